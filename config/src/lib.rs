//! Environment layering and typed settings for the switchboard server.
//!
//! Two pieces: [`apply_env_layers`] merges file-based configuration into the
//! process environment with priority **existing env > .env > XDG
//! `config.toml`**, and [`Settings`] reads the merged environment into a
//! typed struct the server consumes at startup.

mod env_file;
mod settings;
mod xdg;

pub use settings::{EnvTag, Settings, SettingsError};

use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("xdg config path: {0}")]
    XdgPath(String),
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    EnvFileRead(std::io::Error),
}

/// Merges `.env` and the XDG `[env]` table into the process environment.
/// A key already present in the environment is never touched, so the
/// effective priority is env > .env > XDG.
///
/// * `app_name`: XDG path component, `~/.config/<app_name>/config.toml`.
/// * `override_dir`: where to look for `.env`; defaults to the current
///   directory.
pub fn apply_env_layers(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let xdg_map = xdg::load_env_map(app_name)?;
    let env_map = env_file::load_env_map(override_dir).map_err(LoadError::EnvFileRead)?;

    let mut keys: std::collections::HashSet<&String> = xdg_map.keys().collect();
    keys.extend(env_map.keys());

    for key in keys {
        if std::env::var(key).is_ok() {
            continue;
        }
        if let Some(value) = env_map.get(key).or_else(|| xdg_map.get(key)) {
            std::env::set_var(key, value);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;

    fn restore_var(key: &str, prev: Option<String>) {
        match prev {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
    }

    #[test]
    fn existing_env_is_never_overwritten() {
        env::set_var("LAYER_TEST_EXISTING", "from_env");
        let _ = apply_env_layers("switchboard", None);
        assert_eq!(env::var("LAYER_TEST_EXISTING").as_deref(), Ok("from_env"));
        env::remove_var("LAYER_TEST_EXISTING");
    }

    #[test]
    fn no_config_anywhere_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let r = apply_env_layers("config-test-no-such-app-98765", Some(dir.path()));
        assert!(r.is_ok());
    }

    #[test]
    fn env_file_beats_xdg() {
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("switchboard");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(
            app_dir.join("config.toml"),
            "[env]\nLAYER_TEST_PRIORITY = \"from_xdg\"\n",
        )
        .unwrap();

        let env_dir = tempfile::tempdir().unwrap();
        std::fs::write(env_dir.path().join(".env"), "LAYER_TEST_PRIORITY=from_env_file\n")
            .unwrap();

        let prev_xdg = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg_dir.path());
        env::remove_var("LAYER_TEST_PRIORITY");

        let _ = apply_env_layers("switchboard", Some(env_dir.path()));
        let val = env::var("LAYER_TEST_PRIORITY").unwrap();
        env::remove_var("LAYER_TEST_PRIORITY");
        restore_var("XDG_CONFIG_HOME", prev_xdg);

        assert_eq!(val, "from_env_file");
    }

    #[test]
    fn xdg_applies_when_env_file_is_absent() {
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("switchboard");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(
            app_dir.join("config.toml"),
            "[env]\nLAYER_TEST_XDG_ONLY = \"from_xdg\"\n",
        )
        .unwrap();

        let empty_dir = tempfile::tempdir().unwrap();

        let prev_xdg = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg_dir.path());
        env::remove_var("LAYER_TEST_XDG_ONLY");

        let _ = apply_env_layers("switchboard", Some(empty_dir.path()));
        let val = env::var("LAYER_TEST_XDG_ONLY").unwrap();
        env::remove_var("LAYER_TEST_XDG_ONLY");
        restore_var("XDG_CONFIG_HOME", prev_xdg);

        assert_eq!(val, "from_xdg");
    }

    #[test]
    fn malformed_xdg_toml_surfaces_parse_error() {
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("switchboard");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("config.toml"), "broken [[[\n").unwrap();

        let prev_xdg = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg_dir.path());

        let result = apply_env_layers("switchboard", None);
        restore_var("XDG_CONFIG_HOME", prev_xdg);

        assert!(matches!(result, Err(LoadError::XdgParse(_))));
    }
}
