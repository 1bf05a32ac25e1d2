//! Server entry point: layer config, read settings, wire the agent stack,
//! serve HTTP.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Settings;
use switchboard::engine::OpenAIConfig;
use switchboard::{
    AgentFactory, FactoryConfig, MemoryThreadStore, OpenAiEngine, PromptStore, RetryPolicy,
    Router,
};

use serve::{run_serve, AppState};

#[tokio::main]
async fn main() {
    let layering = config::apply_env_layers("switchboard", None);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = layering {
        warn!(error = %e, "config layering failed, continuing with process env");
    }

    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "invalid settings");
            std::process::exit(1);
        }
    };

    let mut factory_config = FactoryConfig {
        enable_logging: settings.enable_logging,
        enable_summarization: settings.enable_summarization,
        retry: if settings.enable_retry {
            RetryPolicy::with_max_attempts(settings.max_retries)
        } else {
            RetryPolicy::disabled()
        },
        ..FactoryConfig::default()
    };
    if let Some(model) = settings.model.clone() {
        factory_config.model = model;
    }

    let factory = AgentFactory::new(PromptStore::new(), factory_config);
    if let Err(e) = factory.verify() {
        error!(error = %e, "node verification failed");
        std::process::exit(1);
    }

    let engine = OpenAiEngine::with_config(
        OpenAIConfig::new().with_api_key(settings.openai_api_key.clone()),
    );
    let router = Router::new(factory, Arc::new(engine));

    let state = Arc::new(AppState {
        router: Arc::new(router),
        store: Arc::new(MemoryThreadStore::new()),
        env: settings.env,
    });

    let addr = std::env::var("SERVE_ADDR").ok();
    info!(env = %settings.env, "starting switchboard server");
    if let Err(e) = run_serve(addr.as_deref(), state).await {
        error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}
