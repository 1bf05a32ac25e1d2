//! Built-in tools: clock, arithmetic, caller info, preference saving.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;

use crate::context::RequestContext;
use crate::memory::{MemoryPreferenceStore, PreferenceStore};

use super::{ToolError, ToolOutcome, ToolSpec, Toolbox};

pub const TOOL_CURRENT_TIME: &str = "current_time";
pub const TOOL_CALCULATE: &str = "calculate";
pub const TOOL_USER_INFO: &str = "user_info";
pub const TOOL_SAVE_PREFERENCE: &str = "save_preference";

/// The default tool set wired into every assistant descriptor.
/// Preferences go through the shared [`PreferenceStore`], so they are
/// per-user and visible across threads.
#[derive(Clone)]
pub struct BuiltinToolbox {
    prefs: Arc<dyn PreferenceStore>,
}

impl Default for BuiltinToolbox {
    fn default() -> Self {
        Self::new(Arc::new(MemoryPreferenceStore::new()))
    }
}

impl BuiltinToolbox {
    pub fn new(prefs: Arc<dyn PreferenceStore>) -> Self {
        Self { prefs }
    }

    fn string_arg<'a>(
        tool: &str,
        arguments: &'a serde_json::Value,
        key: &str,
    ) -> Result<&'a str, ToolError> {
        arguments
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: tool.to_string(),
                message: format!("missing string field '{key}'"),
            })
    }
}

#[async_trait]
impl Toolbox for BuiltinToolbox {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: TOOL_CURRENT_TIME.to_string(),
                description: Some("Get the current date and time.".to_string()),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {},
                }),
            },
            ToolSpec {
                name: TOOL_CALCULATE.to_string(),
                description: Some(
                    "Evaluate a math expression like '2 + 2' or '10 * (5 - 3)'.".to_string(),
                ),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "expression": { "type": "string" }
                    },
                    "required": ["expression"],
                }),
            },
            ToolSpec {
                name: TOOL_USER_INFO.to_string(),
                description: Some(
                    "Get information about the current user and session.".to_string(),
                ),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {},
                }),
            },
            ToolSpec {
                name: TOOL_SAVE_PREFERENCE.to_string(),
                description: Some(
                    "Save a user preference. Saved preferences persist across conversations.".to_string(),
                ),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "key": { "type": "string" },
                        "value": { "type": "string" }
                    },
                    "required": ["key", "value"],
                }),
            },
        ]
    }

    async fn call(
        &self,
        name: &str,
        arguments: &serde_json::Value,
        ctx: &RequestContext,
    ) -> Result<ToolOutcome, ToolError> {
        match name {
            TOOL_CURRENT_TIME => Ok(ToolOutcome::text(
                Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            )),
            TOOL_CALCULATE => {
                let expression = Self::string_arg(name, arguments, "expression")?;
                let value = evaluate(expression).map_err(|message| ToolError::Failed {
                    tool: name.to_string(),
                    message,
                })?;
                Ok(ToolOutcome::text(format_number(value)))
            }
            TOOL_USER_INFO => {
                let user = ctx.user_or_anonymous();
                let mut text = format!(
                    "User: {}, Session: {}",
                    user,
                    if ctx.session_id.is_empty() {
                        "unknown"
                    } else {
                        &ctx.session_id
                    }
                );
                let prefs = self.prefs.list(user).await.map_err(|e| ToolError::Failed {
                    tool: name.to_string(),
                    message: e.to_string(),
                })?;
                if !prefs.is_empty() {
                    let rendered: Vec<String> =
                        prefs.iter().map(|(k, v)| format!("{k}={v}")).collect();
                    text.push_str(&format!(", Preferences: {}", rendered.join(", ")));
                }
                Ok(ToolOutcome::text(text))
            }
            TOOL_SAVE_PREFERENCE => {
                let key = Self::string_arg(name, arguments, "key")?;
                let value = Self::string_arg(name, arguments, "value")?;
                let user = ctx.user_or_anonymous();
                self.prefs
                    .put(user, key, value)
                    .await
                    .map_err(|e| ToolError::Failed {
                        tool: name.to_string(),
                        message: e.to_string(),
                    })?;
                let mut outcome = ToolOutcome::text(format!(
                    "Saved preference '{key}' = '{value}' for user {user}"
                ));
                outcome.extensions.insert(
                    format!("pref.{key}"),
                    serde_json::Value::String(value.to_string()),
                );
                Ok(outcome)
            }
            other => Err(ToolError::Unknown(other.to_string())),
        }
    }
}

/// Drops a trailing `.0` so integer results read as integers.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Evaluates `+ - * /` with parentheses and unary minus over f64.
fn evaluate(expression: &str) -> Result<f64, String> {
    if let Some(c) = expression
        .chars()
        .find(|c| !c.is_ascii_digit() && !"+-*/(). ".contains(*c))
    {
        return Err(format!("invalid character: '{c}'"));
    }
    let tokens: Vec<char> = expression.chars().filter(|c| !c.is_whitespace()).collect();
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!(
            "unexpected trailing input at position {}",
            parser.pos
        ));
    }
    if !value.is_finite() {
        return Err("result is not finite".to_string());
    }
    Ok(value)
}

struct Parser {
    tokens: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.tokens.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.factor()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            if op == '*' {
                value *= rhs;
            } else {
                if rhs == 0.0 {
                    return Err("division by zero".to_string());
                }
                value /= rhs;
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some('(') => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek() != Some(')') {
                    return Err("missing closing parenthesis".to_string());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) => Err(format!("unexpected '{c}'")),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn number(&mut self) -> Result<f64, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let text: String = self.tokens[start..self.pos].iter().collect();
        text.parse::<f64>().map_err(|_| format!("bad number: {text}"))
    }
}
