//! Request handlers: invoke, stream, nodes, health.
//!
//! Both turn endpoints share the same shape: resolve or mint a thread id,
//! load the latest state snapshot, append the user message, route, persist
//! the result. `/invoke` returns the reply as JSON; `/stream` sends reply
//! chunks as SSE `data:` events, a `[DONE]` trailer on success, and an
//! `Error: ...` event when the turn fails mid-stream. Validation failures
//! on `/stream` are plain HTTP errors raised before any event is sent.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

use switchboard::{
    AgentError, ConversationState, ReplyChunk, RequestContext, StoreError,
};

use crate::app::AppState;

/// Reply chunks buffered between the turn task and the SSE writer.
const CHUNK_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
pub(crate) struct InvokeRequest {
    pub message: String,
    #[serde(default = "default_node")]
    pub node: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_node() -> String {
    "assistant".to_string()
}

#[derive(Debug, Serialize)]
pub(crate) struct InvokeResponse {
    pub thread_id: String,
    pub node: String,
    pub response: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct NodesResponse {
    pub nodes: Vec<String>,
}

/// Error surface of the facade: a message plus the HTTP status it maps to.
pub(crate) struct FacadeError(String, StatusCode);

impl From<AgentError> for FacadeError {
    fn from(e: AgentError) -> Self {
        let status = match &e {
            AgentError::UnknownNode(_) => StatusCode::BAD_REQUEST,
            AgentError::PromptNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AgentError::ExecutionFailed(_) => StatusCode::BAD_GATEWAY,
            AgentError::StateUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        FacadeError(e.to_string(), status)
    }
}

impl From<StoreError> for FacadeError {
    fn from(e: StoreError) -> Self {
        AgentError::StateUnavailable(e.to_string()).into()
    }
}

impl IntoResponse for FacadeError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.0 }));
        (self.1, body).into_response()
    }
}

/// Resolves the request to a (thread id, context, pre-turn state) triple.
/// New threads get a fresh UUID; existing ids resume their stored state.
async fn prepare_turn(
    state: &AppState,
    req: &InvokeRequest,
) -> Result<(String, RequestContext, ConversationState), FacadeError> {
    let node = req.node.as_str();
    if !state.router.factory().registry().is_valid(node) {
        return Err(AgentError::UnknownNode(node.to_string()).into());
    }

    let thread_id = req
        .thread_id
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let ctx = RequestContext::for_session(
        req.user_id.clone().unwrap_or_default(),
        thread_id.clone(),
    );
    let snapshot = state
        .store
        .load(&thread_id)
        .await?
        .unwrap_or_else(|| ConversationState::new(&thread_id))
        .with_user_message(&req.message);
    Ok((thread_id, ctx, snapshot))
}

pub(crate) async fn invoke(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, FacadeError> {
    let (thread_id, ctx, snapshot) = prepare_turn(&state, &req).await?;
    let routed = state.router.route(&req.node, &snapshot, &ctx).await?;
    state.store.save(&routed).await?;
    info!(
        thread_id = %thread_id,
        node = %req.node,
        messages = routed.messages.len(),
        "turn complete"
    );
    Ok(Json(InvokeResponse {
        thread_id,
        node: req.node,
        response: routed
            .last_assistant_reply()
            .unwrap_or_default()
            .to_string(),
    }))
}

pub(crate) async fn stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InvokeRequest>,
) -> Result<Response, FacadeError> {
    let (thread_id, ctx, snapshot) = prepare_turn(&state, &req).await?;
    let node = req.node.clone();

    let (chunk_tx, mut chunk_rx) = mpsc::channel::<ReplyChunk>(CHUNK_QUEUE_CAPACITY);
    let (done_tx, done_rx) = oneshot::channel::<Result<(), String>>();

    {
        let state = state.clone();
        let node = node.clone();
        let thread_id = thread_id.clone();
        tokio::spawn(async move {
            let outcome = match state.router.route_stream(&node, &snapshot, &ctx, chunk_tx).await
            {
                Ok(routed) => match state.store.save(&routed).await {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        warn!(thread_id = %thread_id, error = %e, "save after stream failed");
                        Err(e.to_string())
                    }
                },
                Err(e) => {
                    warn!(thread_id = %thread_id, node = %node, error = %e, "streamed turn failed");
                    Err(e.to_string())
                }
            };
            let _ = done_tx.send(outcome);
        });
    }

    let body = async_stream::stream! {
        while let Some(chunk) = chunk_rx.recv().await {
            yield Ok::<Event, Infallible>(Event::default().data(chunk.content));
        }
        // channel closed: the turn task is done or about to be
        match done_rx.await {
            Ok(Ok(())) => yield Ok(Event::default().data("[DONE]")),
            Ok(Err(msg)) => yield Ok(Event::default().data(format!("Error: {msg}"))),
            Err(_) => yield Ok(Event::default().data("Error: turn task dropped")),
        }
    };

    let mut response = Sse::new(body).into_response();
    if let Ok(value) = HeaderValue::from_str(&thread_id) {
        response.headers_mut().insert("x-thread-id", value);
    }
    if let Ok(value) = HeaderValue::from_str(&node) {
        response.headers_mut().insert("x-node", value);
    }
    Ok(response)
}

pub(crate) async fn nodes(State(state): State<Arc<AppState>>) -> Json<NodesResponse> {
    Json(NodesResponse {
        nodes: state.router.factory().registry().list().to_vec(),
    })
}

pub(crate) async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "env": state.env.as_str(),
    }))
}
