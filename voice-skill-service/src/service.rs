use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderValue, Request},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post},
};
use dialog_flow::{Context, Graph};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, Span, error, info, warn};
use uuid::Uuid;

use crate::bindings::BindingStore;
use crate::config::{KvBackend, SkillConfig};
use crate::downstream::{HttpAssistantService, HttpShipmentService, Orchestrator};
use crate::envelope::{OutboundEnvelope, TurnRequest};
use crate::kv::{InMemoryKvStore, KvStore, PipelineKvStore};
use crate::models::SessionState;
use crate::replies;
use crate::tasks::session_keys;
use crate::workflow::build_turn_graph;

/// Runs one turn through the graph and always produces an envelope
pub struct TurnEngine {
    graph: Arc<Graph>,
}

impl TurnEngine {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph: Arc::new(graph),
        }
    }

    pub fn from_parts(
        bindings: BindingStore,
        orchestrator: Orchestrator,
        verification_phrase: &str,
    ) -> Self {
        Self::new(build_turn_graph(bindings, orchestrator, verification_phrase))
    }

    pub async fn handle(&self, turn: TurnRequest) -> OutboundEnvelope {
        let context = Context::new();
        if let Some(user_id) = &turn.user_id {
            context.set(session_keys::USER_ID, user_id).await;
        }
        if let Some(session_id) = &turn.session_id {
            context.set(session_keys::SESSION_ID, session_id).await;
        }
        context.set(session_keys::UTTERANCE, &turn.utterance).await;
        context
            .set(session_keys::RAW_UTTERANCE, &turn.raw_utterance)
            .await;
        if let Some(state) = &turn.state {
            context.set(session_keys::INBOUND_STATE, state).await;
        }

        // A panic inside a task surfaces as a JoinError instead of tearing down the connection
        let graph = Arc::clone(&self.graph);
        let run_context = context.clone();
        let outcome = tokio::spawn(
            async move { graph.run_turn(run_context).await }.instrument(Span::current()),
        )
        .await;

        match outcome {
            Ok(Ok(result)) => match result.response {
                Some(text) => {
                    let state = context
                        .get::<SessionState>(session_keys::OUTBOUND_STATE)
                        .await;
                    info!(
                        task_id = %result.task_id,
                        awaiting_details = state.as_ref().is_some_and(|s| s.awaiting_details),
                        "Turn answered"
                    );
                    OutboundEnvelope::reply(text, state)
                }
                None => {
                    error!(task_id = %result.task_id, "Turn ended without a reply");
                    fallback()
                }
            },
            Ok(Err(e)) => {
                error!(error = %e, "Turn failed");
                fallback()
            }
            Err(e) => {
                error!(error = %e, "Turn task aborted");
                fallback()
            }
        }
    }
}

fn fallback() -> OutboundEnvelope {
    OutboundEnvelope::reply(replies::STILL_PROCESSING, None)
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TurnEngine>,
}

/// Wire the production dependencies described by `config`
pub fn create_app(config: &SkillConfig) -> anyhow::Result<Router> {
    let client = reqwest::Client::builder().build()?;

    let kv: Arc<dyn KvStore> = match config.kv.backend {
        KvBackend::Pipeline => {
            let store = PipelineKvStore::from_config(client.clone(), &config.kv);
            if !store.is_configured() {
                warn!("KV_REST_URL or KV_REST_TOKEN missing; every binding lookup will miss");
            }
            Arc::new(store)
        }
        KvBackend::Memory => {
            warn!("Using in-memory key-value store; bindings are lost on restart");
            Arc::new(InMemoryKvStore::new())
        }
    };

    let orchestrator = Orchestrator::new(
        Arc::new(HttpShipmentService::new(
            client.clone(),
            &config.downstream.base_url,
        )),
        Arc::new(HttpAssistantService::new(client, &config.downstream.base_url)),
        config.downstream.clone(),
    );

    let engine = TurnEngine::from_parts(
        BindingStore::new(kv),
        orchestrator,
        &config.verification_phrase,
    );
    Ok(build_router(AppState {
        engine: Arc::new(engine),
    }))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/webhook", post(webhook))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(correlation_id_middleware))
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(app_state)
}

/// Middleware to add correlation ID to all requests
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// The voice platform renders only `response.text` and treats any non-200
/// as a skill failure, so every body gets a 200 envelope.
async fn webhook(State(state): State<AppState>, body: Bytes) -> Json<OutboundEnvelope> {
    let envelope: Value = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, body_length = body.len(), "Unparsable webhook body");
            return Json(fallback());
        }
    };

    let turn = TurnRequest::from_envelope(&envelope);
    info!(
        user_id = turn.user_id.as_deref().unwrap_or("unknown"),
        utterance_length = turn.utterance.chars().count(),
        has_state = turn.state.is_some(),
        "Processing webhook turn"
    );

    Json(state.engine.handle(turn).await)
}
