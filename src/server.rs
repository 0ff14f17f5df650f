// coordinator-agent: HTTP surface

use crate::audit::AuditLogger;
use crate::config::CoordinatorConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::llm::LanguageModel;
use crate::model::{Candidate, DispatchOutcome};
use crate::retrieval::{SearchHit, VectorStore};
use crate::selector;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Shared, request-independent server state.
pub struct AppState {
    pub config: CoordinatorConfig,
    pub llm: Arc<dyn LanguageModel>,
    pub vector_store: VectorStore,
    pub http: reqwest::Client,
    pub audit: AuditLogger,
}

impl AppState {
    /// Assemble state from configuration with the default HTTP backends.
    pub fn new(config: CoordinatorConfig, llm: Arc<dyn LanguageModel>) -> CoordinatorResult<Self> {
        let vector_store = VectorStore::new(&config)?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CoordinatorError::Config(format!("failed to build HTTP client: {}", e)))?;
        let audit = AuditLogger::new(&config.trace_log_path);

        Ok(Self {
            config,
            llm,
            vector_store,
            http,
            audit,
        })
    }
}

/// Build the coordinator router.
pub fn app(state: Arc<AppState>) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/api/search", get(search))
        .route("/api/rerank", post(rerank))
        .route("/api/dispatch", post(dispatch))
        .route("/api/logs", get(read_logs))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve the router until the process is stopped.
pub async fn serve(state: Arc<AppState>, listen_addr: &str) -> CoordinatorResult<()> {
    let listener = TcpListener::bind(listen_addr)
        .await
        .map_err(|e| CoordinatorError::Config(format!("failed to bind {}: {}", listen_addr, e)))?;

    info!("Coordinator listening on http://{}", listen_addr);
    info!("API endpoints:");
    info!("  GET  /api/search?q=..&k=.. - candidate retrieval");
    info!("  POST /api/rerank - service selection only");
    info!("  POST /api/dispatch - full pipeline");
    info!("  GET  /api/logs - trace log");
    info!("  GET  /health - liveness");

    axum::serve(listener, app(state))
        .await
        .map_err(|e| CoordinatorError::Internal(format!("server error: {}", e)))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
    #[serde(default = "default_k")]
    k: usize,
}

fn default_k() -> usize {
    5
}

async fn search(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    axum::extract::Query(params): axum::extract::Query<SearchParams>,
) -> Result<axum::Json<Vec<SearchHit>>, CoordinatorError> {
    if params.q.trim().is_empty() {
        return Err(CoordinatorError::BadRequest("require 'q'".to_string()));
    }

    let embeddings = state.llm.embed(&[params.q.clone()]).await?;
    let embedding = embeddings
        .first()
        .ok_or_else(|| CoordinatorError::Upstream("embedding error: empty batch".to_string()))?;

    let hits = state.vector_store.query(embedding, params.k).await?;
    Ok(axum::Json(hits))
}

async fn rerank(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    axum::Json(body): axum::Json<Value>,
) -> Result<axum::Json<Value>, CoordinatorError> {
    let (query, candidates) = parse_query_and_candidates(&body)?;

    let selection = selector::select(
        state.llm.as_ref(),
        &state.config.selection_prompts,
        &query,
        &candidates,
    )
    .await?;

    Ok(axum::Json(json!({
        "pickids": selection.pickids,
        "order": selection.order,
        "reasons": selection.reasons,
        "raw_response": selection.raw,
    })))
}

async fn dispatch(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    axum::Json(body): axum::Json<Value>,
) -> Result<axum::Json<DispatchOutcome>, CoordinatorError> {
    let body: Map<String, Value> = body
        .as_object()
        .cloned()
        .ok_or_else(|| CoordinatorError::BadRequest("request body must be an object".to_string()))?;

    let dispatcher = Dispatcher {
        llm: state.llm.as_ref(),
        http: &state.http,
        audit: &state.audit,
        prompts: &state.config.selection_prompts,
    };

    let outcome = dispatcher.dispatch(body).await?;
    Ok(axum::Json(outcome))
}

async fn read_logs(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Result<String, CoordinatorError> {
    tokio::fs::read_to_string(&state.config.trace_log_path)
        .await
        .map_err(|_| CoordinatorError::NotFound("Log file not found".to_string()))
}

async fn health() -> axum::Json<Value> {
    axum::Json(json!({ "status": "ok" }))
}

fn parse_query_and_candidates(body: &Value) -> CoordinatorResult<(String, Vec<Candidate>)> {
    let query = body
        .get("query")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty());

    let candidates = body
        .get("candidates")
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty());

    match (query, candidates) {
        (Some(query), Some(items)) => {
            let candidates: Vec<Candidate> =
                serde_json::from_value(Value::Array(items.clone())).map_err(|e| {
                    CoordinatorError::BadRequest(format!("invalid candidates: {}", e))
                })?;
            Ok((query.to_string(), candidates))
        }
        _ => Err(CoordinatorError::BadRequest(
            "require 'query' and 'candidates'".to_string(),
        )),
    }
}
