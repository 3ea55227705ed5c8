//! HTTP entry points.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::agent::conversation::strict_instruction;
use crate::agent::reply::resolve_instruction;
use crate::agent::{ConversationAgent, ReplyDrafter};
use crate::email::{EmailRecord, NewEmail, PromptConfig};
use crate::error::{AgentError, DatabaseError, PipelineError, RagError};
use crate::llm::LlmProvider;
use crate::pipeline::{BatchOrchestrator, PassSummary, RateLimiter};
use crate::rag::{EmbeddingProvider, RagConfig, RagService};
use crate::store::Database;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Database>,
    pub orchestrator: Arc<BatchOrchestrator>,
    pub conversation: Arc<ConversationAgent>,
    pub drafter: Arc<ReplyDrafter>,
    pub rag: Arc<RagService>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Database>,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        limiter: Arc<RateLimiter>,
        rag_config: RagConfig,
    ) -> Self {
        Self {
            orchestrator: Arc::new(BatchOrchestrator::new(
                Arc::clone(&store),
                Arc::clone(&llm),
                limiter,
            )),
            conversation: Arc::new(ConversationAgent::new(Arc::clone(&llm))),
            drafter: Arc::new(ReplyDrafter::new(Arc::clone(&llm))),
            rag: Arc::new(RagService::new(Arc::clone(&store), embedder, llm, rag_config)),
            store,
        }
    }
}

/// Build the Axum router with every REST route.
pub fn app_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/prompts", get(get_prompts).post(update_prompts))
        .route("/emails", get(list_emails))
        .route("/add-email", post(add_email))
        .route("/process-all-emails", post(process_all))
        .route("/process-email", post(process_email_instruction))
        .route("/process-email/{id}", post(process_one))
        .route("/categorize", post(categorize))
        .route("/generate-reply", post(generate_reply))
        .route("/init", get(rag_init))
        .route("/embed", post(rag_embed))
        .route("/ask", post(rag_ask))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

type ApiResponse = (StatusCode, Json<Value>);

fn error_body(status: StatusCode, message: impl Into<String>) -> ApiResponse {
    (status, Json(json!({"error": message.into()})))
}

fn database_error(e: DatabaseError) -> ApiResponse {
    error!(error = %e, "Database request failed");
    error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn pipeline_error(e: PipelineError) -> ApiResponse {
    let status = match &e {
        PipelineError::EmailNotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::Stage { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %e, "Pipeline request failed");
    }
    error_body(status, e.to_string())
}

fn agent_error(e: AgentError) -> ApiResponse {
    match e {
        AgentError::EmailNotFound(_) => error_body(StatusCode::NOT_FOUND, "Email not found"),
        AgentError::InvalidOutput(_) => {
            error_body(StatusCode::BAD_GATEWAY, "Model returned invalid JSON")
        }
        AgentError::Llm(e) => {
            warn!(error = %e, "Model call failed");
            error_body(StatusCode::BAD_GATEWAY, e.to_string())
        }
        AgentError::Database(e) => database_error(e),
    }
}

fn rag_error(e: RagError) -> ApiResponse {
    match e {
        RagError::Database(e) => database_error(e),
        other => {
            warn!(error = %other, "Retrieval request failed");
            error_body(StatusCode::BAD_GATEWAY, other.to_string())
        }
    }
}

/// Summary JSON for a pass, or the failure status when the pass aborted.
fn pass_result(result: Result<PassSummary, PipelineError>) -> ApiResponse {
    match result {
        Ok(summary) => (StatusCode::OK, Json(json!(summary))),
        Err(e) => {
            error!(error = %e, "Re-processing pass aborted");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "message": e.to_string()})),
            )
        }
    }
}

async fn find_email(state: &AppState, id: &str) -> Result<EmailRecord, ApiResponse> {
    match state.store.get_email(id).await {
        Ok(Some(email)) => Ok(email),
        Ok(None) => Err(error_body(StatusCode::NOT_FOUND, "Email not found")),
        Err(e) => Err(database_error(e)),
    }
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Prompts ─────────────────────────────────────────────────────────────

async fn get_prompts(State(state): State<AppState>) -> ApiResponse {
    match state.store.get_prompts().await {
        Ok(prompts) => (StatusCode::OK, Json(json!(prompts))),
        Err(e) => database_error(e),
    }
}

/// Save the prompts, then re-process so stored results follow them.
async fn update_prompts(
    State(state): State<AppState>,
    Json(prompts): Json<PromptConfig>,
) -> ApiResponse {
    if let Err(e) = state.store.save_prompts(&prompts).await {
        return database_error(e);
    }
    info!("Prompts updated, starting re-processing pass");

    let (_, Json(summary)) = pass_result(state.orchestrator.run_pass().await);
    (
        StatusCode::OK,
        Json(json!({"status": "success", "summary": summary})),
    )
}

// ── Emails ──────────────────────────────────────────────────────────────

async fn list_emails(State(state): State<AppState>) -> ApiResponse {
    match state.store.get_all_emails().await {
        Ok(emails) => (StatusCode::OK, Json(json!(emails))),
        Err(e) => database_error(e),
    }
}

async fn add_email(State(state): State<AppState>, Json(new_email): Json<NewEmail>) -> ApiResponse {
    let email = match state.orchestrator.ingest(new_email).await {
        Ok(email) => email,
        Err(e) => return pipeline_error(e),
    };

    if let Err(e) = state.rag.index_email(&email).await {
        warn!(id = %email.id, error = %e, "Failed to index new email for retrieval");
    }

    (StatusCode::CREATED, Json(json!(email)))
}

async fn process_all(State(state): State<AppState>) -> ApiResponse {
    pass_result(state.orchestrator.run_pass().await)
}

async fn process_one(State(state): State<AppState>, Path(id): Path<String>) -> ApiResponse {
    match state.orchestrator.process_by_id(&id).await {
        Ok(processed) => (StatusCode::OK, Json(json!(processed))),
        Err(e) => pipeline_error(e),
    }
}

#[derive(Deserialize)]
struct InstructionRequest {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "prmopt")]
    prompt: Option<String>,
}

async fn process_email_instruction(
    State(state): State<AppState>,
    Json(body): Json<InstructionRequest>,
) -> ApiResponse {
    let (Some(id), Some(prompt)) = (
        body.id.filter(|s| !s.trim().is_empty()),
        body.prompt.filter(|s| !s.trim().is_empty()),
    ) else {
        return error_body(StatusCode::BAD_REQUEST, "id and prompt are required");
    };

    let email = match find_email(&state, &id).await {
        Ok(email) => email,
        Err(response) => return response,
    };

    match state
        .conversation
        .ask(&email, &strict_instruction(&prompt))
        .await
    {
        Ok(reply) => (StatusCode::OK, Json(json!({"id": id, "response": reply}))),
        Err(e) => agent_error(e),
    }
}

#[derive(Deserialize)]
struct CategorizeRequest {
    #[serde(default)]
    id: String,
    subject: String,
    body: String,
}

async fn categorize(
    State(state): State<AppState>,
    Json(body): Json<CategorizeRequest>,
) -> ApiResponse {
    match state
        .orchestrator
        .categorize_adhoc(&body.subject, &body.body)
        .await
    {
        Ok(category) => (
            StatusCode::OK,
            Json(json!({"id": body.id, "category": category})),
        ),
        Err(e) => pipeline_error(e),
    }
}

#[derive(Deserialize)]
struct GenerateReplyRequest {
    id: String,
    #[serde(default)]
    prompt: Option<String>,
}

async fn generate_reply(
    State(state): State<AppState>,
    Json(body): Json<GenerateReplyRequest>,
) -> ApiResponse {
    let email = match find_email(&state, &body.id).await {
        Ok(email) => email,
        Err(response) => return response,
    };
    let prompts = match state.store.get_prompts().await {
        Ok(prompts) => prompts,
        Err(e) => return database_error(e),
    };

    let instruction = resolve_instruction(body.prompt.as_deref(), &prompts);
    match state.drafter.draft(&email, instruction).await {
        Ok(draft) => (StatusCode::OK, Json(json!(draft))),
        Err(e) => agent_error(e),
    }
}

// ── Retrieval ───────────────────────────────────────────────────────────

async fn rag_init(State(state): State<AppState>) -> ApiResponse {
    match state.rag.build_index().await {
        Ok(count) => (StatusCode::OK, Json(json!({"indexed": count}))),
        Err(e) => rag_error(e),
    }
}

#[derive(Deserialize)]
struct AskRequest {
    prompt: String,
    #[serde(default)]
    k: Option<usize>,
}

async fn rag_embed(State(state): State<AppState>, Json(body): Json<AskRequest>) -> ApiResponse {
    match state.rag.embed(&body.prompt).await {
        Ok(vector) => (StatusCode::OK, Json(json!({"vector": vector}))),
        Err(e) => rag_error(e),
    }
}

async fn rag_ask(State(state): State<AppState>, Json(body): Json<AskRequest>) -> ApiResponse {
    match state.rag.ask(&body.prompt, body.k).await {
        Ok(answer) => (StatusCode::OK, Json(json!(answer))),
        Err(e) => rag_error(e),
    }
}
