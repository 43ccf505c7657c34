// HTTP server module
// Thin transport wrapper around the question/answer pipeline


use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::agent::{Answer, PortfolioAgent};
use crate::{PortfolioError, Result};

const INDEX_PAGE: &str = include_str!("../../static/index.html");

#[derive(Clone)]
struct AppState {
    agent: Arc<PortfolioAgent>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AskReply {
    Answer { response: String },
    Error { error: String },
}

/// Build the router: `POST /ask` answering questions, `GET /` serving
/// the static page
#[inline]
pub fn router(agent: Arc<PortfolioAgent>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_page))
        .route("/ask", post(ask))
        .layer(cors)
        .with_state(AppState { agent })
}

/// Bind and serve until the process is stopped
#[inline]
pub async fn serve(agent: Arc<PortfolioAgent>, port: u16) -> Result<()> {
    let app = router(agent);
    let addr = format!("0.0.0.0:{port}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PortfolioError::Config(format!("Failed to bind {addr}: {e}")))?;

    info!("Listening on http://{addr}");
    axum::serve(listener, app)
        .await
        .map_err(|e| PortfolioError::Other(anyhow::anyhow!("Server error: {e}")))?;

    Ok(())
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> (StatusCode, Json<AskReply>) {
    let question = request.question.trim();
    if question.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(AskReply::Error {
                error: "Please ask a question".to_string(),
            }),
        );
    }

    match state.agent.answer(question).await {
        Ok(Answer::Text(response)) => (StatusCode::OK, Json(AskReply::Answer { response })),
        Ok(Answer::NoData) => (
            StatusCode::OK,
            Json(AskReply::Answer {
                response: state.agent.fallback_reply(),
            }),
        ),
        Err(e) => {
            error!("Failed to answer question: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AskReply::Error {
                    error: format!("An error occurred: {e}"),
                }),
            )
        }
    }
}
