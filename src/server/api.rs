use axum::{
    extract::State,
    http::header,
    http::HeaderMap,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use log::{error, info};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::agent::{resolve_chat_id, PipelineRequest, PolicyAgent};
use crate::cli::Args;
use crate::models::api::{
    ChatCompletionRequest, ModelCapabilities, ModelDescriptor, ModelList,
};
use crate::server::error::ServerError;
use crate::server::stream;

#[derive(Clone)]
struct AppState {
    agent: Arc<PolicyAgent>,
    args: Args,
}

pub async fn serve(
    addr: String,
    agent: Arc<PolicyAgent>,
    args: Args,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app_state = AppState { agent, args };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .layer(cors)
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatCompletionRequest>,
) -> Result<Response, ServerError> {
    let session_token = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookie_header| {
            extract_session_token(cookie_header, &state.args.session_cookie)
        });

    // The last user-role message is the current query.
    let user_message = req
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .ok_or_else(|| ServerError::BadRequest("No user message found".into()))?;

    let chat_id = resolve_chat_id(session_token, req.chat_id.clone());
    info!("chat_id: {}, stream: {}", chat_id, req.stream);

    let request = PipelineRequest {
        chat_id,
        query: user_message,
    };

    // The pipeline runs on its own task: if the client disconnects, the
    // handler future is dropped but the persistence writes still finish.
    let agent = state.agent.clone();
    let result = tokio::spawn(async move { agent.process_query(request).await })
        .await
        .map_err(|e| {
            error!("Pipeline task panicked or was cancelled: {}", e);
            ServerError::Internal("pipeline execution failed".into())
        })??;

    let response_id = stream::new_response_id();
    let created = Utc::now().timestamp();

    if req.stream {
        stream::sse_response(&result, &req.model, &response_id, created)
    } else {
        Ok(stream::single_shot_response(
            &result,
            &req.model,
            &response_id,
            created,
        ))
    }
}

async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    Json(ModelList {
        object: "list".to_string(),
        data: vec![ModelDescriptor {
            id: state.args.served_model.clone(),
            object: "model".to_string(),
            created: 1690000000,
            owned_by: "organization".to_string(),
            permission: Vec::new(),
            root: state.args.served_model.clone(),
            parent: None,
            max_tokens: state.args.context_length,
            context_length: state.args.context_length,
            capabilities: ModelCapabilities {
                completion: true,
                chat_completion: true,
            },
        }],
    })
}

/// Pulls the session token out of a Cookie header. pgAdmin-style values are
/// quoted and carry a `!`-separated signature suffix; only the leading
/// token identifies the session.
fn extract_session_token(cookie_header: &str, cookie_name: &str) -> Option<String> {
    let prefix = format!("{}=", cookie_name);
    for part in cookie_header.split(';') {
        if let Some(value) = part.trim().strip_prefix(prefix.as_str()) {
            let value = value.trim_matches('"');
            let token = value.split('!').next().unwrap_or("");
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_cookie_value() {
        let token = extract_session_token("pga4_session=abc123; theme=dark", "pga4_session");
        assert_eq!(token.as_deref(), Some("abc123"));
    }

    #[test]
    fn strips_quotes_and_signature_suffix() {
        let token = extract_session_token(
            "other=1; pga4_session=\"abc123!signature-part\"",
            "pga4_session",
        );
        assert_eq!(token.as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_cookie_yields_none() {
        assert!(extract_session_token("theme=dark", "pga4_session").is_none());
        assert!(extract_session_token("", "pga4_session").is_none());
    }

    #[test]
    fn empty_value_yields_none() {
        assert!(extract_session_token("pga4_session=", "pga4_session").is_none());
        assert!(extract_session_token("pga4_session=\"!sig\"", "pga4_session").is_none());
    }
}
