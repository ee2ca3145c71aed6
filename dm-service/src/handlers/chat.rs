//! `POST /chat` and `DELETE /chat`.

use crate::models::{ChatRequest, ChatResponse, MessageResponse, StreamLine};
use crate::services::{metrics, DmError};
use crate::startup::AppState;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use service_core::error::AppError;
use std::convert::Infallible;

fn upstream(error: DmError) -> AppError {
    AppError::UpstreamError(error.to_string())
}

/// Answer a player turn, either as one JSON object or as NDJSON deltas.
pub async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let request = ChatRequest::parse(&body).map_err(|e| {
        tracing::warn!(error = %e, "Rejected chat request");
        metrics::record_chat_request("invalid", "none", "bad_request");
        AppError::BadRequest(anyhow::Error::new(e))
    })?;

    let action = request.action.as_str();
    let mode = if request.enable_stream { "stream" } else { "complete" };
    tracing::info!(action, mode, prompt_chars = request.prompt.len(), "Chat request");

    if request.enable_stream {
        let deltas = state
            .dungeon_master
            .respond_stream(request.action, &request.prompt)
            .await
            .map_err(|e| {
                tracing::error!(action, error = %e, "Failed to start DM reply stream");
                metrics::record_chat_request(action, mode, "error");
                upstream(e)
            })?;
        metrics::record_chat_request(action, mode, "ok");

        let lines = deltas.map(|delta| {
            let line = match delta {
                Ok(text) => StreamLine::content(text),
                Err(e) => StreamLine::error(e),
            };
            Ok::<_, Infallible>(line.to_line())
        });

        return Ok((
            [(header::CONTENT_TYPE, "application/json")],
            Body::from_stream(lines),
        )
            .into_response());
    }

    let result = state
        .dungeon_master
        .respond(request.action, &request.prompt)
        .await
        .map_err(|e| {
            tracing::error!(action, error = %e, "DM reply failed");
            metrics::record_chat_request(action, mode, "error");
            upstream(e)
        })?;
    metrics::record_chat_request(action, mode, "ok");

    Ok(Json(ChatResponse { result }).into_response())
}

/// Wipe campaign history.
pub async fn reset_campaign(State(state): State<AppState>) -> Result<Json<MessageResponse>, AppError> {
    state.dungeon_master.reset_campaign().await.map_err(|e| {
        tracing::error!(error = %e, "Campaign reset failed");
        metrics::record_chat_request("reset", "none", "error");
        upstream(e)
    })?;
    metrics::record_chat_request("reset", "none", "ok");

    Ok(Json(MessageResponse {
        message: "Campaign history reset successfully".to_string(),
    }))
}
