use axum::{
    extract::State,
    response::{IntoResponse, Json, Response},
    Extension,
};
use validator::Validate;

use crate::dto::chat_dto::{ChatHistoryResponse, SendMessageRequest, SendMessageResponse};
use crate::middleware::auth::Claims;
use crate::AppState;

#[axum::debug_handler]
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let owner_id = claims.owner_id()?;

    let (reply, history) = state.chat_service.send_message(owner_id, &req.message).await?;

    Ok(Json(SendMessageResponse {
        message: reply,
        chat_history: history,
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn get_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> crate::error::Result<Response> {
    let owner_id = claims.owner_id()?;
    let messages = state.chat_service.history(owner_id).await?;
    Ok(Json(ChatHistoryResponse { messages }).into_response())
}
