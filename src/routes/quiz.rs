use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json, Response},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::quiz_dto::{GenerateQuizRequest, SubmitQuizRequest, SubmitQuizResponse};
use crate::middleware::auth::Claims;
use crate::AppState;

#[axum::debug_handler]
pub async fn generate_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GenerateQuizRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let owner_id = claims.owner_id()?;

    let quiz = state
        .quiz_service
        .generate(owner_id, &req.subject, &req.level, &req.topic)
        .await?;

    Ok(Json(quiz).into_response())
}

#[axum::debug_handler]
pub async fn submit_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitQuizRequest>,
) -> crate::error::Result<Response> {
    let owner_id = claims.owner_id()?;

    let outcome = state
        .quiz_service
        .submit(req.quiz_id, owner_id, &req.answers, &req.question_times)
        .await?;

    Ok(Json(SubmitQuizResponse {
        score: outcome.score,
        total_questions: outcome.total_questions,
        ml_data: outcome.analytics,
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn get_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let owner_id = claims.owner_id()?;
    let quiz = state.quiz_service.get(quiz_id, owner_id).await?;
    Ok(Json(quiz).into_response())
}

#[axum::debug_handler]
pub async fn get_quiz_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> crate::error::Result<Response> {
    let owner_id = claims.owner_id()?;
    let quizzes = state.quiz_service.history(owner_id).await?;
    Ok(Json(quizzes).into_response())
}
