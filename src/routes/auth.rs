use axum::{
    extract::State,
    response::{IntoResponse, Json, Response},
    Extension,
};
use validator::Validate;

use crate::dto::auth_dto::{AuthResponse, LoginRequest, SignupRequest, UserView};
use crate::error::Error;
use crate::middleware::auth::Claims;
use crate::models::user::User;
use crate::utils::{crypto, token};
use crate::AppState;

#[axum::debug_handler]
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    if !req.valid_role() {
        return Err(Error::BadRequest(
            "Role must be either student or teacher".to_string(),
        ));
    }

    let password_hash = crypto::hash_password(&req.password)
        .map_err(|e| Error::Internal(format!("Password hashing failed: {}", e)))?;

    let result = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(&req.name)
    .bind(req.email.to_lowercase())
    .bind(&password_hash)
    .bind(&req.role)
    .fetch_one(&state.pool)
    .await;

    let user = match result {
        Ok(user) => user,
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            return Err(Error::BadRequest("Email is already registered".to_string()));
        }
        Err(other) => return Err(other.into()),
    };

    let config = crate::config::get_config();
    let token = token::issue_token(user.id, &user.role, &config.jwt_secret)?;
    tracing::info!(user_id = %user.id, "user registered");

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;

    let user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE email = $1"#)
        .bind(req.email.to_lowercase())
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| Error::Unauthorized("Invalid credentials".to_string()))?;

    let ok = crypto::verify_password(&req.password, &user.password_hash)
        .map_err(|e| Error::Internal(format!("Password verification failed: {}", e)))?;
    if !ok {
        return Err(Error::Unauthorized("Invalid credentials".to_string()));
    }

    let config = crate::config::get_config();
    let token = token::issue_token(user.id, &user.role, &config.jwt_secret)?;

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> crate::error::Result<Response> {
    let owner_id = claims.owner_id()?;
    let user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE id = $1"#)
        .bind(owner_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| Error::NotFound("User not found".to_string()))?;

    Ok(Json(UserView::from(user)).into_response())
}
