pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::services::{
    ai_service::AiService,
    chat_service::ChatService,
    quiz_service::{GenerationSettings, QuizService},
    scoring::ScoringPolicy,
};
use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use sqlx::PgPool;
use std::time::Duration;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub chat_service: ChatService,
    pub quiz_service: QuizService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let config = crate::config::get_config();
        let timeout = Duration::from_secs(config.ai_timeout_seconds);
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        let ai_service = AiService::new(
            config.openai_api_key.clone(),
            http_client,
            config.openai_base_url.clone(),
            timeout,
        );
        let chat_service = ChatService::new(pool.clone(), ai_service.clone());
        let quiz_service = QuizService::new(
            pool.clone(),
            ai_service,
            GenerationSettings {
                question_count: config.quiz_question_count,
                max_attempts: config.generation_max_attempts,
            },
            ScoringPolicy::default(),
        );

        Self {
            pool,
            chat_service,
            quiz_service,
        }
    }
}

pub fn app(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/auth/signup", post(routes::auth::signup))
        .route("/api/auth/login", post(routes::auth::login));

    let protected = Router::new()
        .route("/api/auth/me", get(routes::auth::me))
        .route("/api/chat/send", post(routes::chat::send_message))
        .route("/api/chat/history", get(routes::chat::get_history))
        .route("/api/quiz/generate", post(routes::quiz::generate_quiz))
        .route("/api/quiz/submit", post(routes::quiz::submit_quiz))
        .route("/api/quiz/history", get(routes::quiz::get_quiz_history))
        .route("/api/quiz/:quiz_id", get(routes::quiz::get_quiz))
        .layer(axum::middleware::from_fn(
            middleware::auth::require_bearer_auth,
        ));

    public
        .merge(protected)
        .with_state(state)
        .layer(middleware::cors::permissive_cors())
        .layer(TraceLayer::new_for_http())
}
