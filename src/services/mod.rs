pub mod ai_service;
pub mod chat_service;
pub mod quiz_service;
pub mod scoring;
