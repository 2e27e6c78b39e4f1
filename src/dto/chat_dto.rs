use crate::models::chat::Message;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 2000, message = "Message must be 1-2000 characters"))]
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub message: String,
    pub chat_history: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatHistoryResponse {
    pub messages: Vec<Message>,
}
