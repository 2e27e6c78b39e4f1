use crate::models::quiz::Analytics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerateQuizRequest {
    #[validate(length(min = 1, max = 200, message = "Subject is required"))]
    pub subject: String,
    #[validate(length(min = 1, max = 100, message = "Level is required"))]
    pub level: String,
    #[validate(length(min = 1, max = 200, message = "Topic is required"))]
    pub topic: String,
}

/// Submission payload. The client's own start/end timestamps are accepted for
/// wire compatibility but ignored; the server clock is authoritative.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuizRequest {
    pub quiz_id: Uuid,
    pub answers: HashMap<usize, usize>,
    pub question_times: HashMap<usize, f64>,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuizResponse {
    pub score: i32,
    pub total_questions: usize,
    pub ml_data: Analytics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_request_parses_original_frontend_shape() {
        let body = serde_json::json!({
            "quizId": "9be6b4a2-9d8f-4dd4-8e27-1d3757d7b0d1",
            "answers": { "0": 2, "1": 0 },
            "questionTimes": { "0": 12.5, "1": 30 },
            "startTime": 1700000000000i64,
            "endTime": 1700000100000i64
        });
        let req: SubmitQuizRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.answers[&0], 2);
        assert_eq!(req.question_times[&1], 30.0);
        assert!(req.start_time.is_some());
    }
}
