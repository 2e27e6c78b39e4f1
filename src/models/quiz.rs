use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

/// A quiz document. Questions, attempts, and analytics live in JSONB payload
/// columns and are deserialized into typed structs at the service boundary.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Quiz {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject: String,
    pub level: String,
    pub topic: String,
    pub questions: JsonValue,
    pub attempts: Option<JsonValue>,
    pub analytics: Option<JsonValue>,
    pub score: Option<i32>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Quiz {
    pub fn questions(&self) -> Vec<Question> {
        serde_json::from_value(self.questions.clone()).unwrap_or_default()
    }

    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// One graded answer. `is_correct` is always recomputed server-side from the
/// selected index, never taken from the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub question_index: usize,
    pub user_answer: usize,
    pub time_spent_seconds: f64,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    /// Mean time per question, in minutes.
    pub time_taken_per_question: f64,
    /// Question-level difficulty summary in [0, 10].
    pub question_difficulty: f64,
    /// Topic-level difficulty summary in [0, 10].
    pub topic_difficulty: f64,
    pub score_percentage: f64,
    pub skill_level: SkillLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
}
