use crate::error::{Error, Result};
use crate::models::chat::{ChatSession, Message};
use crate::services::ai_service::AiService;
use sqlx::PgPool;
use uuid::Uuid;

/// Conversation stage, stored explicitly on the session so resuming an
/// interrupted conversation is unambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitingSubject,
    AwaitingLevel,
    AwaitingTopic,
    QuizReady,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::AwaitingSubject => "awaiting_subject",
            Stage::AwaitingLevel => "awaiting_level",
            Stage::AwaitingTopic => "awaiting_topic",
            Stage::QuizReady => "quiz_ready",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "awaiting_subject" => Some(Stage::AwaitingSubject),
            "awaiting_level" => Some(Stage::AwaitingLevel),
            "awaiting_topic" => Some(Stage::AwaitingTopic),
            "quiz_ready" => Some(Stage::QuizReady),
            _ => None,
        }
    }
}

/// Which conversation slot the user's message fills at a given stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Subject,
    Level,
    Topic,
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub next: Stage,
    pub slot: Option<Slot>,
    pub prompt: String,
}

/// Pure transition function: (stage, user input) -> (next stage, captured
/// slot, prompt for the assistant). The prompts follow the original guided
/// flow: subject -> ask level, level -> ask focus area, topic -> announce the
/// quiz.
pub fn advance(stage: Stage, input: &str) -> Transition {
    match stage {
        Stage::AwaitingSubject => Transition {
            next: Stage::AwaitingLevel,
            slot: Some(Slot::Subject),
            prompt: format!(
                "As a helpful educational assistant, ask about the student's knowledge level \
                 (Beginner/Intermediate/Advanced) for studying: {}",
                input
            ),
        },
        Stage::AwaitingLevel => Transition {
            next: Stage::AwaitingTopic,
            slot: Some(Slot::Level),
            prompt: format!(
                "Based on their {} level, ask about specific areas they want to focus on in \
                 their studies.",
                input
            ),
        },
        Stage::AwaitingTopic => Transition {
            next: Stage::QuizReady,
            slot: Some(Slot::Topic),
            prompt: format!(
                "Acknowledge their focus area and let them know you'll generate a quiz to \
                 assess their knowledge in: {}",
                input
            ),
        },
        Stage::QuizReady => Transition {
            next: Stage::QuizReady,
            slot: None,
            prompt: format!(
                "The student already has a quiz prepared. Briefly respond to their message \
                 and encourage them to complete the quiz. Their message: {}",
                input
            ),
        },
    }
}

#[derive(Clone)]
pub struct ChatService {
    pool: PgPool,
    ai: AiService,
}

impl ChatService {
    pub fn new(pool: PgPool, ai: AiService) -> Self {
        Self { pool, ai }
    }

    /// Append the user's message, derive the next prompt from the stored
    /// stage, and append the assistant's reply. The user message is persisted
    /// before the upstream call so it survives an assistant outage; both
    /// writes carry an optimistic version check so rapid repeated sends
    /// cannot silently drop messages.
    pub async fn send_message(&self, owner_id: Uuid, text: &str) -> Result<(String, Vec<Message>)> {
        let session = self.find_or_create_session(owner_id).await?;
        let stage = Stage::parse(&session.stage)
            .ok_or_else(|| Error::Internal(format!("Unknown stage: {}", session.stage)))?;

        let mut messages = session.messages();
        messages.push(Message::user(text));

        let transition = advance(stage, text);

        // Persist the user message first; on upstream failure the caller is
        // told to retry without losing what they typed.
        let version = self
            .write_session(&session, &messages, stage, None, session.version)
            .await?;

        let reply = self.ai.chat_reply(&transition.prompt).await?;

        messages.push(Message::bot(reply.clone()));
        self.write_session(
            &session,
            &messages,
            transition.next,
            transition.slot.map(|s| (s, text.to_string())),
            version,
        )
        .await?;

        tracing::debug!(owner = %owner_id, stage = transition.next.as_str(), "chat advanced");
        Ok((reply, messages))
    }

    pub async fn history(&self, owner_id: Uuid) -> Result<Vec<Message>> {
        let session = sqlx::query_as::<_, ChatSession>(
            r#"SELECT * FROM chat_sessions WHERE user_id = $1"#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session.map(|s| s.messages()).unwrap_or_default())
    }

    async fn find_or_create_session(&self, owner_id: Uuid) -> Result<ChatSession> {
        if let Some(session) = sqlx::query_as::<_, ChatSession>(
            r#"SELECT * FROM chat_sessions WHERE user_id = $1"#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(session);
        }

        sqlx::query(
            r#"INSERT INTO chat_sessions (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING"#,
        )
        .bind(owner_id)
        .execute(&self.pool)
        .await?;

        let session = sqlx::query_as::<_, ChatSession>(
            r#"SELECT * FROM chat_sessions WHERE user_id = $1"#,
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }

    /// Conditional update keyed on the session version. Returns the new
    /// version; a concurrent writer invalidates the check and surfaces as a
    /// retryable conflict.
    async fn write_session(
        &self,
        session: &ChatSession,
        messages: &[Message],
        stage: Stage,
        slot: Option<(Slot, String)>,
        expected_version: i64,
    ) -> Result<i64> {
        let messages_json = serde_json::to_value(messages)?;
        let (subject, level, topic) = match &slot {
            Some((Slot::Subject, v)) => (Some(v.clone()), None, None),
            Some((Slot::Level, v)) => (None, Some(v.clone()), None),
            Some((Slot::Topic, v)) => (None, None, Some(v.clone())),
            None => (None, None, None),
        };

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE chat_sessions
            SET messages = $1,
                stage = $2,
                subject = COALESCE($3, subject),
                level = COALESCE($4, level),
                topic = COALESCE($5, topic),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $6 AND version = $7
            RETURNING version
            "#,
        )
        .bind(messages_json)
        .bind(stage.as_str())
        .bind(subject)
        .bind(level)
        .bind(topic)
        .bind(session.id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| {
            Error::Conflict("Chat session was modified concurrently, retry".to_string())
        })
    }
}
