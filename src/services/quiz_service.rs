use crate::error::{Error, Result};
use crate::models::quiz::{Analytics, Question, Quiz};
use crate::services::ai_service::{AiService, DifficultyMix};
use crate::services::scoring::{self, AnswerSheet, ScoringPolicy};
use std::collections::HashMap;
use uuid::Uuid;

use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub question_count: usize,
    pub max_attempts: usize,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub score: i32,
    pub total_questions: usize,
    pub analytics: Analytics,
}

#[derive(Clone)]
pub struct QuizService {
    pool: PgPool,
    ai: AiService,
    settings: GenerationSettings,
    policy: ScoringPolicy,
}

impl QuizService {
    pub fn new(
        pool: PgPool,
        ai: AiService,
        settings: GenerationSettings,
        policy: ScoringPolicy,
    ) -> Self {
        Self {
            pool,
            ai,
            settings,
            policy,
        }
    }

    /// Generate and persist a quiz for the owner. Malformed generator output
    /// is retried a bounded number of times; nothing is persisted until a
    /// whole batch validates.
    pub async fn generate(
        &self,
        owner_id: Uuid,
        subject: &str,
        level: &str,
        topic: &str,
    ) -> Result<Quiz> {
        let mix = DifficultyMix::for_level(level, self.settings.question_count);

        let mut last_error = None;
        let mut questions = None;
        for attempt in 1..=self.settings.max_attempts {
            match self.ai.generate_questions(subject, topic, mix).await {
                Ok(batch) => {
                    questions = Some(batch);
                    break;
                }
                Err(e @ Error::GenerationFailed(_)) => {
                    tracing::warn!(attempt, error = %e, "discarding malformed question batch");
                    last_error = Some(e);
                }
                Err(other) => return Err(other),
            }
        }

        let questions = questions.ok_or_else(|| {
            last_error.unwrap_or_else(|| {
                Error::GenerationFailed("No valid question batch produced".to_string())
            })
        })?;

        let questions_json = serde_json::to_value(&questions)?;
        let quiz = sqlx::query_as::<_, Quiz>(
            r#"
            INSERT INTO quizzes (user_id, subject, level, topic, questions, start_time)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING *
            "#,
        )
        .bind(owner_id)
        .bind(subject)
        .bind(level)
        .bind(topic)
        .bind(questions_json)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(quiz_id = %quiz.id, owner = %owner_id, topic, "quiz generated");
        Ok(quiz)
    }

    /// Owner-scoped read; a quiz belonging to someone else reads as missing.
    pub async fn get(&self, quiz_id: Uuid, owner_id: Uuid) -> Result<Quiz> {
        let quiz = sqlx::query_as::<_, Quiz>(
            r#"SELECT * FROM quizzes WHERE id = $1 AND user_id = $2"#,
        )
        .bind(quiz_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Quiz not found".to_string()))?;
        Ok(quiz)
    }

    pub async fn history(&self, owner_id: Uuid) -> Result<Vec<Quiz>> {
        let quizzes = sqlx::query_as::<_, Quiz>(
            r#"SELECT * FROM quizzes WHERE user_id = $1 ORDER BY created_at DESC"#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(quizzes)
    }

    /// Finalize a quiz: grade the answers, derive analytics, and write
    /// attempts + analytics + score + end_time in one conditional statement.
    /// The `end_time IS NULL` guard makes the finalization atomic; under two
    /// concurrent submissions exactly one wins and the other reports
    /// `AlreadySubmitted`.
    pub async fn submit(
        &self,
        quiz_id: Uuid,
        owner_id: Uuid,
        answers: &HashMap<usize, usize>,
        question_times: &HashMap<usize, f64>,
    ) -> Result<SubmitOutcome> {
        let quiz = self.get(quiz_id, owner_id).await?;
        let questions = quiz.questions();

        let sheet = check_submission(
            &questions,
            quiz.is_finalized(),
            answers,
            question_times,
            &self.policy,
        )?;

        let graded = scoring::grade(&questions, &sheet, &self.policy);
        let attempts_json = serde_json::to_value(&graded.attempts)?;
        let analytics_json = serde_json::to_value(&graded.analytics)?;

        let updated = sqlx::query_as::<_, Quiz>(
            r#"
            UPDATE quizzes
            SET attempts = $1, analytics = $2, score = $3, end_time = NOW()
            WHERE id = $4 AND user_id = $5 AND end_time IS NULL
            RETURNING *
            "#,
        )
        .bind(attempts_json)
        .bind(analytics_json)
        .bind(graded.score)
        .bind(quiz_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        // The quiz exists and is owned; a missing row means another
        // submission finalized it between our read and this write.
        if updated.is_none() {
            return Err(Error::AlreadySubmitted);
        }

        tracing::info!(quiz_id = %quiz_id, score = graded.score, "quiz submitted");
        Ok(SubmitOutcome {
            score: graded.score,
            total_questions: questions.len(),
            analytics: graded.analytics,
        })
    }
}

/// Submission preconditions: the quiz is still open, every question is
/// answered exactly once with an option that exists, and every duration is
/// present, non-negative, and plausible. Returns the answers ordered by
/// question index, ready for grading.
pub fn check_submission(
    questions: &[Question],
    finalized: bool,
    answers: &HashMap<usize, usize>,
    question_times: &HashMap<usize, f64>,
    policy: &ScoringPolicy,
) -> Result<AnswerSheet> {
    if finalized {
        return Err(Error::AlreadySubmitted);
    }
    if questions.is_empty() {
        return Err(Error::BadRequest("Quiz has no questions".to_string()));
    }

    let mut ordered_answers = Vec::with_capacity(questions.len());
    let mut ordered_times = Vec::with_capacity(questions.len());
    for (idx, question) in questions.iter().enumerate() {
        let answer = answers.get(&idx).copied().ok_or_else(|| {
            Error::IncompleteAnswers(format!("Missing answer for question {}", idx))
        })?;
        if answer >= question.options.len() {
            return Err(Error::BadRequest(format!(
                "Answer for question {} is not a valid option",
                idx
            )));
        }

        let time = question_times.get(&idx).copied().ok_or_else(|| {
            Error::IncompleteAnswers(format!("Missing time for question {}", idx))
        })?;
        if !time.is_finite() || time < 0.0 {
            return Err(Error::BadRequest(format!(
                "Invalid duration for question {}",
                idx
            )));
        }
        if time > policy.max_question_seconds {
            return Err(Error::BadRequest(format!(
                "Implausible duration for question {}",
                idx
            )));
        }

        ordered_answers.push(answer);
        ordered_times.push(time);
    }

    if answers.keys().any(|&idx| idx >= questions.len()) {
        return Err(Error::BadRequest(
            "Answer refers to an unknown question".to_string(),
        ));
    }

    Ok(AnswerSheet {
        answers: ordered_answers,
        times_seconds: ordered_times,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::Difficulty;

    fn questions(n: usize) -> Vec<Question> {
        (0..n)
            .map(|i| Question {
                question: format!("Question {}?", i),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_answer: i % 4,
                difficulty: Difficulty::Medium,
            })
            .collect()
    }

    fn complete(n: usize) -> (HashMap<usize, usize>, HashMap<usize, f64>) {
        let answers = (0..n).map(|i| (i, 0)).collect();
        let times = (0..n).map(|i| (i, 30.0)).collect();
        (answers, times)
    }

    #[test]
    fn complete_submission_passes_and_orders_answers() {
        let (answers, times) = complete(5);
        let sheet = check_submission(
            &questions(5),
            false,
            &answers,
            &times,
            &ScoringPolicy::default(),
        )
        .unwrap();
        assert_eq!(sheet.answers, vec![0; 5]);
        assert_eq!(sheet.times_seconds, vec![30.0; 5]);
    }

    #[test]
    fn finalized_quiz_rejects_a_second_submission() {
        let (answers, times) = complete(5);
        let err = check_submission(
            &questions(5),
            true,
            &answers,
            &times,
            &ScoringPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "already_submitted");
    }

    #[test]
    fn missing_answer_is_incomplete() {
        let (mut answers, times) = complete(5);
        answers.remove(&3);
        let err = check_submission(
            &questions(5),
            false,
            &answers,
            &times,
            &ScoringPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "incomplete_answers");
    }

    #[test]
    fn missing_time_is_incomplete() {
        let (answers, mut times) = complete(5);
        times.remove(&1);
        let err = check_submission(
            &questions(5),
            false,
            &answers,
            &times,
            &ScoringPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "incomplete_answers");
    }

    #[test]
    fn out_of_range_option_is_rejected() {
        let (mut answers, times) = complete(3);
        answers.insert(1, 99);
        let err = check_submission(
            &questions(3),
            false,
            &answers,
            &times,
            &ScoringPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }

    #[test]
    fn negative_duration_is_rejected() {
        let (answers, mut times) = complete(3);
        times.insert(2, -1.0);
        let err = check_submission(
            &questions(3),
            false,
            &answers,
            &times,
            &ScoringPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }

    #[test]
    fn implausible_duration_is_rejected() {
        let (answers, mut times) = complete(3);
        times.insert(0, 1_000_000.0);
        let err = check_submission(
            &questions(3),
            false,
            &answers,
            &times,
            &ScoringPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }

    #[test]
    fn stray_answer_index_is_rejected() {
        let (mut answers, times) = complete(3);
        answers.insert(9, 1);
        let err = check_submission(
            &questions(3),
            false,
            &answers,
            &times,
            &ScoringPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }
}
