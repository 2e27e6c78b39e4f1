use crate::models::quiz::{Analytics, Attempt, Difficulty, Question, SkillLevel};

/// Tunable grading policy. The 2x multiplier and the skill thresholds come
/// from the product's display contract, not a fixed rule, so they live here
/// rather than inline in the grader.
#[derive(Debug, Clone)]
pub struct ScoringPolicy {
    pub points_per_correct: i32,
    pub advanced_threshold: f64,
    pub intermediate_threshold: f64,
    /// Per-question durations above this are rejected as implausible.
    pub max_question_seconds: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            points_per_correct: 2,
            advanced_threshold: 80.0,
            intermediate_threshold: 50.0,
            max_question_seconds: 3600.0,
        }
    }
}

/// Validated submission, ordered by question index: entry i answers
/// question i. Produced by `quiz_service::check_submission`, which guarantees
/// full coverage, in-range option indices, and plausible durations.
#[derive(Debug, Clone)]
pub struct AnswerSheet {
    pub answers: Vec<usize>,
    pub times_seconds: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct GradedQuiz {
    pub attempts: Vec<Attempt>,
    pub score: i32,
    pub analytics: Analytics,
}

/// Expected seconds to answer a question of the given difficulty. Used as the
/// baseline when turning elapsed time into a difficulty signal.
fn baseline_seconds(difficulty: Difficulty) -> f64 {
    30.0 * difficulty_weight(difficulty)
}

fn difficulty_weight(difficulty: Difficulty) -> f64 {
    match difficulty {
        Difficulty::Easy => 1.0,
        Difficulty::Medium => 2.0,
        Difficulty::Hard => 3.0,
    }
}

/// Grade a validated answer sheet. Correctness is derived here from the
/// stored questions, never taken from the client.
pub fn grade(questions: &[Question], sheet: &AnswerSheet, policy: &ScoringPolicy) -> GradedQuiz {
    debug_assert_eq!(questions.len(), sheet.answers.len());
    debug_assert_eq!(questions.len(), sheet.times_seconds.len());

    let total = questions.len();
    let mut attempts = Vec::with_capacity(total);
    let mut correct_count = 0usize;
    let mut total_seconds = 0.0;
    let mut difficulty_sum = 0.0;

    for (idx, question) in questions.iter().enumerate() {
        let user_answer = sheet.answers[idx];
        let time_spent = sheet.times_seconds[idx];
        let is_correct = user_answer == question.correct_answer;
        if is_correct {
            correct_count += 1;
        }
        total_seconds += time_spent;

        // Label hardness and slowness against baseline, each half the signal,
        // scaled to [0, 10]. Monotonic in both inputs.
        let label_part = difficulty_weight(question.difficulty) / 3.0;
        let slowness_part = (time_spent / baseline_seconds(question.difficulty)).min(2.0) / 2.0;
        difficulty_sum += 10.0 * (0.5 * label_part + 0.5 * slowness_part);

        attempts.push(Attempt {
            question_index: idx,
            user_answer,
            time_spent_seconds: time_spent,
            is_correct,
        });
    }

    let total_f = total.max(1) as f64;
    let score_percentage = 100.0 * correct_count as f64 / total_f;
    let question_difficulty = (difficulty_sum / total_f).clamp(0.0, 10.0);
    let miss_rate = 1.0 - correct_count as f64 / total_f;
    let topic_difficulty = (0.7 * question_difficulty + 0.3 * miss_rate * 10.0).clamp(0.0, 10.0);

    let skill_level = if score_percentage >= policy.advanced_threshold {
        SkillLevel::Advanced
    } else if score_percentage >= policy.intermediate_threshold {
        SkillLevel::Intermediate
    } else {
        SkillLevel::Beginner
    };

    GradedQuiz {
        attempts,
        score: policy.points_per_correct * correct_count as i32,
        analytics: Analytics {
            time_taken_per_question: total_seconds / total_f / 60.0,
            question_difficulty,
            topic_difficulty,
            score_percentage,
            skill_level,
        },
    }
}
