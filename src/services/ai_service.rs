use crate::error::{Error, Result};
use crate::models::quiz::{Difficulty, Question};
use rand::seq::SliceRandom;
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::time::Duration;

/// How many questions of each difficulty to request for a given level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifficultyMix {
    pub easy: usize,
    pub medium: usize,
    pub hard: usize,
}

impl DifficultyMix {
    /// Beginner leans easy/medium, Advanced leans medium/hard. Unknown levels
    /// get the intermediate mix.
    pub fn for_level(level: &str, total: usize) -> Self {
        let (easy_w, medium_w, hard_w) = match level.trim().to_lowercase().as_str() {
            "beginner" => (3usize, 2usize, 0usize),
            "advanced" => (0, 2, 3),
            _ => (1, 3, 1),
        };
        let weight_sum = easy_w + medium_w + hard_w;
        let easy = total * easy_w / weight_sum;
        let hard = total * hard_w / weight_sum;
        let medium = total - easy - hard;
        Self { easy, medium, hard }
    }

    pub fn total(&self) -> usize {
        self.easy + self.medium + self.hard
    }
}

/// Client for the OpenAI-compatible chat completions API. The HTTP client,
/// key, and base URL are injected at construction so tests can point it at a
/// local double.
#[derive(Clone)]
pub struct AiService {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl AiService {
    pub fn new(api_key: String, client: Client, base_url: String, timeout: Duration) -> Self {
        Self {
            client,
            api_key,
            base_url,
            timeout,
        }
    }

    /// Free-text assistant reply for the guided conversation.
    pub async fn chat_reply(&self, prompt: &str) -> Result<String> {
        let payload = serde_json::json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "You are a friendly study assistant guiding a student toward a quiz. Keep replies short and encouraging."},
                {"role": "user", "content": prompt}
            ],
            "max_tokens": 150,
            "temperature": 0.7
        });

        let content = self.chat_completion(payload).await?;
        Ok(content.trim().to_string())
    }

    /// One generation attempt: ask for a question batch in JSON mode and run
    /// it through the strict parse-and-validate boundary. Malformed output is
    /// a `GenerationFailed` the caller may retry; transport failures surface
    /// as `UpstreamUnavailable` and are not retried here.
    pub async fn generate_questions(
        &self,
        subject: &str,
        topic: &str,
        mix: DifficultyMix,
    ) -> Result<Vec<Question>> {
        let system_prompt = r#"You are an experienced tutor writing a multiple-choice quiz.
The output must be a valid JSON object with a 'questions' array.

Rules:
1. Generate exactly the requested number of questions with the requested difficulty counts.
2. Every question has 4 distinct options and one correct answer.
3. 'correct_answer' is the 0-based index of the correct option. VARY the index; do NOT always use 0.
4. 'difficulty' is one of "easy", "medium", "hard".
5. Avoid "All of the above" or "None of the above" options.
"#;

        let user_schema = serde_json::json!({
            "subject": subject,
            "topic": topic,
            "required_counts": { "easy": mix.easy, "medium": mix.medium, "hard": mix.hard },
            "schema_example": {
                "questions": [
                    {
                        "question": "Question text here...",
                        "options": ["Option 1", "Option 2", "Option 3", "Option 4"],
                        "correct_answer": 2,
                        "difficulty": "medium"
                    }
                ]
            }
        });

        let payload = serde_json::json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": serde_json::to_string(&user_schema)?}
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.8
        });

        let content = self.chat_completion(payload).await?;
        let raw: JsonValue = serde_json::from_str(&content)
            .map_err(|e| Error::GenerationFailed(format!("Response is not JSON: {}", e)))?;

        let mut rng = rand::thread_rng();
        parse_question_batch(&raw, mix.total(), &mut rng)
    }

    async fn chat_completion(&self, payload: JsonValue) -> Result<String> {
        let res = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(Error::UpstreamUnavailable(format!(
                "Completions API error {}: {}",
                status, text
            )));
        }

        let body: JsonValue = res.json().await?;
        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                Error::UpstreamUnavailable("Invalid completions response format".to_string())
            })
    }
}

/// Strict validation boundary for generated questions. The whole batch is
/// rejected when the count is wrong or any question is malformed; the caller
/// retries with a fresh generation instead of persisting partial output.
pub fn parse_question_batch(
    raw: &JsonValue,
    expected: usize,
    rng: &mut impl rand::Rng,
) -> Result<Vec<Question>> {
    let arr = raw
        .get("questions")
        .and_then(|a| a.as_array())
        .or_else(|| raw.as_array())
        .ok_or_else(|| Error::GenerationFailed("Missing 'questions' array".to_string()))?;

    if arr.len() < expected {
        return Err(Error::GenerationFailed(format!(
            "Expected {} questions, got {}",
            expected,
            arr.len()
        )));
    }

    let mut questions = Vec::with_capacity(expected);
    for (idx, val) in arr.iter().take(expected).enumerate() {
        let question = coerce_question(val, rng)
            .map_err(|e| Error::GenerationFailed(format!("Question {}: {}", idx, e)))?;
        questions.push(question);
    }

    Ok(questions)
}

fn coerce_question(v: &JsonValue, rng: &mut impl rand::Rng) -> anyhow::Result<Question> {
    let text = v
        .get("question")
        .and_then(|s| s.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing question text"))?;

    let mut options: Vec<String> = v
        .get("options")
        .and_then(|o| o.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|x| x.as_str().map(|s| s.trim().to_string()))
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let mut distinct = options.clone();
    distinct.sort();
    distinct.dedup();
    if distinct.len() < 2 || distinct.len() != options.len() {
        anyhow::bail!("needs at least 2 distinct options");
    }

    let correct = v
        .get("correct_answer")
        .and_then(|i| i.as_u64())
        .ok_or_else(|| anyhow::anyhow!("missing correct_answer"))? as usize;
    if correct >= options.len() {
        anyhow::bail!("correct_answer {} out of range", correct);
    }

    let difficulty = v
        .get("difficulty")
        .and_then(|s| s.as_str())
        .and_then(Difficulty::parse)
        .ok_or_else(|| anyhow::anyhow!("unknown difficulty"))?;

    // Reshuffle so the correct index varies even if the model did not.
    let correct_option = options[correct].clone();
    options.shuffle(rng);
    let correct_answer = options
        .iter()
        .position(|o| o == &correct_option)
        .ok_or_else(|| anyhow::anyhow!("shuffle lost correct option"))?;

    Ok(Question {
        question: text.to_string(),
        options,
        correct_answer,
        difficulty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Minimal HTTP double standing in for the completions endpoint: serves
    /// the given raw response to every connection.
    async fn spawn_completions_double(response: String) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let response = response.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 64 * 1024];
                    let mut read = 0;
                    loop {
                        match socket.read(&mut buf[read..]).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                read += n;
                                let text = String::from_utf8_lossy(&buf[..read]);
                                if let Some(pos) = text.find("\r\n\r\n") {
                                    let content_length = text
                                        .lines()
                                        .find_map(|line| {
                                            let (name, value) = line.split_once(':')?;
                                            if name.eq_ignore_ascii_case("content-length") {
                                                value.trim().parse::<usize>().ok()
                                            } else {
                                                None
                                            }
                                        })
                                        .unwrap_or(0);
                                    if read >= pos + 4 + content_length {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    fn service_for(addr: SocketAddr) -> AiService {
        AiService::new(
            "sk-test".to_string(),
            Client::new(),
            format!("http://{}/v1", addr),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn chat_reply_returns_trimmed_completion_content() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": "  Hello there!  "}}]
        })
        .to_string();
        let addr = spawn_completions_double(format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        ))
        .await;

        let reply = service_for(addr).chat_reply("hi").await.unwrap();
        assert_eq!(reply, "Hello there!");
    }

    #[tokio::test]
    async fn server_error_surfaces_as_upstream_unavailable() {
        let addr = spawn_completions_double(
            "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                .to_string(),
        )
        .await;

        let err = service_for(addr).chat_reply("hi").await.unwrap_err();
        assert_eq!(err.code(), "upstream_unavailable");
    }

    #[tokio::test]
    async fn malformed_generation_body_is_generation_failed() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": "not json at all"}}]
        })
        .to_string();
        let addr = spawn_completions_double(format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        ))
        .await;

        let err = service_for(addr)
            .generate_questions("Math", "Fractions", DifficultyMix::for_level("beginner", 5))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "generation_failed");
    }

    fn valid_batch(n: usize) -> JsonValue {
        let questions: Vec<JsonValue> = (0..n)
            .map(|i| {
                serde_json::json!({
                    "question": format!("Question {}?", i),
                    "options": ["a", "b", "c", "d"],
                    "correct_answer": i % 4,
                    "difficulty": "medium"
                })
            })
            .collect();
        serde_json::json!({ "questions": questions })
    }

    #[test]
    fn accepts_valid_batch_and_keeps_correct_option() {
        let raw = serde_json::json!({
            "questions": [{
                "question": "2 + 2?",
                "options": ["3", "4", "5"],
                "correct_answer": 1,
                "difficulty": "easy"
            }]
        });
        let questions = parse_question_batch(&raw, 1, &mut rand::thread_rng()).unwrap();
        assert_eq!(questions.len(), 1);
        let q = &questions[0];
        assert!(q.correct_answer < q.options.len());
        assert_eq!(q.options[q.correct_answer], "4");
        assert_eq!(q.difficulty, Difficulty::Easy);
    }

    #[test]
    fn every_correct_index_is_in_bounds() {
        let questions = parse_question_batch(&valid_batch(5), 5, &mut rand::thread_rng()).unwrap();
        assert_eq!(questions.len(), 5);
        for q in &questions {
            assert!(q.correct_answer < q.options.len());
        }
    }

    #[test]
    fn rejects_short_batch() {
        let err = parse_question_batch(&valid_batch(3), 5, &mut rand::thread_rng()).unwrap_err();
        assert_eq!(err.code(), "generation_failed");
    }

    #[test]
    fn rejects_too_few_options() {
        let raw = serde_json::json!({
            "questions": [{
                "question": "Pick one",
                "options": ["only"],
                "correct_answer": 0,
                "difficulty": "easy"
            }]
        });
        assert!(parse_question_batch(&raw, 1, &mut rand::thread_rng()).is_err());
    }

    #[test]
    fn rejects_duplicate_options() {
        let raw = serde_json::json!({
            "questions": [{
                "question": "Pick one",
                "options": ["same", "same", "other"],
                "correct_answer": 2,
                "difficulty": "hard"
            }]
        });
        assert!(parse_question_batch(&raw, 1, &mut rand::thread_rng()).is_err());
    }

    #[test]
    fn rejects_out_of_range_correct_answer() {
        let raw = serde_json::json!({
            "questions": [{
                "question": "Pick one",
                "options": ["a", "b"],
                "correct_answer": 5,
                "difficulty": "medium"
            }]
        });
        assert!(parse_question_batch(&raw, 1, &mut rand::thread_rng()).is_err());
    }

    #[test]
    fn rejects_unknown_difficulty() {
        let raw = serde_json::json!({
            "questions": [{
                "question": "Pick one",
                "options": ["a", "b"],
                "correct_answer": 0,
                "difficulty": "impossible"
            }]
        });
        assert!(parse_question_batch(&raw, 1, &mut rand::thread_rng()).is_err());
    }

    #[test]
    fn mix_sums_to_total_and_tracks_level() {
        for level in ["Beginner", "intermediate", "ADVANCED", "unknown"] {
            let mix = DifficultyMix::for_level(level, 5);
            assert_eq!(mix.total(), 5, "level {}", level);
        }
        let beginner = DifficultyMix::for_level("beginner", 5);
        assert!(beginner.easy > beginner.hard);
        let advanced = DifficultyMix::for_level("advanced", 5);
        assert!(advanced.hard > advanced.easy);
        assert_eq!(advanced.easy, 0);
    }
}
