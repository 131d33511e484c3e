//! services/api/src/adapters/generation.rs
//!
//! This module contains the adapter for the flashcard-generating LLM.
//! It implements the `CardGenerationService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig, error::OpenAIError, types::responses::CreateResponseArgs, Client,
};
use async_trait::async_trait;
use std::time::Duration;
use study_buddy_core::domain::CardContent;
use study_buddy_core::ports::CardGenerationService;
use study_buddy_core::service::CARDS_PER_GENERATION;
use tracing::warn;

/// Bound on one upstream generation attempt. The HTTP client handed to the
/// OpenAI `Client` must carry this total-request timeout; a stuck upstream
/// then surfaces as "no cards generated" instead of hanging the request.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

const INSTRUCTIONS_TEMPLATE: &str = r#"Based on the following text, generate exactly {count} distinct questions and their corresponding answers.
Format your response as a valid JSON array of objects, where each object has a "question" key and an "answer" key.
Do not include any other text or explanation outside of the JSON array.

Here is the text:
---
{context}
---"#;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CardGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiGenerationAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerationAdapter {
    /// Creates a new `OpenAiGenerationAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    async fn request_cards(&self, context: &str) -> Result<String, OpenAIError> {
        let input = INSTRUCTIONS_TEMPLATE
            .replace("{count}", &CARDS_PER_GENERATION.to_string())
            .replace("{context}", context);

        let request = CreateResponseArgs::default()
            .model(&self.model)
            .input(input)
            .max_output_tokens(1000u32)
            .build()?;

        let response = self.client.responses().create(request).await?;
        Ok(response.output_text().unwrap_or_default())
    }
}

//=========================================================================================
// Response parsing
//=========================================================================================

/// The shape of one generated pair as the model emits it. Both fields are
/// optional so a half-formed pair can be dropped instead of failing the
/// whole batch.
#[derive(serde::Deserialize)]
struct RawCard {
    question: Option<String>,
    answer: Option<String>,
}

/// Extracts Q&A pairs from a free-text model response.
///
/// The model is told to emit only a JSON array, but in practice the array is
/// often wrapped in prose or code fences, so this scans from the first `[`
/// to the last `]` instead of parsing the whole body. Anything unparsable
/// yields an empty Vec.
fn parse_cards(response_text: &str) -> Vec<CardContent> {
    let start = match response_text.find('[') {
        Some(i) => i,
        None => return Vec::new(),
    };
    let end = match response_text.rfind(']') {
        Some(i) if i >= start => i,
        _ => return Vec::new(),
    };

    let raw: Vec<RawCard> = match serde_json::from_str(&response_text[start..=end]) {
        Ok(cards) => cards,
        Err(e) => {
            warn!("Could not parse generated card array: {}", e);
            return Vec::new();
        }
    };

    raw.into_iter()
        .filter_map(|card| match (card.question, card.answer) {
            (Some(question), Some(answer)) => Some(CardContent { question, answer }),
            _ => None,
        })
        .collect()
}

//=========================================================================================
// `CardGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CardGenerationService for OpenAiGenerationAdapter {
    /// Generates Q&A pairs for the submitted study text.
    ///
    /// A transport failure or an unparsable response both come back as an
    /// empty Vec; the orchestrator treats that as a terminal failure for the
    /// request. One attempt only.
    async fn generate_cards(&self, context: &str) -> Vec<CardContent> {
        match self.request_cards(context).await {
            Ok(text) => parse_cards(&text),
            Err(e) => {
                warn!("Card generation request failed: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_clean_array() {
        let cards = parse_cards(
            r#"[{"question":"What is ATP?","answer":"The cell's energy currency."}]"#,
        );
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].question, "What is ATP?");
    }

    #[test]
    fn locates_the_array_inside_surrounding_prose() {
        let response = r#"Sure! Here are your flashcards:
```json
[{"question":"Q1?","answer":"A1"},{"question":"Q2?","answer":"A2"}]
```
Let me know if you need more."#;
        let cards = parse_cards(response);
        assert_eq!(cards.len(), 2);
    }

    #[test]
    fn drops_pairs_missing_a_field() {
        let response = r#"[
            {"question":"Q1?","answer":"A1"},
            {"question":"no answer here"},
            {"answer":"no question here"},
            {"question":"Q2?","answer":"A2"}
        ]"#;
        let cards = parse_cards(response);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[1].question, "Q2?");
    }

    #[test]
    fn response_without_an_array_yields_nothing() {
        assert!(parse_cards("I'm sorry, I can't help with that.").is_empty());
    }

    #[test]
    fn unparsable_array_yields_nothing() {
        assert!(parse_cards("[{question: unquoted}]").is_empty());
    }

    #[test]
    fn bracket_before_opening_brace_yields_nothing() {
        // A stray `]` before the `[` must not panic or parse.
        assert!(parse_cards("] oops [").is_empty());
    }

    #[tokio::test]
    async fn stuck_upstream_times_out_into_no_cards() {
        // Accept the connection and hold it open without ever responding.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(socket);
        });

        // Short timeout to keep the test fast; production wiring uses
        // UPSTREAM_TIMEOUT the same way.
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let config = OpenAIConfig::new()
            .with_api_base(format!("http://{addr}/v1"))
            .with_api_key("test-key");
        let client = Client::with_config(config).with_http_client(http_client);
        let adapter = OpenAiGenerationAdapter::new(client, "test-model".to_string());

        let cards = tokio::time::timeout(
            Duration::from_secs(5),
            adapter.generate_cards("some study text"),
        )
        .await
        .expect("the client timeout must bound the call");

        assert!(cards.is_empty());
    }
}
