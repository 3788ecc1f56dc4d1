use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::classify::Classification;
use crate::corpus::{CorpusHandle, CorpusPhase};
use crate::retriever::Retriever;

pub const INITIALIZING_MESSAGE: &str =
    "The knowledge base is still initializing. Please try again in a moment.";
pub const UNAVAILABLE_MESSAGE: &str =
    "The knowledge base is currently unavailable. Please consult the official documentation.";

/// Characters of raw context quoted when the generator cannot be used.
const FALLBACK_EXCERPT_CHARS: usize = 500;

const RAG_PROMPT: &str = r#"You are the helpdesk's expert support agent. Answer the customer using only the documentation context provided.

CUSTOMER TICKET:
"""
{ticket}
"""

TOPIC: {topic}

DOCUMENTATION CONTEXT:
{context}

INSTRUCTIONS:
- Use specific information from the documentation context.
- Include step-by-step instructions or configuration details when available.
- Cite the exact URLs you used from the context.
- If the context is insufficient, say so and point to the official documentation.
- Format the answer in markdown.

Return ONLY a JSON object: {"response": "your detailed customer response", "sources": ["urls", "from", "context"]}"#;

/// Free-form text generation consumed by the answer engine. Prompt in,
/// answer text out; parsing what comes back is the caller's concern.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Blocking client for OpenAI-compatible chat-completion endpoints.
pub struct HttpGenerator {
    client: Client,
    endpoint: String,
    model: String,
}

impl HttpGenerator {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let auth = format!("Bearer {}", key.trim());
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth).context("invalid generator API key")?,
            );
        }
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build generator HTTP client")?;
        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model: model.into(),
        })
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl TextGenerator for HttpGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a precise helpdesk agent. Follow the output format exactly.",
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .context("failed to call the text generator")?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("generator returned {}: {}", status, text);
        }
        let parsed: ChatResponse = response
            .json()
            .context("failed to parse the generator response")?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("generator returned no choices")?;
        Ok(answer)
    }
}

/// Final answer handed back to the ticket channel.
#[derive(Debug, Clone, Serialize)]
pub struct TicketAnswer {
    pub response: String,
    pub sources: Vec<String>,
}

/// Classification-gated answering over the retriever and the (optional)
/// text generator. Without a generator, answers degrade to raw context
/// excerpts rather than failing.
pub struct AnswerEngine {
    handle: CorpusHandle,
    retriever: Retriever,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl AnswerEngine {
    pub fn new(
        handle: CorpusHandle,
        retriever: Retriever,
        generator: Option<Arc<dyn TextGenerator>>,
    ) -> Self {
        Self {
            handle,
            retriever,
            generator,
        }
    }

    pub fn respond(&self, ticket: &str, classification: &Classification) -> TicketAnswer {
        if !classification.is_rag_eligible() {
            return TicketAnswer {
                response: format!(
                    "This ticket has been classified as a '{}' issue and routed to the appropriate team.",
                    classification.topic
                ),
                sources: Vec::new(),
            };
        }

        match self.handle.phase() {
            CorpusPhase::Initializing => {
                return TicketAnswer {
                    response: INITIALIZING_MESSAGE.to_string(),
                    sources: Vec::new(),
                }
            }
            CorpusPhase::Failed(reason) => {
                tracing::warn!(reason = %reason, "answering against a failed corpus build");
                return TicketAnswer {
                    response: UNAVAILABLE_MESSAGE.to_string(),
                    sources: Vec::new(),
                };
            }
            CorpusPhase::Ready(_) => {}
        }

        let query = format!("{} {}", classification.topic, ticket);
        let context = self.retriever.retrieve(&query);

        let Some(generator) = &self.generator else {
            return self.fallback_answer(&classification.topic, &context);
        };

        let prompt = rag_prompt(ticket, &classification.topic, &context.text);
        match generator.generate(&prompt) {
            Ok(text) => match parse_generated_answer(&text, &context.sources) {
                Some(answer) => answer,
                None => {
                    tracing::warn!("generator output carried no parseable answer");
                    self.fallback_answer(&classification.topic, &context)
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "text generation failed");
                self.fallback_answer(&classification.topic, &context)
            }
        }
    }

    /// Answer from raw context when the generator is absent or failing.
    fn fallback_answer(
        &self,
        topic: &str,
        context: &crate::retriever::RetrievalContext,
    ) -> TicketAnswer {
        if context.is_empty() {
            return TicketAnswer {
                response: format!(
                    "I found limited information for your {topic} question. Please refer to the official documentation or contact our support team for personalized assistance."
                ),
                sources: Vec::new(),
            };
        }
        let excerpt: String = context.text.chars().take(FALLBACK_EXCERPT_CHARS).collect();
        TicketAnswer {
            response: format!(
                "Based on the documentation, here's guidance for your {topic} question:\n\n{excerpt}...\n\nFor complete details, please refer to the official documentation."
            ),
            sources: context.sources.clone(),
        }
    }
}

fn rag_prompt(ticket: &str, topic: &str, context: &str) -> String {
    RAG_PROMPT
        .replace("{ticket}", ticket)
        .replace("{topic}", topic)
        .replace("{context}", context)
}

fn parse_generated_answer(text: &str, retrieved_sources: &[String]) -> Option<TicketAnswer> {
    let value = extract_json(text)?;
    let response = value.get("response")?.as_str()?.to_string();
    let sources = value
        .get("sources")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|sources| !sources.is_empty())
        .unwrap_or_else(|| retrieved_sources.to_vec());
    Some(TicketAnswer { response, sources })
}

/// Pull a JSON object out of generator output: fenced ```json blocks first,
/// then the outermost brace span, then the text as a whole.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + "```json".len()..];
        if let Some(end) = rest.find("```") {
            if let Ok(value) = serde_json::from_str(rest[..end].trim()) {
                return Some(value);
            }
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str(text[start..=end].trim()) {
                return Some(value);
            }
        }
    }

    serde_json::from_str(text.trim()).ok()
}
