//! OpenAI-Compatible LLM Client
//!
//! Chat-completions client for any OpenAI-compatible endpoint, with a
//! static pricing table so each completion carries its dollar cost into the
//! benchmark. Unknown models price at zero.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{Completion, CompletionRequest, LlmClient, ProviderError, ProviderResult};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

// ============================================================================
// Pricing
// ============================================================================

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (f64::from(input_tokens) / 1_000_000.0) * self.input_per_million
            + (f64::from(output_tokens) / 1_000_000.0) * self.output_per_million
    }
}

/// Known pricing for common model families.
pub fn pricing_for(model_id: &str) -> Option<ModelPricing> {
    let m = model_id.to_lowercase();
    let (input, output) = match () {
        _ if m.contains("gpt-4o-mini") => (0.15, 0.60),
        _ if m.contains("gpt-4o") => (2.50, 10.0),
        _ if m.contains("gpt-4-turbo") => (10.0, 30.0),
        _ if m.contains("gpt-3.5-turbo") => (0.50, 1.50),
        _ if m.contains("o3-mini") => (1.10, 4.40),
        _ if m.contains("claude") && m.contains("haiku") => (0.80, 4.0),
        _ if m.contains("claude") && m.contains("sonnet") => (3.0, 15.0),
        _ if m.contains("claude") && m.contains("opus") => (15.0, 75.0),
        _ if m.contains("gemini") && m.contains("flash") => (0.10, 0.40),
        _ if m.contains("gemini") && m.contains("pro") => (1.25, 5.0),
        _ => return None,
    };
    Some(ModelPricing {
        input_per_million: input,
        output_per_million: output,
    })
}

// ============================================================================
// Client
// ============================================================================

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiCompatClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl OpenAiCompatClient {
    pub fn new(api_key: String) -> ProviderResult<Self> {
        Self::with_endpoint(api_key, DEFAULT_ENDPOINT.to_string())
    }

    pub fn with_endpoint(api_key: String, endpoint: String) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.trim().to_string(),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<Completion> {
        let body = serde_json::json!({
            "model": request.model_id,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no choices in response".to_string()))?;

        let cost_usd = match pricing_for(&request.model_id) {
            Some(pricing) => pricing.cost(parsed.usage.prompt_tokens, parsed.usage.completion_tokens),
            None => {
                debug!(model = %request.model_id, "no pricing for model, costing at zero");
                0.0
            }
        };

        Ok(Completion {
            text,
            input_tokens: parsed.usage.prompt_tokens,
            output_tokens: parsed.usage.completion_tokens,
            cost_usd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_pricing_lookup() {
        let gpt4o_mini = pricing_for("gpt-4o-mini-2024-07-18").unwrap();
        assert!((gpt4o_mini.input_per_million - 0.15).abs() < 1e-9);
        assert!(pricing_for("my-local-model").is_none());
    }

    #[test]
    fn test_pricing_cost() {
        let pricing = ModelPricing {
            input_per_million: 2.0,
            output_per_million: 10.0,
        };
        let cost = pricing.cost(500_000, 100_000);
        assert!((cost - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_complete_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "{\"name\": \"Harvard University\"}" } }
                ],
                "usage": { "prompt_tokens": 1200, "completion_tokens": 80 }
            })))
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::with_endpoint(
            "key".into(),
            format!("{}/v1/chat/completions", server.uri()),
        )
        .unwrap();
        let completion = client
            .complete(&CompletionRequest {
                system_prompt: "extract".into(),
                user_prompt: "content".into(),
                model_id: "gpt-4o-mini".into(),
                max_tokens: 1024,
                temperature: 0.1,
            })
            .await
            .unwrap();

        assert!(completion.text.contains("Harvard University"));
        assert_eq!(completion.input_tokens, 1200);
        assert_eq!(completion.output_tokens, 80);
        let expected = 1200.0 / 1e6 * 0.15 + 80.0 / 1e6 * 0.60;
        assert!((completion.cost_usd - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_complete_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client =
            OpenAiCompatClient::with_endpoint("key".into(), server.uri()).unwrap();
        let err = client
            .complete(&CompletionRequest {
                system_prompt: String::new(),
                user_prompt: String::new(),
                model_id: "gpt-4o-mini".into(),
                max_tokens: 16,
                temperature: 0.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 401, .. }));
    }
}
