//! External service seams: the NLP classifier/reply model and the
//! outbound delivery channel.
//!
//! Both are consumed behind `Send + Sync` traits so the engine never
//! knows which vendor sits behind them and tests can substitute fakes.
//! The HTTP implementations follow the same blocking call pattern as
//! the rest of the codebase: a reqwest client driven through the
//! current tokio runtime handle.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::EngineError;

/// Semantic intent of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Emergency,
    Social,
    Question,
    CheckinResponse,
    OffTopic,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Emergency => "emergency",
            Intent::Social => "social",
            Intent::Question => "question",
            Intent::CheckinResponse => "checkin_response",
            Intent::OffTopic => "off_topic",
        }
    }
}

/// Result of classifying one inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    /// 0.0..=1.0 classifier confidence.
    pub confidence: f64,
    pub reason: String,
}

/// Conversational context handed to the classifier.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassifyContext {
    pub has_active_checkin: bool,
    pub checkin_title: Option<String>,
}

/// Black-box classification and reply-generation service.
pub trait NlpService: Send + Sync {
    /// Classify an inbound message given conversational context.
    fn classify(&self, text: &str, context: &ClassifyContext)
        -> Result<Classification, EngineError>;

    /// Generate a free-form conversational reply.
    fn generate_reply(&self, text: &str, patient_name: &str) -> Result<String, EngineError>;
}

/// Outbound delivery capability: `send(destination, text)`.
pub trait OutboundSender: Send + Sync {
    fn send(&self, destination: &str, text: &str) -> Result<(), EngineError>;
}

/// HTTP-backed NLP service client.
pub struct HttpNlpService {
    base_url: String,
    client: Client,
}

impl HttpNlpService {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    intent: Intent,
    confidence: f64,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct ReplyResponse {
    reply: String,
}

impl NlpService for HttpNlpService {
    fn classify(
        &self,
        text: &str,
        context: &ClassifyContext,
    ) -> Result<Classification, EngineError> {
        let body = json!({
            "text": text,
            "context": context,
        });
        let url = format!("{}/classify", self.base_url);
        let response: ClassifyResponse = tokio::runtime::Handle::current()
            .block_on(async {
                self.client
                    .post(&url)
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await
            })
            .map_err(|e: reqwest::Error| EngineError::Downstream {
                service: "nlp",
                message: e.to_string(),
            })?;
        Ok(Classification {
            intent: response.intent,
            confidence: response.confidence.clamp(0.0, 1.0),
            reason: response.reason,
        })
    }

    fn generate_reply(&self, text: &str, patient_name: &str) -> Result<String, EngineError> {
        let body = json!({
            "text": text,
            "patient_name": patient_name,
        });
        let url = format!("{}/reply", self.base_url);
        let response: ReplyResponse = tokio::runtime::Handle::current()
            .block_on(async {
                self.client
                    .post(&url)
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await
            })
            .map_err(|e: reqwest::Error| EngineError::Downstream {
                service: "nlp",
                message: e.to_string(),
            })?;
        Ok(response.reply)
    }
}

/// HTTP-backed delivery gateway client.
pub struct HttpOutboundSender {
    gateway_url: String,
    client: Client,
}

impl HttpOutboundSender {
    pub fn new(gateway_url: &str) -> Self {
        Self {
            gateway_url: gateway_url.to_string(),
            client: Client::new(),
        }
    }
}

impl OutboundSender for HttpOutboundSender {
    fn send(&self, destination: &str, text: &str) -> Result<(), EngineError> {
        let body = json!({
            "to": destination,
            "body": text,
        });
        tokio::runtime::Handle::current()
            .block_on(async {
                self.client
                    .post(&self.gateway_url)
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?;
                Ok::<_, reqwest::Error>(())
            })
            .map_err(|e| EngineError::Downstream {
                service: "delivery",
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_parses_response() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/classify")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"intent":"social","confidence":0.93,"reason":"greeting"}"#)
            .create();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let service = HttpNlpService::new(&server.url());
        let result = service
            .classify("bom dia!", &ClassifyContext::default())
            .unwrap();
        assert_eq!(result.intent, Intent::Social);
        assert!((result.confidence - 0.93).abs() < f64::EPSILON);
        assert_eq!(result.reason, "greeting");
    }

    #[test]
    fn test_classify_error_maps_to_downstream() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("POST", "/classify").with_status(500).create();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let service = HttpNlpService::new(&server.url());
        let err = service
            .classify("hello", &ClassifyContext::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::Downstream { service: "nlp", .. }));
    }

    #[test]
    fn test_sender_posts_to_gateway() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/send")
            .with_status(200)
            .with_body("{}")
            .create();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let sender = HttpOutboundSender::new(&format!("{}/send", server.url()));
        sender.send("+5511999990000", "hello").unwrap();
        mock.assert();
    }

    #[test]
    fn test_confidence_is_clamped() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/classify")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"intent":"question","confidence":1.7,"reason":""}"#)
            .create();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let service = HttpNlpService::new(&server.url());
        let result = service
            .classify("why?", &ClassifyContext::default())
            .unwrap();
        assert_eq!(result.confidence, 1.0);
    }
}
