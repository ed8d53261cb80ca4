//! Outbound HTTP to the book-catalog provider.
//!
//! Everything above this module talks to [`CatalogTransport`], so pacing,
//! retries and parsing can be exercised against an in-process transport.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::TransportError;

pub const USER_AGENT: &str = concat!("Volume-BookReviews/", env!("CARGO_PKG_VERSION"));

/// A GET request as queued by the throttler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl OutboundRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }
}

/// Raw provider response. Status interpretation is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait CatalogTransport: Send + Sync {
    async fn get(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl CatalogTransport for HttpTransport {
    async fn get(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(format!("Failed to read body: {}", e)))?;

        tracing::debug!(url = %request.url, status, bytes = body.len(), "Catalog response received");

        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted transport used by the unit tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    pub(crate) enum Reply {
        Respond(TransportResponse),
        Fail(TransportError),
        /// Answers only after the given delay.
        Delayed(Duration, TransportResponse),
        /// Never answers within any sane timeout.
        Hang,
        /// Panics inside the transport call.
        Panic,
    }

    pub(crate) struct Rule {
        pattern: String,
        replies: VecDeque<Reply>,
        fallback: Option<TransportResponse>,
    }

    #[derive(Default)]
    pub(crate) struct MockTransport {
        rules: Mutex<Vec<Rule>>,
        calls: Mutex<Vec<(Instant, String)>>,
    }

    impl MockTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Always answer URLs containing `pattern` with `status`/`body`.
        pub(crate) fn respond(self, pattern: &str, status: u16, body: serde_json::Value) -> Self {
            self.rules.lock().unwrap().push(Rule {
                pattern: pattern.to_string(),
                replies: VecDeque::new(),
                fallback: Some(TransportResponse::new(status, body.to_string())),
            });
            self
        }

        /// Answer URLs containing `pattern` with each reply once, in order.
        pub(crate) fn sequence(self, pattern: &str, replies: Vec<Reply>) -> Self {
            self.rules.lock().unwrap().push(Rule {
                pattern: pattern.to_string(),
                replies: replies.into(),
                fallback: None,
            });
            self
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(_, url)| url.clone()).collect()
        }

        pub(crate) fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(at, _)| *at).collect()
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CatalogTransport for MockTransport {
        async fn get(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((Instant::now(), request.url.clone()));

            let reply = {
                let mut rules = self.rules.lock().unwrap();
                rules
                    .iter_mut()
                    .find(|rule| request.url.contains(&rule.pattern))
                    .and_then(|rule| {
                        rule.replies
                            .pop_front()
                            .or_else(|| rule.fallback.clone().map(Reply::Respond))
                    })
            };

            match reply {
                Some(Reply::Respond(response)) => Ok(response),
                Some(Reply::Fail(err)) => Err(err),
                Some(Reply::Delayed(delay, response)) => {
                    tokio::time::sleep(delay).await;
                    Ok(response)
                }
                Some(Reply::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(TransportError::Network("hung".into()))
                }
                Some(Reply::Panic) => panic!("transport crashed on {}", request.url),
                None => Ok(TransportResponse::new(404, "{}")),
            }
        }
    }
}
