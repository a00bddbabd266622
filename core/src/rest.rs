/// REST collaborator: conversation lists, thread history, message persistence
///
/// Endpoints:
///   GET  /messages/contacts/{user}                               → result.data
///   GET  /messages/direct/?recipient_id={other}&sender_id={self} → result.Messages
///   POST /messages/                                              body: Message
///   PUT  /notifications/update                                   body: {"recipient","sender"}
use crate::config::Config;
use crate::error::{MessagingError, Result};
use crate::messenger_types::{ConversationSummary, Message};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

#[async_trait]
pub trait RestService: Send + Sync {
    /// Latest message per counterpart for `user_id`
    async fn fetch_latest_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>>;

    /// Full history between the two identities, oldest first
    async fn fetch_thread(&self, self_id: &str, counterpart_id: &str) -> Result<Vec<Message>>;

    async fn post_message(&self, message: &Message) -> Result<()>;

    /// `recipient_id` has read everything `sender_id` sent
    async fn mark_read(&self, recipient_id: &str, sender_id: &str) -> Result<()>;
}

// ─── Wire envelopes ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct ConversationsResult {
    #[serde(default)]
    data: Vec<ConversationSummary>,
}

#[derive(Deserialize)]
struct ThreadResult {
    #[serde(rename = "Messages", default)]
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct MarkReadRequest<'a> {
    recipient: &'a str,
    sender: &'a str,
}

// ─── hyper client ────────────────────────────────────────────────────────────

/// `RestService` over plain HTTP
pub struct HttpRestClient {
    client: Client<HttpConnector, Full<Bytes>>,
    base_url: String,
    auth_token: Option<String>,
    request_timeout: Duration,
}

impl HttpRestClient {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            request_timeout: config.request_timeout,
        }
    }

    async fn request(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<Bytes> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = Request::builder().method(method.clone()).uri(&url);
        if let Some(token) = &self.auth_token {
            builder = builder.header("Authorization", token);
        }
        let payload = match body {
            Some(bytes) => {
                builder = builder.header("Content-Type", "application/json");
                Full::new(Bytes::from(bytes))
            }
            None => Full::new(Bytes::new()),
        };
        let req = builder
            .body(payload)
            .map_err(|e| MessagingError::Fetch(format!("{} {}: bad request: {}", method, url, e)))?;

        debug!("{} {}", method, url);
        let exchange = async {
            let resp = self
                .client
                .request(req)
                .await
                .map_err(|e| MessagingError::Fetch(format!("{} {}: {}", method, url, e)))?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| MessagingError::Fetch(format!("{} {}: body read error: {}", method, url, e)))?
                .to_bytes();
            Ok::<_, MessagingError>((status, body))
        };

        let (status, body) = timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| {
                MessagingError::Fetch(format!("{} {}: timed out after {:?}", method, url, self.request_timeout))
            })??;

        if !status.is_success() {
            return Err(MessagingError::Fetch(format!("{} {}: status {}", method, url, status_text(status))));
        }
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.request(Method::GET, path, None).await?;
        serde_json::from_slice(&body)
            .map_err(|e| MessagingError::Fetch(format!("GET {}: invalid body: {}", path, e)))
    }
}

fn status_text(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

#[async_trait]
impl RestService for HttpRestClient {
    async fn fetch_latest_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let path = format!("/messages/contacts/{}", urlencoding::encode(user_id));
        let envelope: Envelope<ConversationsResult> = self.get_json(&path).await?;
        Ok(envelope.result.data)
    }

    async fn fetch_thread(&self, self_id: &str, counterpart_id: &str) -> Result<Vec<Message>> {
        let path = format!(
            "/messages/direct/?recipient_id={}&sender_id={}",
            urlencoding::encode(counterpart_id),
            urlencoding::encode(self_id)
        );
        let envelope: Envelope<ThreadResult> = self.get_json(&path).await?;
        let mut messages = envelope.result.messages;
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn post_message(&self, message: &Message) -> Result<()> {
        let body = serde_json::to_vec(message)?;
        self.request(Method::POST, "/messages/", Some(body)).await?;
        Ok(())
    }

    async fn mark_read(&self, recipient_id: &str, sender_id: &str) -> Result<()> {
        let body = serde_json::to_vec(&MarkReadRequest {
            recipient: recipient_id,
            sender: sender_id,
        })?;
        self.request(Method::PUT, "/notifications/update", Some(body)).await?;
        Ok(())
    }
}
