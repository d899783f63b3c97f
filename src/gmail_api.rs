use crate::auth::TokenManager;
use crate::config::Config;
use crate::errors::{GmailApiError, GmailResult};
use crate::utils::decode_base64_bytes;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

// Raw Gmail REST shapes, only the fields the relay reads
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub result_size_estimate: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub payload: MessagePart,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: MessagePartBody,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePartBody {
    pub data: Option<String>,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

// Email message model
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct EmailMessage {
    pub id: String,
    pub thread_id: String,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub date: Option<String>,
    pub snippet: Option<String>,
    pub body: String,
}

impl EmailMessage {
    pub fn from_gmail_message(message: Message) -> Self {
        debug!(
            "Converting Gmail Message to EmailMessage for ID: {}",
            message.id
        );

        let mut subject = None;
        let mut from = None;
        let mut date = None;

        for header in &message.payload.headers {
            match header.name.as_str() {
                "Subject" => subject = Some(header.value.clone()),
                "From" => from = Some(header.value.clone()),
                "Date" => date = Some(header.value.clone()),
                _ => {}
            }
        }

        let body = extract_body(&message.payload);
        debug!("Extracted {} bytes of body text for {}", body.len(), message.id);

        let snippet = if message.snippet.is_empty() {
            None
        } else {
            Some(message.snippet)
        };

        EmailMessage {
            id: message.id,
            thread_id: message.thread_id,
            subject,
            from,
            date,
            snippet,
            body,
        }
    }
}

/// Concatenate every text/plain and text/html part, depth first.
///
/// A payload without parts contributes its own body data. Parts with invalid
/// base64 are skipped; invalid UTF-8 is replaced.
pub fn extract_body(payload: &MessagePart) -> String {
    let mut body = String::new();
    if payload.parts.is_empty() {
        append_part_data(payload, &mut body);
    } else {
        collect_text_parts(&payload.parts, &mut body);
    }
    body
}

fn collect_text_parts(parts: &[MessagePart], body: &mut String) {
    for part in parts {
        if part.mime_type == "text/plain" || part.mime_type == "text/html" {
            append_part_data(part, body);
        } else if !part.parts.is_empty() {
            collect_text_parts(&part.parts, body);
        }
    }
}

fn append_part_data(part: &MessagePart, body: &mut String) {
    if let Some(data) = part.body.data.as_deref() {
        match decode_base64_bytes(data) {
            Ok(bytes) => body.push_str(&String::from_utf8_lossy(&bytes)),
            Err(e) => warn!("Skipping undecodable {} part: {}", part.mime_type, e),
        }
    }
}

/// One page of a message listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePage {
    pub message_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

impl From<MessageList> for MessagePage {
    fn from(list: MessageList) -> Self {
        MessagePage {
            message_ids: list.messages.into_iter().map(|m| m.id).collect(),
            next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
        }
    }
}

/// An authenticated view of one mailbox.
#[async_trait]
pub trait Mailbox: Send + Sync {
    async fn list_page(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> GmailResult<MessagePage>;

    async fn get_message(&self, message_id: &str) -> GmailResult<EmailMessage>;
}

/// Produces a ready-to-use mailbox, or fails the turn.
#[async_trait]
pub trait MailAuthenticator: Send + Sync {
    async fn authenticate(&self) -> GmailResult<Box<dyn Mailbox>>;
}

pub struct GmailService {
    client: Client,
    base_url: String,
    access_token: String,
}

impl GmailService {
    pub fn new(client: Client, base_url: &str, access_token: String) -> Self {
        debug!("Creating new GmailService for {}", base_url);
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> GmailResult<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(params)
            .send()
            .await
            .map_err(|e| GmailApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        debug!("Gmail API response status: {}", status);

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no response body>".to_string());
            error!("Gmail API request failed. Status: {}, Error: {}", status, error_text);
            return Err(map_status_error(status, error_text));
        }

        let text = response
            .text()
            .await
            .map_err(|e| GmailApiError::NetworkError(e.to_string()))?;

        serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse Gmail API response: {}", e);
            GmailApiError::MessageFormatError(format!("Failed to parse response: {}", e))
        })
    }
}

fn map_status_error(status: StatusCode, body: String) -> GmailApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GmailApiError::AuthError(format!("Status: {}, Error: {}", status, body))
        }
        StatusCode::TOO_MANY_REQUESTS => GmailApiError::RateLimitError(body),
        StatusCode::NOT_FOUND => GmailApiError::MessageRetrievalError(body),
        _ => GmailApiError::ApiError(format!("Status: {}, Error: {}", status, body)),
    }
}

#[async_trait]
impl Mailbox for GmailService {
    async fn list_page(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> GmailResult<MessagePage> {
        debug!(
            "Listing messages with page_size={}, query={:?}, page_token={:?}",
            page_size, query, page_token
        );

        let mut params = vec![
            ("q", query.to_string()),
            ("maxResults", page_size.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let url = format!("{}/users/me/messages", self.base_url);
        let list: MessageList = self.get_json(&url, &params).await?;
        info!(
            "Found {} message references (estimate {})",
            list.messages.len(),
            list.result_size_estimate
        );
        Ok(list.into())
    }

    async fn get_message(&self, message_id: &str) -> GmailResult<EmailMessage> {
        debug!("Getting message with ID: {}", message_id);

        let url = format!("{}/users/me/messages/{}", self.base_url, message_id);
        let message: Message = self
            .get_json(&url, &[("format", "full".to_string())])
            .await?;
        Ok(EmailMessage::from_gmail_message(message))
    }
}

/// Authenticates with a shared token cache, refreshing only when the token expired.
pub struct GmailAuthenticator {
    client: Client,
    base_url: String,
    tokens: Arc<Mutex<TokenManager>>,
}

impl GmailAuthenticator {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.api_base_url.clone(),
            tokens: Arc::new(Mutex::new(TokenManager::new(config))),
        }
    }
}

#[async_trait]
impl MailAuthenticator for GmailAuthenticator {
    async fn authenticate(&self) -> GmailResult<Box<dyn Mailbox>> {
        let token = self.tokens.lock().await.get_token(&self.client).await?;
        Ok(Box::new(GmailService::new(
            self.client.clone(),
            &self.base_url,
            token,
        )))
    }
}
