//! Gmail newsletter fetcher.
//!
//! Talks to the Gmail REST API directly with `reqwest`: exchanges the stored
//! refresh token for an access token, lists message ids under the configured
//! label (following pagination), downloads each message, and writes the HTML
//! body to the new-documents directory as `<timestamp> <subject>.html`.
//!
//! Deletion is strictly conditional on durable storage: a message is removed
//! from the mailbox only after its file has been written and fsynced. A
//! per-message failure is logged and the loop moves on, leaving that message
//! in the mailbox for the next run.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Context, Result};
use base64::Engine;
use regex::Regex;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use crate::config::{Config, MailConfig};
use crate::models::FetchedEmail;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Timestamp substring found in `X-Received` headers, e.g.
/// `Mon, 2 Jan 2023 08:00:00 -0700 (PDT)`.
const TIMESTAMP_PATTERN: &str =
    r"\w{3}, \d{1,2} \w{3} \d{4} \d{2}:\d{2}:\d{2} [-+]\d{4} \([A-Z]{2,5}\)";

// ============ Stored OAuth material ============

/// Shape of `token.json` as written by the provider's auth flow.
#[derive(Debug, Deserialize)]
struct StoredToken {
    refresh_token: String,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

/// Shape of `credentials.json` (client secret file).
#[derive(Debug, Deserialize)]
struct StoredCredentials {
    #[serde(alias = "web")]
    installed: ClientSecret,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

// ============ Wire types ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    id: String,
    payload: Payload,
}

/// One MIME node of a message. `parts` nests for multipart messages.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Option<Vec<Payload>>,
}

#[derive(Debug, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
}

// ============ Client ============

/// Gmail API client holding a refreshed access token.
pub struct GmailClient {
    http: reqwest::Client,
    access_token: String,
    max_retries: u32,
}

impl GmailClient {
    /// Refresh the access token from the stored refresh token and build a
    /// ready-to-use client.
    pub async fn connect(config: &MailConfig) -> Result<Self> {
        let token_raw = std::fs::read_to_string(&config.token_path).with_context(|| {
            format!("Failed to read token file: {}", config.token_path.display())
        })?;
        let token: StoredToken =
            serde_json::from_str(&token_raw).with_context(|| "Failed to parse token file")?;

        // Client id/secret live in token.json when the auth flow wrote them
        // there, otherwise in credentials.json.
        let (client_id, client_secret, token_uri) = match (&token.client_id, &token.client_secret) {
            (Some(id), Some(secret)) => (
                id.clone(),
                secret.clone(),
                token.token_uri.clone(),
            ),
            _ => {
                let creds_raw =
                    std::fs::read_to_string(&config.credentials_path).with_context(|| {
                        format!(
                            "Failed to read credentials file: {}",
                            config.credentials_path.display()
                        )
                    })?;
                let creds: StoredCredentials = serde_json::from_str(&creds_raw)
                    .with_context(|| "Failed to parse credentials file")?;
                (
                    creds.installed.client_id,
                    creds.installed.client_secret,
                    creds.installed.token_uri,
                )
            }
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let token_uri = token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());
        let resp = http
            .post(&token_uri)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", token.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .with_context(|| "Token refresh request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Token refresh failed ({}): {}", status, body);
        }

        let token_resp: TokenResponse = resp
            .json()
            .await
            .with_context(|| "Failed to parse token response")?;

        Ok(Self {
            http,
            access_token: token_resp.access_token,
            max_retries: config.max_retries,
        })
    }

    /// List all message ids under a label, following pagination.
    pub async fn list_messages(&self, label_id: &str) -> Result<Vec<MessageRef>> {
        let mut refs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!("{}/messages?labelIds={}", GMAIL_API_BASE, label_id);
            if let Some(ref token) = page_token {
                url.push_str("&pageToken=");
                url.push_str(token);
            }

            let json = self.get_json(&url).await?;
            let page: MessageList = serde_json::from_value(json)
                .with_context(|| "Failed to parse message list response")?;

            refs.extend(page.messages);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(refs)
    }

    /// Fetch one message in full and extract subject, timestamp, and the
    /// HTML body. Returns `Ok(None)` when the message carries no HTML part.
    pub async fn get_message(&self, id: &str) -> Result<Option<FetchedEmail>> {
        let url = format!("{}/messages/{}?format=full", GMAIL_API_BASE, id);
        let json = self.get_json(&url).await?;
        let message: Message =
            serde_json::from_value(json).with_context(|| "Failed to parse message response")?;

        let subject = header_value(&message.payload.headers, "Subject").unwrap_or_default();
        let timestamp = header_value(&message.payload.headers, "X-Received")
            .and_then(|v| extract_timestamp(&v));

        let html = match find_html_part(&message.payload) {
            Some(data) => decode_body(&data)?,
            None => return Ok(None),
        };

        Ok(Some(FetchedEmail {
            message_id: message.id,
            subject,
            timestamp,
            html,
        }))
    }

    /// Permanently delete one message from the mailbox.
    pub async fn delete_message(&self, id: &str) -> Result<()> {
        let url = format!("{}/messages/{}", GMAIL_API_BASE, id);

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .http
                .delete(&url)
                .bearer_auth(&self.access_token)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!("Gmail API error {}: {}", status, body));
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    bail!("Gmail API error {}: {}", status, body);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Delete failed after retries")))
    }

    /// GET a Gmail endpoint with retry/backoff, returning the JSON body.
    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .http
                .get(url)
                .bearer_auth(&self.access_token)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json().await?);
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!("Gmail API error {}: {}", status, body));
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    bail!("Gmail API error {}: {}", status, body);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

/// Exponential backoff: 1s, 2s, 4s, 8s, ... capped at 2^5.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

// ============ Extraction helpers ============

fn header_value(headers: &[Header], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TIMESTAMP_PATTERN).expect("valid timestamp pattern"))
}

/// Extract the first timestamp substring from a header value, or `None`.
pub fn extract_timestamp(header: &str) -> Option<String> {
    timestamp_re()
        .find(header)
        .map(|m| m.as_str().to_string())
}

fn sanitize_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").expect("valid sanitize pattern"))
}

/// Remove every character outside word/space classes. Idempotent.
pub fn sanitize_title(title: &str) -> String {
    sanitize_re().replace_all(title, "").into_owned()
}

/// `"<timestamp> <subject>"` when a timestamp matched, else the subject.
pub fn email_title(timestamp: Option<&str>, subject: &str) -> String {
    match timestamp {
        Some(ts) => format!("{} {}", ts, subject),
        None => subject.to_string(),
    }
}

/// Depth-first search for the first `text/html` part carrying body data.
fn find_html_part(payload: &Payload) -> Option<String> {
    if payload.mime_type == "text/html" {
        if let Some(data) = payload.body.as_ref().and_then(|b| b.data.clone()) {
            return Some(data);
        }
    }
    if let Some(parts) = &payload.parts {
        for part in parts {
            if let Some(data) = find_html_part(part) {
                return Some(data);
            }
        }
    }
    None
}

/// Decode a base64url body payload into UTF-8 text.
fn decode_body(data: &str) -> Result<String> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .with_context(|| "Failed to decode message body")?;
    String::from_utf8(bytes).with_context(|| "Message body is not valid UTF-8")
}

// ============ Persistence ============

/// Write one email to the new-documents directory and fsync it. The file
/// content is exactly the decoded HTML payload. A title collision with an
/// already-saved email gets the message id appended so no saved file is
/// truncated before its message could be deleted.
pub fn save_email(new_dir: &Path, email: &FetchedEmail) -> Result<PathBuf> {
    std::fs::create_dir_all(new_dir)
        .with_context(|| format!("Failed to create dir: {}", new_dir.display()))?;

    let title = sanitize_title(&email_title(email.timestamp.as_deref(), &email.subject));
    let mut path = new_dir.join(format!("{}.html", title));
    // A different email already saved under this name must not be truncated;
    // re-saving the same payload (retry after a failed delete) may be.
    let occupied = std::fs::read_to_string(&path)
        .map(|existing| existing != email.html)
        .unwrap_or(false);
    if occupied {
        path = new_dir.join(format!(
            "{} {}.html",
            title,
            sanitize_title(&email.message_id)
        ));
    }

    let mut file = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    file.write_all(email.html.as_bytes())?;
    // Durable before the message can be deleted from the mailbox.
    file.sync_all()?;

    Ok(path)
}

// ============ Fetch command ============

pub async fn run_fetch(config: &Config) -> Result<()> {
    if config.mail.label_id.is_empty() {
        bail!("mail.label_id must be set in config");
    }

    let client = GmailClient::connect(&config.mail).await?;
    let refs = client.list_messages(&config.mail.label_id).await?;

    println!("fetch");
    println!("  listed: {} messages", refs.len());

    if refs.is_empty() {
        println!("ok");
        return Ok(());
    }

    let mut saved = 0u64;
    let mut skipped = 0u64;
    let mut deleted = 0u64;
    let mut failed = 0u64;

    for msg_ref in &refs {
        let email = match client.get_message(&msg_ref.id).await {
            Ok(Some(email)) => email,
            Ok(None) => {
                skipped += 1;
                continue;
            }
            Err(e) => {
                eprintln!("Warning: fetching message {} failed: {}", msg_ref.id, e);
                failed += 1;
                continue;
            }
        };

        match save_email(&config.dirs.new_dir, &email) {
            Ok(path) => {
                println!("  fetched: {}", path.display());
                saved += 1;
            }
            Err(e) => {
                eprintln!("Warning: saving message {} failed: {}", msg_ref.id, e);
                failed += 1;
                continue;
            }
        }

        // Delete only after the file is durably on disk.
        if config.mail.delete_after_fetch {
            match client.delete_message(&email.message_id).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    eprintln!(
                        "Warning: deleting message {} failed (left in mailbox): {}",
                        email.message_id, e
                    );
                }
            }
        }
    }

    println!("  saved: {}", saved);
    println!("  no html part: {}", skipped);
    if config.mail.delete_after_fetch {
        println!("  deleted from mailbox: {}", deleted);
    }
    println!("  failed: {}", failed);
    println!("ok");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_extracted_exactly() {
        let header = "by 2002:a17:90a with SMTP id abc; Mon, 2 Jan 2023 08:00:00 -0700 (PDT)";
        assert_eq!(
            extract_timestamp(header).as_deref(),
            Some("Mon, 2 Jan 2023 08:00:00 -0700 (PDT)")
        );
    }

    #[test]
    fn timestamp_absent_yields_none() {
        assert_eq!(extract_timestamp("no date in here"), None);
        assert_eq!(extract_timestamp(""), None);
    }

    #[test]
    fn timestamp_matches_other_zones() {
        let header = "received; Thu, 14 Sep 2023 03:18:19 +0200 (CEST)";
        assert_eq!(
            extract_timestamp(header).as_deref(),
            Some("Thu, 14 Sep 2023 03:18:19 +0200 (CEST)")
        );
    }

    #[test]
    fn sanitize_removes_special_characters() {
        assert_eq!(sanitize_title("Hello, World! (v2)"), "Hello World v2");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize_title("Mon, 2 Jan 2023 08:00:00 -0700 (PDT) Weekly Digest");
        let twice = sanitize_title(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn title_falls_back_to_subject() {
        assert_eq!(email_title(None, "Weekly Digest"), "Weekly Digest");
        assert_eq!(
            email_title(Some("Mon, 2 Jan 2023 08:00:00 -0700 (PDT)"), "Weekly Digest"),
            "Mon, 2 Jan 2023 08:00:00 -0700 (PDT) Weekly Digest"
        );
    }

    #[test]
    fn saved_file_matches_decoded_payload() {
        let tmp = tempfile::TempDir::new().unwrap();
        let email = FetchedEmail {
            message_id: "m1".to_string(),
            subject: "Weekly Digest".to_string(),
            timestamp: Some("Mon, 2 Jan 2023 08:00:00 -0700 (PDT)".to_string()),
            html: "<p>Hello</p>".to_string(),
        };

        let path = save_email(tmp.path(), &email).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "Mon 2 Jan 2023 080000 0700 PDT Weekly Digest.html"
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<p>Hello</p>");
    }

    #[test]
    fn same_title_different_message_keeps_both_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let first = FetchedEmail {
            message_id: "m1".to_string(),
            subject: "Weekly Digest".to_string(),
            timestamp: None,
            html: "<p>first issue</p>".to_string(),
        };
        let second = FetchedEmail {
            message_id: "m2".to_string(),
            subject: "Weekly Digest".to_string(),
            timestamp: None,
            html: "<p>second issue</p>".to_string(),
        };

        let path1 = save_email(tmp.path(), &first).unwrap();
        let path2 = save_email(tmp.path(), &second).unwrap();

        assert_ne!(path1, path2);
        assert_eq!(std::fs::read_to_string(&path1).unwrap(), "<p>first issue</p>");
        assert_eq!(
            std::fs::read_to_string(&path2).unwrap(),
            "<p>second issue</p>"
        );
        assert!(path2
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .contains("m2"));
    }

    #[test]
    fn resaving_same_message_overwrites_in_place() {
        let tmp = tempfile::TempDir::new().unwrap();
        let email = FetchedEmail {
            message_id: "m1".to_string(),
            subject: "Weekly Digest".to_string(),
            timestamp: None,
            html: "<p>same payload</p>".to_string(),
        };

        let path1 = save_email(tmp.path(), &email).unwrap();
        let path2 = save_email(tmp.path(), &email).unwrap();

        assert_eq!(path1, path2);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn html_part_found_in_nested_multipart() {
        let payload: Payload = serde_json::from_value(serde_json::json!({
            "mimeType": "multipart/mixed",
            "headers": [],
            "parts": [
                { "mimeType": "multipart/alternative", "parts": [
                    { "mimeType": "text/plain", "body": { "data": "cGxhaW4" } },
                    { "mimeType": "text/html", "body": { "data": "PHA-SGVsbG88L3A-" } }
                ]}
            ]
        }))
        .unwrap();

        let data = find_html_part(&payload).unwrap();
        assert_eq!(decode_body(&data).unwrap(), "<p>Hello</p>");
    }

    #[test]
    fn missing_html_part_yields_none() {
        let payload: Payload = serde_json::from_value(serde_json::json!({
            "mimeType": "multipart/alternative",
            "parts": [
                { "mimeType": "text/plain", "body": { "data": "cGxhaW4" } }
            ]
        }))
        .unwrap();
        assert!(find_html_part(&payload).is_none());
    }

    #[test]
    fn decode_accepts_padded_base64url() {
        assert_eq!(decode_body("aGVsbG8=").unwrap(), "hello");
        assert_eq!(decode_body("aGVsbG8").unwrap(), "hello");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let headers = vec![Header {
            name: "subject".to_string(),
            value: "Hi".to_string(),
        }];
        assert_eq!(header_value(&headers, "Subject").as_deref(), Some("Hi"));
    }
}
