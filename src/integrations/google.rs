//! Gmail and Google Calendar REST clients.
//!
//! Both read a bearer access token from the environment on every call; token
//! exchange and refresh happen outside this process. The token belongs to one
//! account, so the `user_id` argument is only used for logging.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{Client, Method, Url};
use serde_json::{json, Value};
use std::time::Duration;

use super::{
    CalendarClient, CalendarEvent, EmailSummary, MailClient, NewEvent, OutgoingEmail,
    ReplyTarget,
};
use crate::config::GoogleConfig;

#[derive(Clone)]
struct GoogleApi {
    client: Client,
    token_env: String,
}

impl GoogleApi {
    fn new(token_env: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            token_env: token_env.to_string(),
        })
    }

    fn token(&self) -> Result<String> {
        std::env::var(&self.token_env)
            .with_context(|| format!("Google access token not set (expected in ${})", self.token_env))
    }

    async fn request(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Value> {
        let mut req = self
            .client
            .request(method, url.clone())
            .bearer_auth(self.token()?)
            .header("Accept", "application/json");
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("Google API request failed for {}", url.path()))?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let parsed: Value = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text }));

        if !status.is_success() {
            let message = parsed["error"]["message"].as_str().unwrap_or(&text);
            anyhow::bail!("Google API error ({status}): {message}");
        }
        Ok(parsed)
    }
}

fn endpoint(base: &str, path: &str) -> Result<Url> {
    let joined = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    Url::parse(&joined).with_context(|| format!("invalid Google API URL: {joined}"))
}

fn header<'a>(message: &'a Value, name: &str) -> Option<&'a str> {
    message["payload"]["headers"].as_array().and_then(|headers| {
        headers
            .iter()
            .find(|h| {
                h["name"]
                    .as_str()
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
            .and_then(|h| h["value"].as_str())
    })
}

/// RFC 2047 encode a header value when it is not plain ASCII.
fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!(
            "=?UTF-8?B?{}?=",
            base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
        )
    }
}

/// Build the RFC 2822 message Gmail expects in the `raw` field.
pub(crate) fn build_raw_message(email: &OutgoingEmail) -> String {
    let mut raw = format!(
        "To: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=utf-8\r\n",
        email.to,
        encode_header(&email.subject)
    );
    if let Some(id) = &email.in_reply_to {
        raw.push_str(&format!("In-Reply-To: {id}\r\n"));
    }
    if let Some(refs) = &email.references {
        raw.push_str(&format!("References: {refs}\r\n"));
    }
    raw.push_str("\r\n");
    raw.push_str(&email.body);
    raw
}

pub struct GoogleMail {
    api: GoogleApi,
    base_url: String,
}

impl GoogleMail {
    pub fn new(config: &GoogleConfig) -> Result<Self> {
        Ok(Self {
            api: GoogleApi::new(&config.access_token_env)?,
            base_url: config.gmail_base_url.clone(),
        })
    }

    async fn message_summary(&self, id: &str) -> Result<EmailSummary> {
        let mut url = endpoint(&self.base_url, &format!("users/me/messages/{id}"))?;
        url.query_pairs_mut()
            .append_pair("format", "metadata")
            .append_pair("metadataHeaders", "From")
            .append_pair("metadataHeaders", "Subject");
        let msg = self.api.request(Method::GET, url, None).await?;

        Ok(EmailSummary {
            id: id.to_string(),
            thread_id: msg["threadId"].as_str().unwrap_or_default().to_string(),
            subject: header(&msg, "Subject").unwrap_or_default().to_string(),
            from: header(&msg, "From").unwrap_or_default().to_string(),
            preview: msg["snippet"].as_str().unwrap_or_default().to_string(),
        })
    }
}

#[async_trait]
impl MailClient for GoogleMail {
    async fn search(
        &self,
        user_id: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<EmailSummary>> {
        let mut url = endpoint(&self.base_url, "users/me/messages")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("maxResults", &max_results.clamp(1, 50).to_string());

        let list = self.api.request(Method::GET, url, None).await?;
        let ids: Vec<&str> = list["messages"]
            .as_array()
            .map(|m| m.iter().filter_map(|v| v["id"].as_str()).collect())
            .unwrap_or_default();

        let fetched =
            futures::future::join_all(ids.iter().map(|id| self.message_summary(id))).await;

        let mut out = Vec::with_capacity(fetched.len());
        for (id, result) in ids.iter().zip(fetched) {
            match result {
                Ok(summary) => out.push(summary),
                Err(e) => tracing::warn!(user = %user_id, message = %id, error = %e, "skipping unreadable message"),
            }
        }
        tracing::debug!(user = %user_id, count = out.len(), "gmail search complete");
        Ok(out)
    }

    async fn reply_target(&self, _user_id: &str, thread_id: &str) -> Result<ReplyTarget> {
        let mut url = endpoint(&self.base_url, &format!("users/me/threads/{thread_id}"))?;
        url.query_pairs_mut()
            .append_pair("format", "metadata")
            .append_pair("metadataHeaders", "Message-ID")
            .append_pair("metadataHeaders", "References")
            .append_pair("metadataHeaders", "Subject");
        let thread = self.api.request(Method::GET, url, None).await?;

        let last = thread["messages"]
            .as_array()
            .and_then(|m| m.last())
            .with_context(|| format!("thread {thread_id} has no messages"))?;
        let message_id = header(last, "Message-ID")
            .with_context(|| format!("latest message in thread {thread_id} has no Message-ID"))?;

        Ok(ReplyTarget {
            message_id: message_id.to_string(),
            references: header(last, "References").map(str::to_string),
            subject: header(last, "Subject").unwrap_or_default().to_string(),
        })
    }

    async fn send(&self, user_id: &str, email: &OutgoingEmail) -> Result<String> {
        let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(build_raw_message(email).as_bytes());
        let mut body = json!({ "raw": raw });
        if let Some(thread) = &email.thread_id {
            body["threadId"] = json!(thread);
        }

        let url = endpoint(&self.base_url, "users/me/messages/send")?;
        let resp = self.api.request(Method::POST, url, Some(&body)).await?;
        let id = resp["id"]
            .as_str()
            .context("Gmail send response had no message id")?
            .to_string();

        tracing::info!(user = %user_id, message = %id, threaded = email.thread_id.is_some(), "email sent");
        Ok(id)
    }
}

pub struct GoogleCalendar {
    api: GoogleApi,
    base_url: String,
    calendar_id: String,
}

impl GoogleCalendar {
    pub fn new(config: &GoogleConfig) -> Result<Self> {
        Ok(Self {
            api: GoogleApi::new(&config.access_token_env)?,
            base_url: config.calendar_base_url.clone(),
            calendar_id: config.calendar_id.clone(),
        })
    }

    fn events_url(&self) -> Result<Url> {
        let mut url = endpoint(&self.base_url, "calendars")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("calendar base URL cannot hold a path"))?
            .push(&self.calendar_id)
            .push("events");
        Ok(url)
    }
}

fn event_time(v: &Value) -> String {
    v["dateTime"]
        .as_str()
        .or_else(|| v["date"].as_str())
        .unwrap_or("?")
        .to_string()
}

#[async_trait]
impl CalendarClient for GoogleCalendar {
    async fn list_events(&self, user_id: &str, days_ahead: u32) -> Result<Vec<CalendarEvent>> {
        let now = chrono::Utc::now();
        let until = now + chrono::Duration::days(i64::from(days_ahead));

        let mut url = self.events_url()?;
        url.query_pairs_mut()
            .append_pair("timeMin", &now.to_rfc3339())
            .append_pair("timeMax", &until.to_rfc3339())
            .append_pair("singleEvents", "true")
            .append_pair("orderBy", "startTime")
            .append_pair("maxResults", "50");

        let resp = self.api.request(Method::GET, url, None).await?;
        let events: Vec<CalendarEvent> = resp["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|ev| CalendarEvent {
                        id: ev["id"].as_str().unwrap_or_default().to_string(),
                        title: ev["summary"].as_str().unwrap_or("(No title)").to_string(),
                        start: event_time(&ev["start"]),
                        end: event_time(&ev["end"]),
                        description: ev["description"].as_str().map(str::to_string),
                        location: ev["location"].as_str().map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();

        tracing::debug!(user = %user_id, days_ahead, count = events.len(), "calendar window fetched");
        Ok(events)
    }

    async fn create_event(&self, user_id: &str, event: &NewEvent) -> Result<String> {
        let mut body = json!({
            "summary": event.title,
            "start": { "dateTime": event.start },
            "end": { "dateTime": event.end },
        });
        if let Some(desc) = &event.description {
            body["description"] = json!(desc);
        }
        if let Some(loc) = &event.location {
            body["location"] = json!(loc);
        }

        let resp = self
            .api
            .request(Method::POST, self.events_url()?, Some(&body))
            .await?;
        let id = resp["id"]
            .as_str()
            .context("Calendar response had no event id")?
            .to_string();

        tracing::info!(user = %user_id, event = %id, title = %event.title, "calendar event created");
        Ok(id)
    }
}
