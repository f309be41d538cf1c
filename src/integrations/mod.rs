//! Mail and calendar collaborator seams.
//!
//! The agent only sees [`MailClient`] and [`CalendarClient`]; concrete Google
//! clients live in [`google`], and [`Disconnected`] stands in when no access
//! token is configured.

pub mod google;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub from: String,
    pub preview: String,
}

/// Headers needed to answer the latest message of a thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyTarget {
    /// RFC 2822 `Message-ID` of the message being answered.
    pub message_id: String,
    /// That message's own `References` header, if any.
    pub references: Option<String>,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub thread_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: String,
    pub end: String,
    pub description: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub start: String,
    pub end: String,
    pub description: Option<String>,
    pub location: Option<String>,
}

#[async_trait]
pub trait MailClient: Send + Sync {
    async fn search(&self, user_id: &str, query: &str, max_results: usize)
        -> Result<Vec<EmailSummary>>;

    /// Look up the message a reply in `thread_id` should answer.
    async fn reply_target(&self, user_id: &str, thread_id: &str) -> Result<ReplyTarget>;

    /// Send and return the provider's message id.
    async fn send(&self, user_id: &str, email: &OutgoingEmail) -> Result<String>;
}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn list_events(&self, user_id: &str, days_ahead: u32) -> Result<Vec<CalendarEvent>>;

    /// Create and return the provider's event id.
    async fn create_event(&self, user_id: &str, event: &NewEvent) -> Result<String>;
}

/// Used when the user has not connected a Google account.
pub struct Disconnected;

#[async_trait]
impl MailClient for Disconnected {
    async fn search(&self, _: &str, _: &str, _: usize) -> Result<Vec<EmailSummary>> {
        anyhow::bail!("email account is not connected")
    }

    async fn reply_target(&self, _: &str, _: &str) -> Result<ReplyTarget> {
        anyhow::bail!("email account is not connected")
    }

    async fn send(&self, _: &str, _: &OutgoingEmail) -> Result<String> {
        anyhow::bail!("email account is not connected")
    }
}

#[async_trait]
impl CalendarClient for Disconnected {
    async fn list_events(&self, _: &str, _: u32) -> Result<Vec<CalendarEvent>> {
        anyhow::bail!("calendar is not connected")
    }

    async fn create_event(&self, _: &str, _: &NewEvent) -> Result<String> {
        anyhow::bail!("calendar is not connected")
    }
}

pub fn format_email_list(emails: &[EmailSummary]) -> String {
    emails
        .iter()
        .enumerate()
        .map(|(i, e)| {
            format!(
                "{}. {}\n   From: {}\n   Thread: {}\n   {}",
                i + 1,
                if e.subject.is_empty() { "(no subject)" } else { &e.subject },
                e.from,
                e.thread_id,
                e.preview
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_event_list(events: &[CalendarEvent]) -> String {
    events
        .iter()
        .map(|ev| {
            let mut line = format!("- {} ({} to {})", ev.title, ev.start, ev.end);
            if let Some(loc) = ev.location.as_deref().filter(|l| !l.is_empty()) {
                line.push_str(&format!(" @ {loc}"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_list_shows_subject_sender_and_thread() {
        let out = format_email_list(&[EmailSummary {
            id: "m1".into(),
            thread_id: "t1".into(),
            subject: "Invoice".into(),
            from: "billing@example.com".into(),
            preview: "Your invoice is ready".into(),
        }]);
        assert!(out.contains("1. Invoice"));
        assert!(out.contains("billing@example.com"));
        assert!(out.contains("Thread: t1"));
        assert!(out.contains("Your invoice is ready"));
    }

    #[test]
    fn event_list_shows_title_and_start() {
        let out = format_event_list(&[CalendarEvent {
            id: "e1".into(),
            title: "Standup".into(),
            start: "2026-10-19T09:00:00Z".into(),
            end: "2026-10-19T09:30:00Z".into(),
            description: None,
            location: Some("Room 4".into()),
        }]);
        assert_eq!(
            out,
            "- Standup (2026-10-19T09:00:00Z to 2026-10-19T09:30:00Z) @ Room 4"
        );
    }

    #[tokio::test]
    async fn disconnected_clients_fail() {
        assert!(MailClient::search(&Disconnected, "u1", "x", 5).await.is_err());
        assert!(CalendarClient::list_events(&Disconnected, "u1", 7).await.is_err());
    }
}
