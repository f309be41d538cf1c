//! `draft_and_send_email` tool. Gated: only after the user approved the draft.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::integrations::{MailClient, OutgoingEmail};

pub const NAME: &str = "draft_and_send_email";
pub const DESCRIPTION: &str = "Send an email on the user's behalf. Only call this after showing \
the user the full draft (recipient, subject, body) and receiving their explicit approval. \
Pass thread_id to reply within an existing thread.";

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DraftAndSendEmailParams {
    #[schemars(description = "Recipient email address")]
    pub to: String,

    #[schemars(description = "Subject line. For replies, 'Re:' is added automatically.")]
    pub subject: String,

    #[schemars(description = "Plain-text body")]
    pub body: String,

    #[schemars(description = "Thread id of the email being answered, from search_emails")]
    pub thread_id: Option<String>,
}

/// Prefix `Re: ` unless the subject already carries it.
pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    let already = trimmed
        .get(..3)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:"));
    if already {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}

pub(super) async fn run(
    mail: &dyn MailClient,
    user_id: &str,
    params: DraftAndSendEmailParams,
) -> Result<String, ToolError> {
    let to = params.to.trim();
    if to.is_empty() || !to.contains('@') {
        return Err(ToolError::validation(NAME, format!("'{to}' is not an email address")));
    }
    if params.body.trim().is_empty() {
        return Err(ToolError::validation(NAME, "body must not be empty"));
    }
    let thread_id = params
        .thread_id
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if thread_id.is_none() && params.subject.trim().is_empty() {
        return Err(ToolError::validation(NAME, "subject must not be empty"));
    }

    let email = match &thread_id {
        Some(thread) => {
            let target = mail
                .reply_target(user_id, thread)
                .await
                .map_err(|e| ToolError::collaborator(NAME, e))?;
            let base_subject = if params.subject.trim().is_empty() {
                target.subject.as_str()
            } else {
                params.subject.as_str()
            };
            let references = match &target.references {
                Some(refs) if !refs.trim().is_empty() => format!("{} {}", refs.trim(), target.message_id),
                _ => target.message_id.clone(),
            };
            OutgoingEmail {
                to: to.to_string(),
                subject: reply_subject(base_subject),
                body: params.body,
                thread_id: Some(thread.clone()),
                in_reply_to: Some(target.message_id.clone()),
                references: Some(references),
            }
        }
        None => OutgoingEmail {
            to: to.to_string(),
            subject: params.subject.trim().to_string(),
            body: params.body,
            thread_id: None,
            in_reply_to: None,
            references: None,
        },
    };

    let message_id = mail
        .send(user_id, &email)
        .await
        .map_err(|e| ToolError::collaborator(NAME, e))?;

    Ok(format!(
        "Email sent to {} with subject \"{}\". Message id: {message_id}",
        email.to, email.subject
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_subject_prefixes_once() {
        assert_eq!(reply_subject("Budget"), "Re: Budget");
        assert_eq!(reply_subject("Re: Budget"), "Re: Budget");
        assert_eq!(reply_subject("RE: Budget"), "RE: Budget");
        assert_eq!(reply_subject("re:Budget"), "re:Budget");
        assert_eq!(reply_subject("Regarding budget"), "Re: Regarding budget");
    }
}
