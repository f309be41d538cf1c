//! `search_emails` tool: read-only inbox search.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::integrations::{format_email_list, MailClient};

pub const NAME: &str = "search_emails";
pub const DESCRIPTION: &str = "Search the user's inbox. Accepts Gmail search syntax \
(e.g. 'is:unread', 'from:dana invoice'). Returns subject, sender, preview, and thread id.";

const DEFAULT_RESULTS: usize = 5;
const MAX_RESULTS: usize = 20;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchEmailsParams {
    #[schemars(description = "Inbox search query")]
    pub query: String,

    #[schemars(description = "Maximum number of emails to return (1-20). Defaults to 5.")]
    pub max_results: Option<usize>,
}

pub(super) async fn run(
    mail: &dyn MailClient,
    user_id: &str,
    params: SearchEmailsParams,
) -> Result<String, ToolError> {
    if params.query.trim().is_empty() {
        return Err(ToolError::validation(NAME, "query must not be empty"));
    }
    let max_results = params.max_results.unwrap_or(DEFAULT_RESULTS).clamp(1, MAX_RESULTS);

    let emails = mail
        .search(user_id, &params.query, max_results)
        .await
        .map_err(|e| ToolError::collaborator(NAME, e))?;

    if emails.is_empty() {
        return Ok("No emails found".into());
    }
    Ok(format_email_list(&emails))
}
