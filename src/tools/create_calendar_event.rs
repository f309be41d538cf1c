//! `create_calendar_event` tool. Gated: only after the user approved the proposal.

use chrono::DateTime;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::integrations::{CalendarClient, NewEvent};

pub const NAME: &str = "create_calendar_event";
pub const DESCRIPTION: &str = "Create a calendar event. Only call this after proposing the exact \
title and times to the user and receiving their explicit approval. Times are ISO-8601 with an \
offset, e.g. 2026-03-02T09:00:00-05:00.";

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateCalendarEventParams {
    #[schemars(description = "Event title")]
    pub title: String,

    #[schemars(description = "Start time, ISO-8601 with offset")]
    pub start: String,

    #[schemars(description = "End time, ISO-8601 with offset")]
    pub end: String,

    #[schemars(description = "Optional description")]
    pub description: Option<String>,

    #[schemars(description = "Optional location")]
    pub location: Option<String>,
}

pub(super) async fn run(
    calendar: &dyn CalendarClient,
    user_id: &str,
    params: CreateCalendarEventParams,
) -> Result<String, ToolError> {
    let title = params.title.trim();
    if title.is_empty() {
        return Err(ToolError::validation(NAME, "title must not be empty"));
    }
    let start = DateTime::parse_from_rfc3339(params.start.trim()).map_err(|e| {
        ToolError::validation(NAME, format!("start '{}' is not ISO-8601: {e}", params.start))
    })?;
    let end = DateTime::parse_from_rfc3339(params.end.trim()).map_err(|e| {
        ToolError::validation(NAME, format!("end '{}' is not ISO-8601: {e}", params.end))
    })?;
    if end <= start {
        return Err(ToolError::validation(NAME, "end must be after start"));
    }

    let event = NewEvent {
        title: title.to_string(),
        start: start.to_rfc3339(),
        end: end.to_rfc3339(),
        description: params.description.filter(|d| !d.trim().is_empty()),
        location: params.location.filter(|l| !l.trim().is_empty()),
    };

    let event_id = calendar
        .create_event(user_id, &event)
        .await
        .map_err(|e| ToolError::collaborator(NAME, e))?;

    Ok(format!(
        "Created \"{}\" from {} to {}. Event id: {event_id}",
        event.title, event.start, event.end
    ))
}
