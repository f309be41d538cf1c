//! `get_calendar_events` tool: read-only calendar window.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::integrations::{format_event_list, CalendarClient};

pub const NAME: &str = "get_calendar_events";
pub const DESCRIPTION: &str =
    "List the user's upcoming calendar events from now until the given number of days ahead.";

pub const DEFAULT_DAYS_AHEAD: u32 = 7;
const MAX_DAYS_AHEAD: u32 = 365;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetCalendarEventsParams {
    #[schemars(description = "How many days ahead to look (1-365). Defaults to 7.")]
    pub days_ahead: Option<u32>,
}

pub(super) async fn run(
    calendar: &dyn CalendarClient,
    user_id: &str,
    params: GetCalendarEventsParams,
) -> Result<String, ToolError> {
    let days_ahead = params.days_ahead.unwrap_or(DEFAULT_DAYS_AHEAD);
    if !(1..=MAX_DAYS_AHEAD).contains(&days_ahead) {
        return Err(ToolError::validation(
            NAME,
            format!("days_ahead must be between 1 and {MAX_DAYS_AHEAD}, got {days_ahead}"),
        ));
    }

    let events = calendar
        .list_events(user_id, days_ahead)
        .await
        .map_err(|e| ToolError::collaborator(NAME, e))?;

    if events.is_empty() {
        return Ok("No upcoming events found".into());
    }
    Ok(format_event_list(&events))
}
