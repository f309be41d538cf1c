//! Code-level approval check for side-effecting tools.
//!
//! A gated tool may run only when the newest user turn is a bare approval
//! that directly answers an assistant proposal. One approval covers one
//! gated action: a later gated call in the same request is refused once an
//! earlier one has run or is running.

use crate::agent::context::classify;
use crate::llm::{ChatMessage, Role};

use super::{ERROR_PREFIX, GATED_TOOLS};

const APPROVALS: &[&str] = &[
    "yes",
    "yep",
    "yeah",
    "sure",
    "ok",
    "okay",
    "confirm",
    "confirmed",
    "approve",
    "approved",
    "go ahead",
    "send it",
    "book it",
    "do it",
    "please do",
    "sounds good",
    "looks good",
    "lgtm",
];

const NEGATIONS: &[&str] = &[
    "no", "not", "don't", "dont", "never", "wait", "cancel", "stop", "hold",
];

/// Longer replies carry instructions of their own.
const MAX_APPROVAL_WORDS: usize = 12;

/// Whether `text` reads as an unambiguous approval and nothing else.
pub fn is_approval(text: &str) -> bool {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '\'' { c } else { ' ' })
        .collect();
    let words: Vec<&str> = normalized.split_whitespace().collect();
    if words.len() > MAX_APPROVAL_WORDS || words.iter().any(|w| NEGATIONS.contains(w)) {
        return false;
    }
    let intents = classify(text);
    if intents.needs_email_send || intents.needs_calendar {
        return false;
    }
    let padded = format!(" {} ", words.join(" "));
    APPROVALS
        .iter()
        .any(|phrase| padded.contains(&format!(" {phrase} ")))
}

/// Whether the gated call `call_id` is covered by the user's latest approval.
///
/// The turn right before the newest user turn must be assistant text (the
/// proposal). Within the current request, the approval is spent by the first
/// gated call that is still pending or that ran without error.
pub fn approved_in(history: &[ChatMessage], call_id: &str) -> bool {
    let Some(last_user) = history.iter().rposition(|m| m.role == Role::User) else {
        return false;
    };
    let proposal = last_user
        .checked_sub(1)
        .map(|i| &history[i])
        .is_some_and(|m| m.role == Role::Assistant && !m.content.trim().is_empty());
    if !proposal || !is_approval(&history[last_user].content) {
        return false;
    }
    !approval_spent(&history[last_user + 1..], call_id)
}

/// Whether a gated call other than `call_id` already claimed the approval.
///
/// `request` holds the turns after the approving user turn.
fn approval_spent(request: &[ChatMessage], call_id: &str) -> bool {
    // The turn carrying `call_id`; absent when checking ahead of the turn.
    let own_turn = request.iter().rposition(|m| {
        m.role == Role::Assistant && m.tool_calls.iter().any(|c| c.id == call_id)
    });
    let scan_end = own_turn.map_or(request.len(), |i| i + 1);

    for (i, turn) in request[..scan_end].iter().enumerate() {
        if turn.role != Role::Assistant {
            continue;
        }
        for call in turn
            .tool_calls
            .iter()
            .filter(|c| GATED_TOOLS.contains(&c.name.as_str()))
        {
            if Some(i) == own_turn {
                // Earlier in the same batch: that call holds the approval
                return call.id != call_id;
            }
            let observation = request[i + 1..].iter().find(|m| {
                m.role == Role::Tool && m.tool_call_id.as_deref() == Some(call.id.as_str())
            });
            match observation {
                Some(obs) if obs.content.starts_with(ERROR_PREFIX) => {}
                _ => return true,
            }
        }
    }
    false
}
