//! Prompt and lenient parser for model-driven fact extraction.

use serde_json::{Map, Value};

use super::types::Category;

pub const EXTRACTION_PROMPT: &str = "\
You extract durable facts about the user from the message you are given.

Return ONLY a JSON array. Each element is an object with these keys:
  \"fact\": a short standalone statement about the user, in third person
  \"category\": one of preference, habit, project, relationship, constraint, event, personal, other
  \"importance\": a number from 0.0 (trivia) to 1.0 (must never be forgotten)
  \"metadata\": an optional object of extra key-value details

Only extract things the user states about themselves, their work, their
people, or their schedule. Questions, greetings, and requests for
information contain no facts. If there is nothing worth remembering,
return [].";

/// A fact proposed by the model, normalized but not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFact {
    pub fact: String,
    pub category: Category,
    pub importance: f64,
    pub metadata: Map<String, Value>,
}

const DEFAULT_IMPORTANCE: f64 = 0.5;

/// Parse the first JSON array in `response` into candidates.
///
/// Surrounding prose and code fences are ignored. Returns `None` if no JSON
/// array can be found at all. Elements that are not usable facts are dropped.
pub fn parse_candidates(response: &str) -> Option<Vec<CandidateFact>> {
    let items = first_json_array(response)?;
    Some(items.iter().filter_map(candidate_from_value).collect())
}

fn first_json_array(text: &str) -> Option<Vec<Value>> {
    text.match_indices('[').find_map(|(start, _)| {
        serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<Vec<Value>>()
            .next()
            .and_then(Result::ok)
    })
}

fn candidate_from_value(value: &Value) -> Option<CandidateFact> {
    let obj = value.as_object()?;

    let fact = obj.get("fact")?.as_str()?.trim();
    if fact.is_empty() {
        return None;
    }

    let category = obj
        .get("category")
        .and_then(Value::as_str)
        .map(Category::from_lenient)
        .unwrap_or(Category::Other);

    let importance = match obj.get("importance") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
    .unwrap_or(DEFAULT_IMPORTANCE)
    .clamp(0.0, 1.0);

    let metadata = obj
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    Some(CandidateFact {
        fact: fact.to_string(),
        category,
        importance,
        metadata,
    })
}
