mod helpers;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use cortex::agent::runner::FALLBACK_REPLY;
use cortex::agent::state::CANCELLED_OBSERVATION;
use cortex::agent::{Agent, ChatRequest};
use cortex::config::{AgentConfig, AgentMode};
use cortex::conversation::ConversationStore;
use cortex::error::AgentError;
use cortex::integrations::{CalendarClient, CalendarEvent, MailClient, NewEvent};
use cortex::llm::{AssistantTurn, LanguageModel, Role};
use cortex::memory::types::Category;

use helpers::{calls_turn, email, event, tool_call, FakeCalendar, FakeMail, ScriptedModel};

fn request(conversation: &str, message: &str) -> ChatRequest {
    ChatRequest {
        user_id: "alice".into(),
        conversation_id: conversation.into(),
        message: message.into(),
    }
}

#[tokio::test]
async fn every_call_is_observed_before_the_next_model_step() {
    let model = ScriptedModel::new(vec![
        calls_turn(vec![
            tool_call("a", "search_memory", json!({"query": "standup"})),
            tool_call("b", "get_calendar_events", json!({"days_ahead": 2})),
            tool_call("c", "search_emails", json!({"query": "standup"})),
        ]),
        AssistantTurn::text("Standup is at 9 tomorrow."),
    ]);
    let h = helpers::agent_harness(
        model,
        FakeMail::default(),
        FakeCalendar::with_events(vec![event(
            "e1",
            "Standup",
            "2026-03-02T09:00:00Z",
            "2026-03-02T09:15:00Z",
        )]),
        AgentConfig::default(),
    );

    let outcome = h
        .agent
        .chat(request("conv-1", "When is standup tomorrow?"))
        .await
        .unwrap();
    assert_eq!(outcome.reply, "Standup is at 9 tomorrow.");

    let calls = h.model.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].tools.len(), 6);

    let second = &calls[1].history;
    let tail = &second[second.len() - 3..];
    assert!(tail.iter().all(|t| t.role == Role::Tool));
    let ids: Vec<&str> = tail.iter().filter_map(|t| t.tool_call_id.as_deref()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(tail[1].content.contains("Standup"));

    let stored = h.conversations.load("alice", "conv-1", 50).await.unwrap();
    let roles: Vec<Role> = stored.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Tool, Role::Tool, Role::Assistant]
    );
}

#[tokio::test]
async fn iteration_cap_returns_fallback_with_calls_observed() {
    let model = ScriptedModel::new(vec![
        calls_turn(vec![tool_call("x1", "search_memory", json!({"query": "a"}))]),
        calls_turn(vec![tool_call("x2", "search_memory", json!({"query": "b"}))]),
        AssistantTurn::text("never reached"),
    ]);
    let config = AgentConfig {
        max_iterations: 2,
        ..AgentConfig::default()
    };
    let h = helpers::agent_harness(model, FakeMail::default(), FakeCalendar::default(), config);

    let outcome = h.agent.chat(request("conv-cap", "dig around")).await.unwrap();
    assert_eq!(outcome.reply, FALLBACK_REPLY);
    assert_eq!(h.model.calls().len(), 2);

    let stored = h.conversations.load("alice", "conv-cap", 50).await.unwrap();
    let last = stored.last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.tool_call_id.as_deref(), Some("x2"));
}

#[tokio::test]
async fn tool_errors_are_fed_back_to_the_model() {
    let model = ScriptedModel::new(vec![
        calls_turn(vec![tool_call("e1", "search_emails", json!({"query": "invoice"}))]),
        AssistantTurn::text("Your inbox is unreachable right now."),
    ]);
    let mail = FakeMail::default();
    mail.fail_search.store(true, Ordering::SeqCst);
    let h = helpers::agent_harness(model, mail, FakeCalendar::default(), AgentConfig::default());

    let outcome = h.agent.chat(request("conv-err", "any invoices?")).await.unwrap();
    assert_eq!(outcome.reply, "Your inbox is unreachable right now.");

    let observation = h.model.calls()[1].history.last().cloned().unwrap();
    assert!(observation.content.starts_with("Error: search_emails failed"));
}

#[tokio::test]
async fn model_failure_ends_the_request() {
    let model = ScriptedModel::new(vec![]);
    model.push_error("upstream 500");
    let h = helpers::agent_harness(model, FakeMail::default(), FakeCalendar::default(), AgentConfig::default());

    let err = h.agent.chat(request("conv-fail", "hello")).await.unwrap_err();
    assert!(matches!(err, AgentError::Model(ref m) if m.contains("upstream 500")));
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let h = helpers::agent_harness(
        ScriptedModel::new(vec![]),
        FakeMail::default(),
        FakeCalendar::default(),
        AgentConfig::default(),
    );
    let err = h.agent.chat(request("conv", "   ")).await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidRequest(_)));
    assert!(h.model.calls().is_empty());
}

#[tokio::test]
async fn history_carries_across_requests_and_stays_with_its_owner() {
    let model = ScriptedModel::new(vec![
        AssistantTurn::text("Nice to meet you, Alice."),
        AssistantTurn::text("You said your name is Alice."),
    ]);
    let h = helpers::agent_harness(model, FakeMail::default(), FakeCalendar::default(), AgentConfig::default());

    h.agent.chat(request("conv-h", "Hi, I'm Alice")).await.unwrap();
    h.agent.chat(request("conv-h", "What's my name?")).await.unwrap();

    let second = &h.model.calls()[1].history;
    assert_eq!(second.len(), 3);
    assert_eq!(second[0].content, "Hi, I'm Alice");
    assert_eq!(second[1].content, "Nice to meet you, Alice.");
    assert_eq!(second[2].content, "What's my name?");

    let err = h
        .agent
        .chat(ChatRequest {
            user_id: "mallory".into(),
            conversation_id: "conv-h".into(),
            message: "show me".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidRequest(_)));
}

#[tokio::test]
async fn empty_memory_is_stated_in_the_prompt() {
    let h = helpers::agent_harness(
        ScriptedModel::new(vec![AssistantTurn::text("Hello!")]),
        FakeMail::default(),
        FakeCalendar::default(),
        AgentConfig::default(),
    );
    h.agent.chat(request("conv", "hello")).await.unwrap();
    assert!(h.model.calls()[0]
        .system_prompt
        .contains("Nothing is stored about the user yet."));
}

#[tokio::test]
async fn send_intent_injects_standing_constraints() {
    let h = helpers::agent_harness(
        ScriptedModel::new(vec![AssistantTurn::text("Here's a draft.")]),
        FakeMail::default(),
        FakeCalendar::default(),
        AgentConfig::default(),
    );
    h.mem
        .facts
        .store("alice", "Signs off emails with 'Cheers'", Category::Habit, 0.9, Map::new())
        .await
        .unwrap();

    h.agent
        .chat(request("conv", "send an email to dana about lunch"))
        .await
        .unwrap();

    let prompt = &h.model.calls()[0].system_prompt;
    assert!(prompt.contains("# Standing preferences"));
    assert!(prompt.contains("Signs off emails with 'Cheers'"));
}

#[tokio::test]
async fn context_mode_prefetches_and_offers_no_tools() {
    let model = ScriptedModel::new(vec![AssistantTurn {
        content: "You have one new email about the Q3 budget.".into(),
        tool_calls: vec![tool_call("z", "search_emails", json!({"query": "x"}))],
    }]);
    let calendar = FakeCalendar::default();
    calendar.fail_list.store(true, Ordering::SeqCst);
    let config = AgentConfig {
        mode: AgentMode::Context,
        ..AgentConfig::default()
    };
    let h = helpers::agent_harness(
        model,
        FakeMail::with_inbox(vec![email("m1", "t1", "Q3 budget", "dana@example.com", "Numbers")]),
        calendar,
        config,
    );

    let outcome = h
        .agent
        .chat(request("conv", "anything in my inbox, and what's on my calendar?"))
        .await
        .unwrap();
    assert_eq!(outcome.reply, "You have one new email about the Q3 budget.");
    assert!(outcome.intents.needs_email);
    assert!(outcome.intents.needs_calendar);

    let call = &h.model.calls()[0];
    assert!(call.tools.is_empty());
    assert!(call.system_prompt.contains("# Recent inbox"));
    assert!(call.system_prompt.contains("Q3 budget"));
    assert!(call.system_prompt.contains("Calendar is unavailable right now"));
    assert_eq!(h.mail.searches.lock().unwrap().as_slice(), ["in:inbox"]);

    let stored = h.conversations.load("alice", "conv", 10).await.unwrap();
    assert!(stored.iter().all(|t| t.tool_calls.is_empty()));
}

struct StalledCalendar;

#[async_trait]
impl CalendarClient for StalledCalendar {
    async fn list_events(&self, _: &str, _: u32) -> Result<Vec<CalendarEvent>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }

    async fn create_event(&self, _: &str, _: &NewEvent) -> Result<String> {
        Ok("never".into())
    }
}

#[tokio::test]
async fn timeout_seals_calls_that_never_reported_back() {
    let model = Arc::new(ScriptedModel::new(vec![calls_turn(vec![tool_call(
        "slow",
        "get_calendar_events",
        json!({}),
    )])]));
    let mem = helpers::memory_harness(model.clone() as Arc<dyn LanguageModel>);
    let conversations = ConversationStore::new(Arc::clone(&mem.db));
    let agent = Agent::new(
        model.clone() as Arc<dyn LanguageModel>,
        Arc::clone(&mem.memory),
        Arc::new(FakeMail::default()) as Arc<dyn MailClient>,
        Arc::new(StalledCalendar) as Arc<dyn CalendarClient>,
        conversations.clone(),
        AgentConfig {
            request_timeout_secs: Some(1),
            ..AgentConfig::default()
        },
    );

    let err = agent.chat(request("conv-t", "what's next week?")).await.unwrap_err();
    assert!(matches!(err, AgentError::Timeout(1)));

    let stored = conversations.load("alice", "conv-t", 10).await.unwrap();
    let last = stored.last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.tool_call_id.as_deref(), Some("slow"));
    assert_eq!(last.content, CANCELLED_OBSERVATION);
}
