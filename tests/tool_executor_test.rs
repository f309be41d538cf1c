mod helpers;

use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use cortex::config::GateMode;
use cortex::integrations::{CalendarClient, MailClient, ReplyTarget};
use cortex::llm::{ChatMessage, Role};
use cortex::memory::types::Category;
use cortex::tools::ToolExecutor;

use helpers::{email, event, tool_call, FakeCalendar, FakeMail, ScriptedModel};

struct Fixture {
    mem: helpers::MemoryHarness,
    mail: Arc<FakeMail>,
    calendar: Arc<FakeCalendar>,
    executor: ToolExecutor,
}

fn fixture(mail: FakeMail, calendar: FakeCalendar, gate: GateMode) -> Fixture {
    let mem = helpers::memory_harness(Arc::new(ScriptedModel::new(vec![])));
    let mail = Arc::new(mail);
    let calendar = Arc::new(calendar);
    let executor = ToolExecutor::new(
        Arc::clone(&mem.memory),
        mail.clone() as Arc<dyn MailClient>,
        calendar.clone() as Arc<dyn CalendarClient>,
        gate,
    );
    Fixture {
        mem,
        mail,
        calendar,
        executor,
    }
}

fn default_fixture() -> Fixture {
    fixture(FakeMail::default(), FakeCalendar::default(), GateMode::Prompt)
}

#[tokio::test]
async fn search_emails_lists_subject_sender_and_thread() {
    let f = fixture(
        FakeMail::with_inbox(vec![
            email("m1", "t1", "Q3 budget", "dana@example.com", "Numbers attached"),
            email("m2", "t2", "", "ops@example.com", "Maintenance window"),
        ]),
        FakeCalendar::default(),
        GateMode::Prompt,
    );

    let out = f
        .executor
        .execute("alice", &tool_call("c1", "search_emails", json!({"query": "budget"})), &[])
        .await;

    assert!(out.contains("Q3 budget"));
    assert!(out.contains("dana@example.com"));
    assert!(out.contains("Thread: t1"));
    assert!(out.contains("(no subject)"));
    assert_eq!(f.mail.searches.lock().unwrap().as_slice(), ["budget"]);
}

#[tokio::test]
async fn empty_inbox_reports_no_emails() {
    let f = default_fixture();
    let out = f
        .executor
        .execute("alice", &tool_call("c1", "search_emails", json!({"query": "anything"})), &[])
        .await;
    assert_eq!(out, "No emails found");
}

#[tokio::test]
async fn calendar_defaults_to_a_week_and_rejects_bad_ranges() {
    let f = fixture(
        FakeMail::default(),
        FakeCalendar::with_events(vec![event(
            "e1",
            "Standup",
            "2026-03-02T09:00:00Z",
            "2026-03-02T09:15:00Z",
        )]),
        GateMode::Prompt,
    );

    let out = f
        .executor
        .execute("alice", &tool_call("c1", "get_calendar_events", json!({})), &[])
        .await;
    assert!(out.contains("- Standup (2026-03-02T09:00:00Z to 2026-03-02T09:15:00Z)"));
    assert_eq!(f.calendar.listed_days.lock().unwrap().as_slice(), [7]);

    let out = f
        .executor
        .execute(
            "alice",
            &tool_call("c2", "get_calendar_events", json!({"days_ahead": 0})),
            &[],
        )
        .await;
    assert!(out.starts_with("Error: "));
    assert!(out.contains("days_ahead"));
}

#[tokio::test]
async fn save_then_search_memory() {
    let f = default_fixture();

    let saved = f
        .executor
        .execute(
            "alice",
            &tool_call(
                "c1",
                "save_memory",
                json!({"fact": "Prefers afternoon meetings", "category": "preference"}),
            ),
            &[],
        )
        .await;
    assert_eq!(saved, "Saved to memory: \"Prefers afternoon meetings\" (preference)");

    let stored = f.mem.facts.by_importance("alice", 0.0, 10).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!((stored[0].importance - 0.7).abs() < 1e-9);
    assert_eq!(stored[0].category, Category::Preference);

    let again = f
        .executor
        .execute(
            "alice",
            &tool_call(
                "c2",
                "save_memory",
                json!({"fact": "Prefers afternoon meetings", "category": "preference"}),
            ),
            &[],
        )
        .await;
    assert!(again.starts_with("Already remembered"));

    let found = f
        .executor
        .execute(
            "alice",
            &tool_call("c3", "search_memory", json!({"query": "meetings"})),
            &[],
        )
        .await;
    assert_eq!(found, "- Prefers afternoon meetings");
}

#[tokio::test]
async fn save_memory_rejects_unknown_category() {
    let f = default_fixture();
    let out = f
        .executor
        .execute(
            "alice",
            &tool_call("c1", "save_memory", json!({"fact": "Something", "category": "mood"})),
            &[],
        )
        .await;
    assert!(out.starts_with("Error: invalid arguments for save_memory"));
    assert!(f.mem.facts.by_importance("alice", 0.0, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn search_memory_on_empty_store() {
    let f = default_fixture();
    let out = f
        .executor
        .execute("alice", &tool_call("c1", "search_memory", json!({"query": "anything"})), &[])
        .await;
    assert_eq!(out, "No relevant memories found");
}

#[tokio::test]
async fn reply_in_thread_sets_threading_headers() {
    let mut mail = FakeMail::default();
    mail.threads = HashMap::from([(
        "t1".to_string(),
        ReplyTarget {
            message_id: "<abc@mail.example.com>".into(),
            references: Some("<root@mail.example.com>".into()),
            subject: "Q3 budget".into(),
        },
    )]);
    let f = fixture(mail, FakeCalendar::default(), GateMode::Prompt);

    let out = f
        .executor
        .execute(
            "alice",
            &tool_call(
                "c1",
                "draft_and_send_email",
                json!({
                    "to": "dana@example.com",
                    "subject": "",
                    "body": "Looks good, approved.",
                    "thread_id": "t1"
                }),
            ),
            &[],
        )
        .await;
    assert!(out.starts_with("Email sent to dana@example.com"));

    let sent = f.mail.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Re: Q3 budget");
    assert_eq!(sent[0].thread_id.as_deref(), Some("t1"));
    assert_eq!(sent[0].in_reply_to.as_deref(), Some("<abc@mail.example.com>"));
    assert_eq!(
        sent[0].references.as_deref(),
        Some("<root@mail.example.com> <abc@mail.example.com>")
    );
}

#[tokio::test]
async fn reply_to_unknown_thread_sends_nothing() {
    let f = default_fixture();
    let out = f
        .executor
        .execute(
            "alice",
            &tool_call(
                "c1",
                "draft_and_send_email",
                json!({"to": "dana@example.com", "subject": "Hi", "body": "Hello", "thread_id": "missing"}),
            ),
            &[],
        )
        .await;
    assert!(out.starts_with("Error: draft_and_send_email failed"));
    assert!(f.mail.sent().is_empty());
}

#[tokio::test]
async fn new_email_keeps_subject_and_has_no_threading() {
    let f = default_fixture();
    f.executor
        .execute(
            "alice",
            &tool_call(
                "c1",
                "draft_and_send_email",
                json!({"to": "dana@example.com", "subject": "Lunch Friday?", "body": "Free at noon?"}),
            ),
            &[],
        )
        .await;

    let sent = f.mail.sent();
    assert_eq!(sent[0].subject, "Lunch Friday?");
    assert!(sent[0].in_reply_to.is_none());
    assert!(sent[0].references.is_none());
}

#[tokio::test]
async fn create_event_validates_times() {
    let f = default_fixture();

    let out = f
        .executor
        .execute(
            "alice",
            &tool_call(
                "c1",
                "create_calendar_event",
                json!({"title": "Review", "start": "tomorrow 9am", "end": "2026-03-02T10:00:00Z"}),
            ),
            &[],
        )
        .await;
    assert!(out.starts_with("Error: "));

    let out = f
        .executor
        .execute(
            "alice",
            &tool_call(
                "c2",
                "create_calendar_event",
                json!({"title": "Review", "start": "2026-03-02T10:00:00Z", "end": "2026-03-02T09:00:00Z"}),
            ),
            &[],
        )
        .await;
    assert!(out.contains("end must be after start"));
    assert!(f.calendar.created().is_empty());

    let out = f
        .executor
        .execute(
            "alice",
            &tool_call(
                "c3",
                "create_calendar_event",
                json!({"title": "Review", "start": "2026-03-02T09:00:00-05:00", "end": "2026-03-02T09:30:00-05:00"}),
            ),
            &[],
        )
        .await;
    assert!(out.starts_with("Created \"Review\""));
    assert_eq!(f.calendar.created()[0].start, "2026-03-02T09:00:00-05:00");
}

#[tokio::test]
async fn strict_gate_requires_an_approval_turn() {
    let f = fixture(FakeMail::default(), FakeCalendar::default(), GateMode::Strict);
    let call = tool_call(
        "c1",
        "create_calendar_event",
        json!({"title": "Standup", "start": "2026-03-02T09:00:00Z", "end": "2026-03-02T09:30:00Z"}),
    );

    let request_only = vec![ChatMessage::user("create a meeting titled Standup tomorrow 9-9:30am")];
    let out = f.executor.execute("alice", &call, &request_only).await;
    assert!(out.contains("requires explicit user approval"));
    assert!(f.calendar.created().is_empty());

    let approved = vec![
        ChatMessage::user("create a meeting titled Standup tomorrow 9-9:30am"),
        ChatMessage::assistant("I'll create \"Standup\" 9:00-9:30. Shall I?", vec![]),
        ChatMessage::user("yes, go ahead"),
    ];
    let out = f.executor.execute("alice", &call, &approved).await;
    assert!(out.starts_with("Created"));
    assert_eq!(f.calendar.created().len(), 1);
}

#[tokio::test]
async fn strict_gate_ignores_approval_words_in_a_fresh_request() {
    let f = fixture(FakeMail::default(), FakeCalendar::default(), GateMode::Strict);
    let call = tool_call(
        "c1",
        "draft_and_send_email",
        json!({"to": "bob@example.com", "subject": "Deal", "body": "The deal is off."}),
    );
    let history = vec![
        ChatMessage::user("hi"),
        ChatMessage::assistant("Hello! How can I help?", vec![]),
        ChatMessage::user("ok, send an email to bob@example.com saying the deal is off"),
        ChatMessage::assistant("", vec![call.clone()]),
    ];

    let out = f.executor.execute("alice", &call, &history).await;
    assert!(out.contains("requires explicit user approval"));
    assert!(f.mail.sent().is_empty());
}

#[tokio::test]
async fn strict_gate_lets_one_action_through_per_approval() {
    let f = fixture(FakeMail::default(), FakeCalendar::default(), GateMode::Strict);
    let standup = json!({"title": "Standup", "start": "2026-03-02T09:00:00Z", "end": "2026-03-02T09:30:00Z"});
    let calls = vec![
        tool_call("c1", "create_calendar_event", standup.clone()),
        tool_call("c2", "create_calendar_event", standup.clone()),
    ];
    let mut history = vec![
        ChatMessage::user("create a meeting titled Standup tomorrow 9-9:30am"),
        ChatMessage::assistant("I'll create \"Standup\" 9:00-9:30. Shall I?", vec![]),
        ChatMessage::user("yes, go ahead"),
        ChatMessage::assistant("", calls.clone()),
    ];

    let observations = f.executor.execute_batch("alice", &calls, &history).await;
    assert!(observations[0].content.starts_with("Created"));
    assert!(observations[1].content.contains("requires explicit user approval"));
    assert_eq!(f.calendar.created().len(), 1);

    // A follow-up step in the same request finds the approval spent
    history.extend(observations);
    let retry = tool_call("c3", "create_calendar_event", standup);
    history.push(ChatMessage::assistant("", vec![retry.clone()]));
    let out = f.executor.execute("alice", &retry, &history).await;
    assert!(out.contains("requires explicit user approval"));
    assert_eq!(f.calendar.created().len(), 1);
}

#[tokio::test]
async fn prompt_gate_does_not_block_in_code() {
    let f = default_fixture();
    let call = tool_call(
        "c1",
        "create_calendar_event",
        json!({"title": "Standup", "start": "2026-03-02T09:00:00Z", "end": "2026-03-02T09:30:00Z"}),
    );
    let out = f
        .executor
        .execute("alice", &call, &[ChatMessage::user("book standup")])
        .await;
    assert!(out.starts_with("Created"));
}

#[tokio::test]
async fn unknown_tool_and_malformed_arguments_become_observations() {
    let f = default_fixture();

    let out = f
        .executor
        .execute("alice", &tool_call("c1", "delete_everything", json!({})), &[])
        .await;
    assert_eq!(out, "Error: unknown tool: delete_everything");

    let out = f
        .executor
        .execute(
            "alice",
            &tool_call("c2", "search_emails", json!("{not json")),
            &[],
        )
        .await;
    assert!(out.starts_with("Error: invalid arguments for search_emails"));

    let out = f
        .executor
        .execute("alice", &tool_call("c3", "search_emails", json!({"max_results": 3})), &[])
        .await;
    assert!(out.contains("missing field `query`"));
}

#[tokio::test]
async fn batch_returns_one_observation_per_call_in_order() {
    let f = fixture(
        FakeMail::with_inbox(vec![email("m1", "t1", "Hello", "a@example.com", "hi")]),
        FakeCalendar::default(),
        GateMode::Prompt,
    );
    f.calendar.fail_list.store(true, Ordering::SeqCst);

    let calls = vec![
        tool_call("a", "search_emails", json!({"query": "hello"})),
        tool_call("b", "get_calendar_events", json!({"days_ahead": 3})),
        tool_call("c", "search_memory", json!({"query": "anything"})),
    ];
    let observations = f.executor.execute_batch("alice", &calls, &[]).await;

    assert_eq!(observations.len(), 3);
    assert!(observations.iter().all(|o| o.role == Role::Tool));
    let ids: Vec<&str> = observations
        .iter()
        .map(|o| o.tool_call_id.as_deref().unwrap())
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    assert!(observations[0].content.contains("Hello"));
    assert!(observations[1].content.starts_with("Error: get_calendar_events failed"));
    assert_eq!(observations[2].content, "No relevant memories found");
}
