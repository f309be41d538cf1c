#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cortex::agent::Agent;
use cortex::config::{AgentConfig, MemoryConfig};
use cortex::conversation::ConversationStore;
use cortex::db;
use cortex::embedding::{l2_normalize, EmbeddingProvider};
use cortex::integrations::{
    CalendarClient, CalendarEvent, EmailSummary, MailClient, NewEvent, OutgoingEmail, ReplyTarget,
};
use cortex::llm::{AssistantTurn, ChatMessage, LanguageModel, ToolCall, ToolDefinition};
use cortex::memory::extract::EXTRACTION_PROMPT;
use cortex::memory::fact_store::FactStore;
use cortex::memory::service::MemoryService;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

pub fn shared_db() -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(test_db()))
}

pub const HASH_DIMS: usize = 64;

/// Deterministic bag-of-words embedding: each word (lowercased, trailing
/// plural `s` dropped) adds weight to one hashed dimension.
pub struct HashEmbedding {
    dims: usize,
    fail: AtomicBool,
}

impl HashEmbedding {
    pub fn new() -> Self {
        Self::with_dims(HASH_DIMS)
    }

    pub fn with_dims(dims: usize) -> Self {
        Self {
            dims,
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
        {
            let stem = if word.len() > 3 {
                word.strip_suffix('s').unwrap_or(word)
            } else {
                word
            };
            // FNV-1a
            let mut hash: u64 = 0xcbf29ce484222325;
            for b in stem.bytes() {
                hash ^= u64::from(b);
                hash = hash.wrapping_mul(0x100000001b3);
            }
            v[(hash % self.dims as u64) as usize] += 1.0;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[0] = 1.0;
        }
        l2_normalize(&v)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("embedding service unavailable");
        }
        Ok(self.vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model(&self) -> &str {
        "hash-test"
    }
}

/// What the model was shown on one `generate` call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    pub tools: Vec<String>,
}

/// Replays scripted assistant turns in order and records every call.
///
/// Extraction requests (recognised by their system prompt) are answered with
/// `extraction_reply` and do not consume the script.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<AssistantTurn, String>>>,
    calls: Mutex<Vec<RecordedCall>>,
    extraction_reply: Mutex<Result<String, String>>,
    extraction_calls: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(turns: Vec<AssistantTurn>) -> Self {
        Self {
            script: Mutex::new(turns.into_iter().map(Ok).collect()),
            calls: Mutex::new(Vec::new()),
            extraction_reply: Mutex::new(Ok("[]".to_string())),
            extraction_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_extraction(self, reply: &str) -> Self {
        *self.extraction_reply.lock().unwrap() = Ok(reply.to_string());
        self
    }

    pub fn with_failing_extraction(self) -> Self {
        *self.extraction_reply.lock().unwrap() = Err("model overloaded".to_string());
        self
    }

    pub fn push(&self, turn: AssistantTurn) {
        self.script.lock().unwrap().push_back(Ok(turn));
    }

    pub fn push_error(&self, message: &str) {
        self.script.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn extraction_inputs(&self) -> Vec<String> {
        self.extraction_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<AssistantTurn> {
        if system_prompt == EXTRACTION_PROMPT {
            let input = history.last().map(|m| m.content.clone()).unwrap_or_default();
            self.extraction_calls.lock().unwrap().push(input);
            return match &*self.extraction_reply.lock().unwrap() {
                Ok(reply) => Ok(AssistantTurn::text(reply.clone())),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            };
        }

        self.calls.lock().unwrap().push(RecordedCall {
            system_prompt: system_prompt.to_string(),
            history: history.to_vec(),
            tools: tools.iter().map(|t| t.name.to_string()).collect(),
        });

        match self.script.lock().unwrap().pop_front() {
            Some(Ok(turn)) => Ok(turn),
            Some(Err(e)) => Err(anyhow::anyhow!("{e}")),
            None => anyhow::bail!("script exhausted"),
        }
    }
}

pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments,
    }
}

pub fn calls_turn(calls: Vec<ToolCall>) -> AssistantTurn {
    AssistantTurn {
        content: String::new(),
        tool_calls: calls,
    }
}

#[derive(Default)]
pub struct FakeMail {
    pub inbox: Vec<EmailSummary>,
    pub threads: HashMap<String, ReplyTarget>,
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub searches: Mutex<Vec<String>>,
    pub fail_search: AtomicBool,
    pub fail_send: AtomicBool,
}

impl FakeMail {
    pub fn with_inbox(inbox: Vec<EmailSummary>) -> Self {
        Self {
            inbox,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailClient for FakeMail {
    async fn search(&self, _user_id: &str, query: &str, max_results: usize) -> Result<Vec<EmailSummary>> {
        self.searches.lock().unwrap().push(query.to_string());
        if self.fail_search.load(Ordering::SeqCst) {
            anyhow::bail!("gmail returned 503");
        }
        Ok(self.inbox.iter().take(max_results).cloned().collect())
    }

    async fn reply_target(&self, _user_id: &str, thread_id: &str) -> Result<ReplyTarget> {
        self.threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("thread {thread_id} not found"))
    }

    async fn send(&self, _user_id: &str, email: &OutgoingEmail) -> Result<String> {
        if self.fail_send.load(Ordering::SeqCst) {
            anyhow::bail!("gmail rejected the message");
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(email.clone());
        Ok(format!("msg-{}", sent.len()))
    }
}

#[derive(Default)]
pub struct FakeCalendar {
    pub events: Vec<CalendarEvent>,
    pub created: Mutex<Vec<NewEvent>>,
    pub listed_days: Mutex<Vec<u32>>,
    pub fail_list: AtomicBool,
}

impl FakeCalendar {
    pub fn with_events(events: Vec<CalendarEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub fn created(&self) -> Vec<NewEvent> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarClient for FakeCalendar {
    async fn list_events(&self, _user_id: &str, days_ahead: u32) -> Result<Vec<CalendarEvent>> {
        self.listed_days.lock().unwrap().push(days_ahead);
        if self.fail_list.load(Ordering::SeqCst) {
            anyhow::bail!("calendar API timed out");
        }
        Ok(self.events.clone())
    }

    async fn create_event(&self, _user_id: &str, event: &NewEvent) -> Result<String> {
        let mut created = self.created.lock().unwrap();
        created.push(event.clone());
        Ok(format!("evt-{}", created.len()))
    }
}

pub fn email(id: &str, thread: &str, subject: &str, from: &str, preview: &str) -> EmailSummary {
    EmailSummary {
        id: id.into(),
        thread_id: thread.into(),
        subject: subject.into(),
        from: from.into(),
        preview: preview.into(),
    }
}

pub fn event(id: &str, title: &str, start: &str, end: &str) -> CalendarEvent {
    CalendarEvent {
        id: id.into(),
        title: title.into(),
        start: start.into(),
        end: end.into(),
        description: None,
        location: None,
    }
}

/// Fact store and memory service over one shared in-memory database.
pub struct MemoryHarness {
    pub db: Arc<Mutex<Connection>>,
    pub embedder: Arc<HashEmbedding>,
    pub facts: Arc<FactStore>,
    pub memory: Arc<MemoryService>,
}

pub fn memory_harness(model: Arc<dyn LanguageModel>) -> MemoryHarness {
    let db = shared_db();
    let embedder = Arc::new(HashEmbedding::new());
    let facts = Arc::new(FactStore::new(
        Arc::clone(&db),
        embedder.clone() as Arc<dyn EmbeddingProvider>,
        MemoryConfig::default().dedup_threshold,
    ));
    let memory = Arc::new(MemoryService::new(
        Arc::clone(&facts),
        model,
        MemoryConfig::default(),
    ));
    MemoryHarness {
        db,
        embedder,
        facts,
        memory,
    }
}

/// Everything an agent test needs, with handles kept for assertions.
pub struct AgentHarness {
    pub model: Arc<ScriptedModel>,
    pub mail: Arc<FakeMail>,
    pub calendar: Arc<FakeCalendar>,
    pub mem: MemoryHarness,
    pub conversations: ConversationStore,
    pub agent: Agent,
}

pub fn agent_harness(
    model: ScriptedModel,
    mail: FakeMail,
    calendar: FakeCalendar,
    config: AgentConfig,
) -> AgentHarness {
    let model = Arc::new(model);
    let mail = Arc::new(mail);
    let calendar = Arc::new(calendar);
    let mem = memory_harness(model.clone() as Arc<dyn LanguageModel>);
    let conversations = ConversationStore::new(Arc::clone(&mem.db));
    let agent = Agent::new(
        model.clone() as Arc<dyn LanguageModel>,
        Arc::clone(&mem.memory),
        mail.clone() as Arc<dyn MailClient>,
        calendar.clone() as Arc<dyn CalendarClient>,
        conversations.clone(),
        config,
    );
    AgentHarness {
        model,
        mail,
        calendar,
        mem,
        conversations,
        agent,
    }
}
