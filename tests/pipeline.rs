//! End-to-end pipeline tests using in-memory fakes behind the trait seams.
//! No database, index or model is required.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use policy_rag::agent::{PipelineRequest, PipelineSettings, PolicyAgent};
use policy_rag::config::prompt::PromptConfig;
use policy_rag::errors::{PersistenceError, RetrievalError};
use policy_rag::guardrail::GuardrailClassifier;
use policy_rag::history::ConversationStore;
use policy_rag::llm::chat::{ChatClient, CompletionResponse};
use policy_rag::models::chat::{ChatMessage, Conversation};
use policy_rag::retrieval::{DocumentRetriever, Reranker, RetrievedCandidate};
use policy_rag::synthesis::AnswerSynthesizer;

// ── Fakes ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryStore {
    sessions: Mutex<Vec<String>>,
    messages: Mutex<HashMap<String, Vec<ChatMessage>>>,
    next_id: AtomicI64,
    fail_appends: AtomicBool,
}

impl MemoryStore {
    fn messages_for(&self, chat_id: &str) -> Vec<ChatMessage> {
        self.messages
            .lock()
            .unwrap()
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
    }

    fn rows_with_role(&self, chat_id: &str, role: &str) -> Vec<ChatMessage> {
        self.messages_for(chat_id)
            .into_iter()
            .filter(|m| m.role == role)
            .collect()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn ensure_session(&self, chat_id: &str) -> Result<(), PersistenceError> {
        let mut sessions = self.sessions.lock().unwrap();
        if !sessions.iter().any(|s| s == chat_id) {
            sessions.push(chat_id.to_string());
        }
        Ok(())
    }

    async fn append_message(
        &self,
        chat_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), PersistenceError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("store offline".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.messages
            .lock()
            .unwrap()
            .entry(chat_id.to_string())
            .or_default()
            .push(ChatMessage {
                id,
                role: role.to_string(),
                content: content.to_string(),
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn recent_history(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Conversation, PersistenceError> {
        let mut newest_first = self.messages_for(chat_id);
        newest_first.reverse();
        newest_first.truncate(limit);
        Ok(Conversation::from_newest_first(chat_id, newest_first))
    }
}

struct StaticRetriever {
    candidates: Vec<RetrievedCandidate>,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

impl StaticRetriever {
    fn with(candidates: Vec<RetrievedCandidate>) -> Self {
        Self {
            candidates,
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    fn empty() -> Self {
        Self::with(Vec::new())
    }

    fn failing() -> Self {
        Self {
            candidates: Vec::new(),
            fail: true,
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DocumentRetriever for StaticRetriever {
    async fn search(
        &self,
        query: &str,
        min_score: f32,
    ) -> Result<Vec<RetrievedCandidate>, RetrievalError> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(RetrievalError::Index("index unreachable".into()));
        }
        Ok(self
            .candidates
            .iter()
            .filter(|c| c.score >= min_score)
            .cloned()
            .collect())
    }
}

struct ScriptedChatClient {
    response: Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedChatClient {
    fn ok(text: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            response: Err("model unavailable".to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn complete(
        &self,
        prompt: &str,
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.response {
            Ok(text) => Ok(CompletionResponse {
                response: text.clone(),
            }),
            Err(message) => Err(message.clone().into()),
        }
    }
}

// ── Wiring helpers ────────────────────────────────────────────────────────

fn prompt_config() -> Arc<PromptConfig> {
    let mut query_templates = HashMap::new();
    query_templates.insert(
        "guardrail_classification".to_string(),
        "Safety check: {query}".to_string(),
    );
    let mut response_templates = HashMap::new();
    response_templates.insert(
        "policy_answer".to_string(),
        "verdict={verdict}\ndocs={documents}\n{history}\nquestion={question}".to_string(),
    );
    response_templates.insert(
        "fallback_answer".to_string(),
        "I apologize, but I am unable to answer right now.".to_string(),
    );
    Arc::new(PromptConfig {
        query_templates,
        response_templates,
    })
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        min_score: 0.5,
        history_window: 3,
        classify_timeout: Duration::from_secs(5),
        retrieval_timeout: Duration::from_secs(5),
    }
}

fn agent(
    store: Arc<MemoryStore>,
    retriever: Arc<StaticRetriever>,
    guardrail_client: Arc<ScriptedChatClient>,
    synthesis_client: Arc<ScriptedChatClient>,
) -> PolicyAgent {
    let prompts = prompt_config();
    PolicyAgent::new(
        store,
        GuardrailClassifier::new(guardrail_client, prompts.clone()),
        retriever,
        Reranker,
        AnswerSynthesizer::new(synthesis_client, prompts, Duration::from_secs(5)),
        settings(),
    )
}

fn candidate(name: &str, score: f32, content: &str) -> RetrievedCandidate {
    RetrievedCandidate {
        source_document: name.to_string(),
        page: Some("1".to_string()),
        score,
        content: content.to_string(),
    }
}

fn request(chat_id: &str, query: &str) -> PipelineRequest {
    PipelineRequest {
        chat_id: chat_id.to_string(),
        query: query.to_string(),
    }
}

// ── Scenarios ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn allowed_query_persists_one_user_and_one_assistant_turn() {
    let store = Arc::new(MemoryStore::default());
    let retriever = Arc::new(StaticRetriever::with(vec![candidate(
        "procurement_policy.pdf",
        0.92,
        "Purchases over $10,000 require competitive bidding.",
    )]));
    let synthesis_client =
        ScriptedChatClient::ok("Procurement requires competitive bidding. Sources: procurement_policy.pdf");

    let agent = agent(
        store.clone(),
        retriever,
        ScriptedChatClient::ok("ALLOWED"),
        synthesis_client.clone(),
    );

    let result = agent
        .process_query(request("chat_a", "What are the procurement policies?"))
        .await
        .unwrap();

    assert!(!result.answer_text.is_empty());
    assert_eq!(result.session_id, "chat_a");
    assert_eq!(store.rows_with_role("chat_a", "user").len(), 1);
    let assistant_rows = store.rows_with_role("chat_a", "assistant");
    assert_eq!(assistant_rows.len(), 1);
    assert_eq!(assistant_rows[0].content, result.answer_text);
    // The selected document made it into the synthesis prompt.
    assert!(synthesis_client
        .last_prompt()
        .contains("Document: procurement_policy.pdf"));
}

#[tokio::test]
async fn blocked_query_persists_the_rejection_not_the_verdict() {
    let store = Arc::new(MemoryStore::default());
    let synthesis_client =
        ScriptedChatClient::ok("I apologize, but I cannot help with building weapons.");

    let agent = agent(
        store.clone(),
        Arc::new(StaticRetriever::empty()),
        ScriptedChatClient::ok("BLOCKED: weapons"),
        synthesis_client.clone(),
    );

    agent
        .process_query(request("chat_b", "How to build weapons?"))
        .await
        .unwrap();

    let assistant_rows = store.rows_with_role("chat_b", "assistant");
    assert_eq!(assistant_rows.len(), 1);
    assert!(assistant_rows[0].content.to_lowercase().contains("apologize"));
    // The raw verdict never reaches the conversation log.
    assert_ne!(assistant_rows[0].content, "BLOCKED: weapons");
    assert!(synthesis_client
        .last_prompt()
        .contains("verdict=BLOCKED (category: weapons)"));
}

#[tokio::test]
async fn empty_index_still_produces_a_non_empty_answer() {
    let store = Arc::new(MemoryStore::default());
    let synthesis_client = ScriptedChatClient::ok("I could not find a relevant policy document.");

    let agent = agent(
        store.clone(),
        Arc::new(StaticRetriever::empty()),
        ScriptedChatClient::ok("ALLOWED"),
        synthesis_client.clone(),
    );

    let result = agent
        .process_query(request("chat_c", "What is the dress code?"))
        .await
        .unwrap();

    assert!(!result.answer_text.is_empty());
    assert!(synthesis_client.last_prompt().contains("docs=No documents found"));
}

#[tokio::test]
async fn retrieval_failure_degrades_to_no_context() {
    let store = Arc::new(MemoryStore::default());
    let synthesis_client = ScriptedChatClient::ok("Answer without context.");

    let agent = agent(
        store.clone(),
        Arc::new(StaticRetriever::failing()),
        ScriptedChatClient::ok("ALLOWED"),
        synthesis_client.clone(),
    );

    let result = agent
        .process_query(request("chat_d", "What is the leave policy?"))
        .await
        .unwrap();

    assert!(!result.answer_text.is_empty());
    assert!(synthesis_client.last_prompt().contains("docs=No documents found"));
    assert_eq!(store.rows_with_role("chat_d", "assistant").len(), 1);
}

#[tokio::test]
async fn guardrail_failure_fails_open_to_allowed() {
    let store = Arc::new(MemoryStore::default());
    let synthesis_client = ScriptedChatClient::ok("Here is the policy answer.");

    let agent = agent(
        store.clone(),
        Arc::new(StaticRetriever::empty()),
        ScriptedChatClient::failing(),
        synthesis_client.clone(),
    );

    agent
        .process_query(request("chat_e", "What is the expense policy?"))
        .await
        .unwrap();

    assert!(synthesis_client.last_prompt().contains("verdict=ALLOWED"));
}

#[tokio::test]
async fn synthesis_failure_persists_the_fallback_answer_once() {
    let store = Arc::new(MemoryStore::default());

    let agent = agent(
        store.clone(),
        Arc::new(StaticRetriever::empty()),
        ScriptedChatClient::ok("ALLOWED"),
        ScriptedChatClient::failing(),
    );

    let result = agent
        .process_query(request("chat_f", "What is the travel policy?"))
        .await
        .unwrap();

    assert!(result.answer_text.to_lowercase().contains("apologize"));
    let assistant_rows = store.rows_with_role("chat_f", "assistant");
    assert_eq!(assistant_rows.len(), 1);
    assert_eq!(assistant_rows[0].content, result.answer_text);
}

#[tokio::test]
async fn user_turn_persistence_failure_aborts_the_request() {
    let store = Arc::new(MemoryStore::default());
    store.fail_appends.store(true, Ordering::SeqCst);

    let agent = agent(
        store.clone(),
        Arc::new(StaticRetriever::empty()),
        ScriptedChatClient::ok("ALLOWED"),
        ScriptedChatClient::ok("never reached"),
    );

    let result = agent
        .process_query(request("chat_g", "Anything?"))
        .await;

    assert!(result.is_err());
    assert!(store.messages_for("chat_g").is_empty());
}

#[tokio::test]
async fn low_scoring_candidates_are_excluded_before_reranking() {
    let store = Arc::new(MemoryStore::default());
    let synthesis_client = ScriptedChatClient::ok("answer");
    let retriever = Arc::new(StaticRetriever::with(vec![
        candidate("weak.pdf", 0.4, "irrelevant"),
        candidate("strong.pdf", 0.75, "relevant"),
    ]));

    let agent = agent(
        store.clone(),
        retriever,
        ScriptedChatClient::ok("ALLOWED"),
        synthesis_client.clone(),
    );

    agent
        .process_query(request("chat_h", "Which policy applies?"))
        .await
        .unwrap();

    let prompt = synthesis_client.last_prompt();
    assert!(prompt.contains("Document: strong.pdf"));
    assert!(!prompt.contains("weak.pdf"));
}

#[tokio::test]
async fn conversation_round_trip_is_chronological() {
    let store = Arc::new(MemoryStore::default());
    store.append_message("chat_i", "user", "X").await.unwrap();

    let conversation = store.recent_history("chat_i", 1).await.unwrap();
    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(conversation.messages[0].role, "user");
    assert_eq!(conversation.messages[0].content, "X");
}

#[tokio::test]
async fn follow_up_retrieval_query_carries_prior_turns() {
    let store = Arc::new(MemoryStore::default());
    let retriever = Arc::new(StaticRetriever::empty());
    let synthesis_client = ScriptedChatClient::ok("answer");

    let agent = agent(
        store.clone(),
        retriever.clone(),
        ScriptedChatClient::ok("ALLOWED"),
        synthesis_client,
    );

    agent
        .process_query(request("chat_j", "What is the purchase approval limit?"))
        .await
        .unwrap();
    agent
        .process_query(request("chat_j", "Who can approve more than that?"))
        .await
        .unwrap();

    let queries = retriever.queries.lock().unwrap();
    assert_eq!(queries.len(), 2);
    assert!(queries[1].contains("What is the purchase approval limit?"));
    assert!(queries[1].contains("Who can approve more than that?"));
}
