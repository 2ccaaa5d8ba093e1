pub mod agent;
pub mod cli;
pub mod config;
pub mod errors;
pub mod guardrail;
pub mod history;
pub mod llm;
pub mod models;
pub mod retrieval;
pub mod server;
pub mod synthesis;

use agent::{PipelineSettings, PolicyAgent};
use cli::Args;
use guardrail::GuardrailClassifier;
use history::PostgresConversationStore;
use llm::{LlmConfig, LlmType};
use log::info;
use retrieval::{HybridRetriever, Reranker};
use server::Server;
use std::error::Error;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use synthesis::AnswerSynthesizer;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Served Model: {}", args.served_model);
    info!("Conversation Store: {}", args.database_url);
    info!("Vector Store Type: {}", args.vector_type);
    info!("Vector Store Host: {}", args.host);
    info!("Vector Index: {}", args.indexes);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Embedding LLM Type: {}", args.embedding_llm_type);
    info!("Prompts Path: {}", args.prompts_path);
    info!("History Window: {}", args.history_window);
    info!("Retrieval Limit: {} (min score {})", args.retrieval_limit, args.min_score);
    info!("-------------------------");

    let prompt_config = config::prompt::load_prompts(&args.prompts_path)?;

    let chat_config = LlmConfig {
        llm_type: LlmType::from_str(&args.chat_llm_type)?,
        base_url: args.chat_base_url.clone(),
        api_key: Some(args.chat_api_key.clone()).filter(|k| !k.is_empty()),
        completion_model: args.chat_model.clone(),
        embedding_model: None,
    };
    let chat_client = llm::chat::new_client(&chat_config)?;

    let embedding_config = LlmConfig {
        llm_type: LlmType::from_str(&args.embedding_llm_type)?,
        base_url: args.embedding_base_url.clone(),
        api_key: Some(args.embedding_api_key.clone()).filter(|k| !k.is_empty()),
        completion_model: None,
        embedding_model: args.embedding_model.clone(),
    };
    let embedding_client = llm::embedding::new_client(&embedding_config)?;

    let store = Arc::new(PostgresConversationStore::connect(&args.database_url).await?);
    let vector_store = retrieval::retriever::connect_vector_store(&args).await?;

    let retriever = Arc::new(HybridRetriever::new(
        vector_store,
        embedding_client,
        args.indexes.clone(),
        args.retrieval_limit,
    ));
    let guardrail = GuardrailClassifier::new(chat_client.clone(), prompt_config.clone());
    let synthesizer = AnswerSynthesizer::new(
        chat_client,
        prompt_config,
        Duration::from_secs(args.synthesis_timeout_secs),
    );

    let agent = Arc::new(PolicyAgent::new(
        store,
        guardrail,
        retriever,
        Reranker,
        synthesizer,
        PipelineSettings::from(&args),
    ));

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, agent, args);
    server.run().await?;

    Ok(())
}
