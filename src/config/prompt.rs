use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::sync::Arc;

#[derive(Debug)]
pub enum PromptError {
    TemplateNotFound(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::TemplateNotFound(key) => write!(f, "Prompt template '{}' not found", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    pub query_templates: HashMap<String, String>,
    pub response_templates: HashMap<String, String>,
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        if !self.query_templates.contains_key("guardrail_classification") {
            return Err(PromptError::TemplateNotFound(
                "query_templates:guardrail_classification".to_string(),
            ));
        }
        if !self.response_templates.contains_key("policy_answer") {
            return Err(PromptError::TemplateNotFound(
                "response_templates:policy_answer".to_string(),
            ));
        }
        if !self.response_templates.contains_key("fallback_answer") {
            return Err(PromptError::TemplateNotFound(
                "response_templates:fallback_answer".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn load_prompts(path: &str) -> Result<Arc<PromptConfig>, Box<dyn Error + Send + Sync>> {
    let file_content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read prompts file '{}': {}", path, e))?;
    let config: PromptConfig = serde_json::from_str(&file_content)
        .map_err(|e| format!("Failed to parse prompts file '{}': {}", path, e))?;
    config.validate()?;
    Ok(Arc::new(config))
}

fn get_query_template<'a>(config: &'a PromptConfig, key: &str) -> Result<&'a str, PromptError> {
    config
        .query_templates
        .get(key)
        .map(|s| s.as_str())
        .ok_or_else(|| PromptError::TemplateNotFound(format!("query_templates:{}", key)))
}

fn get_response_template<'a>(config: &'a PromptConfig, key: &str) -> Result<&'a str, PromptError> {
    config
        .response_templates
        .get(key)
        .map(|s| s.as_str())
        .ok_or_else(|| PromptError::TemplateNotFound(format!("response_templates:{}", key)))
}

pub fn get_guardrail_prompt(config: &PromptConfig, query: &str) -> Result<String, PromptError> {
    let template = get_query_template(config, "guardrail_classification")?;
    Ok(template.replace("{query}", query))
}

pub fn get_answer_prompt(
    config: &PromptConfig,
    verdict: &str,
    documents: &str,
    history: &str,
    question: &str,
) -> Result<String, PromptError> {
    let template = get_response_template(config, "policy_answer")?;

    Ok(template
        .replace("{verdict}", verdict)
        .replace("{documents}", documents)
        .replace("{history}", history)
        .replace("{question}", question))
}

pub fn get_fallback_answer(config: &PromptConfig) -> Result<String, PromptError> {
    get_response_template(config, "fallback_answer").map(|s| s.to_string())
}
