//! The text-completion oracle as a narrow capability: prompt in, text / JSON / actions out.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;

use super::{ChatMessage, ChatOptions, FunctionCall, LlmClient, Role, StreamEvent, ToolSchema};

/// How the oracle is asked to shape its answer.
#[derive(Debug, Clone)]
pub enum ResponseFormat {
    Text,
    JsonObject,
    Actions(Vec<ToolSchema>),
}

#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub system: String,
    pub user: String,
    pub format: ResponseFormat,
}

impl OracleRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, format: ResponseFormat) -> Self {
        Self { system: system.into(), user: user.into(), format }
    }
}

/// Everything the oracle said: free text (possibly a JSON document) and any requested actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub actions: Vec<FunctionCall>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), actions: Vec::new() }
    }

    pub fn with_actions(actions: Vec<FunctionCall>) -> Self {
        Self { content: String::new(), actions }
    }
}

#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, request: OracleRequest) -> Result<Completion>;
}

#[async_trait]
impl Oracle for LlmClient {
    async fn complete(&self, request: OracleRequest) -> Result<Completion> {
        let messages = vec![
            ChatMessage::new(Role::System, request.system),
            ChatMessage::new(Role::User, request.user),
        ];
        let mut opts = ChatOptions::for_model(self.model());
        match request.format {
            ResponseFormat::Text => {}
            ResponseFormat::JsonObject => opts.json_mode = true,
            ResponseFormat::Actions(tools) => {
                opts.tools = Some(tools);
                opts.tool_choice = Some("auto".into());
            }
        }

        let mut stream = self.chat_stream(messages, opts);
        let mut content = String::new();
        // Deltas for one call share an index; names arrive once, arguments in pieces.
        let mut calls: BTreeMap<usize, (String, String)> = BTreeMap::new();
        while let Some(ev) = stream.next().await {
            match ev? {
                StreamEvent::Content(t) => content.push_str(&t),
                StreamEvent::ToolCallDelta { index, name, arguments } => {
                    let entry = calls.entry(index).or_default();
                    if let Some(n) = name {
                        entry.0.push_str(&n);
                    }
                    if let Some(a) = arguments {
                        entry.1.push_str(&a);
                    }
                }
                StreamEvent::ToolCallsFinish => {}
                StreamEvent::Done => break,
            }
        }

        let actions = calls
            .into_values()
            .map(|(name, arguments)| FunctionCall { name, arguments })
            .collect();
        Ok(Completion { content, actions })
    }
}
