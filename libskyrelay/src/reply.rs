//! Reply generator: answer one post with a completion
//!
//! The flow is refresh, read the post, render the prompt, complete once,
//! and publish the first choice as a threaded reply. Nothing is retried.

use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::completion::{CompletionChoice, CompletionClient};
use crate::config::CompletionConfig;
use crate::error::{CompletionError, ConfigError, PublishError, Result};
use crate::platforms::Publisher;
use crate::types::{RecordPath, ReplyRef, StrongRef};

/// Bot parameters file
///
/// JSON with `prompt`, `model`, `auth` (API key) and optional `org`. The
/// capitalised spellings (`Prompt`, `Model`, ...) are accepted too.
#[derive(Debug)]
pub struct BotParams {
    pub prompt: String,
    pub model: String,
    pub auth: SecretString,
    pub org: Option<String>,
}

#[derive(Deserialize)]
struct RawParams {
    #[serde(alias = "Prompt")]
    prompt: String,
    #[serde(alias = "Model")]
    model: String,
    #[serde(alias = "Auth")]
    auth: String,
    #[serde(default, alias = "Org")]
    org: Option<String>,
}

impl BotParams {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let raw: RawParams = serde_json::from_str(content).map_err(ConfigError::ParamsError)?;

        if raw.model.trim().is_empty() {
            return Err(ConfigError::MissingField("model".to_string()).into());
        }
        if raw.auth.trim().is_empty() {
            return Err(ConfigError::MissingField("auth".to_string()).into());
        }

        Ok(Self {
            prompt: raw.prompt,
            model: raw.model,
            auth: SecretString::from(raw.auth),
            org: raw.org.filter(|org| !org.is_empty()),
        })
    }
}

/// Substitute the post text into the prompt template
///
/// The first `%s` is replaced. A template without one gets the text
/// appended after a blank line.
pub fn render_prompt(template: &str, text: &str) -> String {
    if template.contains("%s") {
        template.replacen("%s", text, 1)
    } else if template.is_empty() {
        text.to_string()
    } else {
        format!("{}\n\n{}", template, text)
    }
}

/// Completion generated for a post, not yet published
#[derive(Debug, Clone)]
pub struct ReplyDraft {
    /// Every choice the completion returned, in order
    pub choices: Vec<CompletionChoice>,
    /// The post being answered
    pub parent: StrongRef,
    pub thread: ReplyRef,
}

impl ReplyDraft {
    /// Text of the reply: the first choice, trimmed
    pub fn reply_text(&self) -> Option<&str> {
        self.choices.first().map(|choice| choice.text.trim())
    }
}

#[derive(Debug, Clone)]
pub struct ReplyOutcome {
    /// Every choice the completion returned, in order
    pub choices: Vec<CompletionChoice>,
    /// The post that was answered
    pub parent: StrongRef,
    pub reply: StrongRef,
}

pub struct ReplyGenerator {
    completion: CompletionClient,
    prompt: String,
    model: String,
}

impl ReplyGenerator {
    pub fn new(params: BotParams, config: &CompletionConfig, timeout: Duration) -> Result<Self> {
        let completion = CompletionClient::new(config, params.auth, params.org, timeout)?;
        Ok(Self {
            completion,
            prompt: params.prompt,
            model: params.model,
        })
    }

    /// Refresh, read the post at `post_ref`, and ask for a completion
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a reference that is not `repo/collection/rkey`,
    /// `CompletionError::Empty` when no choice came back, otherwise whatever
    /// refresh, read, or completion returned.
    pub async fn prepare(&self, publisher: &mut dyn Publisher, post_ref: &str) -> Result<ReplyDraft> {
        let path: RecordPath = post_ref.parse()?;

        publisher.refresh_auth().await?;

        let post = publisher.get_post(&path).await?;
        info!(uri = %post.reference.uri, "Fetched post to answer");

        let prompt = render_prompt(&self.prompt, &post.record.text);
        let choices = self.completion.complete(&self.model, &prompt).await?;
        if choices.is_empty() {
            return Err(CompletionError::Empty.into());
        }

        let thread = ReplyRef::for_parent(post.reference.clone(), &post.record);
        Ok(ReplyDraft {
            choices,
            parent: post.reference,
            thread,
        })
    }

    /// Publish the first choice of `draft` as a reply in its thread
    pub async fn publish(&self, publisher: &dyn Publisher, draft: ReplyDraft) -> Result<ReplyOutcome> {
        let text = draft.reply_text().unwrap_or_default();
        if text.is_empty() {
            return Err(PublishError::Validation("Completion produced an empty reply".to_string()).into());
        }

        let reply = publisher
            .publish_reply(&draft.thread.parent, &draft.thread.root, text)
            .await?;
        info!(uri = %reply.uri, root = %draft.thread.root.uri, "Published reply");

        Ok(ReplyOutcome {
            choices: draft.choices,
            parent: draft.parent,
            reply,
        })
    }

    /// Answer the post at `post_ref` through `publisher`
    pub async fn respond(&self, publisher: &mut dyn Publisher, post_ref: &str) -> Result<ReplyOutcome> {
        let draft = self.prepare(publisher, post_ref).await?;
        self.publish(publisher, draft).await
    }
}
