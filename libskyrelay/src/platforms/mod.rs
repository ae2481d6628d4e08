//! Publishing targets
//!
//! A [`Publisher`] owns the account session, refreshes it on demand, and
//! turns [`PostDraft`]s into records on the target network.
//!
//! # Examples
//!
//! ```no_run
//! use libskyrelay::platforms::{Publisher, bluesky::BlueskyClient};
//! use libskyrelay::types::PostDraft;
//! use std::path::PathBuf;
//! use std::time::Duration;
//!
//! # async fn example() -> libskyrelay::error::Result<()> {
//! let mut publisher = BlueskyClient::from_auth_file(
//!     "https://bsky.social",
//!     PathBuf::from("/home/me/.config/skyrelay/bsky.auth"),
//!     Duration::from_secs(30),
//! )?;
//!
//! publisher.refresh_auth().await?;
//! let created = publisher.publish(&PostDraft::text("Hello from skyrelay")).await?;
//! println!("Posted: {}", created.uri);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::{PublishError, Result};
use crate::types::{FetchedPost, PostDraft, PostEmbed, RecordPath, ReplyRef, StrongRef};

pub mod bluesky;

// Mock publisher is available for all builds (not just tests) to support integration tests
pub mod mock;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Exchange the refresh token for a fresh session and persist it
    ///
    /// Called unconditionally before every poll cycle and every reply;
    /// refreshing a still-valid session is harmless.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Refresh` if the server rejects the refresh token
    /// and `AuthError::Persist` if the new session cannot be written.
    async fn refresh_auth(&mut self) -> Result<()>;

    /// Create a post and return its content reference
    ///
    /// A failed call never yields a reference, so callers can only record
    /// what was actually created.
    async fn publish(&self, draft: &PostDraft) -> Result<StrongRef>;

    /// Create a reply to `parent` within the thread started by `root`
    async fn publish_reply(&self, parent: &StrongRef, root: &StrongRef, text: &str) -> Result<StrongRef> {
        let draft = PostDraft::reply(
            text,
            ReplyRef {
                root: root.clone(),
                parent: parent.clone(),
            },
        );
        self.publish(&draft).await
    }

    /// Read back a single post record
    async fn get_post(&self, path: &RecordPath) -> Result<FetchedPost>;

    /// Get the platform name (e.g., "bluesky")
    fn name(&self) -> &str;

    /// Maximum post length in characters, if the platform has one
    fn character_limit(&self) -> Option<usize>;

    /// Check a draft before sending it
    ///
    /// Link posts need text; every post must fit the character limit.
    fn validate_content(&self, draft: &PostDraft) -> Result<()> {
        let is_link = matches!(draft.embed, Some(PostEmbed::External(_)));
        if is_link && draft.text.trim().is_empty() {
            return Err(PublishError::Validation("Content cannot be empty".to_string()).into());
        }

        if let Some(limit) = self.character_limit() {
            let length = draft.text.chars().count();
            if length > limit {
                return Err(PublishError::Validation(format!(
                    "Content exceeds {}'s {} character limit (current: {} characters)",
                    self.name(),
                    limit,
                    length
                ))
                .into());
            }
        }

        Ok(())
    }
}
