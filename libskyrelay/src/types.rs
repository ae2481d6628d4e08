//! Core types for Skyrelay

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SkyrelayError;

/// Discussion page for items that carry no outbound link
pub const HN_ITEM_URL: &str = "https://news.ycombinator.com/item?id=";

/// Lexicon type of a feed post record
pub const FEED_POST_COLLECTION: &str = "app.bsky.feed.post";

const EXTERNAL_EMBED_TYPE: &str = "app.bsky.embed.external";

/// One entry of the ranked list, as returned by the item endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalItem {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub by: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub kids: Vec<i64>,
    #[serde(default)]
    pub descendants: i64,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl ExternalItem {
    /// The URL to link to, falling back to the discussion page
    pub fn link(&self) -> String {
        match self.url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => format!("{}{}", HN_ITEM_URL, self.id),
        }
    }
}

/// Row of the seen-store: proof that an item was published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeenRecord {
    pub id: i64,
    pub external_id: i64,
    pub content_id: String,
    pub uri: String,
    pub created_at: i64,
}

/// Content-addressed reference to a record in a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}

impl ReplyRef {
    /// Build the reply reference for answering `parent`
    ///
    /// Replies always point at the thread root: when the parent is itself a
    /// reply, its root is reused instead of the parent.
    pub fn for_parent(parent: StrongRef, parent_record: &FeedPostRecord) -> Self {
        let root = match &parent_record.reply {
            Some(reply) => reply.root.clone(),
            None => parent.clone(),
        };
        Self { root, parent }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    pub uri: String,
    pub title: String,
    pub description: String,
}

/// What a post hangs off: a link card or a thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostEmbed {
    External(ExternalLink),
    Reply(ReplyRef),
}

/// A post before it is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub text: String,
    pub embed: Option<PostEmbed>,
}

impl PostDraft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            embed: None,
        }
    }

    /// Link post for a ranked-list item: title as text plus a link card
    pub fn from_item(item: &ExternalItem) -> Self {
        Self {
            text: item.title.clone(),
            embed: Some(PostEmbed::External(ExternalLink {
                uri: item.link(),
                title: item.title.clone(),
                description: String::new(),
            })),
        }
    }

    pub fn reply(text: impl Into<String>, reply: ReplyRef) -> Self {
        Self {
            text: text.into(),
            embed: Some(PostEmbed::Reply(reply)),
        }
    }

    /// Wire record stamped with `created_at`
    pub fn into_record(self, created_at: String) -> FeedPostRecord {
        let (embed, reply) = match self.embed {
            Some(PostEmbed::External(external)) => (
                Some(EmbedExternal {
                    kind: EXTERNAL_EMBED_TYPE.to_string(),
                    external,
                }),
                None,
            ),
            Some(PostEmbed::Reply(reply)) => (None, Some(reply)),
            None => (None, None),
        };

        FeedPostRecord {
            kind: FEED_POST_COLLECTION.to_string(),
            text: self.text,
            created_at,
            embed,
            reply,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedExternal {
    #[serde(rename = "$type")]
    pub kind: String,
    pub external: ExternalLink,
}

/// `app.bsky.feed.post` as it travels over XRPC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPostRecord {
    #[serde(rename = "$type", default = "feed_post_type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_embed")]
    pub embed: Option<EmbedExternal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
}

fn feed_post_type() -> String {
    FEED_POST_COLLECTION.to_string()
}

/// Posts fetched for replying may carry image or quote embeds; those are
/// irrelevant here and must not fail decoding.
fn lenient_embed<'de, D>(deserializer: D) -> std::result::Result<Option<EmbedExternal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// A post read back from a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPost {
    pub reference: StrongRef,
    pub record: FeedPostRecord,
}

/// Timestamp format the AppView expects: millisecond precision, UTC, `Z`
pub fn format_created_at(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// `repo/collection/rkey` locator for a record, usually taken from an AT-URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPath {
    pub repo: String,
    pub collection: String,
    pub rkey: String,
}

impl FromStr for RecordPath {
    type Err = SkyrelayError;

    /// Uses the last three slash-separated segments, so both
    /// `at://did:plc:abc/app.bsky.feed.post/3k2j` and a bare
    /// `did:plc:abc/app.bsky.feed.post/3k2j` parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim_end_matches('/').split('/').collect();
        if parts.len() < 3 {
            return Err(SkyrelayError::InvalidInput(format!(
                "Post reference '{}' must look like at://<repo>/<collection>/<rkey>",
                s
            )));
        }

        let n = parts.len();
        let (repo, collection, rkey) = (parts[n - 3], parts[n - 2], parts[n - 1]);
        if repo.is_empty() || collection.is_empty() || rkey.is_empty() {
            return Err(SkyrelayError::InvalidInput(format!(
                "Post reference '{}' has an empty path segment",
                s
            )));
        }

        Ok(Self {
            repo: repo.to_string(),
            collection: collection.to_string(),
            rkey: rkey.to_string(),
        })
    }
}

impl fmt::Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at://{}/{}/{}", self.repo, self.collection, self.rkey)
    }
}
