//! Bluesky platform implementation over raw XRPC

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AuthError, PublishError, Result};
use crate::platforms::Publisher;
use crate::session::{AuthSession, SessionData};
use crate::types::{
    format_created_at, FeedPostRecord, FetchedPost, PostDraft, RecordPath, StrongRef,
    FEED_POST_COLLECTION,
};

/// Bluesky counts graphemes; characters are a close, conservative proxy
const CHARACTER_LIMIT: usize = 300;

/// Error body returned by XRPC endpoints
#[derive(Debug, Default, Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl XrpcErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// "Code: message", or the raw body when it is not an XRPC error
    fn describe(&self, raw: &str) -> String {
        match (&self.error, &self.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (Some(code), None) => code.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) if raw.is_empty() => "empty response body".to_string(),
            (None, None) => raw.to_string(),
        }
    }
}

/// Map an XRPC failure to a PublishError
///
/// Uses the HTTP status first and the AT Protocol error code second, keeping
/// the code in the message so it shows up in logs.
fn map_xrpc_error(status: u16, body: &str, context: &str) -> PublishError {
    let parsed = XrpcErrorBody::parse(body);
    let detail = parsed.describe(body);
    let code = parsed.error.as_deref().unwrap_or("");

    if status == 401
        || status == 403
        || matches!(code, "AuthenticationRequired" | "InvalidToken" | "ExpiredToken")
    {
        return PublishError::Authentication(format!(
            "Bluesky authentication failed during {}: {}",
            context, detail
        ));
    }

    if status == 429 || code == "RateLimitExceeded" {
        return PublishError::RateLimit(format!(
            "Bluesky rate limit exceeded during {}: {}",
            context, detail
        ));
    }

    if status == 400 || matches!(code, "InvalidRequest" | "InvalidRecord") {
        return PublishError::Validation(format!(
            "Bluesky rejected the request during {}: {}",
            context, detail
        ));
    }

    PublishError::Rejected {
        status,
        message: format!("{}: {}", context, detail),
    }
}

fn map_transport_error(error: reqwest::Error, context: &str) -> PublishError {
    PublishError::Network(format!(
        "Could not reach Bluesky PDS during {}: {}",
        context, error
    ))
}

#[derive(Debug, Deserialize)]
struct GetRecordResponse {
    uri: String,
    cid: Option<String>,
    value: FeedPostRecord,
}

pub struct BlueskyClient {
    client: Client,
    pds: String,
    session: AuthSession,
    auth_file: PathBuf,
}

impl BlueskyClient {
    /// Create a client for an existing session
    ///
    /// # Arguments
    ///
    /// * `pds` - Base URL of the account's PDS (e.g., "https://bsky.social")
    /// * `session` - Current session; replaced on every refresh
    /// * `auth_file` - Where refreshed sessions are written
    /// * `timeout` - Per-request timeout
    pub fn new(
        pds: impl Into<String>,
        session: AuthSession,
        auth_file: PathBuf,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("skyrelay/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            pds: pds.into().trim_end_matches('/').to_string(),
            session,
            auth_file,
        })
    }

    /// Create a client from the session stored in `auth_file`
    pub fn from_auth_file(pds: impl Into<String>, auth_file: PathBuf, timeout: Duration) -> Result<Self> {
        let session = AuthSession::load(&auth_file)?;
        Self::new(pds, session, auth_file, timeout)
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    fn xrpc_url(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.pds, method)
    }

    async fn check(response: Response, context: &str) -> std::result::Result<Response, PublishError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_xrpc_error(status.as_u16(), &body, context))
    }
}

#[async_trait]
impl Publisher for BlueskyClient {
    async fn refresh_auth(&mut self) -> Result<()> {
        tracing::debug!("Refreshing Bluesky session for {}", self.session.handle);

        let response = self
            .client
            .post(self.xrpc_url("com.atproto.server.refreshSession"))
            .bearer_auth(self.session.refresh_token())
            .send()
            .await
            .map_err(|e| AuthError::Refresh(format!("Could not reach Bluesky PDS: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Refresh(format!("Failed to read refresh response: {}", e)))?;

        if !status.is_success() {
            let detail = XrpcErrorBody::parse(&body).describe(&body);
            return Err(AuthError::Refresh(format!("{} ({})", detail, status.as_u16())).into());
        }

        let data: SessionData = serde_json::from_str(&body)
            .map_err(|e| AuthError::Refresh(format!("Malformed refresh response: {}", e)))?;
        let session = AuthSession::from(data);

        // Persist first so a crash never leaves only the in-memory copy valid
        session.save(&self.auth_file)?;
        self.session = session;

        tracing::debug!("Bluesky session refreshed for {}", self.session.did);
        Ok(())
    }

    async fn publish(&self, draft: &PostDraft) -> Result<StrongRef> {
        self.validate_content(draft)?;

        let record = draft.clone().into_record(format_created_at(chrono::Utc::now()));
        let body = serde_json::json!({
            "repo": self.session.did,
            "collection": FEED_POST_COLLECTION,
            "validate": true,
            "record": record,
        });

        tracing::debug!("Posting to Bluesky: {} characters", draft.text.chars().count());

        let response = self
            .client
            .post(self.xrpc_url("com.atproto.repo.createRecord"))
            .bearer_auth(self.session.access_token())
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, "posting"))?;

        let created: StrongRef = Self::check(response, "posting")
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Decode(format!("createRecord response: {}", e)))?;

        tracing::debug!("Posted to Bluesky: {}", created.uri);
        Ok(created)
    }

    async fn get_post(&self, path: &RecordPath) -> Result<FetchedPost> {
        let response = self
            .client
            .get(self.xrpc_url("com.atproto.repo.getRecord"))
            .bearer_auth(self.session.access_token())
            .query(&[
                ("repo", path.repo.as_str()),
                ("collection", path.collection.as_str()),
                ("rkey", path.rkey.as_str()),
            ])
            .send()
            .await
            .map_err(|e| map_transport_error(e, "fetching post"))?;

        let fetched: GetRecordResponse = Self::check(response, "fetching post")
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Decode(format!("getRecord response: {}", e)))?;

        let cid = fetched.cid.ok_or_else(|| {
            PublishError::Decode(format!("getRecord response for {} has no cid", fetched.uri))
        })?;

        Ok(FetchedPost {
            reference: StrongRef {
                uri: fetched.uri,
                cid,
            },
            record: fetched.value,
        })
    }

    fn name(&self) -> &str {
        "bluesky"
    }

    fn character_limit(&self) -> Option<usize> {
        Some(CHARACTER_LIMIT)
    }
}
