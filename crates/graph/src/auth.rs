//! OAuth credential handling and single-flight token refresh.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::{debug, warn};

use crate::types::TokenResponse;

/// Default Microsoft identity token endpoint.
pub const DEFAULT_TOKEN_URL: &str =
    "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// A credential that fails construction-time validation.
#[derive(Debug, thiserror::Error)]
#[error("invalid credential: {0}")]
pub struct CredentialError(String);

/// OAuth credential for one drive account.
#[derive(Debug, Clone)]
pub struct Credential {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Builds a credential, rejecting missing fields and unparseable expiry
    /// up front rather than at first use.
    ///
    /// `expires_at` is RFC 3339, matching how token stores serialize it.
    pub fn new(
        client_id: &str,
        client_secret: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: &str,
    ) -> Result<Self, CredentialError> {
        if client_id.is_empty() {
            return Err(CredentialError("missing client_id".into()));
        }
        if client_secret.is_empty() {
            return Err(CredentialError("missing client_secret".into()));
        }
        if refresh_token.is_empty() {
            return Err(CredentialError("missing refresh_token".into()));
        }
        let expires_at = DateTime::parse_from_rfc3339(expires_at)
            .map_err(|e| CredentialError(format!("bad token expiry {expires_at:?}: {e}")))?
            .with_timezone(&Utc);

        Ok(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at,
        })
    }

    /// True when the access token needs a refresh before use.
    pub fn is_expired(&self) -> bool {
        self.access_token.is_empty() || Utc::now() >= self.expires_at
    }
}

/// Failure talking to the token endpoint.
///
/// `Clone`, so every caller joined on one in-flight refresh receives the
/// same failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("token refresh failed: {message}")]
pub struct TokenRefreshError {
    /// HTTP status when the endpoint answered; `None` for transport errors.
    pub status: Option<u16>,
    pub message: String,
}

impl TokenRefreshError {
    fn transport(err: reqwest::Error) -> Self {
        Self {
            status: None,
            message: err.to_string(),
        }
    }

    fn endpoint(status: u16, body: String) -> Self {
        Self {
            status: Some(status),
            message: format!("status {status}: {body}"),
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<(), TokenRefreshError>>>;

struct GuardInner {
    http: reqwest::Client,
    token_url: String,
    credential: RwLock<Credential>,
    inflight: tokio::sync::Mutex<Option<SharedRefresh>>,
}

/// Serializes token refreshes for one credential.
///
/// Callers race [`ensure_valid`](Self::ensure_valid) freely: the first one
/// past an expired check starts a refresh, everyone else awaits that same
/// in-flight attempt, and its result fans out to all of them.
#[derive(Clone)]
pub struct TokenGuard {
    inner: Arc<GuardInner>,
}

impl TokenGuard {
    pub fn new(http: reqwest::Client, token_url: &str, credential: Credential) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                http,
                token_url: token_url.to_string(),
                credential: RwLock::new(credential),
                inflight: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Refreshes the access token if it is expired; returns once the
    /// credential is usable.
    pub async fn ensure_valid(&self) -> Result<(), TokenRefreshError> {
        if !self.is_expired() {
            return Ok(());
        }

        let refresh = {
            let mut slot = self.inner.inflight.lock().await;
            // A refresh that completed while we waited on the slot lock
            // already fixed the credential.
            if !self.is_expired() {
                return Ok(());
            }
            match &*slot {
                Some(inflight) => inflight.clone(),
                None => {
                    let task = run_refresh(Arc::clone(&self.inner)).boxed().shared();
                    *slot = Some(task.clone());
                    task
                }
            }
        };

        refresh.await
    }

    /// True when the stored access token is unusable.
    pub fn is_expired(&self) -> bool {
        self.inner.credential.read().unwrap().is_expired()
    }

    /// Current access token.
    pub fn access_token(&self) -> String {
        self.inner.credential.read().unwrap().access_token.clone()
    }

    /// Snapshot of the stored credential.
    pub fn credential(&self) -> Credential {
        self.inner.credential.read().unwrap().clone()
    }
}

/// One refresh attempt; clears the in-flight slot when done so a later
/// expiry starts fresh.
async fn run_refresh(inner: Arc<GuardInner>) -> Result<(), TokenRefreshError> {
    let result = refresh_credential(&inner).await;
    *inner.inflight.lock().await = None;
    if let Err(e) = &result {
        warn!(error = %e, "token refresh failed");
    }
    result
}

async fn refresh_credential(inner: &GuardInner) -> Result<(), TokenRefreshError> {
    let (client_id, client_secret, refresh_token) = {
        let cred = inner.credential.read().unwrap();
        (
            cred.client_id.clone(),
            cred.client_secret.clone(),
            cred.refresh_token.clone(),
        )
    };

    let params = [
        ("client_id", client_id.as_str()),
        ("client_secret", client_secret.as_str()),
        ("refresh_token", refresh_token.as_str()),
        ("grant_type", "refresh_token"),
    ];
    let resp = inner
        .http
        .post(&inner.token_url)
        .form(&params)
        .send()
        .await
        .map_err(TokenRefreshError::transport)?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(TokenRefreshError::endpoint(status.as_u16(), body));
    }

    let token: TokenResponse = resp.json().await.map_err(TokenRefreshError::transport)?;
    let expires_at = Utc::now() + chrono::Duration::seconds(token.expires_in);

    // The credential only changes on success; a failed refresh leaves the
    // previous values in place.
    let mut cred = inner.credential.write().unwrap();
    cred.access_token = token.access_token;
    if let Some(rotated) = token.refresh_token {
        cred.refresh_token = rotated;
    }
    cred.expires_at = expires_at;
    debug!(expires_at = %cred.expires_at, "access token refreshed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn valid_credential() -> Credential {
        Credential::new(
            "client-1",
            "secret-1",
            "token-1",
            "refresh-1",
            "2099-01-01T00:00:00Z",
        )
        .unwrap()
    }

    fn expired_credential() -> Credential {
        Credential::new(
            "client-1",
            "secret-1",
            "stale-token",
            "refresh-1",
            "2020-01-01T00:00:00Z",
        )
        .unwrap()
    }

    /// Mock token endpoint serving `responses` in order, one per
    /// connection, after `delay`. Records hit count and request payloads.
    async fn mock_token_server(
        responses: Vec<(u16, String)>,
        delay: Duration,
    ) -> (
        String,
        Arc<AtomicUsize>,
        Arc<Mutex<Vec<String>>>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}/token");
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let hit_counter = Arc::clone(&hits);
        let request_log = Arc::clone(&requests);

        let handle = tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                hit_counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = vec![0u8; 8192];
                let n = stream.read(&mut buf).await.unwrap_or(0);
                request_log
                    .lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&buf[..n]).into_owned());
                tokio::time::sleep(delay).await;

                let resp = format!(
                    "HTTP/1.1 {status} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (url, hits, requests, handle)
    }

    #[test]
    fn credential_rejects_missing_fields() {
        assert!(Credential::new("", "s", "t", "r", "2099-01-01T00:00:00Z").is_err());
        assert!(Credential::new("c", "", "t", "r", "2099-01-01T00:00:00Z").is_err());
        assert!(Credential::new("c", "s", "t", "", "2099-01-01T00:00:00Z").is_err());
    }

    #[test]
    fn credential_rejects_bad_expiry() {
        let err = Credential::new("c", "s", "t", "r", "next tuesday").unwrap_err();
        assert!(err.to_string().contains("bad token expiry"));
        assert!(Credential::new("c", "s", "t", "r", "").is_err());
    }

    #[test]
    fn credential_expiry_checks() {
        assert!(!valid_credential().is_expired());
        assert!(expired_credential().is_expired());

        // An empty access token counts as expired even with future expiry.
        let cred = Credential::new("c", "s", "", "r", "2099-01-01T00:00:00Z").unwrap();
        assert!(cred.is_expired());
    }

    #[tokio::test]
    async fn valid_token_skips_the_endpoint() {
        // Unroutable endpoint: any request would error out.
        let guard = TokenGuard::new(reqwest::Client::new(), "http://127.0.0.1:1/token", valid_credential());

        guard.ensure_valid().await.unwrap();
        assert_eq!(guard.access_token(), "token-1");
    }

    #[tokio::test]
    async fn refresh_updates_credential_and_posts_form() {
        let body = r#"{"access_token":"fresh","refresh_token":"refresh-2","expires_in":3600}"#;
        let (url, hits, requests, handle) =
            mock_token_server(vec![(200, body.into())], Duration::ZERO).await;

        let guard = TokenGuard::new(reqwest::Client::new(), &url, expired_credential());
        guard.ensure_valid().await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let cred = guard.credential();
        assert_eq!(cred.access_token, "fresh");
        assert_eq!(cred.refresh_token, "refresh-2");
        assert!(!cred.is_expired());

        let request = requests.lock().unwrap()[0].clone();
        assert!(request.contains("grant_type=refresh_token"));
        assert!(request.contains("client_id=client-1"));
        assert!(request.contains("refresh_token=refresh-1"));

        handle.abort();
    }

    #[tokio::test]
    async fn refresh_keeps_old_refresh_token_when_omitted() {
        let body = r#"{"access_token":"fresh","expires_in":3600}"#;
        let (url, _hits, _requests, handle) =
            mock_token_server(vec![(200, body.into())], Duration::ZERO).await;

        let guard = TokenGuard::new(reqwest::Client::new(), &url, expired_credential());
        guard.ensure_valid().await.unwrap();

        let cred = guard.credential();
        assert_eq!(cred.access_token, "fresh");
        assert_eq!(cred.refresh_token, "refresh-1");

        handle.abort();
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let body = r#"{"access_token":"fresh","refresh_token":"refresh-2","expires_in":3600}"#;
        let (url, hits, _requests, handle) =
            mock_token_server(vec![(200, body.into())], Duration::from_millis(100)).await;

        let guard = TokenGuard::new(reqwest::Client::new(), &url, expired_credential());
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                tokio::spawn(async move { guard.ensure_valid().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(guard.access_token(), "fresh");

        handle.abort();
    }

    #[tokio::test]
    async fn failed_refresh_leaves_credential_untouched() {
        let body = r#"{"error":"invalid_grant"}"#;
        let (url, hits, _requests, handle) =
            mock_token_server(vec![(400, body.into())], Duration::from_millis(50)).await;

        let guard = TokenGuard::new(reqwest::Client::new(), &url, expired_credential());

        // Both concurrent callers get the same failure from one attempt.
        let first = {
            let guard = guard.clone();
            tokio::spawn(async move { guard.ensure_valid().await })
        };
        let second = {
            let guard = guard.clone();
            tokio::spawn(async move { guard.ensure_valid().await })
        };
        let err1 = first.await.unwrap().unwrap_err();
        let err2 = second.await.unwrap().unwrap_err();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(err1.status, Some(400));
        assert_eq!(err2.status, Some(400));
        assert!(err1.to_string().contains("invalid_grant"));

        let cred = guard.credential();
        assert_eq!(cred.access_token, "stale-token");
        assert_eq!(cred.refresh_token, "refresh-1");
        assert!(cred.is_expired());

        handle.abort();
    }

    #[tokio::test]
    async fn next_call_after_failure_tries_again() {
        let good = r#"{"access_token":"fresh","expires_in":3600}"#;
        let (url, hits, _requests, handle) = mock_token_server(
            vec![(500, "boom".into()), (200, good.into())],
            Duration::ZERO,
        )
        .await;

        let guard = TokenGuard::new(reqwest::Client::new(), &url, expired_credential());
        guard.ensure_valid().await.unwrap_err();
        guard.ensure_valid().await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(guard.access_token(), "fresh");

        handle.abort();
    }
}
