//! OAuth2 access token with single-flight refresh.
//!
//! Headers are issued from the current access token, refreshing first when
//! the token is missing or inside the expiry buffer. Concurrent callers that
//! need a refresh share one in-flight operation; the slot is cleared when
//! that operation settles, whether it succeeded or failed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use super::clone_secret;
use crate::error::{ClientError, ClientResult};
use crate::transport::TransportConfig;

/// Default window before expiry in which a token is refreshed proactively.
pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Token endpoint settings.
pub struct OAuth2Config {
    /// Token endpoint URL
    pub token_url: String,
    /// Client identifier
    pub client_id: String,
    /// Client secret for confidential clients
    pub client_secret: Option<SecretString>,
    /// Requested scope
    pub scope: Option<String>,
    /// Refresh this long before expiry (default: 5 minutes)
    pub expiry_buffer: Duration,
}

impl OAuth2Config {
    /// Create a config for a public client.
    #[must_use]
    pub fn new(token_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: None,
            scope: None,
            expiry_buffer: DEFAULT_EXPIRY_BUFFER,
        }
    }

    /// Set the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::from(secret.into()));
        self
    }

    /// Set the requested scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Set the expiry buffer.
    #[must_use]
    pub const fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.expiry_buffer = buffer;
        self
    }
}

impl Clone for OAuth2Config {
    fn clone(&self) -> Self {
        Self {
            token_url: self.token_url.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.as_ref().map(clone_secret),
            scope: self.scope.clone(),
            expiry_buffer: self.expiry_buffer,
        }
    }
}

impl fmt::Debug for OAuth2Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Config")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("scope", &self.scope)
            .field("expiry_buffer", &self.expiry_buffer)
            .finish()
    }
}

/// Current token state.
#[derive(Debug, Default)]
pub struct TokenSet {
    /// Access token sent as the bearer credential
    pub access_token: Option<SecretString>,
    /// Refresh token used to obtain a new access token
    pub refresh_token: Option<SecretString>,
    /// When the access token stops being accepted
    pub expires_at: Option<DateTime<Utc>>,
}

impl Clone for TokenSet {
    fn clone(&self) -> Self {
        Self {
            access_token: self.access_token.as_ref().map(clone_secret),
            refresh_token: self.refresh_token.as_ref().map(clone_secret),
            expires_at: self.expires_at,
        }
    }
}

impl TokenSet {
    /// Token set with an access token and optional refresh token.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: Some(SecretString::from(access_token.into())),
            refresh_token: refresh_token.map(SecretString::from),
            expires_at: None,
        }
    }

    /// Set the expiry.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// The access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_ref().map(ExposeSecret::expose_secret)
    }

    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.access_token.is_some() && self.expires_at.is_none_or(|at| now < at)
    }

    fn should_refresh_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        if self.access_token.is_none() {
            return true;
        }
        let buffer = TimeDelta::from_std(buffer).unwrap_or(TimeDelta::MAX);
        self.expires_at
            .is_some_and(|at| now.checked_add_signed(buffer).is_none_or(|edge| edge >= at))
    }

    fn apply(&mut self, response: TokenResponse, now: DateTime<Utc>) {
        self.access_token = Some(SecretString::from(response.access_token));
        if let Some(refresh_token) = response.refresh_token {
            self.refresh_token = Some(SecretString::from(refresh_token));
        }
        self.expires_at = response.expires_in.and_then(|secs| {
            let secs = i64::try_from(secs).ok()?;
            now.checked_add_signed(TimeDelta::try_seconds(secs)?)
        });
    }
}

/// Token endpoint response (RFC 6749 section 5.1).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    /// New access token
    pub access_token: String,
    /// Rotated refresh token, if the server issued one
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Token type, normally `Bearer`
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Exchanges a refresh token for new tokens.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Perform the refresh grant.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::TokenRefresh`] when the endpoint fails.
    async fn refresh(&self, refresh_token: &str) -> ClientResult<TokenResponse>;
}

/// Refresh grant over HTTP form post.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    config: OAuth2Config,
    client: Client,
}

impl HttpTokenRefresher {
    /// Create a refresher with a dedicated pooled client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: OAuth2Config) -> ClientResult<Self> {
        let transport = TransportConfig::default();
        let client = Client::builder()
            .connect_timeout(transport.connect_timeout)
            .timeout(crate::config::DEFAULT_TIMEOUT)
            .use_rustls_tls()
            .build()
            .map_err(|e| ClientError::TokenRefresh {
                message: format!("failed to create HTTP client: {e}"),
                status: None,
                source: Some(Arc::new(e)),
            })?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> ClientResult<TokenResponse> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.expose_secret()));
        }
        if let Some(scope) = &self.config.scope {
            form.push(("scope", scope.as_str()));
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ClientError::TokenRefresh {
                message: format!("token endpoint unreachable: {e}"),
                status: None,
                source: Some(Arc::new(e)),
            })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| ClientError::TokenRefresh {
            message: format!("failed to read token response: {e}"),
            status: Some(status.as_u16()),
            source: Some(Arc::new(e)),
        })?;

        if !status.is_success() {
            return Err(ClientError::token_refresh(
                format!(
                    "token endpoint returned {status}: {}",
                    String::from_utf8_lossy(&body)
                ),
                Some(status.as_u16()),
            ));
        }

        serde_json::from_slice(&body).map_err(|e| ClientError::TokenRefresh {
            message: format!("invalid token response: {e}"),
            status: Some(status.as_u16()),
            source: Some(Arc::new(e)),
        })
    }
}

/// Callback invoked with the new tokens after every successful refresh.
pub type TokenPersistence = Arc<dyn Fn(TokenSet) -> BoxFuture<'static, ClientResult<()>> + Send + Sync>;

type RefreshFuture = Shared<BoxFuture<'static, ClientResult<TokenSet>>>;

/// Clears the in-flight slot when the refresh settles.
struct ClearSlot(Arc<Mutex<Option<RefreshFuture>>>);

impl Drop for ClearSlot {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

/// OAuth2 credentials. Clones share token state and the in-flight slot.
#[derive(Clone)]
pub struct OAuth2Credentials {
    config: Arc<OAuth2Config>,
    tokens: Arc<RwLock<TokenSet>>,
    inflight: Arc<Mutex<Option<RefreshFuture>>>,
    refresher: Arc<dyn TokenRefresher>,
    persistence: Option<TokenPersistence>,
}

impl fmt::Debug for OAuth2Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let refreshing = self.is_refreshing();
        let expires_at = self.tokens.read().expires_at;
        f.debug_struct("OAuth2Credentials")
            .field("config", &self.config)
            .field("expires_at", &expires_at)
            .field("refresh_in_flight", &refreshing)
            .finish_non_exhaustive()
    }
}

impl OAuth2Credentials {
    /// Credentials refreshed against `config.token_url` over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh HTTP client cannot be built.
    pub fn new(config: OAuth2Config, tokens: TokenSet) -> ClientResult<Self> {
        let refresher = HttpTokenRefresher::new(config.clone())?;
        Ok(Self::with_refresher(config, tokens, Arc::new(refresher)))
    }

    /// Credentials using a custom refresher.
    #[must_use]
    pub fn with_refresher(config: OAuth2Config, tokens: TokenSet, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            config: Arc::new(config),
            tokens: Arc::new(RwLock::new(tokens)),
            inflight: Arc::new(Mutex::new(None)),
            refresher,
            persistence: None,
        }
    }

    /// Persist new tokens after each refresh. Callback failures propagate.
    #[must_use]
    pub fn with_persistence(mut self, persistence: TokenPersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Snapshot of the current tokens.
    #[must_use]
    pub fn tokens(&self) -> TokenSet {
        self.tokens.read().clone()
    }

    /// An access token exists and has not expired.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.tokens.read().is_valid_at(Utc::now())
    }

    /// No access token, or the expiry buffer has been entered.
    #[must_use]
    pub fn should_refresh(&self) -> bool {
        self.tokens
            .read()
            .should_refresh_at(Utc::now(), self.config.expiry_buffer)
    }

    /// Whether a refresh is currently in flight.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inflight.lock().is_some()
    }

    /// `Authorization: Bearer` header, refreshing first if needed.
    ///
    /// # Errors
    ///
    /// Returns the refresh failure shared by every waiting caller.
    pub async fn auth_headers(&self) -> ClientResult<Vec<(String, String)>> {
        let token = self.fresh_access_token().await?;
        Ok(vec![("authorization".to_string(), format!("Bearer {token}"))])
    }

    /// Refresh now, joining an in-flight refresh if there is one.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::TokenRefreshConfig`] without a refresh token,
    /// [`ClientError::TokenRefresh`] on endpoint failure, or the persistence
    /// callback's error.
    #[instrument(skip(self), fields(client_id = %self.config.client_id))]
    pub async fn refresh(&self) -> ClientResult<TokenSet> {
        let pending = {
            let mut slot = self.inflight.lock();
            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let pending = self.start_refresh();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    async fn fresh_access_token(&self) -> ClientResult<String> {
        let pending = {
            let mut slot = self.inflight.lock();
            if let Some(pending) = slot.as_ref() {
                pending.clone()
            } else {
                let tokens = self.tokens.read();
                if !tokens.should_refresh_at(Utc::now(), self.config.expiry_buffer) {
                    if let Some(token) = tokens.access_token() {
                        return Ok(token.to_owned());
                    }
                }
                drop(tokens);
                let pending = self.start_refresh();
                *slot = Some(pending.clone());
                pending
            }
        };

        let tokens = pending.await?;
        tokens
            .access_token()
            .map(str::to_owned)
            .ok_or(ClientError::TokenExpired)
    }

    fn start_refresh(&self) -> RefreshFuture {
        let tokens = Arc::clone(&self.tokens);
        let refresher = Arc::clone(&self.refresher);
        let persistence = self.persistence.clone();
        let clear = ClearSlot(Arc::clone(&self.inflight));

        let fut: BoxFuture<'static, ClientResult<TokenSet>> = Box::pin(async move {
            let _clear = clear;

            let refresh_token = {
                let guard = tokens.read();
                guard
                    .refresh_token
                    .as_ref()
                    .map(|t| t.expose_secret().to_owned())
            };
            let Some(refresh_token) = refresh_token else {
                warn!("Token refresh requested without a refresh token");
                return Err(ClientError::token_refresh_config("no refresh token available"));
            };

            let response = refresher.refresh(&refresh_token).await?;

            let updated = {
                let mut guard = tokens.write();
                guard.apply(response, Utc::now());
                guard.clone()
            };
            info!(expires_at = ?updated.expires_at, "Access token refreshed");

            if let Some(persist) = persistence {
                persist(updated.clone()).await?;
            }
            Ok(updated)
        });
        fut.shared()
    }
}
