//! Credential providers.
//!
//! Each variant declares the capabilities it supports. Only OAuth2 carries
//! mutable state (see [`oauth2`]); the others produce fixed headers.

pub mod oauth2;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{ClientError, ClientResult};

pub use oauth2::{
    HttpTokenRefresher, OAuth2Config, OAuth2Credentials, TokenPersistence, TokenRefresher,
    TokenResponse, TokenSet,
};

/// Default header carrying an API key.
pub const DEFAULT_API_KEY_HEADER: &str = "x-api-key";

pub(crate) fn clone_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}

/// Optional operations a credential variant supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `is_valid` reports a real answer
    pub validity_check: bool,
    /// `refresh` can obtain new credentials
    pub refresh: bool,
}

/// Static bearer token.
#[derive(Debug)]
pub struct BearerToken {
    token: SecretString,
}

impl Clone for BearerToken {
    fn clone(&self) -> Self {
        Self {
            token: clone_secret(&self.token),
        }
    }
}

/// API key sent in a dedicated header.
#[derive(Debug)]
pub struct ApiKey {
    header: String,
    key: SecretString,
}

impl Clone for ApiKey {
    fn clone(&self) -> Self {
        Self {
            header: self.header.clone(),
            key: clone_secret(&self.key),
        }
    }
}

/// HTTP Basic credentials.
#[derive(Debug)]
pub struct BasicAuth {
    username: String,
    password: SecretString,
}

impl Clone for BasicAuth {
    fn clone(&self) -> Self {
        Self {
            username: self.username.clone(),
            password: clone_secret(&self.password),
        }
    }
}

/// Supplies request auth headers.
#[derive(Debug, Clone)]
pub enum CredentialProvider {
    /// `Authorization: Bearer <token>`
    Bearer(BearerToken),
    /// `<header>: <key>`
    ApiKey(ApiKey),
    /// `Authorization: Basic <base64(user:password)>`
    Basic(BasicAuth),
    /// Refreshing OAuth2 access token
    OAuth2(OAuth2Credentials),
}

impl CredentialProvider {
    /// Static bearer token.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(BearerToken {
            token: SecretString::from(token.into()),
        })
    }

    /// API key in the default `x-api-key` header.
    #[must_use]
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::api_key_in(DEFAULT_API_KEY_HEADER, key)
    }

    /// API key in a custom header.
    #[must_use]
    pub fn api_key_in(header: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ApiKey(ApiKey {
            header: header.into(),
            key: SecretString::from(key.into()),
        })
    }

    /// HTTP Basic credentials.
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic(BasicAuth {
            username: username.into(),
            password: SecretString::from(password.into()),
        })
    }

    /// Which optional operations this variant supports.
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        match self {
            Self::OAuth2(_) => Capabilities {
                validity_check: true,
                refresh: true,
            },
            Self::Bearer(_) | Self::ApiKey(_) | Self::Basic(_) => Capabilities {
                validity_check: false,
                refresh: false,
            },
        }
    }

    /// Headers to attach to a request. OAuth2 may refresh first.
    ///
    /// # Errors
    ///
    /// Returns a token refresh error if OAuth2 needed a refresh and it failed.
    pub async fn auth_headers(&self) -> ClientResult<Vec<(String, String)>> {
        match self {
            Self::Bearer(bearer) => Ok(vec![(
                "authorization".to_string(),
                format!("Bearer {}", bearer.token.expose_secret()),
            )]),
            Self::ApiKey(api_key) => Ok(vec![(
                api_key.header.clone(),
                api_key.key.expose_secret().to_owned(),
            )]),
            Self::Basic(basic) => {
                let encoded = STANDARD.encode(format!(
                    "{}:{}",
                    basic.username,
                    basic.password.expose_secret()
                ));
                Ok(vec![("authorization".to_string(), format!("Basic {encoded}"))])
            }
            Self::OAuth2(oauth) => oauth.auth_headers().await,
        }
    }

    /// Whether the current credentials are usable, if this variant can tell.
    #[must_use]
    pub fn is_valid(&self) -> Option<bool> {
        match self {
            Self::OAuth2(oauth) => Some(oauth.is_valid()),
            Self::Bearer(_) | Self::ApiKey(_) | Self::Basic(_) => None,
        }
    }

    /// Obtain new credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::TokenRefreshConfig`] for variants that cannot
    /// refresh, or the refresh failure for OAuth2.
    pub async fn refresh(&self) -> ClientResult<()> {
        match self {
            Self::OAuth2(oauth) => oauth.refresh().await.map(|_| ()),
            Self::Bearer(_) | Self::ApiKey(_) | Self::Basic(_) => Err(ClientError::token_refresh_config(
                "credential provider does not support refresh",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    #[tokio::test]
    async fn test_bearer_headers() {
        let provider = CredentialProvider::bearer("abc");
        let headers = provider.auth_headers().await.unwrap();
        assert_eq!(headers, vec![("authorization".to_string(), "Bearer abc".to_string())]);
    }

    #[tokio::test]
    async fn test_api_key_headers() {
        let headers = CredentialProvider::api_key("k1").auth_headers().await.unwrap();
        assert_eq!(headers, vec![("x-api-key".to_string(), "k1".to_string())]);

        let headers = CredentialProvider::api_key_in("x-token", "k2")
            .auth_headers()
            .await
            .unwrap();
        assert_eq!(headers[0].0, "x-token");
    }

    #[tokio::test]
    async fn test_basic_headers() {
        let headers = CredentialProvider::basic("aladdin", "opensesame")
            .auth_headers()
            .await
            .unwrap();
        assert_eq!(headers[0].1, "Basic YWxhZGRpbjpvcGVuc2VzYW1l");
    }

    #[tokio::test]
    async fn test_static_variants_cannot_refresh() {
        let provider = CredentialProvider::bearer("abc");
        assert_eq!(
            provider.capabilities(),
            Capabilities {
                validity_check: false,
                refresh: false
            }
        );
        assert_eq!(provider.is_valid(), None);

        let err = provider.refresh().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::TokenRefreshConfig);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", CredentialProvider::basic("user", "hunter2"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("user"));
    }
}
