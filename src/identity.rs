//! Resolving the signed-in user.
//!
//! The questionnaire only needs to know *who* is submitting. Hosted auth is
//! provided by Supabase; `StaticIdentity` stands in for it in local runs and
//! tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The user behind `access_token`, or `None` when nobody is signed in.
    async fn current_user(&self, access_token: Option<&str>)
    -> Result<Option<AuthUser>, IdentityError>;
}

/// Always answers with the same user (or nobody).
pub struct StaticIdentity {
    user: Option<AuthUser>,
}

impl StaticIdentity {
    pub fn signed_in(id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            user: Some(AuthUser {
                id: id.into(),
                email,
            }),
        }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(
        &self,
        _access_token: Option<&str>,
    ) -> Result<Option<AuthUser>, IdentityError> {
        Ok(self.user.clone())
    }
}

/// Supabase GoTrue user lookup.
pub struct SupabaseIdentity {
    client: reqwest::Client,
    base_url: String,
    anon_key: SecretString,
    timeout: Duration,
}

impl SupabaseIdentity {
    pub fn new(base_url: impl Into<String>, anon_key: SecretString, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key,
            timeout,
        }
    }

    fn user_url(&self) -> String {
        format!("{}/auth/v1/user", self.base_url)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    async fn current_user(
        &self,
        access_token: Option<&str>,
    ) -> Result<Option<AuthUser>, IdentityError> {
        let Some(token) = access_token.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        let resp = self
            .client
            .get(self.user_url())
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    IdentityError::RequestFailed(format!("no answer within {:?}", self.timeout))
                } else {
                    IdentityError::RequestFailed(e.to_string())
                }
            })?;

        match resp.status() {
            s if s.is_success() => {
                let user: AuthUser = resp
                    .json()
                    .await
                    .map_err(|e| IdentityError::InvalidResponse(e.to_string()))?;
                Ok(Some(user))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::debug!("Access token rejected by identity provider");
                Ok(None)
            }
            s => Err(IdentityError::RequestFailed(format!("HTTP {s}"))),
        }
    }
}

/// Pull the token out of an `Authorization: Bearer ...` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim()).filter(|t| !t.is_empty())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_identity() {
        let signed_in = StaticIdentity::signed_in("user-1", None);
        let user = signed_in.current_user(None).await.unwrap().unwrap();
        assert_eq!(user.id, "user-1");

        let anonymous = StaticIdentity::anonymous();
        assert!(anonymous.current_user(Some("token")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn supabase_without_token_is_anonymous() {
        let identity = SupabaseIdentity::new(
            "http://127.0.0.1:1/",
            SecretString::from("anon"),
            Duration::from_secs(5),
        );
        assert_eq!(identity.user_url(), "http://127.0.0.1:1/auth/v1/user");
        assert!(identity.current_user(None).await.unwrap().is_none());
        assert!(identity.current_user(Some("")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn supabase_lookup_gives_up_on_silent_server() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let identity = SupabaseIdentity::new(
            format!("http://{addr}"),
            SecretString::from("anon"),
            Duration::from_millis(100),
        );
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            identity.current_user(Some("token")),
        )
        .await
        .expect("lookup should time out on its own");
        assert!(matches!(result, Err(IdentityError::RequestFailed(_))));
    }

    #[test]
    fn parses_bearer_header() {
        assert_eq!(bearer_token(Some("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(Some("bearer  xyz ")), Some("xyz"));
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(Some("Bearer")), None);
        assert_eq!(bearer_token(None), None);
    }

    #[test]
    fn user_payload_ignores_extra_fields() {
        let user: AuthUser = serde_json::from_str(
            r#"{"id": "abc", "email": "a@example.com", "aud": "authenticated", "role": "authenticated"}"#,
        )
        .unwrap();
        assert_eq!(user.email.as_deref(), Some("a@example.com"));
    }
}
