// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! [User Account] Credentials type.
//!
//! These credentials are created by `gcloud auth application-default login`
//! and hold an OAuth 2.0 refresh token. They carry no email address, the
//! [identity resolver](crate::identity) asks the user-info endpoint for it.
//!
//! [User Account]: https://cloud.google.com/docs/authentication#user-accounts

use crate::Result;
use crate::credentials::Credentials;
use crate::errors::CredentialsError;
use crate::http::{check_status, client};
use crate::token::{Token, TokenProvider};
use crate::token_cache::TokenCache;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::time::Instant;

const OAUTH2_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// A builder for `authorized_user` [Credentials].
pub struct Builder {
    authorized_user: Value,
    scopes: Option<Vec<String>>,
    token_uri: Option<String>,
}

impl Builder {
    /// Creates a new builder using the `authorized_user` JSON value.
    pub fn new(authorized_user: Value) -> Self {
        Self {
            authorized_user,
            scopes: None,
            token_uri: None,
        }
    }

    /// Sets the URI for the token endpoint.
    ///
    /// Overrides any `token_uri` in the JSON, which in turn overrides
    /// `https://oauth2.googleapis.com/token`.
    pub fn with_token_uri<S: Into<String>>(mut self, token_uri: S) -> Self {
        self.token_uri = Some(token_uri.into());
        self
    }

    /// Sets the scopes requested when refreshing the access token.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(|s| s.into()).collect());
        self
    }

    /// Returns a [Credentials] instance with the configured settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is missing any of the required fields.
    pub fn build(self) -> Result<Credentials> {
        let authorized_user = serde_json::from_value::<AuthorizedUser>(self.authorized_user.clone())
            .map_err(CredentialsError::parsing)?;
        let endpoint = self
            .token_uri
            .or(authorized_user.token_uri)
            .unwrap_or(OAUTH2_ENDPOINT.to_string());
        let token_provider = UserTokenProvider {
            client: client()?,
            client_id: authorized_user.client_id,
            client_secret: authorized_user.client_secret,
            refresh_token: authorized_user.refresh_token,
            endpoint,
            scopes: self.scopes.map(|scopes| scopes.join(" ")),
        };
        Ok(Credentials::new(
            self.authorized_user,
            TokenCache::new(token_provider),
        ))
    }
}

/// The identity key of an `authorized_user` payload.
///
/// All `gcloud` logins share the same OAuth client id, the refresh token is
/// what tells two users apart. Only a digest of it is kept.
pub(crate) fn identity_key(authorized_user: &Value) -> Result<String> {
    let authorized_user = serde_json::from_value::<AuthorizedUser>(authorized_user.clone())
        .map_err(CredentialsError::parsing)?;
    let digest = Sha256::digest(authorized_user.refresh_token.as_bytes());
    Ok(format!(
        "{}/{}",
        authorized_user.client_id,
        hex::encode(&digest[..8])
    ))
}

struct UserTokenProvider {
    client: Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    endpoint: String,
    scopes: Option<String>,
}

impl std::fmt::Debug for UserTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserTokenProvider")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[censored]")
            .field("refresh_token", &"[censored]")
            .field("endpoint", &self.endpoint)
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[async_trait::async_trait]
impl TokenProvider for UserTokenProvider {
    async fn token(&self) -> Result<Token> {
        let req = Oauth2RefreshRequest {
            grant_type: RefreshGrantType::RefreshToken,
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            refresh_token: self.refresh_token.clone(),
            scopes: self.scopes.clone(),
        };
        let resp = self
            .client
            .post(self.endpoint.as_str())
            .json(&req)
            .send()
            .await
            .map_err(|e| CredentialsError::transport("cannot refresh user token", e))?;
        let resp = check_status(resp, StatusCode::OK, &self.endpoint).await?;
        let response = resp
            .json::<Oauth2RefreshResponse>()
            .await
            .map_err(|e| CredentialsError::upstream_decode("cannot parse token response", e))?;
        Ok(Token {
            token: response.access_token,
            token_type: response.token_type,
            expires_at: response
                .expires_in
                .and_then(|d| Instant::now().checked_add(Duration::from_secs(d))),
        })
    }
}

#[derive(Debug, PartialEq, serde::Deserialize)]
struct AuthorizedUser {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token_uri: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
enum RefreshGrantType {
    #[serde(rename = "refresh_token")]
    RefreshToken,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
struct Oauth2RefreshRequest {
    grant_type: RefreshGrantType,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scopes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
struct Oauth2RefreshResponse {
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
    token_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::matchers::{all_of, json_decoded, request};
    use httptest::responders::{json_encoded, status_code};
    use httptest::{Expectation, Server};

    type TestResult = anyhow::Result<()>;

    fn authorized_user_json(token_uri: String) -> Value {
        serde_json::json!({
            "client_id": "test-client-id",
            "client_secret": "test-client-secret",
            "refresh_token": "test-refresh-token",
            "type": "authorized_user",
            "token_uri": token_uri,
        })
    }

    fn check_request(request: &Oauth2RefreshRequest, scopes: Option<&str>) -> bool {
        request.client_id == "test-client-id"
            && request.client_secret == "test-client-secret"
            && request.refresh_token == "test-refresh-token"
            && request.grant_type == RefreshGrantType::RefreshToken
            && request.scopes.as_deref() == scopes
    }

    #[test]
    fn debug_token_provider() -> TestResult {
        let provider = UserTokenProvider {
            client: client()?,
            client_id: "test-client-id".to_string(),
            client_secret: "test-client-secret".to_string(),
            refresh_token: "test-refresh-token".to_string(),
            endpoint: OAUTH2_ENDPOINT.to_string(),
            scopes: Some("https://www.googleapis.com/auth/pubsub".to_string()),
        };
        let fmt = format!("{provider:?}");
        assert!(fmt.contains("test-client-id"), "{fmt}");
        assert!(!fmt.contains("test-client-secret"), "{fmt}");
        assert!(!fmt.contains("test-refresh-token"), "{fmt}");
        assert!(fmt.contains(OAUTH2_ENDPOINT), "{fmt}");
        Ok(())
    }

    #[test]
    fn build_missing_fields() {
        let full = authorized_user_json("test-only".to_string());
        for required_field in ["client_id", "client_secret", "refresh_token"] {
            let mut json = full.clone();
            json[required_field].take();
            let e = Builder::new(json).build().unwrap_err();
            assert!(e.is_parsing(), "{e}");
        }
    }

    #[test]
    fn identity_key_depends_on_refresh_token() -> TestResult {
        let a = authorized_user_json("test-only".to_string());
        let mut b = a.clone();
        b["refresh_token"] = Value::from("another-refresh-token");

        let key_a = identity_key(&a)?;
        assert!(key_a.starts_with("test-client-id/"), "{key_a}");
        assert!(!key_a.contains("test-refresh-token"), "{key_a}");
        assert_eq!(key_a, identity_key(&a)?);
        assert_ne!(key_a, identity_key(&b)?);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn token_success() -> TestResult {
        let server = Server::run();
        let response = Oauth2RefreshResponse {
            access_token: "test-access-token".to_string(),
            expires_in: Some(3600),
            token_type: "Bearer".to_string(),
        };
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/token"),
                request::body(json_decoded(|req: &Oauth2RefreshRequest| {
                    check_request(req, Some("scope1 scope2"))
                }))
            ])
            .respond_with(json_encoded(response)),
        );

        let creds = Builder::new(authorized_user_json(server.url("/token").to_string()))
            .with_scopes(["scope1", "scope2"])
            .build()?;
        let now = Instant::now();
        let token = creds.token().await?;
        assert_eq!(token.token, "test-access-token");
        assert_eq!(token.token_type, "Bearer");
        assert!(
            token
                .expires_at
                .is_some_and(|at| at >= now + Duration::from_secs(3600)),
            "{token:?}"
        );

        // The second call is served from the token cache.
        let token = creds.token().await?;
        assert_eq!(token.token, "test-access-token");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn token_uri_override() -> TestResult {
        let server = Server::run();
        let response = Oauth2RefreshResponse {
            access_token: "test-access-token".to_string(),
            expires_in: None,
            token_type: "Bearer".to_string(),
        };
        server.expect(
            Expectation::matching(request::method_path("POST", "/override"))
                .respond_with(json_encoded(response)),
        );

        let creds = Builder::new(authorized_user_json("http://unused.invalid".to_string()))
            .with_token_uri(server.url("/override").to_string())
            .build()?;
        let token = creds.token().await?;
        assert_eq!(token.token, "test-access-token");
        assert_eq!(token.expires_at, None);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn token_expiry_out_of_range() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/token")).respond_with(
                json_encoded(serde_json::json!({
                    "access_token": "test-access-token",
                    "token_type": "Bearer",
                    "expires_in": u64::MAX,
                })),
            ),
        );

        let creds = Builder::new(authorized_user_json(server.url("/token").to_string())).build()?;
        let token = creds.token().await?;
        assert_eq!(token.token, "test-access-token");
        assert_eq!(token.expires_at, None);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn token_error_status() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::path("/token")).respond_with(status_code(401)),
        );

        let creds = Builder::new(authorized_user_json(server.url("/token").to_string())).build()?;
        let e = creds.token().await.unwrap_err();
        assert!(e.is_upstream(), "{e}");
        assert_eq!(e.status(), Some(StatusCode::UNAUTHORIZED));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn token_malformed_response() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::path("/token"))
                .respond_with(status_code(200).body("bad json")),
        );

        let creds = Builder::new(authorized_user_json(server.url("/token").to_string())).build()?;
        let e = creds.token().await.unwrap_err();
        assert!(e.is_upstream(), "{e}");
        assert_eq!(e.status(), None);
        Ok(())
    }
}
