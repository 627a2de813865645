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

//! Finds the email address of the principal behind some credentials.

use crate::Result;
use crate::credentials::{AUTHORIZED_USER, Credentials, SERVICE_ACCOUNT};
use crate::errors::CredentialsError;
use crate::http::{check_status, client};
use reqwest::StatusCode;

/// The Google user-info endpoint.
pub const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v1/userinfo";

/// Resolves the email of service accounts and authorized users.
#[derive(Clone, Debug)]
pub struct IdentityResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl IdentityResolver {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: client()?,
            endpoint: USERINFO_ENDPOINT.to_string(),
        })
    }

    /// Overrides the user-info endpoint.
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Returns the email of the principal behind `credentials`.
    ///
    /// Service account keys embed the email. Authorized users do not, for
    /// them this mints an access token and asks the user-info endpoint.
    pub async fn email_of(&self, credentials: &Credentials) -> Result<String> {
        match credentials.credentials_type()? {
            SERVICE_ACCOUNT => credentials
                .string_field("client_email")
                .map(str::to_string)
                .ok_or_else(|| {
                    CredentialsError::parsing_from_str(
                        "missing `client_email` field in service account key",
                    )
                }),
            AUTHORIZED_USER => self.user_email(credentials).await,
            unknown => Err(CredentialsError::parsing_from_str(format!(
                "cannot find the email for credentials of type `{unknown}`"
            ))),
        }
    }

    async fn user_email(&self, credentials: &Credentials) -> Result<String> {
        let token = credentials.token().await?;
        let response = self
            .client
            .get(self.endpoint.as_str())
            .query(&[("access_token", token.token.as_str())])
            .send()
            .await
            .map_err(|e| CredentialsError::transport("cannot fetch user info", e))?;
        let response = check_status(response, StatusCode::OK, &self.endpoint).await?;
        let info = response
            .json::<UserInfo>()
            .await
            .map_err(|e| CredentialsError::upstream_decode("cannot parse user info", e))?;
        info.email.filter(|e| !e.is_empty()).ok_or_else(|| {
            CredentialsError::parsing_from_str(
                "user info has no email, the credentials may lack the `email` scope",
            )
        })
    }
}

#[derive(serde::Deserialize)]
struct UserInfo {
    #[serde(alias = "Email")]
    email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedCredentials;
    use crate::credentials::tests::fake_credentials;
    use httptest::matchers::{all_of, contains, request, url_decoded};
    use httptest::responders::{json_encoded, status_code};
    use httptest::{Expectation, Server};
    use serde_json::json;

    type TestResult = anyhow::Result<()>;

    fn user() -> Credentials {
        fake_credentials(
            json!({
                "type": "authorized_user",
                "client_id": "test-client-id",
                "client_secret": "test-client-secret",
                "refresh_token": "test-refresh-token",
            }),
            "test-user-token",
        )
    }

    #[tokio::test]
    async fn service_account_email() -> TestResult {
        let credentials = fake_credentials(
            json!({"type": "service_account", "client_email": "svc@proj.iam.gserviceaccount.com"}),
            "unused",
        );
        // No user-info call is made.
        let resolver = IdentityResolver::new()?.with_endpoint("http://127.0.0.1:9/userinfo");
        let email = resolver.email_of(&credentials).await?;
        assert_eq!(email, "svc@proj.iam.gserviceaccount.com");
        Ok(())
    }

    #[tokio::test]
    async fn service_account_without_email() -> TestResult {
        let credentials = fake_credentials(json!({"type": "service_account"}), "unused");
        let e = IdentityResolver::new()?
            .email_of(&credentials)
            .await
            .unwrap_err();
        assert!(e.is_parsing(), "{e}");
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_type() -> TestResult {
        let credentials = fake_credentials(json!({"type": "external_account"}), "unused");
        let e = IdentityResolver::new()?
            .email_of(&credentials)
            .await
            .unwrap_err();
        assert!(e.is_parsing(), "{e}");
        assert!(e.to_string().contains("external_account"), "{e}");
        Ok(())
    }

    #[tokio::test]
    async fn user_email() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/userinfo"),
                request::query(url_decoded(contains(("access_token", "test-user-token")))),
            ])
            .respond_with(json_encoded(json!({"id": "123", "email": "u@example.com"}))),
        );
        let resolver = IdentityResolver::new()?.with_endpoint(server.url_str("/userinfo"));
        assert_eq!(resolver.email_of(&user()).await?, "u@example.com");
        Ok(())
    }

    #[tokio::test]
    async fn user_email_capitalized_field() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/userinfo"))
                .respond_with(json_encoded(json!({"Email": "u@example.com"}))),
        );
        let resolver = IdentityResolver::new()?.with_endpoint(server.url_str("/userinfo"));
        assert_eq!(resolver.email_of(&user()).await?, "u@example.com");
        Ok(())
    }

    #[tokio::test]
    async fn user_email_missing() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/userinfo"))
                .respond_with(json_encoded(json!({"id": "123"}))),
        );
        let resolver = IdentityResolver::new()?.with_endpoint(server.url_str("/userinfo"));
        let e = resolver.email_of(&user()).await.unwrap_err();
        assert!(e.is_parsing(), "{e}");
        Ok(())
    }

    #[tokio::test]
    async fn user_email_upstream_error() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/userinfo"))
                .respond_with(status_code(401)),
        );
        let resolver = IdentityResolver::new()?.with_endpoint(server.url_str("/userinfo"));
        let e = resolver.email_of(&user()).await.unwrap_err();
        assert!(e.is_upstream(), "{e}");
        assert_eq!(e.status(), Some(StatusCode::UNAUTHORIZED));
        Ok(())
    }

    #[tokio::test]
    async fn user_email_is_memoized() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/userinfo"))
                .times(1)
                .respond_with(json_encoded(json!({"email": "u@example.com"}))),
        );
        let resolver = IdentityResolver::new()?.with_endpoint(server.url_str("/userinfo"));
        let cached = CachedCredentials::new(user(), None)?;
        for _ in 0..3 {
            assert_eq!(cached.email(&resolver).await?, "u@example.com");
        }
        Ok(())
    }

    #[tokio::test]
    async fn user_email_failure_not_memoized() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/userinfo"))
                .times(2)
                .respond_with(status_code(503)),
        );
        let resolver = IdentityResolver::new()?.with_endpoint(server.url_str("/userinfo"));
        let cached = CachedCredentials::new(user(), None)?;
        assert!(cached.email(&resolver).await.is_err());
        assert!(cached.email(&resolver).await.is_err());
        Ok(())
    }
}
