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

//! [Service Account] Credentials type.
//!
//! A service account key file carries the account email and an RSA private
//! key. Access tokens are obtained with the [JWT-bearer grant]: the key signs
//! an assertion naming the requested scopes, and the token endpoint
//! exchanges the assertion for an access token.
//!
//! [Service Account]: https://cloud.google.com/iam/docs/service-account-overview
//! [JWT-bearer grant]: https://datatracker.ietf.org/doc/html/rfc7523

use crate::Result;
use crate::credentials::Credentials;
use crate::credentials::jws::{CLOCK_SKEW_FUDGE, DEFAULT_TOKEN_TIMEOUT, JwsClaims, JwsHeader};
use crate::errors::CredentialsError;
use crate::http::{check_status, client};
use crate::token::{Token, TokenProvider};
use crate::token_cache::TokenCache;
use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use reqwest::{Client, StatusCode};
use rustls::crypto::CryptoProvider;
use rustls::sign::Signer;
use rustls_pki_types::PrivateKeyDer;
use rustls_pki_types::pem::PemObject;
use serde_json::Value;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::Instant;

const OAUTH2_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// A builder for `service_account` [Credentials].
pub struct Builder {
    service_account_key: Value,
    scopes: Option<Vec<String>>,
    token_uri: Option<String>,
}

impl Builder {
    /// Creates a new builder using the `service_account` JSON value.
    pub fn new(service_account_key: Value) -> Self {
        Self {
            service_account_key,
            scopes: None,
            token_uri: None,
        }
    }

    /// Sets the URI for the token endpoint, overriding any `token_uri` in the
    /// JSON.
    pub fn with_token_uri<S: Into<String>>(mut self, token_uri: S) -> Self {
        self.token_uri = Some(token_uri.into());
        self
    }

    /// Sets the scopes named in the assertion.
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
    /// The private key itself is only loaded when a token is requested.
    pub fn build(self) -> Result<Credentials> {
        let key = serde_json::from_value::<ServiceAccountKey>(self.service_account_key.clone())
            .map_err(CredentialsError::parsing)?;
        let endpoint = self
            .token_uri
            .or_else(|| key.token_uri.clone())
            .unwrap_or(OAUTH2_ENDPOINT.to_string());
        let token_provider = ServiceAccountTokenProvider {
            client: client()?,
            key,
            endpoint,
            scopes: self.scopes.map(|scopes| scopes.join(" ")),
        };
        Ok(Credentials::new(
            self.service_account_key,
            TokenCache::new(token_provider),
        ))
    }
}

/// A representation of a [service account key].
///
/// [service account key]: https://cloud.google.com/iam/docs/keys-create-delete#creating
#[derive(serde::Deserialize, Default, Clone)]
pub(crate) struct ServiceAccountKey {
    /// The client email address of the service account.
    pub client_email: String,
    /// ID of the service account's private key.
    pub private_key_id: String,
    /// The PEM-encoded private key.
    pub private_key: String,
    /// Overrides the default token endpoint.
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"[censored]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Debug)]
struct ServiceAccountTokenProvider {
    client: Client,
    key: ServiceAccountKey,
    endpoint: String,
    scopes: Option<String>,
}

#[async_trait::async_trait]
impl TokenProvider for ServiceAccountTokenProvider {
    async fn token(&self) -> Result<Token> {
        let assertion = self.assertion()?;
        let resp = self
            .client
            .post(self.endpoint.as_str())
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
            .send()
            .await
            .map_err(|e| CredentialsError::transport("cannot exchange assertion", e))?;
        let resp = check_status(resp, StatusCode::OK, &self.endpoint).await?;
        let response = resp
            .json::<TokenResponse>()
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

impl ServiceAccountTokenProvider {
    fn assertion(&self) -> Result<String> {
        let signer = self.signer()?;
        // The claims encode a unix timestamp, `tokio::time::Instant` has no
        // epoch.
        let now = OffsetDateTime::now_utc() - CLOCK_SKEW_FUDGE;
        let claims = JwsClaims {
            iss: self.key.client_email.clone(),
            scope: self.scopes.clone(),
            aud: self.endpoint.clone(),
            exp: now + DEFAULT_TOKEN_TIMEOUT,
            iat: now,
        };
        let header = JwsHeader {
            alg: "RS256",
            typ: "JWT",
            kid: &self.key.private_key_id,
        };
        let encoded_header_claims = format!("{}.{}", header.encode()?, claims.encode()?);
        let sig = signer
            .sign(encoded_header_claims.as_bytes())
            .map_err(CredentialsError::parsing)?;
        Ok(format!(
            "{encoded_header_claims}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(sig)
        ))
    }

    // Creates a signer using the private key stored in the service account file.
    fn signer(&self) -> Result<Box<dyn Signer>> {
        let key_provider = CryptoProvider::get_default().map_or_else(
            || rustls::crypto::ring::default_provider().key_provider,
            |p| p.key_provider,
        );
        let private_key = PrivateKeyDer::from_pem_slice(self.key.private_key.as_bytes())
            .map_err(CredentialsError::parsing)?;
        let sk = key_provider
            .load_private_key(private_key)
            .map_err(CredentialsError::parsing)?;
        sk.choose_scheme(&[rustls::SignatureScheme::RSA_PKCS1_SHA256])
            .ok_or_else(|| {
                CredentialsError::parsing_from_str(
                    "the private key does not support the RSA_PKCS1_SHA256 signing scheme",
                )
            })
    }
}

#[derive(serde::Deserialize, serde::Serialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "bearer")]
    token_type: String,
    expires_in: Option<u64>,
}

fn bearer() -> String {
    "Bearer".to_string()
}
