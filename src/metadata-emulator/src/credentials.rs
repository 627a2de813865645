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

//! Types and functions to work with Google Cloud credential payloads.
//!
//! A [Credentials] wraps the JSON payload of a credentials file (its raw
//! form is kept, the identity resolver needs fields from it) together with a
//! token source able to mint access tokens for it.
//!
//! Two payload types are supported:
//! - `authorized_user`, see [user_account].
//! - `service_account`, see [service_account].

mod jws;
pub mod service_account;
pub mod user_account;

use crate::Result;
use crate::errors::CredentialsError;
use crate::token::{Token, TokenProvider};
use serde_json::Value;
use std::sync::Arc;

/// The scope requested when none is configured.
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

pub(crate) const AUTHORIZED_USER: &str = "authorized_user";
pub(crate) const SERVICE_ACCOUNT: &str = "service_account";

/// A credential payload and the token source derived from it.
///
/// Cloning is cheap, all clones share the same token source (and thus the
/// same token cache).
#[derive(Clone, Debug)]
pub struct Credentials {
    payload: Arc<Value>,
    token_provider: Arc<dyn TokenProvider>,
}

impl Credentials {
    /// Creates credentials from an already parsed payload and token source.
    pub fn new<T>(payload: Value, token_provider: T) -> Self
    where
        T: TokenProvider + 'static,
    {
        Self {
            payload: Arc::new(payload),
            token_provider: Arc::new(token_provider),
        }
    }

    /// Parses the contents of a credentials file.
    ///
    /// # Errors
    ///
    /// Returns a parsing error if the contents are not JSON, if the `type`
    /// discriminant is missing or unsupported, or if the payload is missing
    /// any of the fields its type requires.
    pub fn from_json(contents: &[u8], scopes: &[String]) -> Result<Self> {
        let payload = serde_json::from_slice::<Value>(contents).map_err(CredentialsError::parsing)?;
        match credentials_type(&payload)? {
            AUTHORIZED_USER => user_account::Builder::new(payload)
                .with_scopes(scopes)
                .build(),
            SERVICE_ACCOUNT => service_account::Builder::new(payload)
                .with_scopes(scopes)
                .build(),
            unknown => Err(CredentialsError::parsing_from_str(format!(
                "unsupported credential type `{unknown}`, expected `{AUTHORIZED_USER}` or `{SERVICE_ACCOUNT}`"
            ))),
        }
    }

    /// The raw JSON payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The value of the `type` field in the payload.
    pub fn credentials_type(&self) -> Result<&str> {
        credentials_type(&self.payload)
    }

    /// The project id declared by the payload, if any.
    ///
    /// Service account keys always name their project, authorized user
    /// payloads usually do not.
    pub fn project_id(&self) -> Option<&str> {
        self.string_field("project_id")
    }

    /// A key that identifies the principal behind these credentials.
    ///
    /// Two payloads with the same key belong to the same principal, even if
    /// the files they were read from differ.
    pub fn client_id(&self) -> Result<String> {
        match self.credentials_type()? {
            AUTHORIZED_USER => user_account::identity_key(&self.payload),
            SERVICE_ACCOUNT => self
                .string_field("client_email")
                .map(str::to_string)
                .ok_or_else(|| CredentialsError::parsing_from_str("missing `client_email` field")),
            unknown => Err(CredentialsError::parsing_from_str(format!(
                "unsupported credential type `{unknown}`"
            ))),
        }
    }

    /// Returns an access token, refreshing it if needed.
    pub async fn token(&self) -> Result<Token> {
        self.token_provider.token().await
    }

    pub(crate) fn string_field(&self, name: &str) -> Option<&str> {
        self.payload
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

fn credentials_type(payload: &Value) -> Result<&str> {
    payload
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| CredentialsError::parsing_from_str("missing `type` field in credentials"))
}
