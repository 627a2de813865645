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

//! Types and functions to work with OAuth2 access tokens.

use crate::Result;
use tokio::time::Instant;

/// Represents an access token minted by a credential's token source.
#[derive(Clone, PartialEq)]
pub struct Token {
    /// The actual token string.
    pub token: String,

    /// The type of the token, typically `"Bearer"`.
    pub token_type: String,

    /// The instant at which the token expires, if known.
    pub expires_at: Option<Instant>,
}

impl Token {
    /// Seconds remaining until the token expires, relative to `now`.
    ///
    /// The value is negative for a token that already expired, and zero when
    /// the expiration is unknown.
    pub fn expires_in(&self, now: Instant) -> i64 {
        match self.expires_at {
            None => 0,
            Some(at) if at >= now => (at - now).as_secs() as i64,
            Some(at) => -((now - at).as_secs() as i64),
        }
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("token", &"[censored]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Produces access tokens on demand.
///
/// Each credential payload type implements this trait. Implementations are
/// expected to be cheap to call repeatedly; wrap them in a
/// [TokenCache](crate::token_cache::TokenCache) to reuse unexpired tokens.
#[async_trait::async_trait]
pub trait TokenProvider: std::fmt::Debug + Send + Sync {
    async fn token(&self) -> Result<Token>;
}
