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

use crate::Result;
use crate::token::{Token, TokenProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
// Using tokio's wrapper makes the cache testable without relying on clock times.
use tokio::time::Instant;

// Refresh tokens slightly before they expire, so callers never receive a
// token that expires while in flight.
const EXPIRY_SLACK: Duration = Duration::from_secs(10);

/// Reuses the last token minted by `T` until it is about to expire.
///
/// Concurrent callers that find no valid token wait for a single refresh. A
/// failed refresh is returned to the caller and not remembered, the next call
/// tries again.
#[derive(Debug)]
pub(crate) struct TokenCache<T>
where
    T: TokenProvider,
{
    token: Arc<Mutex<Option<Token>>>,
    inner: Arc<T>,
}

fn valid(token: &Token, now: Instant) -> bool {
    token.expires_at.is_none_or(|at| at > now + EXPIRY_SLACK)
}

// We manually implement the `Clone` trait because the Rust compiler will
// squawk if `T` is not `Clone`, even though we only hold an `Arc<T>`.
impl<T: TokenProvider> Clone for TokenCache<T> {
    fn clone(&self) -> TokenCache<T> {
        TokenCache {
            token: self.token.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T: TokenProvider> TokenCache<T> {
    pub(crate) fn new(inner: T) -> TokenCache<T> {
        TokenCache {
            token: Arc::new(Mutex::new(None)),
            inner: Arc::new(inner),
        }
    }
}

#[async_trait::async_trait]
impl<T: TokenProvider + 'static> TokenProvider for TokenCache<T> {
    async fn token(&self) -> Result<Token> {
        // Holding the lock during the refresh makes any concurrent callers
        // wait for (and then reuse) the refreshed token.
        let mut current = self.token.lock().await;
        if let Some(token) = current.as_ref().filter(|t| valid(t, Instant::now())) {
            return Ok(token.clone());
        }
        let token = self.inner.token().await?;
        *current = Some(token.clone());
        Ok(token)
    }
}
