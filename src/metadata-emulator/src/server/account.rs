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

use super::ServerState;
use super::response::HandlerError;
use crate::cache::CachedCredentials;
use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use std::sync::Arc;

/// The alias that always names the resolved service account.
pub(crate) const DEFAULT_ACCOUNT: &str = "default";

#[derive(serde::Deserialize)]
struct AccountPath {
    account: String,
}

/// The default credentials, after checking they match the `{account}` path
/// segment.
///
/// Every per-account handler takes this extractor, so a request reaches the
/// handler only if the credentials resolve and the segment is either
/// `default` or exactly the email of the credentials.
pub(crate) struct ServiceAccount(pub Arc<CachedCredentials>);

impl FromRequestParts<Arc<ServerState>> for ServiceAccount {
    type Rejection = HandlerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        let account = Path::<AccountPath>::from_request_parts(parts, state)
            .await
            .map(|Path(p)| p.account)
            .map_err(|e| HandlerError::UnknownAccount(e.body_text()))?;
        let cached = state
            .default_credentials()
            .await
            .map_err(HandlerError::Resolution)?;
        if account == DEFAULT_ACCOUNT {
            return Ok(Self(cached));
        }
        let email = cached
            .email(&state.identity)
            .await
            .map_err(HandlerError::Email)?;
        if email != account {
            return Err(HandlerError::UnknownAccount(account));
        }
        Ok(Self(cached))
    }
}
