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

//! Memoizes the metadata derived from the default credentials.

use crate::Result;
use crate::credentials::Credentials;
use crate::identity::IdentityResolver;
use crate::project::ProjectResolver;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

/// A [Credentials] and the values derived from it.
///
/// The email and numeric project id are computed on first use and then
/// reused for the lifetime of this value. Failures are not remembered, the
/// next caller tries again.
#[derive(Debug)]
pub struct CachedCredentials {
    credentials: Credentials,
    client_id: String,
    project_id: Option<String>,
    email: OnceCell<String>,
    numeric_project_id: OnceCell<i64>,
}

impl CachedCredentials {
    /// Wraps `credentials`.
    ///
    /// The project id is `project_override` if set, otherwise whatever the
    /// credentials declare.
    ///
    /// # Errors
    ///
    /// Fails if the identity key of the credentials cannot be computed.
    pub fn new(credentials: Credentials, project_override: Option<&str>) -> Result<Self> {
        let client_id = credentials.client_id()?;
        let project_id = project_override
            .filter(|p| !p.is_empty())
            .or(credentials.project_id())
            .map(str::to_string);
        Ok(Self {
            credentials,
            client_id,
            project_id,
            email: OnceCell::new(),
            numeric_project_id: OnceCell::new(),
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The identity key, two values with the same key represent the same
    /// principal.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Returns the email of the principal, resolving it on first use.
    pub async fn email(&self, resolver: &IdentityResolver) -> Result<&str> {
        self.email
            .get_or_try_init(|| resolver.email_of(&self.credentials))
            .await
            .map(String::as_str)
    }

    /// Returns the numeric project id, resolving it on first use.
    ///
    /// The value is `0` when there is no project id.
    pub async fn numeric_project_id(&self, resolver: &ProjectResolver) -> Result<i64> {
        self.numeric_project_id
            .get_or_try_init(|| {
                resolver.numeric_id_of(self.project_id.as_deref(), &self.credentials)
            })
            .await
            .copied()
    }
}

/// Holds the [CachedCredentials] for the default scopes.
///
/// The cache has a single slot. It is replaced only when a newly resolved
/// credential belongs to a different principal, so the memoized values
/// survive as long as the principal does.
#[derive(Debug, Default)]
pub struct CredentialsCache {
    slot: Mutex<Option<Arc<CachedCredentials>>>,
}

impl CredentialsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached entry for the principal behind `credentials`.
    ///
    /// The boolean is `true` when `credentials` replaced (or filled) the
    /// slot, and `false` when an existing entry for the same principal was
    /// returned.
    pub fn get_or_create(
        &self,
        credentials: Credentials,
        project_override: Option<&str>,
    ) -> Result<(Arc<CachedCredentials>, bool)> {
        let candidate = CachedCredentials::new(credentials, project_override)?;
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = slot.as_ref().filter(|c| c.client_id == candidate.client_id) {
            return Ok((current.clone(), false));
        }
        let candidate = Arc::new(candidate);
        *slot = Some(candidate.clone());
        Ok((candidate, true))
    }

    /// The current entry, if any.
    pub fn current(&self) -> Option<Arc<CachedCredentials>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::fake_credentials;
    use serde_json::json;

    fn service_account(email: &str) -> Credentials {
        fake_credentials(
            json!({
                "type": "service_account",
                "project_id": "test-project",
                "client_email": email,
            }),
            "test-token",
        )
    }

    #[test]
    fn same_principal_keeps_instance() -> anyhow::Result<()> {
        let cache = CredentialsCache::new();
        let (first, replaced) = cache.get_or_create(service_account("a@test.iam"), None)?;
        assert!(replaced);
        let (second, replaced) = cache.get_or_create(service_account("a@test.iam"), None)?;
        assert!(!replaced);
        assert!(Arc::ptr_eq(&first, &second));
        Ok(())
    }

    #[tokio::test]
    async fn different_principal_invalidates() -> anyhow::Result<()> {
        let resolver = IdentityResolver::new()?;
        let cache = CredentialsCache::new();
        let (first, _) = cache.get_or_create(service_account("a@test.iam"), None)?;
        assert_eq!(first.email(&resolver).await?, "a@test.iam");

        let (second, replaced) = cache.get_or_create(service_account("b@test.iam"), None)?;
        assert!(replaced);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.email.get().is_none());
        assert_eq!(second.email(&resolver).await?, "b@test.iam");
        let current = cache.current().ok_or_else(|| anyhow::anyhow!("empty cache"))?;
        assert!(Arc::ptr_eq(&current, &second));
        Ok(())
    }

    #[test]
    fn project_override() -> anyhow::Result<()> {
        let cached = CachedCredentials::new(service_account("a@test.iam"), Some("override"))?;
        assert_eq!(cached.project_id(), Some("override"));

        let cached = CachedCredentials::new(service_account("a@test.iam"), Some(""))?;
        assert_eq!(cached.project_id(), Some("test-project"));

        let cached = CachedCredentials::new(service_account("a@test.iam"), None)?;
        assert_eq!(cached.project_id(), Some("test-project"));
        assert_eq!(cached.client_id(), "a@test.iam");
        Ok(())
    }

    #[test]
    fn unusable_credentials() {
        let cache = CredentialsCache::new();
        let credentials = fake_credentials(json!({"type": "external_account"}), "unused");
        let e = cache.get_or_create(credentials, None).unwrap_err();
        assert!(e.is_parsing(), "{e}");
        assert!(cache.current().is_none());
    }

    #[tokio::test]
    async fn numeric_project_id_without_project() -> anyhow::Result<()> {
        let credentials = fake_credentials(
            json!({"type": "service_account", "client_email": "a@test.iam"}),
            "unused",
        );
        let cached = CachedCredentials::new(credentials, None)?;
        // No network call is made, the endpoint is never contacted.
        let resolver = ProjectResolver::new()?.with_endpoint("http://127.0.0.1:9/projects");
        assert_eq!(cached.numeric_project_id(&resolver).await?, 0);
        Ok(())
    }
}
