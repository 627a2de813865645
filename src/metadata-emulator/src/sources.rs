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

//! Locates the credentials that back the emulated service account.
//!
//! The [SourceChain] asks each [CredentialsSource] in turn, the first one to
//! produce [Credentials] wins. The default chain, in order:
//!
//! 1. The credentials file named in the configuration.
//! 2. `application_default_credentials.json` in the Cloud SDK configuration
//!    directory, taken from the configuration or from `CLOUDSDK_CONFIG`.
//! 3. [Application Default Credentials]: the file named by
//!    `GOOGLE_APPLICATION_CREDENTIALS`, or the `gcloud` well-known file.
//!
//! A broken file in the first two steps is logged and skipped. Step 3 is
//! final: if `GOOGLE_APPLICATION_CREDENTIALS` names a file that cannot be
//! used, that is the error returned to the caller.
//!
//! [Application Default Credentials]: https://cloud.google.com/docs/authentication/application-default-credentials

use crate::Result;
use crate::credentials::Credentials;
use crate::errors::CredentialsError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

const GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
const CLOUDSDK_CONFIG: &str = "CLOUDSDK_CONFIG";
const WINDOWS_APPDATA: &str = "APPDATA";
const UNIX_HOME: &str = "HOME";
const USER_CREDENTIAL_FILE: &str = "application_default_credentials.json";

/// A single strategy to find credentials.
#[async_trait::async_trait]
pub trait CredentialsSource: std::fmt::Debug + Send + Sync {
    /// Attempts to produce credentials for `scopes`.
    ///
    /// Returns `Ok(None)` if the source has nothing to offer and the next
    /// source should be consulted. An error stops the search.
    async fn resolve(&self, scopes: &[String]) -> Result<Option<Credentials>>;
}

/// An ordered list of [CredentialsSource]s.
#[derive(Debug)]
pub struct SourceChain {
    sources: Vec<Box<dyn CredentialsSource>>,
}

impl SourceChain {
    /// Creates a chain that consults `sources` in order.
    pub fn new(sources: Vec<Box<dyn CredentialsSource>>) -> Self {
        Self { sources }
    }

    /// Creates the default chain.
    ///
    /// `credentials_file` and `cloudsdk_config` are optional, an unset value
    /// makes the corresponding step a no-op (though `CLOUDSDK_CONFIG` is still
    /// consulted when `cloudsdk_config` is unset).
    pub fn with_defaults(
        credentials_file: Option<PathBuf>,
        cloudsdk_config: Option<PathBuf>,
    ) -> Self {
        let mut sources: Vec<Box<dyn CredentialsSource>> = Vec::new();
        if let Some(path) = credentials_file {
            sources.push(Box::new(CredentialsFileSource::new(path)));
        }
        sources.push(Box::new(CloudSdkConfigSource::new(cloudsdk_config)));
        sources.push(Box::new(ApplicationDefaultSource));
        Self::new(sources)
    }

    /// Returns the credentials from the first source that produces any.
    pub async fn resolve(&self, scopes: &[String]) -> Result<Credentials> {
        for source in &self.sources {
            if let Some(credentials) = source.resolve(scopes).await? {
                return Ok(credentials);
            }
        }
        Err(CredentialsError::not_found(
            "no credentials file found in the configured locations, \
             GOOGLE_APPLICATION_CREDENTIALS, or the gcloud configuration directory",
        ))
    }
}

/// The credentials file named in the configuration.
#[derive(Debug)]
pub struct CredentialsFileSource {
    path: PathBuf,
    warned: AtomicBool,
}

impl CredentialsFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            warned: AtomicBool::new(false),
        }
    }
}

#[async_trait::async_trait]
impl CredentialsSource for CredentialsFileSource {
    async fn resolve(&self, scopes: &[String]) -> Result<Option<Credentials>> {
        match load_file(&self.path, scopes).await {
            Ok(Some(credentials)) => {
                self.warned.store(false, Ordering::Relaxed);
                Ok(Some(credentials))
            }
            Ok(None) => {
                if !self.warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        file = %self.path.display(),
                        "Failed to stat specified credentials file: ignored."
                    );
                }
                Ok(None)
            }
            Err(e) => {
                if !self.warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        error = %e,
                        file = %self.path.display(),
                        "Failed to load specified credentials file: ignored."
                    );
                }
                Ok(None)
            }
        }
    }
}

/// `application_default_credentials.json` in a Cloud SDK configuration
/// directory.
#[derive(Debug)]
pub struct CloudSdkConfigSource {
    directory: Option<PathBuf>,
    warned: AtomicBool,
}

impl CloudSdkConfigSource {
    /// Uses `directory` if set, otherwise the `CLOUDSDK_CONFIG` environment
    /// variable at the time of each lookup.
    pub fn new(directory: Option<PathBuf>) -> Self {
        Self {
            directory,
            warned: AtomicBool::new(false),
        }
    }

    fn directory(&self) -> Option<PathBuf> {
        self.directory.clone().or_else(|| {
            std::env::var_os(CLOUDSDK_CONFIG)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        })
    }
}

#[async_trait::async_trait]
impl CredentialsSource for CloudSdkConfigSource {
    async fn resolve(&self, scopes: &[String]) -> Result<Option<Credentials>> {
        let Some(directory) = self.directory() else {
            return Ok(None);
        };
        let path = directory.join(USER_CREDENTIAL_FILE);
        match load_file(&path, scopes).await {
            Ok(Some(credentials)) => {
                self.warned.store(false, Ordering::Relaxed);
                Ok(Some(credentials))
            }
            // A configuration directory without a login is normal.
            Ok(None) => Ok(None),
            Err(e) => {
                if !self.warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        error = %e,
                        file = %path.display(),
                        "Failed to load credentials from specified cloud-sdk configuration directory: ignored."
                    );
                }
                Ok(None)
            }
        }
    }
}

/// Application Default Credentials, as found by the client libraries.
///
/// The metadata server lookup that client libraries perform as a last resort
/// is not part of this source, that would be a request to ourselves.
#[derive(Debug)]
pub struct ApplicationDefaultSource;

#[async_trait::async_trait]
impl CredentialsSource for ApplicationDefaultSource {
    async fn resolve(&self, scopes: &[String]) -> Result<Option<Credentials>> {
        if let Some(path) = std::env::var_os(GOOGLE_APPLICATION_CREDENTIALS).filter(|v| !v.is_empty())
        {
            let path = PathBuf::from(path);
            let contents = tokio::fs::read(&path).await.map_err(|e| {
                CredentialsError::io(
                    format!(
                        "failed to read {} (set in {GOOGLE_APPLICATION_CREDENTIALS})",
                        path.display()
                    ),
                    e,
                )
            })?;
            return Credentials::from_json(&contents, scopes).map(Some);
        }
        match well_known_file() {
            Some(path) => load_file(&path, scopes).await,
            None => Ok(None),
        }
    }
}

/// Returns the path to the `gcloud` user credentials file.
fn well_known_file() -> Option<PathBuf> {
    let mut path = if cfg!(windows) {
        PathBuf::from(std::env::var_os(WINDOWS_APPDATA)?)
    } else {
        let mut home = PathBuf::from(std::env::var_os(UNIX_HOME)?);
        home.push(".config");
        home
    };
    path.push("gcloud");
    path.push(USER_CREDENTIAL_FILE);
    Some(path)
}

/// Loads the credentials in `path`.
///
/// Returns `Ok(None)` if there is no such file, or if the path is a
/// directory.
async fn load_file(path: &Path, scopes: &[String]) -> Result<Option<Credentials>> {
    match tokio::fs::metadata(path).await {
        Ok(m) if m.is_dir() => return Ok(None),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CredentialsError::io(
                format!("failed to stat {}", path.display()),
                e,
            ));
        }
    }
    let contents = tokio::fs::read(path)
        .await
        .map_err(|e| CredentialsError::io(format!("failed to read {}", path.display()), e))?;
    Credentials::from_json(&contents, scopes).map(Some)
}
