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

//! Google Cloud Metadata Server Emulator
//!
//! Applications running on Google Compute Engine, Cloud Run, and similar
//! environments find their project and their credentials by querying the
//! [metadata server]. This crate serves the same endpoints from a developer
//! workstation or a container, backed by local credentials:
//!
//! - a file named on the command line,
//! - the `gcloud auth application-default login` credentials in a Cloud SDK
//!   configuration directory,
//! - the [Application Default Credentials] found through
//!   `GOOGLE_APPLICATION_CREDENTIALS` or the well-known file.
//!
//! Both service account keys and authorized user credentials are supported.
//!
//! [metadata server]: https://cloud.google.com/compute/docs/metadata/overview
//! [Application Default Credentials]: https://cloud.google.com/docs/authentication/application-default-credentials

pub mod errors;

/// Credential payloads and the access tokens they produce.
pub mod credentials;

pub mod token;

/// The token cache
pub(crate) mod token_cache;

/// Where credentials come from, and in which order.
pub mod sources;

pub mod cache;
pub mod config;
pub mod identity;
pub mod project;
pub mod server;

/// A `Result` alias where the `Err` case is
/// `google_cloud_metadata_emulator::errors::CredentialsError`.
pub(crate) type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;

pub(crate) mod http;
