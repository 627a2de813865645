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
use crate::errors::CredentialsError;
use reqwest::{Response, StatusCode};
use std::sync::LazyLock;
use std::time::Duration;

// Upper bound on any outbound call. A metadata client is typically blocked
// waiting on us, so there is no point in waiting longer than it would.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Shared by every credential and resolver.
static CLIENT: LazyLock<Result<reqwest::Client>> = LazyLock::new(build_client);

/// Returns the client used for all outbound requests.
pub(crate) fn client() -> Result<reqwest::Client> {
    (*CLIENT).clone()
}

fn build_client() -> Result<reqwest::Client> {
    #[cfg(test)]
    tests::BUILDS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    // Some other component may have installed a provider already, that is
    // fine.
    let _ = rustls::crypto::ring::default_provider().install_default();
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| CredentialsError::transport("cannot create HTTP client", e))
}

/// Returns the response if it has the expected status, otherwise reads the
/// body (for the logs) and returns an error.
pub(crate) async fn check_status(
    response: Response,
    expected: StatusCode,
    endpoint: &str,
) -> Result<Response> {
    let status = response.status();
    if status == expected {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(%status, body, endpoint, "unexpected response");
    Err(CredentialsError::upstream(
        status,
        format!("{endpoint} returned {status}"),
    ))
}
