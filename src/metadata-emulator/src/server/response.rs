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

use crate::errors::CredentialsError;
use axum::http::{HeaderName, StatusCode, header::CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub(crate) const METADATA_FLAVOR: HeaderName = HeaderName::from_static("metadata-flavor");
pub(crate) const GOOGLE: &str = "Google";

const REMEDIATION: &str = "Could not retrieve default credentials\n\
    You may haven't set up credentials. You can set up your credentials in one of those ways:\n\
    \n  \
    * Run `gcloud auth application-default login`. Share /root/.config/gcloud with volume mounts in docker containers.\n  \
    * Put the service account key file (a json file), and specify the path with GOOGLE_APPLICATION_CREDENTIALS environment variable.\n";

/// A plain text response.
pub(crate) fn text<S: Into<String>>(body: S) -> Response {
    (
        [(METADATA_FLAVOR, GOOGLE), (CONTENT_TYPE, "application/text")],
        body.into(),
    )
        .into_response()
}

/// A JSON response.
pub(crate) fn json<T: Serialize>(value: &T) -> Result<Response, HandlerError> {
    let body = serde_json::to_vec(value).map_err(HandlerError::Serialization)?;
    Ok((
        [(METADATA_FLAVOR, GOOGLE), (CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

pub(crate) fn log_resolution_failure(error: &CredentialsError) {
    tracing::error!(error = %error, "{REMEDIATION}");
}

/// The ways a metadata request can fail.
///
/// Each error is logged once, when it is turned into a response. The
/// responses carry no body, clients only look at the status code.
#[derive(thiserror::Error, Debug)]
pub(crate) enum HandlerError {
    #[error("cannot resolve default credentials")]
    Resolution(#[source] CredentialsError),
    #[error("Could not retrieve email of the credential")]
    Email(#[source] CredentialsError),
    #[error("Failed to resolve numeric project id")]
    NumericProjectId(#[source] CredentialsError),
    #[error("Could not retrieve token")]
    Token(#[source] CredentialsError),
    #[error("Failed to serialize response")]
    Serialization(#[source] serde_json::Error),
    #[error("unknown service account `{0}`")]
    UnknownAccount(String),
    #[error("/identity endpoint is not supported.")]
    Unsupported,
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Resolution(e) => {
                log_resolution_failure(e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Email(e) | Self::NumericProjectId(e) | Self::Token(e) => {
                tracing::error!(error = %e, "{}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Serialization(e) => {
                tracing::error!(error = %e, "{}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::UnknownAccount(account) => {
                tracing::warn!(account = %account, "Service account does not match the credentials");
                StatusCode::NOT_FOUND
            }
            Self::Unsupported => {
                tracing::warn!("{}", self);
                StatusCode::NOT_FOUND
            }
        };
        status.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use test_case::test_case;

    #[tokio::test]
    async fn text_response() -> anyhow::Result<()> {
        let response = text("email/\nscopes/\ntoken\n");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(METADATA_FLAVOR).map(|v| v.as_bytes()),
            Some(GOOGLE.as_bytes())
        );
        assert_eq!(
            response.headers().get(CONTENT_TYPE).map(|v| v.as_bytes()),
            Some("application/text".as_bytes())
        );
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(&body[..], b"email/\nscopes/\ntoken\n");
        Ok(())
    }

    #[tokio::test]
    async fn json_response() -> anyhow::Result<()> {
        let response = json(&serde_json::json!({"email": "u@example.com"}))?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).map(|v| v.as_bytes()),
            Some("application/json".as_bytes())
        );
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let got = serde_json::from_slice::<serde_json::Value>(&body)?;
        assert_eq!(got, serde_json::json!({"email": "u@example.com"}));
        Ok(())
    }

    #[test_case(HandlerError::Resolution(CredentialsError::not_found("test-only")), StatusCode::INTERNAL_SERVER_ERROR)]
    #[test_case(HandlerError::Email(CredentialsError::parsing_from_str("test-only")), StatusCode::INTERNAL_SERVER_ERROR)]
    #[test_case(HandlerError::Token(CredentialsError::parsing_from_str("test-only")), StatusCode::INTERNAL_SERVER_ERROR)]
    #[test_case(HandlerError::UnknownAccount("other@example.com".to_string()), StatusCode::NOT_FOUND)]
    #[test_case(HandlerError::Unsupported, StatusCode::NOT_FOUND)]
    fn error_status(error: HandlerError, want: StatusCode) {
        let response = error.into_response();
        assert_eq!(response.status(), want);
        assert!(response.headers().get(METADATA_FLAVOR).is_none());
    }
}
