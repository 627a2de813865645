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

//! Errors returned while resolving credentials and the metadata derived from
//! them.

use http::StatusCode;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter, Result};
use std::sync::Arc;

/// Represents an error resolving or using a
/// [Credentials](crate::credentials::Credentials).
///
/// None of these errors are retried by the emulator. The kind only tells the
/// request handlers (and the logs) what went wrong: no credentials at all, a
/// credential payload that cannot be used, or a remote endpoint that refused
/// to cooperate.
#[derive(Clone, Debug)]
pub struct CredentialsError {
    kind: ErrorKind,
    message: Option<String>,
    status: Option<StatusCode>,
    source: Option<Arc<dyn Error + Send + Sync>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ErrorKind {
    NotFound,
    Parsing,
    Upstream,
    Transport,
    Io,
}

impl CredentialsError {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            status: None,
            source: None,
        }
    }

    fn with_message<T: Into<String>>(mut self, message: T) -> Self {
        self.message = Some(message.into());
        self
    }

    fn with_source<T: Error + Send + Sync + 'static>(mut self, source: T) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// No credentials could be found through any configured source.
    pub(crate) fn not_found<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::NotFound).with_message(message)
    }

    /// The credential payload (or a response derived from it) is malformed.
    pub(crate) fn parsing<T: Error + Send + Sync + 'static>(source: T) -> Self {
        Self::new(ErrorKind::Parsing).with_source(source)
    }

    pub(crate) fn parsing_from_str<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::Parsing).with_message(message)
    }

    /// A remote endpoint returned an unexpected status.
    pub(crate) fn upstream<T: Into<String>>(status: StatusCode, message: T) -> Self {
        let mut e = Self::new(ErrorKind::Upstream).with_message(message);
        e.status = Some(status);
        e
    }

    /// A remote endpoint returned a response body we could not decode.
    pub(crate) fn upstream_decode<T: Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: T,
    ) -> Self {
        Self::new(ErrorKind::Upstream)
            .with_message(message)
            .with_source(source)
    }

    /// The request to a remote endpoint could not be completed.
    pub(crate) fn transport<T: Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: T,
    ) -> Self {
        Self::new(ErrorKind::Transport)
            .with_message(message)
            .with_source(source)
    }

    pub(crate) fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::new(ErrorKind::Io)
            .with_message(message)
            .with_source(source)
    }

    /// Returns `true` if no credentials were found.
    ///
    /// The server treats this as "no identity available" and logs guidance
    /// on how to set up credentials.
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Returns `true` if a credential payload or response could not be used.
    pub fn is_parsing(&self) -> bool {
        self.kind == ErrorKind::Parsing
    }

    /// Returns `true` if a remote endpoint rejected the request or returned
    /// an unexpected response.
    pub fn is_upstream(&self) -> bool {
        self.kind == ErrorKind::Upstream
    }

    /// Returns `true` if the request to a remote endpoint failed to complete.
    pub fn is_transport(&self) -> bool {
        self.kind == ErrorKind::Transport
    }

    /// Returns `true` if reading a local file failed.
    pub fn is_io(&self) -> bool {
        self.kind == ErrorKind::Io
    }

    /// The HTTP status returned by the remote endpoint, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }
}

impl std::error::Error for CredentialsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl Display for CredentialsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let prefix = match self.kind {
            ErrorKind::NotFound => "cannot find credentials",
            ErrorKind::Parsing => "cannot use credentials",
            ErrorKind::Upstream => "unexpected response from remote endpoint",
            ErrorKind::Transport => "cannot send request",
            ErrorKind::Io => "cannot read credentials",
        };
        write!(f, "{prefix}")?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }
        Ok(())
    }
}
