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

//! The metadata server.
//!
//! Serves the subset of the [metadata server] endpoints that client libraries
//! use to discover the project and the service account of a VM, and to
//! obtain access tokens for that service account:
//!
//! | Path under `/computeMetadata/v1` | Response |
//! | -------------------------------- | -------- |
//! | `project/project-id` | the project id, or an empty body |
//! | `project/numeric-project-id` | the project number, or `0` |
//! | `instance/service-accounts/` | `default/` and the account email |
//! | `instance/service-accounts/{account}/` | a listing, or JSON with `?recursive=true` |
//! | `instance/service-accounts/{account}/email` | the account email |
//! | `instance/service-accounts/{account}/token` | an access token, `?scopes=` overrides the scopes |
//! | `instance/service-accounts/{account}/identity` | always 404, ID tokens are not supported |
//!
//! Requests without the `Metadata-Flavor: Google` header are rejected with a
//! 404, as are requests for any other path.
//!
//! [metadata server]: https://cloud.google.com/compute/docs/metadata/overview

mod account;
mod response;

use crate::Result;
use crate::cache::{CachedCredentials, CredentialsCache};
use crate::config::ServerConfig;
use crate::credentials::Credentials;
use crate::identity::IdentityResolver;
use crate::project::ProjectResolver;
use crate::sources::SourceChain;
use account::{DEFAULT_ACCOUNT, ServiceAccount};
use axum::Router;
use axum::body::HttpBody;
use axum::extract::{FromRequestParts, Query, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::middleware::{Next, from_fn};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use response::{GOOGLE, HandlerError, METADATA_FLAVOR, json, log_resolution_failure, text};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Instant;

const PROJECT_ID: &str = "/computeMetadata/v1/project/project-id";
const NUMERIC_PROJECT_ID: &str = "/computeMetadata/v1/project/numeric-project-id";
const SERVICE_ACCOUNTS: &str = "/computeMetadata/v1/instance/service-accounts/";

/// A builder for [MetadataServer].
#[derive(Debug)]
pub struct Builder {
    config: ServerConfig,
    sources: Option<SourceChain>,
    userinfo_endpoint: Option<String>,
    projects_endpoint: Option<String>,
}

impl Builder {
    fn new(config: ServerConfig) -> Self {
        Self {
            config,
            sources: None,
            userinfo_endpoint: None,
            projects_endpoint: None,
        }
    }

    /// Replaces the default [SourceChain] built from the configuration.
    pub fn with_sources(mut self, sources: SourceChain) -> Self {
        self.sources = Some(sources);
        self
    }

    /// Overrides the user-info endpoint used to find the email of
    /// authorized users.
    pub fn with_userinfo_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.userinfo_endpoint = Some(endpoint.into());
        self
    }

    /// Overrides the Resource Manager projects endpoint used to find the
    /// numeric project id.
    pub fn with_projects_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.projects_endpoint = Some(endpoint.into());
        self
    }

    pub fn build(self) -> Result<MetadataServer> {
        let sources = self.sources.unwrap_or_else(|| {
            SourceChain::with_defaults(
                self.config.google_application_credentials.clone(),
                self.config.cloudsdk_config.clone(),
            )
        });
        let mut identity = IdentityResolver::new()?;
        if let Some(endpoint) = self.userinfo_endpoint {
            identity = identity.with_endpoint(endpoint);
        }
        let mut projects = ProjectResolver::new()?;
        if let Some(endpoint) = self.projects_endpoint {
            projects = projects.with_endpoint(endpoint);
        }
        let state = ServerState {
            scopes: self.config.scopes,
            project: self.config.project,
            sources,
            cache: CredentialsCache::new(),
            identity,
            projects,
        };
        Ok(MetadataServer {
            state: Arc::new(state),
        })
    }
}

/// Emulates the GCE metadata server.
#[derive(Clone, Debug)]
pub struct MetadataServer {
    state: Arc<ServerState>,
}

impl MetadataServer {
    pub fn builder(config: ServerConfig) -> Builder {
        Builder::new(config)
    }

    /// Returns the router for all the metadata endpoints.
    pub fn router(&self) -> Router {
        let account = |path: &str| format!("{SERVICE_ACCOUNTS}{{account}}{path}");
        Router::new()
            .route(PROJECT_ID, any(project_id))
            .route(NUMERIC_PROJECT_ID, any(numeric_project_id))
            .route(SERVICE_ACCOUNTS, any(service_accounts))
            .route(&account("/"), any(service_account))
            .route(&account("/email"), any(email))
            .route(&account("/token"), any(token))
            .route(&account("/identity"), any(identity))
            .fallback(not_found)
            .layer(from_fn(check_metadata_flavor))
            .layer(from_fn(access_log))
            .with_state(self.state.clone())
    }

    /// Serves requests on `listener` until the process receives Ctrl-C.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        tracing::info!("Listening {}...", listener.local_addr()?);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutting down"),
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for Ctrl-C, the server runs until killed");
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug)]
pub(crate) struct ServerState {
    scopes: Vec<String>,
    project: Option<String>,
    sources: SourceChain,
    cache: CredentialsCache,
    identity: IdentityResolver,
    projects: ProjectResolver,
}

impl ServerState {
    /// Resolves the credentials for the default scopes, through the cache.
    async fn default_credentials(&self) -> Result<Arc<CachedCredentials>> {
        let credentials = self.sources.resolve(&self.scopes).await?;
        let (cached, replaced) = self
            .cache
            .get_or_create(credentials, self.project.as_deref())?;
        if replaced {
            match cached.email(&self.identity).await {
                Ok(email) => tracing::info!("New credentials: {email}"),
                Err(_) => tracing::info!("New credentials: client_id={}", cached.client_id()),
            }
        }
        Ok(cached)
    }

    /// Resolves credentials for `scopes`, bypassing the cache.
    async fn scoped_credentials(&self, scopes: &[String]) -> Result<Credentials> {
        self.sources.resolve(scopes).await
    }
}

async fn check_metadata_flavor(request: Request, next: Next) -> Response {
    if request
        .headers()
        .get(METADATA_FLAVOR)
        .is_some_and(|v| v == GOOGLE)
    {
        return next.run(request).await;
    }
    tracing::debug!(
        method = %request.method(),
        path = request.uri().path(),
        "Accessed without Metadata-Flavor: Google"
    );
    StatusCode::NOT_FOUND.into_response()
}

async fn access_log(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();
    let response = next.run(request).await;
    tracing::info!(
        %method,
        %uri,
        status = response.status().as_u16(),
        size = response.body().size_hint().exact(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}

async fn not_found(request: Request) -> StatusCode {
    tracing::warn!(
        method = %request.method(),
        path = %request.uri(),
        "Unimplemented path is accessed, this may be a metadata server feature that is not emulated."
    );
    StatusCode::NOT_FOUND
}

/// The query parameters of a request, in order.
///
/// A parameter may repeat, handlers use its first value. A query string that
/// cannot be decoded is treated as empty, so it never turns into an error
/// response.
struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    fn first(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for QueryParams {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let params = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map(|Query(params)| params)
            .unwrap_or_else(|e| {
                tracing::debug!(error = %e, uri = %parts.uri, "ignoring malformed query string");
                Vec::new()
            });
        Ok(Self(params))
    }
}

async fn project_id(State(state): State<Arc<ServerState>>) -> Response {
    match state.default_credentials().await {
        Ok(cached) => text(cached.project_id().unwrap_or_default()),
        Err(e) => {
            log_resolution_failure(&e);
            text("")
        }
    }
}

async fn numeric_project_id(
    State(state): State<Arc<ServerState>>,
) -> std::result::Result<Response, HandlerError> {
    let cached = match state.default_credentials().await {
        Ok(cached) => cached,
        Err(e) => {
            log_resolution_failure(&e);
            return Ok(text("0"));
        }
    };
    let id = cached
        .numeric_project_id(&state.projects)
        .await
        .map_err(HandlerError::NumericProjectId)?;
    Ok(text(id.to_string()))
}

async fn service_accounts(
    State(state): State<Arc<ServerState>>,
) -> std::result::Result<Response, HandlerError> {
    let cached = state
        .default_credentials()
        .await
        .map_err(HandlerError::Resolution)?;
    let email = cached
        .email(&state.identity)
        .await
        .map_err(HandlerError::Email)?;
    Ok(text(format!("{DEFAULT_ACCOUNT}/\n{email}\n")))
}

#[derive(serde::Serialize)]
struct RecursiveResponse<'a> {
    scopes: &'a [String],
    email: &'a str,
    aliases: [&'a str; 1],
}

async fn service_account(
    State(state): State<Arc<ServerState>>,
    ServiceAccount(cached): ServiceAccount,
    params: QueryParams,
) -> std::result::Result<Response, HandlerError> {
    if params.first("recursive") != Some("true") {
        return Ok(text("email/\nscopes/\ntoken\n"));
    }
    let email = cached
        .email(&state.identity)
        .await
        .map_err(HandlerError::Email)?;
    json(&RecursiveResponse {
        scopes: &state.scopes,
        email,
        aliases: [DEFAULT_ACCOUNT],
    })
}

async fn email(
    State(state): State<Arc<ServerState>>,
    ServiceAccount(cached): ServiceAccount,
) -> std::result::Result<Response, HandlerError> {
    let email = cached
        .email(&state.identity)
        .await
        .map_err(HandlerError::Email)?;
    Ok(text(email))
}

#[derive(serde::Serialize)]
struct TokenResponse<'a> {
    access_token: &'a str,
    token_type: &'a str,
    expires_in: i64,
}

async fn token(
    State(state): State<Arc<ServerState>>,
    ServiceAccount(cached): ServiceAccount,
    params: QueryParams,
) -> std::result::Result<Response, HandlerError> {
    let scopes = params
        .first("scopes")
        .into_iter()
        .flat_map(|s| s.split(','))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    let token = if scopes.is_empty() {
        cached.credentials().token().await
    } else {
        state
            .scoped_credentials(&scopes)
            .await
            .map_err(HandlerError::Resolution)?
            .token()
            .await
    }
    .map_err(HandlerError::Token)?;
    json(&TokenResponse {
        access_token: &token.token,
        token_type: &token.token_type,
        expires_in: token.expires_in(Instant::now()),
    })
}

// Rejected before any account matching, the endpoint is not supported for
// any account.
async fn identity() -> HandlerError {
    HandlerError::Unsupported
}
