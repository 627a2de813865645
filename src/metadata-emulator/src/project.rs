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

//! Looks up numeric project ids with the [Resource Manager] API.
//!
//! Service accounts need the Resource Manager API enabled in their project
//! for this lookup to work, authorized users do not.
//!
//! [Resource Manager]: https://cloud.google.com/resource-manager/reference/rest/v1/projects/get

use crate::Result;
use crate::credentials::Credentials;
use crate::errors::CredentialsError;
use crate::http::{check_status, client};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::StatusCode;

/// The Resource Manager collection of projects.
pub const PROJECTS_ENDPOINT: &str = "https://cloudresourcemanager.googleapis.com/v1/projects";

// The characters escaped in a single path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Resolves project ids to project numbers.
#[derive(Clone, Debug)]
pub struct ProjectResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl ProjectResolver {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: client()?,
            endpoint: PROJECTS_ENDPOINT.to_string(),
        })
    }

    /// Overrides the projects collection endpoint.
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Returns the project number of `project_id`, using `credentials` to
    /// authorize the lookup.
    ///
    /// Without a project id there is nothing to look up, the result is `0`.
    pub async fn numeric_id_of(
        &self,
        project_id: Option<&str>,
        credentials: &Credentials,
    ) -> Result<i64> {
        let Some(project_id) = project_id else {
            return Ok(0);
        };
        let token = credentials.token().await?;
        let url = format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            utf8_percent_encode(project_id, PATH_SEGMENT)
        );
        let response = self
            .client
            .get(url.as_str())
            .bearer_auth(&token.token)
            .send()
            .await
            .map_err(|e| CredentialsError::transport("cannot fetch project", e))?;
        let response = check_status(response, StatusCode::OK, &url).await?;
        let project = response
            .json::<Project>()
            .await
            .map_err(|e| CredentialsError::upstream_decode("cannot parse project", e))?;
        project.project_number.parse::<i64>().map_err(|e| {
            CredentialsError::upstream_decode(
                format!("invalid projectNumber `{}`", project.project_number),
                e,
            )
        })
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct Project {
    project_number: String,
}
