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

//! Command line configuration.

use crate::credentials::DEFAULT_SCOPE;
use clap::Parser;
use std::path::PathBuf;
use tracing::Level;

const DESCRIPTION: &str = concat!(
    "Serves the Google Compute Engine metadata endpoints used by client",
    " libraries to find credentials, backed by local credentials: a service",
    " account key file, or the `gcloud auth application-default login`",
    " credentials."
);

/// Errors in the startup configuration.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("at least one scope is required")]
    NoScopes,
    #[error("scope #{0} is empty")]
    EmptyScope(usize),
    #[error("the bind host cannot be empty")]
    EmptyHost,
}

/// Command line arguments.
#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = DESCRIPTION)]
pub struct Args {
    /// Address to bind, use 0.0.0.0 to accept remote connections, for
    /// example inside a container.
    #[arg(short = 'H', long, default_value = "localhost")]
    pub host: String,

    /// Port to bind.
    #[arg(short, long, default_value_t = 80)]
    pub port: u16,

    /// Comma separated scopes for tokens requested without explicit scopes.
    #[arg(long, value_delimiter = ',', default_value = DEFAULT_SCOPE)]
    pub scopes: Vec<String>,

    /// The project id to report, overrides the project in the credentials.
    #[arg(long)]
    pub project: Option<String>,

    /// A credentials file used before any other.
    #[arg(long)]
    pub google_application_credentials: Option<PathBuf>,

    /// The Cloud SDK configuration directory. Defaults to the value of
    /// `CLOUDSDK_CONFIG`.
    #[arg(long)]
    pub cloudsdk_config: Option<PathBuf>,

    /// Log level: trace, debug, info, warning, error.
    #[arg(long, value_parser = parse_level, default_value = "warning")]
    pub log_level: Level,
}

impl Args {
    /// Validates the arguments and returns the server configuration.
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.scopes.is_empty() {
            return Err(ConfigError::NoScopes);
        }
        if let Some(i) = self.scopes.iter().position(|s| s.trim().is_empty()) {
            return Err(ConfigError::EmptyScope(i + 1));
        }
        Ok(ServerConfig {
            host: self.host,
            port: self.port,
            scopes: self.scopes,
            project: self.project.filter(|p| !p.is_empty()),
            google_application_credentials: self.google_application_credentials,
            cloudsdk_config: self.cloudsdk_config,
        })
    }
}

fn parse_level(value: &str) -> Result<Level, String> {
    match value.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(format!(
            "unknown log level `{value}`, expected one of trace, debug, info, warning, error"
        )),
    }
}

/// The configuration of a [MetadataServer](crate::server::MetadataServer).
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// The scopes for the default credentials, never empty.
    pub scopes: Vec<String>,
    pub project: Option<String>,
    pub google_application_credentials: Option<PathBuf>,
    pub cloudsdk_config: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 80,
            scopes: vec![DEFAULT_SCOPE.to_string()],
            project: None,
            google_application_credentials: None,
            cloudsdk_config: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn defaults() -> anyhow::Result<()> {
        let args = Args::try_parse_from(["program"])?;
        assert_eq!(args.log_level, Level::WARN);
        let config = args.into_config()?;
        assert_eq!(config, ServerConfig::default());
        Ok(())
    }

    #[test]
    fn all_flags() -> anyhow::Result<()> {
        let args = Args::try_parse_from([
            "program",
            "-H",
            "0.0.0.0",
            "-p",
            "8080",
            "--scopes=a,b",
            "--project=test-project",
            "--google-application-credentials=/tmp/key.json",
            "--cloudsdk-config=/tmp/gcloud",
            "--log-level=Debug",
        ])?;
        assert_eq!(args.log_level, Level::DEBUG);
        let config = args.into_config()?;
        assert_eq!(
            config,
            ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                scopes: vec!["a".to_string(), "b".to_string()],
                project: Some("test-project".to_string()),
                google_application_credentials: Some(PathBuf::from("/tmp/key.json")),
                cloudsdk_config: Some(PathBuf::from("/tmp/gcloud")),
            }
        );
        Ok(())
    }

    #[test_case(&["program", "--scopes=a,,b"], ConfigError::EmptyScope(2))]
    #[test_case(&["program", "--host="], ConfigError::EmptyHost)]
    fn invalid(input: &[&str], want: ConfigError) -> anyhow::Result<()> {
        let args = Args::try_parse_from(input)?;
        let got = args.into_config();
        assert_eq!(got, Err(want));
        Ok(())
    }

    #[test_case("trace", Level::TRACE)]
    #[test_case("Warning", Level::WARN)]
    #[test_case("WARN", Level::WARN)]
    #[test_case("error", Level::ERROR)]
    fn log_levels(input: &str, want: Level) {
        assert_eq!(parse_level(input), Ok(want));
    }

    #[test]
    fn bad_log_level() {
        assert!(Args::try_parse_from(["program", "--log-level=loud"]).is_err());
    }

    #[test]
    fn empty_project_is_unset() -> anyhow::Result<()> {
        let config = Args::try_parse_from(["program", "--project="])?.into_config()?;
        assert_eq!(config.project, None);
        Ok(())
    }
}
