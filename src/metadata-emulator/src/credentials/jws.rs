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
use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use serde::Serialize;
use std::time::Duration;
use time::OffsetDateTime;

// Token endpoints reject assertions with `iat` in the future. Backdating the
// assertion absorbs small amounts of clock skew on this machine.
pub(crate) const CLOCK_SKEW_FUDGE: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(3600);

/// The claims in a JWT-bearer grant assertion.
#[derive(Serialize)]
pub(crate) struct JwsClaims {
    pub iss: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub aud: String,
    #[serde(with = "time::serde::timestamp")]
    pub exp: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub iat: OffsetDateTime,
}

impl JwsClaims {
    pub fn encode(&self) -> Result<String> {
        if self.exp < self.iat {
            return Err(CredentialsError::parsing_from_str(format!(
                "expiration time {:?}, must be later than issued time {:?}",
                self.exp, self.iat
            )));
        }
        let json = serde_json::to_string(&self).map_err(CredentialsError::parsing)?;
        Ok(BASE64_URL_SAFE_NO_PAD.encode(json.as_bytes()))
    }
}

/// The header that describes who, what, and how a token was created.
#[derive(Serialize)]
pub(crate) struct JwsHeader<'a> {
    pub alg: &'a str,
    pub typ: &'a str,
    pub kid: &'a str,
}

impl JwsHeader<'_> {
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_string(&self).map_err(CredentialsError::parsing)?;
        Ok(BASE64_URL_SAFE_NO_PAD.encode(json.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn decode(encoded: String) -> anyhow::Result<Value> {
        let bytes = BASE64_URL_SAFE_NO_PAD.decode(encoded)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[test]
    fn claims_encode() -> anyhow::Result<()> {
        let now = OffsetDateTime::now_utc();
        let then = now + DEFAULT_TOKEN_TIMEOUT;
        let claims = JwsClaims {
            iss: "test-iss".to_string(),
            scope: Some("scope1 scope2".to_string()),
            aud: "https://oauth2.googleapis.com/token".to_string(),
            exp: then,
            iat: now,
        };

        let v = decode(claims.encode()?)?;
        assert_eq!(v["iss"], "test-iss");
        assert_eq!(v["scope"], "scope1 scope2");
        assert_eq!(v["aud"], "https://oauth2.googleapis.com/token");
        assert_eq!(v["iat"], now.unix_timestamp());
        assert_eq!(v["exp"], then.unix_timestamp());
        Ok(())
    }

    #[test]
    fn claims_encode_without_scope() -> anyhow::Result<()> {
        let now = OffsetDateTime::now_utc();
        let claims = JwsClaims {
            iss: "test-iss".to_string(),
            scope: None,
            aud: "test-aud".to_string(),
            exp: now + DEFAULT_TOKEN_TIMEOUT,
            iat: now,
        };
        let v = decode(claims.encode()?)?;
        assert_eq!(v.get("scope"), None);
        Ok(())
    }

    #[test]
    fn claims_encode_exp_before_iat() {
        let now = OffsetDateTime::now_utc();
        let claims = JwsClaims {
            iss: "test-iss".to_string(),
            scope: None,
            aud: "test-aud".to_string(),
            exp: now - DEFAULT_TOKEN_TIMEOUT,
            iat: now,
        };
        let e = claims.encode().unwrap_err();
        assert!(e.to_string().contains("must be later than issued time"), "{e}");
    }

    #[test]
    fn header_encode() -> anyhow::Result<()> {
        let header = JwsHeader {
            alg: "RS256",
            typ: "JWT",
            kid: "test-key-id",
        };
        let v = decode(header.encode()?)?;
        assert_eq!(
            v,
            serde_json::json!({"alg": "RS256", "typ": "JWT", "kid": "test-key-id"})
        );
        Ok(())
    }
}
