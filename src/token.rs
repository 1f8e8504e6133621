//! Manage json web tokens.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::claims::{ClaimCatalog, ClaimId};
use crate::error::{Result, ServerError};

/// Tokens are valid for one week.
pub const EXPIRATION_TIME: Duration = Duration::from_secs(168 * 60 * 60);
pub const BEARER: &str = "Bearer";

const HMAC_ALGORITHMS: [Algorithm; 3] =
    [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub authorized: bool,
    pub user_id: String,
    /// Expiration time as a UNIX timestamp in seconds.
    pub exp: u64,
    /// One `<claim name>: true` entry per granted claim.
    #[serde(flatten)]
    pub claims: BTreeMap<String, Value>,
}

impl TokenClaims {
    /// Whether the token grants claim `name`.
    pub fn has(&self, name: &str) -> bool {
        matches!(self.claims.get(name), Some(Value::Bool(true)))
    }
}

/// Manage HMAC signed tokens.
#[derive(Clone)]
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    catalog: &'static ClaimCatalog,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager").finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a new [`TokenManager`] signing with `secret`.
    pub fn new(secret: &str, catalog: &'static ClaimCatalog) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            catalog,
        }
    }

    /// Mint a token for `user_id` granting `claim_ids`.
    pub fn create(&self, user_id: &str, claim_ids: &[ClaimId]) -> Result<String> {
        let names = self.catalog.names(claim_ids)?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| ServerError::wrap("system clock before UNIX epoch", err))?;

        let claims = TokenClaims {
            authorized: true,
            user_id: user_id.to_owned(),
            exp: (now + EXPIRATION_TIME).as_secs(),
            claims: names
                .into_iter()
                .map(|name| (name.to_owned(), Value::Bool(true)))
                .collect(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| ServerError::wrap("cannot sign token", err))
    }

    /// Decode and check a token.
    pub fn decode(&self, token: &str) -> Result<TokenClaims> {
        if !is_hmac(token) {
            return Err(ServerError::AuthRequired("signin method not valid".into()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = HMAC_ALGORITHMS.to_vec();
        validation.validate_aud = false;

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|err| match err.kind() {
                JwtErrorKind::ExpiredSignature => {
                    ServerError::AuthRequired("token expired".into())
                },
                _ => ServerError::AuthRequired("invalid token".into()),
            })?
            .claims;

        if !claims.authorized {
            return Err(ServerError::AuthRequired("invalid token".into()));
        }

        Ok(claims)
    }

    /// Check every claim of `required` is granted by `claims`.
    pub fn authorize(&self, claims: &TokenClaims, required: &[&str]) -> Result<()> {
        match required.iter().find(|name| !claims.has(name)) {
            Some(missing) => {
                tracing::debug!(user_id = %claims.user_id, claim = %missing, "missing claim");
                Err(ServerError::Forbidden("insufficient permissions".into()))
            },
            None => Ok(()),
        }
    }
}

/// Read the `alg` header without trusting the token.
fn is_hmac(token: &str) -> bool {
    let Some(header) = token.split('.').next() else {
        return false;
    };

    let alg = URL_SAFE_NO_PAD
        .decode(header)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
        .and_then(|header| header.get("alg").and_then(Value::as_str).map(str::to_owned));

    matches!(alg.as_deref(), Some("HS256" | "HS384" | "HS512"))
}

/// Extract the token part of an `Authorization` value.
///
/// Only the exact `Bearer <token>` shape is accepted.
pub fn extract_bearer(value: Option<&str>) -> Result<&str> {
    let value = match value.map(str::trim) {
        None | Some("") => {
            return Err(ServerError::AuthRequired("missing authorization token".into()));
        },
        Some(value) => value,
    };

    match value.split_once(' ') {
        Some((BEARER, token)) if !token.is_empty() && !token.contains(' ') => Ok(token),
        _ => Err(ServerError::AuthRequired("invalid token format".into())),
    }
}
