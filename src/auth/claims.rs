//! Identity claims returned by the provider
//!
//! Claims come either from the payload of an `id_token` or from the profile
//! endpoint. The `id_token` signature is not checked: the token was received
//! directly from the provider's token endpoint over TLS.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};
use thiserror::Error;

/// Claim decoding errors
#[derive(Error, Debug)]
pub enum ClaimsError {
    #[error("Malformed identity token")]
    Malformed,

    #[error("Identity token payload is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Identity token payload is not a JSON object: {0}")]
    Json(#[from] serde_json::Error),
}

/// Keys the subject id may be published under, in lookup order
const SUBJECT_KEYS: [&str; 3] = ["user_id", "id", "oid"];
const EMAIL_KEYS: [&str; 3] = ["email", "mail", "preferred_username"];
const NAME_KEYS: [&str; 2] = ["name", "displayName"];

/// Claims map of an authenticated identity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityClaims(Map<String, Value>);

impl IdentityClaims {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn first_of(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.get_str(key))
    }

    /// Subject id, from `user_id`, else `id`, else `oid`
    pub fn subject_id(&self) -> Option<String> {
        self.first_of(&SUBJECT_KEYS)
    }

    pub fn email(&self) -> Option<String> {
        self.first_of(&EMAIL_KEYS)
    }

    /// Display name, falling back to the email
    pub fn display_name(&self) -> Option<String> {
        self.first_of(&NAME_KEYS).or_else(|| self.email())
    }

    /// Error reported by the provider in place of claims
    pub fn error(&self) -> Option<String> {
        self.get_str("error")
    }
}

impl From<Map<String, Value>> for IdentityClaims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Decode the payload segment of a JWT without verifying its signature
pub fn decode_id_token(token: &str) -> Result<IdentityClaims, ClaimsError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(ClaimsError::Malformed),
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let map: Map<String, Value> = serde_json::from_slice(&bytes)?;
    Ok(IdentityClaims(map))
}
