use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde::de::DeserializeOwned;

use crate::Error;

/// A signed token whose algorithm and signature have been checked.
#[derive(Clone, Debug)]
pub struct VerifiedToken {
    pub header: Header,
    pub claims: serde_json::Value,
}

impl VerifiedToken {
    /// Deserializes the claims into a typed struct.
    pub fn claims_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.claims)
    }
}

/// Verifies a compact JWT signed with the shared `secret` under `expected`.
///
/// The declared `alg` has to equal `expected` exactly, a token declaring anything
/// else (including `none`) is rejected before its signature is looked at. `exp`, `nbf`
/// and `iat` are checked with `leeway` seconds of slack when present, a token issued
/// in the future is rejected. Every failure is reported as [`Error::Unauthorized`].
pub fn verify(
    token: &str,
    expected: Algorithm,
    secret: &[u8],
    leeway: u64,
) -> Result<VerifiedToken, Error> {
    let header = jsonwebtoken::decode_header(token).map_err(reject)?;

    if header.alg != expected {
        tracing::debug!(declared = ?header.alg, ?expected, "jwt algorithm mismatch");
        return Err(Error::Unauthorized);
    }

    let mut validation = Validation::new(expected);
    validation.leeway = leeway;
    validation.validate_nbf = true;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = jsonwebtoken::decode::<serde_json::Value>(
        token,
        &DecodingKey::from_secret(secret),
        &validation,
    )
    .map_err(reject)?;

    if issued_in_future(&data.claims, leeway) {
        tracing::debug!("jwt issued in the future");
        return Err(Error::Unauthorized);
    }

    Ok(VerifiedToken {
        header: data.header,
        claims: data.claims,
    })
}

pub(crate) fn is_hmac(algorithm: Algorithm) -> bool {
    matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    )
}

fn issued_in_future(claims: &serde_json::Value, leeway: u64) -> bool {
    let now = jsonwebtoken::get_current_timestamp().saturating_add(leeway);

    claims
        .get("iat")
        .and_then(serde_json::Value::as_f64)
        .is_some_and(|iat| iat > now as f64)
}

fn reject(err: jsonwebtoken::errors::Error) -> Error {
    tracing::debug!(err = %err, "jwt rejected");

    Error::Unauthorized
}
