use std::fmt;

use hmac::Mac;
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;

use crate::{Error, HmacSha256};

/// Length in bytes of the random salt embedded in every token.
pub const SALT_LEN: usize = 8;

/// A self-verifying CSRF token: `hex(HMAC-SHA256(secret, salt)):hex(salt)`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CsrfToken(String);

impl CsrfToken {
    /// Mints a token under `secret` with a fresh salt from the operating system's RNG.
    ///
    /// A failing random source is returned as [`Error::RandomSource`]; there is no fallback.
    pub fn issue(secret: &[u8]) -> Result<Self, Error> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.try_fill_bytes(&mut salt)?;

        Self::issue_with_salt(secret, &salt)
    }

    /// Mints the token for a known salt. Same secret and salt always give the same token.
    pub fn issue_with_salt(secret: &[u8], salt: &[u8]) -> Result<Self, Error> {
        let mut mac = HmacSha256::new_from_slice(secret)?;
        mac.update(salt);
        let digest = mac.finalize().into_bytes();

        Ok(Self(format!("{}:{}", hex::encode(digest), hex::encode(salt))))
    }

    /// Checks that `token` reproduces under `secret` from its own salt.
    ///
    /// Returns `Ok(false)` for a token without a `:` separator and [`Error::Decode`]
    /// when the salt isn't hex. The comparison runs in constant time.
    pub fn verify(token: &str, secret: &[u8]) -> Result<bool, Error> {
        let Some((_, salt)) = token.split_once(':') else {
            return Ok(false);
        };
        let salt = hex::decode(salt)?;
        let expected = Self::issue_with_salt(secret, &salt)?;

        Ok(expected.0.as_bytes().ct_eq(token.as_bytes()).into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CsrfToken").field(&"***").finish()
    }
}

impl fmt::Display for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
