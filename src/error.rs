use http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A layer was built without a usable secret or with unsupported settings.
    #[error("invalid configuration: {0}")]
    Config(&'static str),
    /// The token couldn't be found where the extractor looks for it.
    #[error("{0}")]
    Extraction(&'static str),
    /// The salt half of a CSRF token isn't valid hex.
    #[error("malformed csrf token: {0}")]
    Decode(#[from] hex::FromHexError),
    /// The CSRF token doesn't reproduce under the configured secret.
    #[error("invalid csrf token")]
    Forbidden,
    /// A form body carrying the token was larger than the configured limit.
    #[error("request body too large")]
    PayloadTooLarge,
    /// The signed token failed the algorithm, structure or signature checks.
    #[error("invalid or expired jwt")]
    Unauthorized,
    /// The operating system's random source failed while minting a salt.
    #[error("secure random source failed: {0}")]
    RandomSource(#[from] rand::Error),
    /// Maps the [`hmac::digest::InvalidLength`] error.
    #[error(transparent)]
    InvalidLength(#[from] hmac::digest::InvalidLength),
    /// An expected extension was missing.
    #[error("couldn't extract `{0}`. is the layer enabled?")]
    ExtensionNotFound(String),
}

impl Error {
    /// The status code a rejected request is answered with.
    ///
    /// Decode failures and MAC mismatches share `403` so clients can't tell them apart.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Extraction(_) => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Decode(_) | Error::Forbidden => StatusCode::FORBIDDEN,
            Error::Config(_)
            | Error::RandomSource(_)
            | Error::InvalidLength(_)
            | Error::ExtensionNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn make_layer_response<T: Default, E>(self) -> Result<http::Response<T>, E> {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(err = %self);
        } else {
            tracing::debug!(err = %self, %status, "request rejected");
        }

        let mut response = http::Response::default();
        *response.status_mut() = status;

        Ok(response)
    }
}
