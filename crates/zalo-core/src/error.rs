use thiserror::Error;

/// Errors produced by the Zalo protocol layer.
#[derive(Debug, Error)]
pub enum ZaloError {
    /// No usable response: network failure, non-2xx without an envelope,
    /// or a body that is not JSON.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-zero `error_code`.
    #[error("error #{code} from service: {message}")]
    Protocol { code: i64, message: String },

    /// An envelope payload could not be inverted with the session secret.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid secret key: {0}")]
    InvalidSecret(String),

    /// Usage failure detected before any network call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not logged in")]
    NotLoggedIn,

    #[error("login failed: {0}")]
    Login(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ZaloError {
    /// Build a protocol error from a code and message.
    pub fn protocol(code: i64, message: impl Into<String>) -> Self {
        ZaloError::Protocol {
            code,
            message: message.into(),
        }
    }

    /// The service error code, if this is a protocol error.
    pub fn code(&self) -> Option<i64> {
        match self {
            ZaloError::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the error points at an expired or invalid session.
    ///
    /// Decode failures almost always mean the secret no longer matches the
    /// server side; the caller should log in again rather than retry.
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            ZaloError::Decode(_) | ZaloError::InvalidSecret(_) | ZaloError::NotLoggedIn
        )
    }
}

pub type ZaloResult<T> = Result<T, ZaloError>;
