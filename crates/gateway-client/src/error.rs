use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("gateway connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("gateway handshake failed: {0}")]
    Handshake(String),

    #[error(transparent)]
    Transport(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("not connected to gateway")]
    NotConnected,

    #[error("gateway connection closed")]
    ConnectionClosed,

    #[error("{method} failed: {message}")]
    Rpc {
        method: String,
        code: Option<String>,
        message: String,
    },

    #[error("{method} timed out after {timeout:?}")]
    RequestTimeout { method: String, timeout: Duration },

    #[error("invalid {method} response: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid gateway url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("gateway client config: {0}")]
    Config(String),
}

impl Error {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_names_method() {
        let err = Error::Rpc {
            method: "sessions.list".into(),
            code: Some("UNAUTHORIZED".into()),
            message: "token rejected".into(),
        };
        assert_eq!(err.to_string(), "sessions.list failed: token rejected");
    }

    #[test]
    fn tungstenite_error_is_boxed_transport() {
        let err: Error = tokio_tungstenite::tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn url_error_converts() {
        let err: Error = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }
}
