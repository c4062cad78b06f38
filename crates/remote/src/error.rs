use kwdsl_eval::ExecError;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Connection refused, timeout or a non-2xx HTTP status.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The server answered with something that is not a protocol message.
    #[error("unreadable response from {url}: {message}")]
    Protocol { url: String, message: String },

    #[error("{url} rejected the API key")]
    Unauthorized { url: String },

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    pub fn url(&self) -> Option<&str> {
        match self {
            RemoteError::Transport { url, .. }
            | RemoteError::Protocol { url, .. }
            | RemoteError::Unauthorized { url } => Some(url),
            RemoteError::Io(_) => None,
        }
    }
}

/// Every client-side failure reaches the DSL as a transport error.
impl From<RemoteError> for ExecError {
    fn from(e: RemoteError) -> Self {
        ExecError::Transport {
            url: e.url().unwrap_or("-").to_owned(),
            message: match &e {
                RemoteError::Transport { message, .. } | RemoteError::Protocol { message, .. } => {
                    message.clone()
                }
                other => other.to_string(),
            },
        }
    }
}
