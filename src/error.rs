use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CvsError {
    #[error("Malformed CVSROOT '{root}': {reason}")]
    MalformedRoot { root: String, reason: String },

    #[error("Failed to establish transport to {target}: {source}")]
    TransportFailure {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("CVS server authorization failed: {0}")]
    AuthenticationFailure(String),

    #[error("CVS server does not support required requests: {}", .0.join(", "))]
    MissingCapability(Vec<String>),

    #[error("Protocol I/O error: {0}")]
    ProtocolIo(#[source] io::Error),

    #[error("Connection closed by CVS server")]
    ConnectionClosed,

    #[error("Truncated read: got {read} of {expected} bytes")]
    Truncated { read: usize, expected: usize },

    #[error("Unexpected reply in state {state}: {line}")]
    UnexpectedReply { state: String, line: String },

    #[error("CVS server error: {0}")]
    ServerError(String),

    #[error("File {path} rev {revision} is {size} bytes, above the {limit} byte memory limit")]
    FileTooLarge {
        path: String,
        revision: String,
        size: u64,
        limit: u64,
    },

    #[error("Consistency fault on {path}: {detail}")]
    ConsistencyFault { path: String, detail: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CvsError {
    pub(crate) fn unexpected(state: impl std::fmt::Debug, line: impl Into<String>) -> Self {
        CvsError::UnexpectedReply {
            state: format!("{:?}", state),
            line: line.into(),
        }
    }

    pub(crate) fn consistency(path: impl Into<String>, detail: impl Into<String>) -> Self {
        CvsError::ConsistencyFault {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn malformed_root(root: &str, reason: impl Into<String>) -> Self {
        CvsError::MalformedRoot {
            root: root.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the failure is confined to a single command and the session
    /// may still be usable afterwards.
    pub fn is_command_local(&self) -> bool {
        matches!(
            self,
            CvsError::ServerError(_) | CvsError::ConsistencyFault { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CvsError>;
