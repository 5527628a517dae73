use std::path::PathBuf;
use thiserror::Error;

/// A value could not cross the boundary. Recoverable; nothing was mutated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarshalError {
    #[error("host value of type '{type_name}' cannot be passed to lua")]
    UnsupportedHostType { type_name: &'static str },

    #[error("lua value of type '{type_name}' has no host representation")]
    UnsupportedGuestType { type_name: &'static str },

    #[error("reference belongs to a different lua session")]
    ForeignReference,

    #[error("attribute name is not valid UTF-8")]
    NonUtf8AttributeName,

    #[error("attribute name must be a string, not '{type_name}'")]
    AttributeNameType { type_name: &'static str },
}

/// Errors surfaced by the bridge to host callers.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error("lua syntax error: {message}")]
    Syntax { message: String },

    #[error("lua error: {message}")]
    Guest {
        message: String,
        traceback: Option<String>,
    },

    #[error("host callback failed: {message}")]
    HostCallback {
        message: String,
        traceback: Option<String>,
    },

    #[error("host object '{type_name}' has no attribute '{name}'")]
    MissingAttribute { type_name: String, name: String },

    /// The owning session was torn down. This is a programming error.
    #[error("reference outlived its lua session")]
    DanglingReference,

    #[error("reference was already released")]
    ReleasedReference,

    #[error("call depth limit of {limit} exceeded")]
    CallDepthExceeded { limit: usize },

    /// Internal invariant: a nested crossing did not restore the call depth.
    /// Only a bug in the bridge can produce it; callers never need to handle
    /// it as a normal outcome.
    #[error("boundary call depth unbalanced: expected {expected}, found {found}")]
    StackImbalance { expected: usize, found: usize },

    #[error("failed to read script '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid session config")]
    Config(#[from] serde_json::Error),
}

impl BridgeError {
    /// Message carried by a guest or host-callback failure, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            BridgeError::Syntax { message }
            | BridgeError::Guest { message, .. }
            | BridgeError::HostCallback { message, .. } => Some(message),
            _ => None,
        }
    }

    /// True for session-lifetime misuse, which callers should treat as fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::DanglingReference | BridgeError::StackImbalance { .. }
        )
    }
}

impl From<mlua::Error> for BridgeError {
    fn from(err: mlua::Error) -> Self {
        match err {
            mlua::Error::SyntaxError { message, .. } => BridgeError::Syntax { message },
            mlua::Error::CallbackError { traceback, cause } => BridgeError::HostCallback {
                message: root_message(&cause),
                traceback: Some(traceback),
            },
            other => BridgeError::Guest {
                message: root_message(&other),
                traceback: None,
            },
        }
    }
}

/// Innermost human-readable message of an mlua error chain.
fn root_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(message) | mlua::Error::MemoryError(message) => message.clone(),
        mlua::Error::CallbackError { cause, .. } | mlua::Error::WithContext { cause, .. } => {
            root_message(cause)
        }
        other => other.to_string(),
    }
}
