//! Error types shared by the registry, the dispatcher and the collaborators.

use std::path::PathBuf;

/// Result type alias for shell operations.
pub type Result<T> = std::result::Result<T, ShellError>;

/// Errors that can occur while building or driving the menu tree.
///
/// None of these terminate the process on their own: the dispatcher reports
/// them and keeps reading input. Only the startup code treats
/// [`ShellError::DuplicateNode`] as fatal.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// Unrecognized command or bad arguments.
    #[error("{0}")]
    UserInput(String),

    /// A plugin could not be registered (bad descriptor, duplicate type, bad manifest).
    #[error("failed to load plugin '{plugin}': {reason}")]
    PluginLoad { plugin: String, reason: String },

    /// The persisted configuration is unreadable or corrupt.
    #[error("config file '{path}': {reason}")]
    ConfigIo { path: PathBuf, reason: String },

    /// Reading a pagination keystroke failed.
    #[error("terminal error: {0}")]
    TerminalIo(#[source] std::io::Error),

    /// Two node types share a type name or a node name.
    #[error("duplicate menu node '{0}'")]
    DuplicateNode(String),

    /// A node type was requested that was never registered.
    #[error("unknown menu node type '{0}'")]
    UnknownNode(String),

    /// A node's setup hook failed, so the node was not constructed.
    #[error("failed to set up menu '{node}'")]
    Setup {
        node: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Shorthand for a [`ShellError::UserInput`] error.
    pub fn input(msg: impl Into<String>) -> Self {
        ShellError::UserInput(msg.into())
    }
}
