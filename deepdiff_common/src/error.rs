use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeepDiffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Comparison cancelled")]
    Cancelled,

    /// A plug-in broke its contract (unrecognized failure shape, bogus
    /// member name, ...). Never absorbed into a comment; surfaces to the
    /// top level.
    #[error("Comparator contract violation: {0}")]
    Contract(String),
}

pub type Result<T> = std::result::Result<T, DeepDiffError>;

/// The only failure shapes a structural comparator may return.
/// Each one degrades to a byte-level comparison plus an explanatory
/// comment; none of them aborts the run.
#[derive(Error, Debug, Clone)]
pub enum ComparatorFailure {
    #[error("'{tool}' not available in path")]
    ToolNotFound {
        tool: String,
        /// Suggested package providing the tool, when known.
        package: Option<String>,
    },

    #[error("command `{command}` exited with {code}")]
    ToolFailed {
        command: String,
        code: i32,
        output: Vec<u8>,
    },

    #[error("error parsing output of `{command}`")]
    UnparseableOutput { command: String },
}

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("extraction failed: {0}")]
    Extraction(String),
}
