use kwdsl_core::ParseErrors;
use kwdsl_storage::StoreError;

/// Everything that can fail while executing a program.
///
/// Control flow (`break`, `continue`, `return`) never travels through this
/// type; see [`crate::Flow`].
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The source did not parse; nothing was executed.
    #[error("{0}")]
    Syntax(#[from] ParseErrors),

    #[error("keyword not found: {name}")]
    KeywordNotFound { name: String },

    /// A failed check. Test outcome depends on this staying distinguishable
    /// from every other failure, so it is never re-wrapped as `Keyword`.
    #[error("assertion failed: {message}")]
    Assertion { message: String },

    #[error("keyword '{keyword}' produced no result")]
    NoResult { keyword: String },

    #[error("{op} by zero")]
    DivisionByZero { op: &'static str },

    #[error("type error: {message}")]
    Type { message: String },

    #[error("invalid arguments for '{keyword}': {message}")]
    Argument { keyword: String, message: String },

    /// Failure raised by a keyword implementation.
    #[error("keyword '{keyword}' failed: {message}")]
    Keyword { keyword: String, message: String },

    /// The remote server ran the keyword and reported FAIL.
    #[error("remote keyword '{keyword}' failed: {message}{}", traceback_suffix(.traceback))]
    Remote {
        keyword: String,
        message: String,
        traceback: Vec<String>,
    },

    /// Connection refused, timeout or an unreadable response.
    #[error("remote call to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("cannot import '{path}': {message}")]
    Import { path: String, message: String },

    /// An `@data` source that is missing or unreadable.
    #[error("cannot load data from '{path}': {message}")]
    Data { path: String, message: String },

    #[error("global store error: {0}")]
    Store(#[from] StoreError),

    /// The first statement an error passed through, for diagnostics.
    #[error("line {line} ({node}): {source}")]
    Located {
        line: u32,
        node: &'static str,
        #[source]
        source: Box<ExecError>,
    },

    /// An interpreter bug rather than a problem with the program.
    #[error("internal error: {0}")]
    Internal(String),
}

fn traceback_suffix(traceback: &[String]) -> String {
    if traceback.is_empty() {
        String::new()
    } else {
        format!("\nremote traceback:\n{}", traceback.join("\n"))
    }
}

impl ExecError {
    pub fn keyword(keyword: impl Into<String>, message: impl Into<String>) -> Self {
        ExecError::Keyword {
            keyword: keyword.into(),
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        ExecError::Type {
            message: message.into(),
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        ExecError::Assertion {
            message: message.into(),
        }
    }

    /// The original error, beneath any location wrapper.
    pub fn root(&self) -> &ExecError {
        match self {
            ExecError::Located { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn into_root(self) -> ExecError {
        match self {
            ExecError::Located { source, .. } => source.into_root(),
            other => other,
        }
    }

    pub fn is_assertion(&self) -> bool {
        matches!(self.root(), ExecError::Assertion { .. })
    }

    /// Source line of the statement the error was raised in, if known.
    pub fn line(&self) -> Option<u32> {
        match self {
            ExecError::Located { line, .. } => Some(*line),
            _ => None,
        }
    }

    pub(crate) fn is_located(&self) -> bool {
        matches!(self, ExecError::Located { .. })
    }
}
