use serde::{Deserialize, Serialize};
use std::fmt;

/// A lexical or syntax error, located by source line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: u32,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        SyntaxError {
            line,
            message: message.into(),
        }
    }

    pub fn lex(line: u32, message: impl Into<String>) -> Self {
        SyntaxError::new(line, format!("lexical error: {}", message.into()))
    }

    pub fn parse(line: u32, message: impl Into<String>) -> Self {
        SyntaxError::new(line, message)
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "line": self.line,
            "message": self.message,
        })
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for SyntaxError {}

/// Every error recorded while parsing one source text. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} syntax error(s); first at {}", .errors.len(), first_of(.errors))]
pub struct ParseErrors {
    pub errors: Vec<SyntaxError>,
}

fn first_of(errors: &[SyntaxError]) -> String {
    errors
        .first()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "<none>".to_owned())
}

impl ParseErrors {
    pub fn iter(&self) -> impl Iterator<Item = &SyntaxError> {
        self.errors.iter()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}
