//! Error taxonomy for the submission engine.
//!
//! Errors fall into the categories the callers need to tell apart:
//! definition parse failures (always reported as a full batch), import
//! fetch failures, packaging failures, transport failures and the
//! per-submission categories of [`SubmissionError`]. Cancellation is not an
//! error; see [`crate::submission::SubmissionOutcome`].

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// A single problem found while reading a definitions document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

/// The complete, non-empty list of problems found in one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseErrors(pub Vec<ParseError>);

impl ParseErrors {
    pub fn errors(&self) -> &[ParseError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} error(s) in submission definitions:", self.0.len())?;
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {error}")?;
        }
        Ok(())
    }
}

/// Errors raised by the target tree and anything that reads it.
///
/// Read accessors on an import group can trigger a fetch, so every
/// accessor that may touch one returns this type.
#[derive(Debug, Clone, Error)]
pub enum TargetError {
    #[error("{0}")]
    Parse(ParseErrors),

    #[error("failed to fetch submission definitions from {href}: {message}")]
    Fetch { href: String, message: String },

    #[error("import group '{name}' has not been loaded yet")]
    NotLoaded { name: String },

    #[error("invalid import reference '{href}': {message}")]
    InvalidHref { href: String, message: String },

    #[error("no submission definitions have been opened")]
    NoDefinitions,

    #[error("unknown target node #{0}")]
    UnknownTarget(usize),

    #[error("target node #{target} does not support {operation}")]
    Unsupported {
        target: usize,
        operation: &'static str,
    },
}

impl From<ParseErrors> for TargetError {
    fn from(errors: ParseErrors) -> Self {
        TargetError::Parse(errors)
    }
}

/// Errors raised while enumerating a project and writing an archive.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("I/O error while packaging: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("packaging was canceled")]
    Canceled,
}

/// Errors raised by protocol implementations while transmitting.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("FTP server replied {code}: {message}")]
    Ftp { code: u16, message: String },

    #[error("invalid destination '{uri}': {reason}")]
    InvalidDestination { uri: String, reason: String },

    #[error(transparent)]
    Packaging(#[from] PackageError),

    #[error(transparent)]
    Target(#[from] TargetError),
}

/// Categorized failure of one submission attempt.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("'{0}' is not an assignment and cannot be submitted to")]
    NotActionable(String),

    #[error("required files are missing: {}", .0.join(", "))]
    RequiredFilesMissing(Vec<String>),

    #[error("malformed transport '{transport}': {reason}")]
    MalformedTransport { transport: String, reason: String },

    #[error("the protocol '{0}' is not registered")]
    UnregisteredProtocol(String),

    #[error("the packager '{0}' is not registered")]
    UnregisteredPackager(String),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("packaging failed: {0}")]
    Packaging(#[from] PackageError),

    #[error("{scheme} transfer failed: {source}")]
    Transport {
        scheme: String,
        #[source]
        source: ProtocolError,
    },
}

impl SubmissionError {
    /// Text suitable for showing to the person who pressed "submit".
    pub fn user_message(&self) -> String {
        match self {
            SubmissionError::NotActionable(name) => format!(
                "'{name}' is a group, not an assignment. Choose an assignment to submit to."
            ),
            SubmissionError::RequiredFilesMissing(missing) => format!(
                "Your project is missing files that this assignment requires:\n{}\nAdd them and submit again.",
                missing
                    .iter()
                    .map(|m| format!("  {m}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
            SubmissionError::MalformedTransport { transport, reason } if transport.is_empty() => {
                format!("This assignment has no submission destination ({reason}). Contact your instructor.")
            }
            SubmissionError::MalformedTransport { transport, reason } => format!(
                "The submission destination '{transport}' is invalid ({reason}). The submission definitions may contain an error; contact your instructor."
            ),
            SubmissionError::UnregisteredProtocol(scheme) => format!(
                "No plug-in is installed for the '{scheme}' protocol. The submission definitions may contain a typo, or a plug-in is missing."
            ),
            SubmissionError::UnregisteredPackager(id) => format!(
                "No packager named '{id}' is installed. The submission definitions may contain a typo, or a plug-in is missing."
            ),
            SubmissionError::Target(e) => {
                format!("The submission definitions could not be read:\n{e}")
            }
            SubmissionError::Packaging(e) => {
                format!("Your project could not be packaged for submission: {e}")
            }
            SubmissionError::Transport { scheme, source } => match scheme.as_str() {
                "http" | "https" | "ftp" => format!(
                    "The submission could not be sent ({source}). Check your network connection and try again."
                ),
                _ => format!("The submission could not be written: {source}"),
            },
        }
    }
}
