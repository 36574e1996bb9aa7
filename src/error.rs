//! Error taxonomy shared by every pipeline stage.
//!
//! Page-level errors ([`ParseError`], [`RecognitionError`]) are recoverable: the
//! orchestrator records them against the page and moves on. [`PersistenceError`]
//! is site-level and [`ConfigurationError`] is process-fatal.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::runtime::Stage;

/// Markup could not be turned into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The body was empty or whitespace only.
    EmptyDocument,
    /// The body carries NUL bytes and is not markup.
    BinaryContent,
    /// The streaming rewriter rejected the markup.
    Rewrite(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyDocument => write!(f, "document is empty"),
            Self::BinaryContent => write!(f, "body contains binary content"),
            Self::Rewrite(message) => write!(f, "html rewrite error: {message}"),
        }
    }
}

impl Error for ParseError {}

impl From<lol_html::errors::RewritingError> for ParseError {
    fn from(err: lol_html::errors::RewritingError) -> Self {
        Self::Rewrite(err.to_string())
    }
}

/// The tagging/chunking capability failed on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// Tagger produced a different number of tags than tokens.
    TagCountMismatch {
        /// Tokens handed to the tagger.
        tokens: usize,
        /// Tags returned.
        tags: usize,
    },
    /// Input text cannot be tokenized (control characters, etc.).
    MalformedInput(String),
    /// The backend is not available.
    Unavailable(String),
}

impl fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TagCountMismatch { tokens, tags } => {
                write!(f, "tagger returned {tags} tags for {tokens} tokens")
            }
            Self::MalformedInput(message) => write!(f, "malformed recognizer input: {message}"),
            Self::Unavailable(message) => write!(f, "recognizer unavailable: {message}"),
        }
    }
}

impl Error for RecognitionError {}

/// Page-level failure tagged with the stage it happened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// Markup failure during normalization or link extraction.
    Parse {
        /// Stage that raised the error.
        stage: Stage,
        /// Underlying parse error.
        source: ParseError,
    },
    /// Entity recognition failure.
    Recognition(RecognitionError),
}

impl PageError {
    /// Stage the page failed in.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Parse { stage, .. } => *stage,
            Self::Recognition(_) => Stage::Recognized,
        }
    }
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { stage, source } => write!(f, "{stage}: {source}"),
            Self::Recognition(err) => write!(f, "{}: {err}", Stage::Recognized),
        }
    }
}

impl Error for PageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse { source, .. } => Some(source),
            Self::Recognition(err) => Some(err),
        }
    }
}

impl From<RecognitionError> for PageError {
    fn from(err: RecognitionError) -> Self {
        Self::Recognition(err)
    }
}

/// Writing a site's aggregate to an output collaborator failed.
#[derive(Debug)]
pub enum PersistenceError {
    /// Filesystem sink failure.
    Io {
        /// Sink path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// Record could not be encoded.
    Encode(serde_json::Error),
    /// Relational store failure.
    Database(tokio_postgres::Error),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to write {}: {source}", path.display()),
            Self::Encode(err) => write!(f, "failed to encode record: {err}"),
            Self::Database(err) => write!(f, "database write failed: {err}"),
        }
    }
}

impl Error for PersistenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Encode(err) => Some(err),
            Self::Database(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err)
    }
}

impl From<tokio_postgres::Error> for PersistenceError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Database(err)
    }
}

/// Process-fatal setup failure raised before any page is processed.
#[derive(Debug)]
pub enum ConfigurationError {
    /// Roster file could not be read.
    RosterUnreadable {
        /// Roster path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// Roster file is not valid UTF-8.
    RosterEncoding {
        /// Roster path.
        path: PathBuf,
        /// 1-based line number of the first invalid line.
        line: usize,
    },
    /// Page dump could not be read or decoded.
    Source {
        /// Dump path.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },
    /// Relational store unreachable or schema setup failed.
    Store(String),
    /// Invalid option combination or value.
    Invalid(String),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RosterUnreadable { path, source } => {
                write!(f, "failed to read roster {}: {source}", path.display())
            }
            Self::RosterEncoding { path, line } => {
                write!(f, "roster {} is not valid UTF-8 (line {line})", path.display())
            }
            Self::Source { path, message } => {
                write!(f, "failed to load pages from {}: {message}", path.display())
            }
            Self::Store(message) => write!(f, "store unavailable: {message}"),
            Self::Invalid(message) => write!(f, "invalid configuration: {message}"),
        }
    }
}

impl Error for ConfigurationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::RosterUnreadable { source, .. } => Some(source),
            _ => None,
        }
    }
}
