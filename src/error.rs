//! Error types shared by every bookpipe component.
//!
//! Library modules return [`Result`]; the binary wraps these in `anyhow` for
//! context chains. Lint findings are data and never surface here.

use std::fmt::Write as _;
use std::path::PathBuf;

/// Top-level error for locating, configuring, assembling and building a book.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("book not found: '{identifier}' (searched in {})", root.display())]
    NotFound { identifier: String, root: PathBuf },

    #[error(
        "book identifier '{identifier}' is ambiguous; use a path or a more specific keyword:{}",
        list_paths(candidates)
    )]
    Ambiguous {
        identifier: String,
        candidates: Vec<PathBuf>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(
        "missing required artifact '{role}' ({file}); searched:{}",
        list_paths(searched)
    )]
    MissingArtifact {
        role: String,
        file: String,
        searched: Vec<PathBuf>,
    },

    #[error("assembly error at {}: {message}", path.display())]
    Assembly { path: PathBuf, message: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{format} converter failed: {message}")]
    Converter { format: String, message: String },

    #[error("validation failed for {}: {message}", path.display())]
    Validation { path: PathBuf, message: String },
}

/// Problems with a book's `book.yaml` declaration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no book.yaml found in {}", dir.display())]
    MissingFile { dir: PathBuf },

    #[error("parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("{} is missing required fields: {}", path.display(), fields.join(", "))]
    MissingFields {
        path: PathBuf,
        fields: Vec<&'static str>,
    },

    #[error("{}: invalid value for '{key}': {message}", path.display())]
    Invalid {
        path: PathBuf,
        key: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn assembly(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Assembly {
            path: path.into(),
            message: message.into(),
        }
    }
}

fn list_paths(paths: &[PathBuf]) -> String {
    let mut out = String::new();
    for path in paths {
        let _ = write!(out, "\n  - {}", path.display());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_lists_every_candidate() {
        let err = Error::Ambiguous {
            identifier: "draft".to_owned(),
            candidates: vec![
                PathBuf::from("manuscript/2_Draft"),
                PathBuf::from("manuscript/10_Drafted"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("'draft'"));
        assert!(msg.contains("manuscript/2_Draft"));
        assert!(msg.contains("manuscript/10_Drafted"));
    }

    #[test]
    fn missing_fields_are_joined() {
        let err = ConfigError::MissingFields {
            path: PathBuf::from("book.yaml"),
            fields: vec!["title", "prefix"],
        };
        assert_eq!(
            err.to_string(),
            "book.yaml is missing required fields: title, prefix"
        );
    }
}
