use std::path::PathBuf;

use thiserror::Error;

/// Which structural rule a field broke.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rule {
    #[error("missing poster_type discriminator")]
    MissingTag,

    #[error("unknown poster_type '{0}', expected one of: pie, bar, dual")]
    UnknownTag(String),

    #[error("field is required")]
    Missing,

    #[error("expected {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("must not be empty")]
    Empty,

    #[error("length {found} does not match {against} length {expected}")]
    LengthMismatch {
        found: usize,
        expected: usize,
        against: String,
    },

    #[error("'{value}' is not one of: {allowed}")]
    NotInEnum {
        value: String,
        allowed: &'static str,
    },
}

/// A configuration field failed validation. No partially valid config is
/// ever produced alongside one of these.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {rule}")]
pub struct ValidationError {
    pub field: String,
    pub rule: Rule,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, rule: Rule) -> Self {
        Self {
            field: field.into(),
            rule,
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no files uploaded")]
    NoFiles,

    #[error("failed to write upload {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum PosterError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("poster_type must be one of: 'pie', 'bar', 'dual' (got '{0}')")]
    UnknownPosterType(String),

    #[error("render failed: {0:#}")]
    Render(anyhow::Error),

    #[error("rendered file missing on disk: {}", .0.display())]
    MissingOutput(PathBuf),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("task join error: {0}")]
    Task(String),
}

impl PosterError {
    /// Errors caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::UnknownPosterType(_) | Self::Upload(UploadError::NoFiles)
        )
    }
}

pub type PosterResult<T> = Result<T, PosterError>;
