use thiserror::Error;

/// Violations of field-level invariants on domain records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("`{field}` must not be blank")]
    Blank { field: &'static str },
    #[error("`{field}` must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("`{value}` is not a valid {kind}")]
    Malformed { kind: &'static str, value: String },
}

impl DomainError {
    pub fn blank(field: &'static str) -> Self {
        Self::Blank { field }
    }

    pub fn too_long(field: &'static str, max: usize) -> Self {
        Self::TooLong { field, max }
    }

    pub fn malformed(kind: &'static str, value: impl Into<String>) -> Self {
        Self::Malformed {
            kind,
            value: value.into(),
        }
    }

    /// Name of the offending form field, when the error maps to one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Blank { field } | Self::TooLong { field, .. } => Some(*field),
            Self::Malformed { kind, .. } => Some(*kind),
        }
    }
}
