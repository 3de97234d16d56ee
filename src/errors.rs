use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShelfError {
    #[error("VALIDATION_ERROR: {0}")]
    Validation(String),
    #[error("INVALID_REFERENCE: {0}")]
    InvalidReference(String),
    #[error("DUPLICATE_ENTRY: {0}")]
    DuplicateEntry(String),
    #[error("PERSISTENCE_ERROR: {0}")]
    Persistence(String),
}

impl ShelfError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InvalidReference(_) => "invalid-reference",
            Self::DuplicateEntry(_) => "duplicate-entry",
            Self::Persistence(_) => "persistence",
        }
    }

    pub(crate) fn unknown(what: &str, id: &str) -> Self {
        Self::InvalidReference(format!("unknown {} {}", what, id))
    }
}

impl From<std::io::Error> for ShelfError {
    fn from(value: std::io::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<rusqlite::Error> for ShelfError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<serde_json::Error> for ShelfError {
    fn from(value: serde_json::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}

pub type ShelfResult<T> = Result<T, ShelfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_code_and_kind_is_stable() {
        let error = ShelfError::unknown("category", "c9");
        assert_eq!(error.kind(), "invalid-reference");
        assert_eq!(error.to_string(), "INVALID_REFERENCE: unknown category c9");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert_eq!(ShelfError::from(io).kind(), "persistence");
    }
}
