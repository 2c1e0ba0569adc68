//! Error types for persistence operations
//!
//! Failures are grouped by the strategy that produced them. Nothing is
//! caught or retried inside the engine; errors surface from the operation
//! that triggered the strategy call (`persist`, `restore`, `clear`, or
//! session initialization).

use thiserror::Error;

/// Errors that can occur while synchronizing state with storage
#[derive(Error, Debug)]
pub enum PersistError {
    /// The storage backend rejected a get/set/remove
    #[error("storage backend error: {0}")]
    Storage(anyhow::Error),

    /// The serialization strategy failed or produced an unusable value
    ///
    /// Also covers conversion between the typed state and its JSON
    /// projection, in either direction.
    #[error("serialization error: {0}")]
    Serialization(anyhow::Error),

    /// The merge strategy failed
    #[error("merge strategy error: {0}")]
    Merge(anyhow::Error),
}

impl PersistError {
    /// Wrap a storage backend failure
    pub fn storage(err: impl Into<anyhow::Error>) -> Self {
        PersistError::Storage(err.into())
    }

    /// Wrap a serialization failure
    pub fn serialization(err: impl Into<anyhow::Error>) -> Self {
        PersistError::Serialization(err.into())
    }

    /// Wrap a merge failure
    pub fn merge(err: impl Into<anyhow::Error>) -> Self {
        PersistError::Merge(err.into())
    }

    /// The strategy slot this error originated from
    pub fn strategy(&self) -> &'static str {
        match self {
            PersistError::Storage(_) => "storage",
            PersistError::Serialization(_) => "serialization",
            PersistError::Merge(_) => "merge",
        }
    }
}

/// Result type for persistence operations
pub type PersistResult<T> = Result<T, PersistError>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_storage_error_display() {
        let err = PersistError::storage(anyhow!("backend unreachable"));
        let msg = err.to_string();
        assert!(msg.contains("storage backend error"));
        assert!(msg.contains("backend unreachable"));
    }

    #[test]
    fn test_serialization_error_display() {
        let err = PersistError::serialization(anyhow!("bad payload"));
        assert!(err.to_string().contains("serialization error"));
    }

    #[test]
    fn test_merge_error_display() {
        let err = PersistError::merge(anyhow!("incompatible shapes"));
        assert!(err.to_string().contains("merge strategy error"));
    }

    #[test]
    fn test_strategy_classification() {
        assert_eq!(PersistError::storage(anyhow!("x")).strategy(), "storage");
        assert_eq!(
            PersistError::serialization(anyhow!("x")).strategy(),
            "serialization"
        );
        assert_eq!(PersistError::merge(anyhow!("x")).strategy(), "merge");
    }
}
