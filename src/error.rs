use std::sync::Arc;

use thiserror::Error;

/// Engine-wide result type alias.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Recoverable tree engine errors.
///
/// Structural misuse (an out-of-range path, an unknown item handed to
/// `get_node` or `refresh`) is a programmer error and panics instead;
/// use `has_node` to validate untrusted lookups.
///
/// The type is `Clone` because a single fetch may have several merged
/// callers waiting on it, and each observes the same outcome.
#[derive(Debug, Clone, Error)]
pub enum TreeError {
    /// The children source failed to produce a child list. The node's
    /// previously materialized children are left untouched and the node
    /// stays eligible for a retry.
    #[error("children fetch failed: {0}")]
    Fetch(Arc<dyn std::error::Error + Send + Sync>),

    /// A fetch completed for a node that was removed while the fetch was
    /// in flight. The late result is discarded, never re-inserted.
    #[error("children fetch cancelled: node no longer exists")]
    Cancelled,
}

impl TreeError {
    /// Wrap an arbitrary source error as a fetch failure.
    pub fn fetch(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        TreeError::Fetch(Arc::new(err))
    }
}

impl From<std::io::Error> for TreeError {
    fn from(err: std::io::Error) -> Self {
        TreeError::fetch(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory");
        let err: TreeError = io_err.into();
        assert!(matches!(err, TreeError::Fetch(_)));
        assert!(err.to_string().contains("no such directory"));
    }

    #[test]
    fn fetch_error_display() {
        let err = TreeError::fetch(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(err.to_string(), "children fetch failed: denied");
    }

    #[test]
    fn cancelled_display() {
        assert_eq!(
            TreeError::Cancelled.to_string(),
            "children fetch cancelled: node no longer exists"
        );
    }

    #[test]
    fn errors_are_cloneable() {
        let err = TreeError::fetch(std::io::Error::other("boom"));
        let clone = err.clone();
        assert_eq!(err.to_string(), clone.to_string());
    }
}
