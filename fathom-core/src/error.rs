//! Error types for Fathom core operations.
//!
//! All errors must be handled explicitly. No silent failures.

use std::fmt;

/// The result type for Fathom core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Fathom core operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An invalid argument was provided.
    InvalidArgument {
        /// The name of the argument.
        name: &'static str,
        /// Why it was invalid.
        reason: &'static str,
    },

    /// The requested resource was not found.
    NotFound {
        /// The type of resource.
        resource: &'static str,
        /// An identifier for the resource.
        id: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
            Self::NotFound { resource, id } => {
                write!(f, "{resource} not found: {id}")
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_display() {
        let err = Error::InvalidArgument {
            name: "local_node_id",
            reason: "not present in nodes",
        };
        assert_eq!(
            format!("{err}"),
            "invalid argument 'local_node_id': not present in nodes"
        );
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::NotFound {
            resource: "node",
            id: "n-7".to_string(),
        };
        assert_eq!(format!("{err}"), "node not found: n-7");
    }
}
