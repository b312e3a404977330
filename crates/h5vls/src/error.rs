//! Error type shared by the container helpers and the VLS subsystem.

use h5vls_format::error::FormatError;
use thiserror::Error;

/// Errors raised while opening, validating or streaming HDF5 content.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HDF5 format error: {0}")]
    Format(#[from] FormatError),

    /// An object has the wrong class, type or shape. `message` is complete
    /// and names `path` where one is known.
    #[error("{message}")]
    Schema { path: String, message: String },

    /// Pointers or positions outside the data they address.
    #[error("{message}")]
    OutOfRange { message: String },

    /// Nothing of the expected kind exists at `path`.
    #[error("expected a {expected} at '{path}'")]
    NotFound { path: String, expected: &'static str },

    /// The file itself could not be opened.
    #[error("{message}")]
    Open { path: String, message: String },
}

impl Error {
    pub(crate) fn schema(path: impl Into<String>, message: impl Into<String>) -> Error {
        Error::Schema {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn out_of_range(message: impl Into<String>) -> Error {
        Error::OutOfRange {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_message() {
        let err = Error::schema("/x", "expected an integer datatype for the VLS heap at '/x'");
        assert_eq!(err.to_string(), "expected an integer datatype for the VLS heap at '/x'");

        let err = Error::NotFound {
            path: "grp/ds".into(),
            expected: "dataset",
        };
        assert_eq!(err.to_string(), "expected a dataset at 'grp/ds'");
    }

    #[test]
    fn format_errors_convert() {
        let err: Error = FormatError::SignatureNotFound.into();
        assert!(matches!(err, Error::Format(FormatError::SignatureNotFound)));
    }
}
