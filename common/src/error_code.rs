//! Stable error codes for identifying errors across process boundaries.
//!
//! Codes are formatted as `"TypeName::VariantName"` for enum variants
//! or `"TypeName"` for struct errors. The NDJSON server sends them to clients
//! and the CLI prints them next to the error message.

/// A trait for errors that have a unique, stable error code.
pub trait ErrorCode: std::error::Error {
    /// Returns the unique error code for this error.
    fn error_code(&self) -> &'static str;
}

impl<E: ErrorCode> ErrorCode for Box<E> {
    fn error_code(&self) -> &'static str {
        (**self).error_code()
    }
}

impl<E: ErrorCode> ErrorCode for &E {
    fn error_code(&self) -> &'static str {
        (*self).error_code()
    }
}

impl ErrorCode for crate::time::Expired {
    fn error_code(&self) -> &'static str {
        "Expired"
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use thiserror::Error;

    #[derive(Debug, Error)]
    enum StorageError {
        #[error("connection failed")]
        Connection,
        #[error("not found")]
        NotFound,
    }

    impl ErrorCode for StorageError {
        fn error_code(&self) -> &'static str {
            match self {
                Self::Connection => "StorageError::Connection",
                Self::NotFound => "StorageError::NotFound",
            }
        }
    }

    #[test]
    fn test_enum_error_code() {
        assert_eq!(
            StorageError::Connection.error_code(),
            "StorageError::Connection"
        );
        assert_eq!(StorageError::NotFound.error_code(), "StorageError::NotFound");
    }

    #[test]
    fn test_boxed_and_ref_error_code() {
        let err = Box::new(StorageError::Connection);
        assert_eq!(err.error_code(), "StorageError::Connection");
        let err = StorageError::NotFound;
        let err_ref = &err;
        assert_eq!(err_ref.error_code(), "StorageError::NotFound");
    }

    #[test]
    fn test_expired_error_code() {
        assert_eq!(crate::time::Expired.error_code(), "Expired");
    }
}
