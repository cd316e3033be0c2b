//! Errors

use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = anyhow::Result<T, Error>;

/// Error taxonomy for descriptor construction, statement building, value conversion and
/// execution.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid field or table configuration. Raised while descriptors are built and never
    /// worth retrying.
    #[error("configuration error: {0}")]
    Config(String),

    /// A builder was finalized in an inconsistent state, before any SQL reached a connection.
    #[error("builder state error: {0}")]
    BuilderState(String),

    /// A persister rejected a value, or a null reached a field that refuses nulls.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// A named table, column or row could not be found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Propagated unchanged from the connection layer.
    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

impl Error {
    /// Returns `true` for errors raised by the connection layer.
    #[must_use]
    pub const fn is_driver(&self) -> bool {
        matches!(self, Self::Driver(_))
    }
}

/// Builds an [`Error::Config`] from a format string.
#[macro_export]
macro_rules! config_err {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Config(format!($fmt, $($arg)*))
    };
    ($desc:expr $(,)?) => {
        $crate::Error::Config(format!($desc))
    };
}

/// Builds an [`Error::BuilderState`] from a format string.
#[macro_export]
macro_rules! builder_err {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::BuilderState(format!($fmt, $($arg)*))
    };
    ($desc:expr $(,)?) => {
        $crate::Error::BuilderState(format!($desc))
    };
}

/// Builds an [`Error::Conversion`] from a format string.
#[macro_export]
macro_rules! conversion_err {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Conversion(format!($fmt, $($arg)*))
    };
    ($desc:expr $(,)?) => {
        $crate::Error::Conversion(format!($desc))
    };
}

#[cfg(test)]
mod tests {
    use anyhow::{Context, anyhow};

    use super::Error;

    #[test]
    fn error_display() {
        let err = builder_err!("UPDATE statements must have at least one SET column");
        assert_eq!(
            err.to_string(),
            "builder state error: UPDATE statements must have at least one SET column"
        );

        let err = config_err!("field '{}' cannot be both id and foreign", "owner");
        assert_eq!(err.to_string(), "configuration error: field 'owner' cannot be both id and foreign");
    }

    #[test]
    fn driver_errors_pass_through() {
        let result = Err::<(), anyhow::Error>(anyhow!("disk I/O error")).context("running query");
        let err: Error = result.unwrap_err().into();

        assert!(err.is_driver());
        assert_eq!(err.to_string(), "running query");
    }
}
