//! Error plumbing for the `rightsize` binary.
//!
//! Library crates expose typed error enums. Once those errors reach the binary, they are only ever displayed, so they
//! get folded into [`GenericError`] along with whatever context explains what was being attempted.

use std::error::Error;
use std::fmt::Display;

/// An opaque error type, with support for attaching context.
pub type GenericError = anyhow::Error;

/// Builds a [`GenericError`] from a format string and its arguments.
#[macro_export]
macro_rules! generic_error {
    ($($arg:tt)+) => { $crate::_anyhow!($($arg)+) };
}

#[doc(hidden)]
pub use anyhow::anyhow as _anyhow;

/// Folds typed errors into a [`GenericError`] with a description of what failed.
pub trait ErrorContext<T> {
    /// Wraps the error value with additional context.
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static;

    /// Wraps the error value with context that is only built once an error occurs.
    fn with_error_context<C, F>(self, f: F) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: Error + Send + Sync + 'static,
{
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| GenericError::new(e).context(context))
    }

    fn with_error_context<C, F>(self, f: F) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| GenericError::new(e).context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct WindowError;

    impl Display for WindowError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "window end precedes window start")
        }
    }

    impl Error for WindowError {}

    #[test]
    fn error_context_wraps_source() {
        let result: Result<(), WindowError> = Err(WindowError);
        let err = result.error_context("Failed to load checkpoint records.").unwrap_err();

        assert_eq!(err.to_string(), "Failed to load checkpoint records.");
        assert_eq!(err.root_cause().to_string(), "window end precedes window start");
    }

    #[test]
    fn with_error_context_is_lazy() {
        let result: Result<u32, WindowError> = Ok(7);
        let value = result
            .with_error_context(|| -> String { panic!("context should not be evaluated on success") })
            .unwrap();

        assert_eq!(value, 7);
    }

    #[test]
    fn generic_error_formats() {
        let err = generic_error!("unknown resource family '{}'", "lambda");
        assert_eq!(err.to_string(), "unknown resource family 'lambda'");
    }
}
