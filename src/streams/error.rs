use std::{error::Error, fmt, sync::Arc};
use thiserror::Error;

/// Errors surfaced by streams, controllers and readers.
///
/// The value is cheap to clone so a single stored error can reject the
/// reader's closed signal and every pending request.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// An operation was used in a state that does not allow it.
    #[error("TypeError: {0}")]
    Type(String),
    /// A numeric argument was out of bounds.
    #[error("RangeError: {0}")]
    Range(String),
    /// A value handed across the buffer layer had an unsupported shape.
    #[error("RuntimeError: {0}")]
    Runtime(String),
    /// An internal invariant did not hold.
    #[error("AssertionError: {0}")]
    Assertion(String),
    #[error("Stream task was dropped")]
    TaskDropped,
    #[error("{0}")]
    Other(#[source] Arc<dyn Error + Send + Sync>),
}

pub type StreamResult<T> = Result<T, StreamError>;

impl StreamError {
    pub fn type_error(message: impl Into<String>) -> Self {
        StreamError::Type(message.into())
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        StreamError::Range(message.into())
    }

    pub fn runtime_error(message: impl Into<String>) -> Self {
        StreamError::Runtime(message.into())
    }

    pub(crate) fn assertion(message: impl Into<String>) -> Self {
        StreamError::Assertion(message.into())
    }

    /// Wrap any error type into `StreamError`
    pub fn other<E>(e: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        StreamError::Other(Arc::new(e))
    }

    /// Wrap a boxed error
    pub fn other_boxed(e: Box<dyn Error + Send + Sync>) -> Self {
        StreamError::Other(e.into())
    }

    pub fn is_type_error(&self) -> bool {
        matches!(self, StreamError::Type(_))
    }

    pub fn is_range_error(&self) -> bool {
        matches!(self, StreamError::Range(_))
    }

    pub fn is_runtime_error(&self) -> bool {
        matches!(self, StreamError::Runtime(_))
    }
}

#[derive(Debug)]
struct SimpleError(String);

impl fmt::Display for SimpleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for SimpleError {}

impl From<&str> for StreamError {
    fn from(s: &str) -> Self {
        StreamError::Other(Arc::new(SimpleError(s.to_string())))
    }
}

impl From<String> for StreamError {
    fn from(s: String) -> Self {
        StreamError::Other(Arc::new(SimpleError(s)))
    }
}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        StreamError::Other(Arc::new(e))
    }
}

impl From<Box<dyn Error + Send + Sync>> for StreamError {
    fn from(e: Box<dyn Error + Send + Sync>) -> Self {
        StreamError::Other(e.into())
    }
}

/// Macro for users to add direct `From` implementations for their error types.
/// This allows using `?` directly without `.map_err(StreamError::other)`.
///
/// # Example
/// ```rust
/// use readable_streams::{StreamError, impl_stream_error_from};
///
/// #[derive(Debug)]
/// struct ParseError;
/// impl std::fmt::Display for ParseError {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         f.write_str("parse error")
///     }
/// }
/// impl std::error::Error for ParseError {}
///
/// impl_stream_error_from!(ParseError);
///
/// fn example() -> Result<(), StreamError> {
///     Err(ParseError)?;
///     Ok(())
/// }
/// assert!(example().is_err());
/// ```
#[macro_export]
macro_rules! impl_stream_error_from {
    ($($error_type:ty),* $(,)?) => {
        $(
            impl From<$error_type> for $crate::streams::error::StreamError {
                fn from(e: $error_type) -> Self {
                    $crate::streams::error::StreamError::Other(std::sync::Arc::new(e))
                }
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_conversions_work() {
        let _: StreamError = "error message".into();
        let _: StreamError = String::from("error").into();

        let io_err = std::io::Error::other("io error");
        let _: StreamError = io_err.into();

        #[derive(Debug)]
        struct CustomError;
        impl fmt::Display for CustomError {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "custom error")
            }
        }
        impl Error for CustomError {}

        let err = StreamError::other(CustomError);
        assert_eq!(err.to_string(), "custom error");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_question_mark_works() {
        fn returns_stream_error() -> Result<(), StreamError> {
            Err("stream error".into())
        }

        fn caller() -> Result<(), Box<dyn Error>> {
            returns_stream_error()?;
            Ok(())
        }

        let err = caller().unwrap_err();
        assert_eq!(err.to_string(), "stream error");
    }

    #[test]
    fn test_macro_usage_example() {
        #[derive(Debug)]
        struct UserCustomError(String);
        impl fmt::Display for UserCustomError {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "User error: {}", self.0)
            }
        }
        impl Error for UserCustomError {}

        impl_stream_error_from!(UserCustomError);

        fn user_function() -> Result<(), StreamError> {
            fn might_fail() -> Result<(), UserCustomError> {
                Err(UserCustomError("something went wrong".to_string()))
            }
            might_fail()?;
            Ok(())
        }

        let err = user_function().unwrap_err();
        assert_eq!(err.to_string(), "User error: something went wrong");
    }

    #[test]
    fn test_mixed_error_handling() {
        fn might_fail_boxed() -> Result<(), Box<dyn Error + Send + Sync>> {
            Err("json parse error".into())
        }

        fn run() -> Result<(), StreamError> {
            might_fail_boxed()?;
            Ok(())
        }

        assert!(might_fail_boxed().map_err(StreamError::other_boxed).is_err());
        assert_eq!(run().unwrap_err().to_string(), "json parse error");
    }

    #[test]
    fn kinds_render_with_their_class_prefix() {
        assert_eq!(
            StreamError::type_error("reader released").to_string(),
            "TypeError: reader released"
        );
        assert_eq!(
            StreamError::range_error("negative size").to_string(),
            "RangeError: negative size"
        );
        assert!(StreamError::type_error("x").is_type_error());
        assert!(StreamError::range_error("x").is_range_error());
        assert!(!StreamError::TaskDropped.is_type_error());
    }
}
