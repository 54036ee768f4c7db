use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! transform_error {
    ($unit:expr, $fmt:expr) => {
        crate::Error::TransformFailure {
            unit: $unit.to_string(),
            message: $fmt.to_string(),
        }
    };

    ($unit:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::TransformFailure {
            unit: $unit.to_string(),
            message: format!($fmt, $($arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Class-file parsing
/// - [`Error::Malformed`] - Corrupted or structurally invalid class file
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the input
/// - [`Error::NotSupported`] - Not a class file, or a construct this crate does not handle
/// - [`Error::Empty`] - Empty input provided
///
/// ## Bytecode assembly
/// - [`Error::InvalidOpcode`], [`Error::InvalidBranch`], [`Error::DuplicateLabel`],
///   [`Error::UndefinedLabel`], [`Error::StackUnderflow`]
///
/// ## Unit resolution
/// - [`Error::NotFound`] - The byte source has no bytes for an owned name
/// - [`Error::TransformFailure`] - A member had a shape the transformer can not rewrite
/// - [`Error::InvariantViolation`] - Loader or policy programming error, never recoverable
/// - [`Error::ResolutionFailed`] - Wraps any of the above as surfaced by
///   [`crate::Loader::resolve`]
///
/// # Examples
///
/// ```rust,no_run
/// use shadowloader::{Error, ClassFile};
///
/// match ClassFile::parse(&[0xCA, 0xFE]) {
///     Ok(_) => println!("parsed"),
///     Err(Error::OutOfBounds { .. }) => println!("truncated input"),
///     Err(e) => println!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The class file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing.
    #[error("Out of Bound read would have occurred - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// This input is not supported.
    #[error("This input is not supported - {0}")]
    NotSupported(String),

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while a byte source reads unit bytes.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// An opcode that is not part of the JVM instruction set was encountered.
    #[error("Invalid opcode - 0x{0:02X}")]
    InvalidOpcode(u8),

    /// A branch was emitted that can not be encoded.
    #[error("Invalid branch - {0}")]
    InvalidBranch(String),

    /// A label was defined twice within one encoder.
    #[error("Duplicate label - {0}")]
    DuplicateLabel(String),

    /// A branch referenced a label that was never defined.
    #[error("Undefined label - {0}")]
    UndefinedLabel(String),

    /// Stack tracking detected more pops than values on the operand stack.
    #[error("Operand stack underflow at instruction '{0}'")]
    StackUnderflow(&'static str),

    /// The byte source has no bytes for a name this loader owns.
    #[error("Cannot resolve named unit - {0}")]
    NotFound(String),

    /// A member of the unit has a shape the transformer can not rewrite.
    ///
    /// Aborts instrumentation of this one unit only; it is never retried.
    #[error("Failed to transform {unit}: {message}")]
    TransformFailure {
        /// Fully-qualified name of the unit being instrumented
        unit: String,
        /// Description of the malformed shape
        message: String,
    },

    /// An internal invariant of the loader or its policy was broken.
    ///
    /// Indicates a programming error (an acquired name the loader does not own, or a
    /// duplicate definition), never a user-recoverable condition.
    #[error("Invariant violation - {0}")]
    InvariantViolation(String),

    /// Unit resolution failed, wrapping the specific cause.
    #[error("Unit resolution failed for {name}: {source}")]
    ResolutionFailed {
        /// Fully-qualified name that was being resolved
        name: String,
        /// The specific cause
        #[source]
        source: Box<Error>,
    },

    /// Failed to lock target.
    ///
    /// Occurs when a per-name resolution lock was poisoned by a panicking thread.
    #[error("Failed to lock target")]
    LockError,

    /// Execution of generated code in the dispatch emulator failed.
    #[error("Emulation failed - {0}")]
    Emulation(String),
}

impl Error {
    /// Returns the innermost cause, unwrapping any [`Error::ResolutionFailed`] layers.
    #[must_use]
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::ResolutionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_nested_resolution_failures() {
        let error = Error::ResolutionFailed {
            name: "a.Outer".to_string(),
            source: Box::new(Error::ResolutionFailed {
                name: "a.Inner".to_string(),
                source: Box::new(Error::NotFound("a.Inner".to_string())),
            }),
        };

        assert!(matches!(error.root_cause(), Error::NotFound(name) if name == "a.Inner"));
        assert!(error.to_string().contains("a.Outer"));
    }

    #[test]
    fn test_malformed_macro_records_location() {
        let error = malformed_error!("bad magic {:08X}", 0xDEADBEEF_u32);
        match error {
            Error::Malformed {
                message, file, line,
            } => {
                assert_eq!(message, "bad magic DEADBEEF");
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
            }
            _ => panic!("expected Malformed"),
        }
    }
}
