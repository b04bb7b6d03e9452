use thiserror::Error;

use crate::metadata::token::Token;

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

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Lookups throughout the crate return [`Option`] and never produce an error; this enum covers
/// the failure modes of I/O, image decoding, body mutation and interpretation.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - Corrupted or invalid module image / symbol companion
/// - [`Error::OutOfBounds`] - Attempted to read beyond the input buffer
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Serialization`] - Payload (de)serialization failure
///
/// ## Model Errors
/// - [`Error::ModuleNotFound`] - A module that was required could not be located
/// - [`Error::ModuleNotLoaded`] - The session has no module with this name
/// - [`Error::NoBody`] - Body mutation on a method without a body
/// - [`Error::InstructionNotInBody`] - A reference instruction is not part of the body
///
/// ## Rewrite Errors
/// - [`Error::MissingRuntimeMember`] - The dispatch hook is missing from the runtime assembly
/// - [`Error::InvalidDirective`] - A work-set directive is malformed
/// - [`Error::WriteFailed`] - Writing a module back to disk failed
/// - [`Error::Emulation`] - The verification interpreter hit an unsupported construct
///
/// # Examples
///
/// ```rust,no_run
/// use dotpatch::{Error, project::{Session, SessionConfig}};
///
/// let mut session = Session::open(SessionConfig::new("Library/ScriptAssemblies"));
/// match session.load("Assembly-CSharp") {
///     Ok(_) => println!("loaded"),
///     Err(Error::ModuleNotFound(path)) => eprintln!("no such module: {}", path),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed image: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the input.
    #[error("Out of Bound read would have occurred - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Failed to encode or decode a serialized payload.
    #[error("Serialization failed - {0}")]
    Serialization(String),

    /// The module image could not be found on disk.
    #[error("Module not found - {0}")]
    ModuleNotFound(String),

    /// The session holds no module with the requested name.
    #[error("Module is not loaded - {0}")]
    ModuleNotLoaded(String),

    /// A body mutation was requested on a method that has no body.
    #[error("Method has no body - {0}")]
    NoBody(Token),

    /// The reference instruction is not (or no longer) part of the method body.
    #[error("Instruction {0} is not part of the method body")]
    InstructionNotInBody(u32),

    /// Writing a module back to disk failed. The original file is left untouched.
    #[error("Failed to write module '{module}' - {source}")]
    WriteFailed {
        /// Name of the module that failed to write
        module: String,
        /// The underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The runtime assembly lacks a type or method the rewriter calls into.
    #[error("Runtime member not found - {0}")]
    MissingRuntimeMember(String),

    /// A work-set directive could not be parsed.
    #[error("Invalid directive - {0}")]
    InvalidDirective(String),

    /// The verification interpreter could not execute a body.
    #[error("Emulation failed - {0}")]
    Emulation(String),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl From<bincode::Error> for Error {
    fn from(error: bincode::Error) -> Self {
        Error::Serialization(error.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error.to_string())
    }
}
