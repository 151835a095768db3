//! Centralized error handling for Graphwire.
//!
//! This module provides a robust error handling system that strictly avoids panics,
//! ensuring that all failure conditions are properly propagated through the `Result` type.
//!
//! ## Design Philosophy
//!
//! Graphwire's error handling is designed with the following principles:
//!
//! 1. **No Panics:** All error conditions are represented as `Result` values. The library
//!    enforces this through `#![deny(clippy::panic)]` and `#![deny(clippy::unwrap_used)]`.
//!
//! 2. **Contextual Information:** Errors include descriptive messages that help diagnose
//!    the root cause of failures.
//!
//! 3. **Error Chaining:** Where possible, errors preserve the underlying cause through
//!    the `source()` method, enabling full error traces.
//!
//! 4. **Cloneable Errors:** The [`GraphwireError`] type is `Clone`, allowing a single fault
//!    to be recorded against every graph node that transitively depends on it.
//!
//! ## Error Categories
//!
//! Errors are categorized by their domain:
//!
//! - **I/O Errors** ([`GraphwireError::Io`]): Failures of the underlying byte sink or source
//! - **Format Errors** ([`GraphwireError::Format`]): Corrupt or ill-formed stream data
//! - **Resolution Errors** ([`GraphwireError::UnresolvedClass`],
//!   [`GraphwireError::UnresolvedConstant`]): Stream data referring to schemas or enum
//!   constants the local registry does not know
//! - **Optional Data** ([`GraphwireError::OptionalData`]): A read crossed the boundary of the
//!   custom data written for one object; recoverable by the custom read hook
//! - **Usage Errors** ([`GraphwireError::Usage`]): API called in a state that does not allow it
//! - **Aborted** ([`GraphwireError::Aborted`]): The writing peer recorded a fatal failure
//!   in-band; nothing after that point is trustworthy
//! - **Internal Errors** ([`GraphwireError::Internal`]): Logic errors (should not occur in
//!   production)

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for Graphwire operations.
///
/// This type alias is used throughout the library to simplify error handling.
/// It is equivalent to `std::result::Result<T, GraphwireError>`.
///
/// ## Examples
///
/// ```rust
/// use graphwire::Result;
///
/// fn my_function() -> Result<i32> {
///     Ok(42)
/// }
/// ```
pub type Result<T> = std::result::Result<T, GraphwireError>;

/// The master error enum covering all failure domains in Graphwire.
///
/// Each variant corresponds to a specific failure domain and contains contextual
/// information about the error.
///
/// ## Cloneability
///
/// This type is `Clone` so the same fault can be stored in many handle-table slots
/// (taint propagation marks every dependent of a failed node with the original error).
/// I/O errors are wrapped in `Arc` to make cloning efficient.
///
/// ## Examples
///
/// ```rust
/// use graphwire::GraphwireError;
///
/// fn check_error(err: &GraphwireError) {
///     match err {
///         GraphwireError::Io(e) => println!("I/O error: {}", e),
///         GraphwireError::Format(msg) => println!("Format error: {}", msg),
///         _ => println!("Other error"),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum GraphwireError {
    /// Low-level I/O failure of the underlying byte sink or source.
    ///
    /// The underlying `io::Error` is wrapped in an `Arc` to make the error `Clone`.
    Io(Arc<io::Error>),

    /// The stream is invalid, corrupted, or ill-formed.
    ///
    /// This error occurs when the bytes do not conform to the Graphwire stream grammar:
    ///
    /// - Wrong magic number or version in the stream header
    /// - An unknown or out-of-place type tag
    /// - A back-reference outside the assigned handle range
    /// - Malformed string data or a negative length
    ///
    /// The string contains a detailed description of the violation.
    Format(String),

    /// The stream names a class the local schema registry cannot resolve,
    /// or the local schema is version-incompatible with the stream descriptor.
    ///
    /// This fault taints the affected node and everything that depends on it,
    /// but unrelated sibling nodes in the same graph still decode.
    UnresolvedClass(String),

    /// The stream names an enum constant the local schema does not declare.
    UnresolvedConstant {
        /// Qualified name of the enum class.
        class: String,
        /// The constant name found on the stream.
        constant: String,
    },

    /// A read crossed the end of the custom data written for the current object.
    ///
    /// Custom read hooks receive this when they try to consume more than their
    /// level's writer produced. It is recoverable: the hook can stop reading and
    /// return, and the codec resynchronizes at the level terminator.
    OptionalData {
        /// Framed bytes still buffered for the current object, if any.
        length: usize,
        /// True when the custom data is fully exhausted (vs. a nested value
        /// boundary with `length` primitive bytes still pending).
        eof: bool,
    },

    /// The API was called in a state that does not allow it.
    ///
    /// Examples: reading a back-reference in an unshared context, calling
    /// `default_fields` outside a custom hook or twice for one level, switching
    /// the channel out of block-data mode with unconsumed framed bytes.
    Usage(String),

    /// The writing peer failed mid-stream and recorded its fault in-band.
    ///
    /// Everything already handed out by earlier reads is unaffected, but the
    /// stream position after this marker is not trustworthy.
    Aborted(String),

    /// Logic error in the codec or handle bookkeeping.
    ///
    /// This error should not occur in production. If you encounter this error, it likely
    /// indicates a bug in the library. Please report it with a minimal reproduction case.
    Internal(String),
}

impl fmt::Display for GraphwireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O Error: {e}"),
            Self::Format(s) => write!(f, "Format Error: {s}"),
            Self::UnresolvedClass(s) => write!(f, "Unresolved Class: {s}"),
            Self::UnresolvedConstant { class, constant } => {
                write!(f, "Unresolved Constant: {class}::{constant}")
            }
            Self::OptionalData { length, eof } => {
                if *eof {
                    write!(f, "Optional Data: custom data exhausted")
                } else {
                    write!(f, "Optional Data: {length} framed byte(s) pending")
                }
            }
            Self::Usage(s) => write!(f, "Usage Error: {s}"),
            Self::Aborted(s) => write!(f, "Aborted by Peer: {s}"),
            Self::Internal(s) => write!(f, "Internal Logic Error: {s}"),
        }
    }
}

impl std::error::Error for GraphwireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for GraphwireError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
