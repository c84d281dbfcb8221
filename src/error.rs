use thiserror::Error;

#[allow(unused_macros)]
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

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Most of these never reach the runtime hook. Per-unit failures (parsing a binary, evaluating
/// a matcher, weaving, asking the runtime to redeliver a unit) are caught at the decision
/// boundary, logged and turned into a no-op. Only setup-time failures of a registration, such
/// as [`Error::UnsupportedCapability`], are returned to the caller.
///
/// # Error Categories
///
/// ## Structure Errors
/// - [`Error::Malformed`] - The binary of a unit could not be parsed
/// - [`Error::NotSupported`] - The binary uses a format the builder does not understand
/// - [`Error::Empty`] - An empty binary was provided
///
/// ## Decision Errors
/// - [`Error::Match`] - The matcher failed while evaluating a structural view
/// - [`Error::Weave`] - The weaver failed while rewriting a binary
///
/// ## Runtime Errors
/// - [`Error::RetransformRejected`] - The runtime refused to redeliver a unit
/// - [`Error::UnsupportedCapability`] - An optional runtime capability is missing
///
/// ## Background Queue Errors
/// - [`Error::QueueFull`] - The retransform queue is at capacity
/// - [`Error::QueueClosed`] - The retransform worker has been shut down
///
/// # Examples
///
/// ```rust
/// use weavehook::Error;
///
/// let error = Error::UnsupportedCapability("native method prefix");
/// assert!(error.is_fatal());
///
/// let error = Error::Weave("stack map frames out of sync".to_string());
/// assert!(!error.is_fatal());
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The binary is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// This binary format is not supported by the structure builder.
    #[error("This binary format is not supported")]
    NotSupported,

    /// Provided binary was empty.
    #[error("Provided binary was empty")]
    Empty,

    /// The matcher failed while evaluating a structural view.
    #[error("Matcher failed - {0}")]
    Match(String),

    /// The weaver failed while rewriting a binary.
    #[error("Weaver failed - {0}")]
    Weave(String),

    /// The runtime refused to redeliver a unit through the transform hook.
    ///
    /// Typical causes are a unit that has been unloaded in the meantime, or a
    /// rewrite the runtime considers an incompatible schema change.
    #[error("Retransform of {unit} rejected: {reason}")]
    RetransformRejected {
        /// Name of the unit the runtime refused to redeliver
        unit: String,
        /// Reason reported by the runtime
        reason: String,
    },

    /// An optional runtime capability was requested but is not available.
    ///
    /// This is fatal to the setup of a registration. Continuing without the
    /// capability would install incorrect rewrites.
    #[error("Runtime capability not supported: {0}")]
    UnsupportedCapability(&'static str),

    /// The background retransform queue is at capacity.
    #[error("Retransform queue is full")]
    QueueFull,

    /// The background retransform worker no longer accepts work.
    #[error("Retransform queue is closed")]
    QueueClosed,

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Returns `true` if this error came from turning a binary into a structural view.
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Error::Malformed { .. } | Error::NotSupported | Error::Empty
        )
    }

    /// Returns `true` if this error must be reported to the owner of a registration
    /// instead of being swallowed at the hook boundary.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::UnsupportedCapability(_))
    }
}
