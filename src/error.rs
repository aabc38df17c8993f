use std::fmt;

/// Builds an [`ApkError`] variant carrying a formatted message.
macro_rules! err {
    ($kind:ident, $msg:literal) => {
        $crate::error::ApkError::$kind(format!($msg))
    };
    ($kind:ident, $fmtstr:literal, $($args:tt)*) => {
        $crate::error::ApkError::$kind(format!($fmtstr, $($args)*))
    };
}

/// Returns early with an [`ApkError`] variant carrying a formatted message.
macro_rules! fail {
    ($kind:ident, $msg:literal) => {
        return Err(err!($kind, $msg))
    };
    ($kind:ident, $fmtstr:literal, $($args:tt)*) => {
        return Err(err!($kind, $fmtstr, $($args)*))
    };
}

/// Result alias used throughout the decoder.
pub type ApkResult<T> = Result<T, ApkError>;

/// Failures raised while decoding APK containers.
///
/// Every variant is unrecoverable for the input that produced it. The two tolerated
/// conditions of the binary XML format (a truncated trailing chunk and an out-of-range
/// resource map index) are not errors and never surface here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApkError {
    /// A read or slice went past the bounds of its view.
    BufferUnderflow(String),
    /// Chunk framing, size or offset inconsistency, or a repeated singleton chunk.
    MalformedChunk(String),
    /// An attribute could not be coerced to the requested type.
    UnresolvableAttribute(String),
    /// `minSdkVersion` names a platform codename that cannot be mapped to an API level.
    UnsupportedCodename(String),
    /// Bad ZIP signature or truncated ZIP record.
    ZipFormat(String),
    /// The APK is not well-formed, optionally caused by a lower level error.
    ApkFormat {
        message: String,
        cause: Option<Box<ApkError>>,
    },
}

impl ApkError {
    pub(crate) fn apk_format(message: impl Into<String>) -> Self {
        ApkError::ApkFormat {
            message: message.into(),
            cause: None,
        }
    }

    pub(crate) fn apk_format_caused_by(message: impl Into<String>, cause: ApkError) -> Self {
        ApkError::ApkFormat {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// The diagnostic message of this error, without the cause chain.
    pub fn message(&self) -> &str {
        match self {
            ApkError::BufferUnderflow(msg)
            | ApkError::MalformedChunk(msg)
            | ApkError::UnresolvableAttribute(msg)
            | ApkError::UnsupportedCodename(msg)
            | ApkError::ZipFormat(msg) => msg,
            ApkError::ApkFormat { message, .. } => message,
        }
    }
}

impl fmt::Display for ApkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApkError::BufferUnderflow(msg) => write!(f, "Buffer underflow: {msg}"),
            ApkError::MalformedChunk(msg) => write!(f, "Malformed binary XML: {msg}"),
            ApkError::UnresolvableAttribute(msg) => write!(f, "Unresolvable attribute: {msg}"),
            ApkError::UnsupportedCodename(msg) => write!(f, "Unsupported codename: {msg}"),
            ApkError::ZipFormat(msg) => write!(f, "Malformed ZIP: {msg}"),
            ApkError::ApkFormat { message, cause } => {
                write!(f, "Malformed APK: {message}")?;
                if let Some(cause) = cause {
                    write!(f, "\n{cause}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ApkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApkError::ApkFormat {
                cause: Some(cause), ..
            } => Some(cause.as_ref()),
            _ => None,
        }
    }
}
