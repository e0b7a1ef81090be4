//! Error taxonomy shared by every layer of the core: transport, the two HID++
//! channels, the device model's setters, and the commit engine. Every public
//! fallible operation returns [`RatbagError`] (or a `Result` alias of it) so
//! that an embedder can pattern-match on `kind()` instead of scraping strings.

use std::fmt;
use std::io;

use thiserror::Error;

/// A single error kind, matching the taxonomy in the design's error-handling
/// section. Kept separate from [`RatbagError`] so callers can compare kinds
/// without matching the full variant (which may carry a `#[source]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A transport read/write failed; the underlying errno is attached to
    /// the originating [`RatbagError::Io`].
    Io,
    /// The peripheral replied with a defined protocol error code.
    Protocol,
    /// The ready handshake exceeded its backoff budget.
    Timeout,
    /// The requested capability is not advertised by this device.
    Unsupported,
    /// A caller-supplied value is out of range or inconsistent.
    Value,
    /// The device is in an unexpected state; the caller should re-read.
    Device,
    /// No driver matches this device; no device object was created.
    NotFound,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Io => "io",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Value => "value",
            ErrorKind::Device => "device",
            ErrorKind::NotFound => "not_found",
        };
        f.write_str(s)
    }
}

/// A defined protocol-level error code as returned by a peripheral (HID++
/// error frame, vendor status byte, etc.). Carried verbatim so a caller can
/// log or compare against the device's own documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolCode(pub u8);

impl fmt::Display for ProtocolCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum RatbagError {
    #[error("I/O failure on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("device reported protocol error {code}")]
    Protocol { code: ProtocolCode },

    #[error("ready handshake timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("capability not advertised: {0}")]
    Unsupported(&'static str),

    #[error("value out of range or inconsistent: {0}")]
    Value(String),

    #[error("device in unexpected state: {0}")]
    Device(String),

    #[error("no driver matches this device")]
    NotFound,
}

impl RatbagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RatbagError::Io { .. } => ErrorKind::Io,
            RatbagError::Protocol { .. } => ErrorKind::Protocol,
            RatbagError::Timeout { .. } => ErrorKind::Timeout,
            RatbagError::Unsupported(_) => ErrorKind::Unsupported,
            RatbagError::Value(_) => ErrorKind::Value,
            RatbagError::Device(_) => ErrorKind::Device,
            RatbagError::NotFound => ErrorKind::NotFound,
        }
    }

    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        RatbagError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn protocol(code: u8) -> Self {
        RatbagError::Protocol {
            code: ProtocolCode(code),
        }
    }

    pub fn value(msg: impl Into<String>) -> Self {
        RatbagError::Value(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        RatbagError::Device(msg.into())
    }

    /// True for `protocol(busy)` (0x09), the only protocol error the core
    /// retries internally with bounded backoff.
    pub fn is_transient_busy(&self) -> bool {
        matches!(self, RatbagError::Protocol { code } if code.0 == 0x09)
    }
}

pub type Result<T> = std::result::Result<T, RatbagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(RatbagError::NotFound.kind(), ErrorKind::NotFound);
        assert_eq!(RatbagError::protocol(0x03).kind(), ErrorKind::Protocol);
        assert_eq!(
            RatbagError::Timeout { attempts: 10 }.kind(),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn busy_is_transient() {
        assert!(RatbagError::protocol(0x09).is_transient_busy());
        assert!(!RatbagError::protocol(0x0b).is_transient_busy());
    }
}
