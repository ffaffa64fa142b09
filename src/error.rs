use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Request rejected before anything touched the region
    InvalidArgument(String),
    PayloadTooLarge { size: usize, max: usize },
    /// Window could not be established
    Map(String),
    OutOfBounds { offset: usize, len: usize, size: usize },
    /// Read back contents don't fit the wire layout
    ProtocolViolation(String),
    /// Remote side reported failure through RET_CODE
    Remote(i32),
    Timeout(Duration),
}

impl Error {
    /// Negative status code for callers that speak errno, remote codes are
    /// passed through untouched.
    pub fn errno(&self) -> i32 {
        return match self {
            Error::InvalidArgument(_) | Error::PayloadTooLarge { .. } => -libc::EINVAL,
            Error::Map(_) => -libc::ENOMEM,
            Error::OutOfBounds { .. } => -libc::EFAULT,
            Error::ProtocolViolation(_) => -libc::EPROTO,
            Error::Remote(code) => *code,
            Error::Timeout(_) => -libc::ETIMEDOUT,
        };
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        return Error::Map(format!("{}", err));
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidArgument(message) => write!(f, "invalid argument: {}", message),
            Error::PayloadTooLarge { size, max } => {
                write!(f, "payload of {} bytes exceeds limit of {}", size, max)
            }
            Error::Map(message) => write!(f, "failed to map shared region: {}", message),
            Error::OutOfBounds { offset, len, size } => write!(
                f,
                "access of {} bytes at {:#x} is outside the {} byte region",
                len, offset, size
            ),
            Error::ProtocolViolation(message) => write!(f, "protocol violation: {}", message),
            Error::Remote(code) => write!(f, "remote returned {}", code),
            Error::Timeout(after) => {
                write!(f, "remote did not acknowledge within {:?}", after)
            }
        }
    }
}

impl std::error::Error for Error {}
