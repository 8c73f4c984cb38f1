// SPDX-License-Identifier: Apache-2.0

use crate::DhcpV4ParseError;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum ErrorKind {
    InvalidArgument,
    InvalidDhcpMessage,
    NoLease,
    IoError,
    Bug,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DhcpError {
    kind: ErrorKind,
    msg: String,
}

impl DhcpError {
    pub fn new(kind: ErrorKind, msg: String) -> Self {
        Self { kind, msg }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn msg(&self) -> &str {
        self.msg.as_str()
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::fmt::Display for DhcpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.msg)
    }
}

impl std::error::Error for DhcpError {}

pub(crate) trait ErrorContext<T> {
    fn context<S: std::fmt::Display>(self, msg: S) -> Result<T, DhcpError>;
}

impl<T> ErrorContext<T> for Result<T, DhcpError> {
    fn context<S: std::fmt::Display>(self, msg: S) -> Result<T, DhcpError> {
        self.map_err(|e| DhcpError::new(e.kind, format!("{msg}: {}", e.msg)))
    }
}

impl From<std::io::Error> for DhcpError {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::IoError, format!("IO error: {e}"))
    }
}

impl From<std::ffi::NulError> for DhcpError {
    fn from(e: std::ffi::NulError) -> Self {
        Self::new(ErrorKind::InvalidArgument, format!("CString error: {e}"))
    }
}

impl From<tokio::time::error::Elapsed> for DhcpError {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Self::new(ErrorKind::IoError, format!("Socket operation timeout: {e}"))
    }
}

impl From<DhcpV4ParseError> for DhcpError {
    fn from(e: DhcpV4ParseError) -> Self {
        Self::new(ErrorKind::InvalidDhcpMessage, e.to_string())
    }
}

#[cfg(feature = "netlink")]
impl From<rtnetlink::Error> for DhcpError {
    fn from(e: rtnetlink::Error) -> Self {
        Self::new(ErrorKind::IoError, format!("Netlink error: {e}"))
    }
}
