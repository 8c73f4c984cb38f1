// SPDX-License-Identifier: Apache-2.0

use super::frame::DhcpV4Encap;

const L2_ERROR: u32 = 1;
const L3_ERROR: u32 = 2;
const L4_ERROR: u32 = 3;
const DHCP_ERROR: u32 = 4;
const MISC_ERROR: u32 = 5;

const fn error_code(layer: u32, subtype: u32) -> u32 {
    (layer << 24) | ((subtype & 0xff) << 16)
}

/// Classification of a packet that could not be decoded.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[non_exhaustive]
pub enum DhcpV4ParseErrorKind {
    /// Buffer shorter than the minimum for the requested encapsulation.
    TooShort(DhcpV4Encap),
    WrongEthType,
    NotIpv4,
    InvalidIp,
    NotUdp,
    WrongPort,
    BadMagicCookie,
    NoCookie,
    /// Tagged with the option code.
    InvalidOptionLength,
    NoMessageType,
    DuplicateMessageType,
    UnknownMessageType,
    /// Tagged with the option code.
    BufferUnderflow,
    ReceiveError,
    ParsingError,
}

impl DhcpV4ParseErrorKind {
    pub fn code(&self) -> u32 {
        match self {
            Self::TooShort(DhcpV4Encap::L2) => error_code(L2_ERROR, 1),
            Self::WrongEthType => error_code(L2_ERROR, 2),
            Self::TooShort(DhcpV4Encap::L3) => error_code(L3_ERROR, 1),
            Self::NotIpv4 => error_code(L3_ERROR, 2),
            Self::InvalidIp => error_code(L3_ERROR, 3),
            Self::NotUdp => error_code(L4_ERROR, 1),
            Self::WrongPort => error_code(L4_ERROR, 2),
            Self::TooShort(DhcpV4Encap::Bootp) => error_code(DHCP_ERROR, 1),
            Self::BadMagicCookie => error_code(DHCP_ERROR, 2),
            Self::InvalidOptionLength => error_code(DHCP_ERROR, 3),
            Self::NoMessageType => error_code(DHCP_ERROR, 4),
            Self::UnknownMessageType => error_code(DHCP_ERROR, 5),
            Self::NoCookie => error_code(DHCP_ERROR, 6),
            Self::DuplicateMessageType => error_code(DHCP_ERROR, 7),
            Self::BufferUnderflow => error_code(MISC_ERROR, 1),
            Self::ReceiveError => error_code(MISC_ERROR, 2),
            Self::ParsingError => error_code(MISC_ERROR, 3),
        }
    }
}

impl std::fmt::Display for DhcpV4ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort(encap) => write!(f, "{encap}_too_short"),
            Self::WrongEthType => write!(f, "wrong_eth_type"),
            Self::NotIpv4 => write!(f, "not_ipv4"),
            Self::InvalidIp => write!(f, "invalid_ip"),
            Self::NotUdp => write!(f, "not_udp"),
            Self::WrongPort => write!(f, "wrong_port"),
            Self::BadMagicCookie => write!(f, "bad_magic_cookie"),
            Self::NoCookie => write!(f, "no_cookie"),
            Self::InvalidOptionLength => write!(f, "invalid_option_length"),
            Self::NoMessageType => write!(f, "no_message_type"),
            Self::DuplicateMessageType => write!(f, "duplicate_message_type"),
            Self::UnknownMessageType => write!(f, "unknown_message_type"),
            Self::BufferUnderflow => write!(f, "buffer_underflow"),
            Self::ReceiveError => write!(f, "receive_error"),
            Self::ParsingError => write!(f, "parsing_error"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DhcpV4ParseError {
    kind: DhcpV4ParseErrorKind,
    option: Option<u8>,
    msg: String,
}

impl DhcpV4ParseError {
    pub(crate) fn new(kind: DhcpV4ParseErrorKind, msg: String) -> Self {
        Self {
            kind,
            option: None,
            msg,
        }
    }

    pub(crate) fn with_option(
        kind: DhcpV4ParseErrorKind,
        option: u8,
        msg: String,
    ) -> Self {
        Self {
            kind,
            option: Some(option),
            msg,
        }
    }

    pub fn kind(&self) -> DhcpV4ParseErrorKind {
        self.kind
    }

    /// The DHCP option code the failure is attributed to, if any.
    pub fn option(&self) -> Option<u8> {
        self.option
    }

    pub fn msg(&self) -> &str {
        self.msg.as_str()
    }

    /// Stable numeric code for metrics: `(layer << 24) | (subtype << 16)`,
    /// with the offending option code in the low byte when known.
    pub fn code(&self) -> u32 {
        self.kind.code() | u32::from(self.option.unwrap_or(0))
    }
}

impl std::fmt::Display for DhcpV4ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.option {
            Some(opt) => write!(f, "{}({opt}): {}", self.kind, self.msg),
            None => write!(f, "{}: {}", self.kind, self.msg),
        }
    }
}

impl std::error::Error for DhcpV4ParseError {}

impl From<crate::DhcpError> for DhcpV4ParseError {
    fn from(e: crate::DhcpError) -> Self {
        Self::new(DhcpV4ParseErrorKind::ParsingError, e.msg().to_string())
    }
}
