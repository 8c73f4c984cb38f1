// SPDX-License-Identifier: Apache-2.0

use std::{cmp::Ordering, collections::HashMap, net::Ipv4Addr};

use super::parse_error::{DhcpV4ParseError, DhcpV4ParseErrorKind};
use crate::{Buffer, BufferMut, DhcpError, ErrorKind};

/// DHCPv4 Option code(u8) defined by RFC 2132
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash)]
pub enum DhcpV4OptionCode {
    Pad,
    SubnetMask,
    Router,
    DomainNameServer,
    HostName,
    DomainName,
    InterfaceMtu,
    BroadcastAddress,
    VendorSpecificInfo,
    RequestedIpAddress,
    IpAddressLeaseTime,
    MessageType,
    ServerIdentifier,
    ParameterRequestList,
    Message,
    MaxMessageSize,
    RenewalTime,
    RebindingTime,
    VendorClassIdentifier,
    ClientIdentifier,
    End,
    Other(u8),
}

const CODE_PAD: u8 = 0;
const CODE_SUBNET_MASK: u8 = 1;
const CODE_ROUTER: u8 = 3;
const CODE_DOMAIN_NAME_SERVER: u8 = 6;
const CODE_HOST_NAME: u8 = 12;
const CODE_DOMAIN_NAME: u8 = 15;
const CODE_INTERFACE_MTU: u8 = 26;
const CODE_BROADCAST_ADDRESS: u8 = 28;
const CODE_VENDOR_SPECIFIC_INFO: u8 = 43;
const CODE_REQUESTED_IP_ADDRESS: u8 = 50;
const CODE_IP_ADDRESS_LEASE_TIME: u8 = 51;
const CODE_MESSAGE_TYPE: u8 = 53;
const CODE_SERVER_IDENTIFIER: u8 = 54;
const CODE_PARAMETER_REQUEST_LIST: u8 = 55;
const CODE_MESSAGE: u8 = 56;
const CODE_MAX_MESSAGE_SIZE: u8 = 57;
const CODE_RENEWAL_TIME: u8 = 58;
const CODE_REBIND_TIME: u8 = 59;
const CODE_VENDOR_CLASS_IDENTIFIER: u8 = 60;
const CODE_CLIENT_IDENTIFIER: u8 = 61;
const CODE_END: u8 = 255;

impl From<DhcpV4OptionCode> for u8 {
    fn from(v: DhcpV4OptionCode) -> u8 {
        match v {
            DhcpV4OptionCode::Pad => CODE_PAD,
            DhcpV4OptionCode::SubnetMask => CODE_SUBNET_MASK,
            DhcpV4OptionCode::Router => CODE_ROUTER,
            DhcpV4OptionCode::DomainNameServer => CODE_DOMAIN_NAME_SERVER,
            DhcpV4OptionCode::HostName => CODE_HOST_NAME,
            DhcpV4OptionCode::DomainName => CODE_DOMAIN_NAME,
            DhcpV4OptionCode::InterfaceMtu => CODE_INTERFACE_MTU,
            DhcpV4OptionCode::BroadcastAddress => CODE_BROADCAST_ADDRESS,
            DhcpV4OptionCode::VendorSpecificInfo => CODE_VENDOR_SPECIFIC_INFO,
            DhcpV4OptionCode::RequestedIpAddress => CODE_REQUESTED_IP_ADDRESS,
            DhcpV4OptionCode::IpAddressLeaseTime => CODE_IP_ADDRESS_LEASE_TIME,
            DhcpV4OptionCode::MessageType => CODE_MESSAGE_TYPE,
            DhcpV4OptionCode::ServerIdentifier => CODE_SERVER_IDENTIFIER,
            DhcpV4OptionCode::ParameterRequestList => {
                CODE_PARAMETER_REQUEST_LIST
            }
            DhcpV4OptionCode::Message => CODE_MESSAGE,
            DhcpV4OptionCode::MaxMessageSize => CODE_MAX_MESSAGE_SIZE,
            DhcpV4OptionCode::RenewalTime => CODE_RENEWAL_TIME,
            DhcpV4OptionCode::RebindingTime => CODE_REBIND_TIME,
            DhcpV4OptionCode::VendorClassIdentifier => {
                CODE_VENDOR_CLASS_IDENTIFIER
            }
            DhcpV4OptionCode::ClientIdentifier => CODE_CLIENT_IDENTIFIER,
            DhcpV4OptionCode::End => CODE_END,
            DhcpV4OptionCode::Other(d) => d,
        }
    }
}

impl From<u8> for DhcpV4OptionCode {
    fn from(d: u8) -> Self {
        match d {
            CODE_PAD => Self::Pad,
            CODE_SUBNET_MASK => Self::SubnetMask,
            CODE_ROUTER => Self::Router,
            CODE_DOMAIN_NAME_SERVER => Self::DomainNameServer,
            CODE_HOST_NAME => Self::HostName,
            CODE_DOMAIN_NAME => Self::DomainName,
            CODE_INTERFACE_MTU => Self::InterfaceMtu,
            CODE_BROADCAST_ADDRESS => Self::BroadcastAddress,
            CODE_VENDOR_SPECIFIC_INFO => Self::VendorSpecificInfo,
            CODE_REQUESTED_IP_ADDRESS => Self::RequestedIpAddress,
            CODE_IP_ADDRESS_LEASE_TIME => Self::IpAddressLeaseTime,
            CODE_MESSAGE_TYPE => Self::MessageType,
            CODE_SERVER_IDENTIFIER => Self::ServerIdentifier,
            CODE_PARAMETER_REQUEST_LIST => Self::ParameterRequestList,
            CODE_MESSAGE => Self::Message,
            CODE_MAX_MESSAGE_SIZE => Self::MaxMessageSize,
            CODE_RENEWAL_TIME => Self::RenewalTime,
            CODE_REBIND_TIME => Self::RebindingTime,
            CODE_VENDOR_CLASS_IDENTIFIER => Self::VendorClassIdentifier,
            CODE_CLIENT_IDENTIFIER => Self::ClientIdentifier,
            CODE_END => Self::End,
            _ => Self::Other(d),
        }
    }
}

impl Ord for DhcpV4OptionCode {
    fn cmp(&self, other: &Self) -> Ordering {
        u8::from(*self).cmp(&u8::from(*other))
    }
}

impl PartialOrd for DhcpV4OptionCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// DHCPv4 Option defined by RFC 2132
///
/// The DHCP message type(53) is not listed here as it is carried by
/// [crate::DhcpV4Packet] variant instead.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum DhcpV4Option {
    SubnetMask(Ipv4Addr),
    Router(Vec<Ipv4Addr>),
    DomainNameServer(Vec<Ipv4Addr>),
    HostName(String),
    DomainName(String),
    InterfaceMtu(u16),
    BroadcastAddress(Ipv4Addr),
    /// Opaque vendor data, not necessarily UTF-8
    VendorSpecificInfo(Vec<u8>),
    RequestedIpAddress(Ipv4Addr),
    IpAddressLeaseTime(u32),
    ServerIdentifier(Ipv4Addr),
    ParameterRequestList(Vec<DhcpV4OptionCode>),
    Message(String),
    MaxMessageSize(u16),
    RenewalTime(u32),
    RebindingTime(u32),
    VendorClassIdentifier(String),
    ClientIdentifier(Vec<u8>),
}

impl DhcpV4Option {
    pub fn code(&self) -> DhcpV4OptionCode {
        match self {
            Self::SubnetMask(_) => DhcpV4OptionCode::SubnetMask,
            Self::Router(_) => DhcpV4OptionCode::Router,
            Self::DomainNameServer(_) => DhcpV4OptionCode::DomainNameServer,
            Self::HostName(_) => DhcpV4OptionCode::HostName,
            Self::DomainName(_) => DhcpV4OptionCode::DomainName,
            Self::InterfaceMtu(_) => DhcpV4OptionCode::InterfaceMtu,
            Self::BroadcastAddress(_) => DhcpV4OptionCode::BroadcastAddress,
            Self::VendorSpecificInfo(_) => DhcpV4OptionCode::VendorSpecificInfo,
            Self::RequestedIpAddress(_) => DhcpV4OptionCode::RequestedIpAddress,
            Self::IpAddressLeaseTime(_) => DhcpV4OptionCode::IpAddressLeaseTime,
            Self::ServerIdentifier(_) => DhcpV4OptionCode::ServerIdentifier,
            Self::ParameterRequestList(_) => {
                DhcpV4OptionCode::ParameterRequestList
            }
            Self::Message(_) => DhcpV4OptionCode::Message,
            Self::MaxMessageSize(_) => DhcpV4OptionCode::MaxMessageSize,
            Self::RenewalTime(_) => DhcpV4OptionCode::RenewalTime,
            Self::RebindingTime(_) => DhcpV4OptionCode::RebindingTime,
            Self::VendorClassIdentifier(_) => {
                DhcpV4OptionCode::VendorClassIdentifier
            }
            Self::ClientIdentifier(_) => DhcpV4OptionCode::ClientIdentifier,
        }
    }

    /// Decode the payload of option `code`.
    ///
    /// Return `Ok(None)` for option codes this crate does not understand.
    /// The payload size must match what the option type holds, otherwise
    /// [DhcpV4ParseErrorKind::InvalidOptionLength] is returned.
    pub(crate) fn parse(
        code: u8,
        data: &[u8],
    ) -> Result<Option<Self>, DhcpV4ParseError> {
        let len = data.len();
        let code_enum = DhcpV4OptionCode::from(code);
        let expected: Option<usize> = match code_enum {
            DhcpV4OptionCode::SubnetMask
            | DhcpV4OptionCode::BroadcastAddress
            | DhcpV4OptionCode::RequestedIpAddress
            | DhcpV4OptionCode::ServerIdentifier
            | DhcpV4OptionCode::IpAddressLeaseTime
            | DhcpV4OptionCode::RenewalTime
            | DhcpV4OptionCode::RebindingTime => Some(4),
            DhcpV4OptionCode::InterfaceMtu
            | DhcpV4OptionCode::MaxMessageSize => Some(2),
            DhcpV4OptionCode::Router | DhcpV4OptionCode::DomainNameServer => {
                Some(len - len % 4)
            }
            _ => None,
        };
        if let Some(expected) = expected {
            if expected != len {
                return Err(DhcpV4ParseError::with_option(
                    DhcpV4ParseErrorKind::InvalidOptionLength,
                    code,
                    format!(
                        "DHCPv4 option {code} declared length {len}, but \
                         decoded size is {expected}"
                    ),
                ));
            }
        }

        let mut buf = Buffer::new(data);
        Ok(Some(match code_enum {
            DhcpV4OptionCode::SubnetMask => Self::SubnetMask(buf.get_ipv4()?),
            DhcpV4OptionCode::Router => Self::Router(get_ipv4_list(&mut buf)?),
            DhcpV4OptionCode::DomainNameServer => {
                Self::DomainNameServer(get_ipv4_list(&mut buf)?)
            }
            DhcpV4OptionCode::HostName => Self::HostName(get_string(data)),
            DhcpV4OptionCode::DomainName => Self::DomainName(get_string(data)),
            DhcpV4OptionCode::InterfaceMtu => {
                Self::InterfaceMtu(buf.get_u16_be()?)
            }
            DhcpV4OptionCode::BroadcastAddress => {
                Self::BroadcastAddress(buf.get_ipv4()?)
            }
            DhcpV4OptionCode::VendorSpecificInfo => {
                Self::VendorSpecificInfo(data.to_vec())
            }
            DhcpV4OptionCode::RequestedIpAddress => {
                Self::RequestedIpAddress(buf.get_ipv4()?)
            }
            DhcpV4OptionCode::IpAddressLeaseTime => {
                Self::IpAddressLeaseTime(buf.get_u32_be()?)
            }
            DhcpV4OptionCode::ServerIdentifier => {
                Self::ServerIdentifier(buf.get_ipv4()?)
            }
            DhcpV4OptionCode::ParameterRequestList => {
                Self::ParameterRequestList(
                    data.iter().map(|c| DhcpV4OptionCode::from(*c)).collect(),
                )
            }
            DhcpV4OptionCode::Message => Self::Message(get_string(data)),
            DhcpV4OptionCode::MaxMessageSize => {
                Self::MaxMessageSize(buf.get_u16_be()?)
            }
            DhcpV4OptionCode::RenewalTime => {
                Self::RenewalTime(buf.get_u32_be()?)
            }
            DhcpV4OptionCode::RebindingTime => {
                Self::RebindingTime(buf.get_u32_be()?)
            }
            DhcpV4OptionCode::VendorClassIdentifier => {
                Self::VendorClassIdentifier(get_string(data))
            }
            DhcpV4OptionCode::ClientIdentifier => {
                Self::ClientIdentifier(data.to_vec())
            }
            _ => return Ok(None),
        }))
    }

    pub(crate) fn emit(&self, buf: &mut BufferMut) -> Result<(), DhcpError> {
        let mut value = BufferMut::new(16);
        match self {
            Self::SubnetMask(ip)
            | Self::BroadcastAddress(ip)
            | Self::RequestedIpAddress(ip)
            | Self::ServerIdentifier(ip) => value.write_ipv4(*ip),
            Self::Router(ips) | Self::DomainNameServer(ips) => {
                for ip in ips {
                    value.write_ipv4(*ip);
                }
            }
            Self::HostName(s)
            | Self::DomainName(s)
            | Self::Message(s)
            | Self::VendorClassIdentifier(s) => value.write_bytes(s.as_bytes()),
            Self::InterfaceMtu(v) | Self::MaxMessageSize(v) => {
                value.write_u16_be(*v)
            }
            Self::IpAddressLeaseTime(v)
            | Self::RenewalTime(v)
            | Self::RebindingTime(v) => value.write_u32_be(*v),
            Self::ParameterRequestList(opts) => {
                for opt in opts {
                    value.write_u8(u8::from(*opt));
                }
            }
            Self::VendorSpecificInfo(v) | Self::ClientIdentifier(v) => {
                value.write_bytes(v.as_slice())
            }
        }
        let code = u8::from(self.code());
        let len = u8::try_from(value.len()).map_err(|_| {
            DhcpError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "OptionTooLong: DHCPv4 option {code} payload is {} bytes, \
                     exceeding the maximum 255 bytes",
                    value.len()
                ),
            )
        })?;
        buf.write_u8(code);
        buf.write_u8(len);
        buf.write_bytes(value.data.as_slice());
        Ok(())
    }
}

fn get_ipv4_list(buf: &mut Buffer) -> Result<Vec<Ipv4Addr>, DhcpError> {
    let mut ret = Vec::new();
    while !buf.is_empty() {
        ret.push(buf.get_ipv4()?);
    }
    Ok(ret)
}

fn get_string(data: &[u8]) -> String {
    String::from_utf8_lossy(data).to_string()
}

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct DhcpV4Options {
    data: HashMap<DhcpV4OptionCode, DhcpV4Option>,
}

impl DhcpV4Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, code: DhcpV4OptionCode) -> Option<&DhcpV4Option> {
        self.data.get(&code)
    }

    /// Insert option, replacing existing option of the same code.
    pub fn insert(&mut self, opt: DhcpV4Option) {
        self.data.insert(opt.code(), opt);
    }

    pub fn remove(&mut self, code: DhcpV4OptionCode) -> Option<DhcpV4Option> {
        self.data.remove(&code)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn server_identifier(&self) -> Option<Ipv4Addr> {
        match self.get(DhcpV4OptionCode::ServerIdentifier) {
            Some(DhcpV4Option::ServerIdentifier(ip)) => Some(*ip),
            _ => None,
        }
    }

    pub fn requested_ip(&self) -> Option<Ipv4Addr> {
        match self.get(DhcpV4OptionCode::RequestedIpAddress) {
            Some(DhcpV4Option::RequestedIpAddress(ip)) => Some(*ip),
            _ => None,
        }
    }

    /// Walk the options after magic cookie.
    ///
    /// Return the parsed options along with the raw value of the DHCP
    /// message type option(53) if found.
    pub(crate) fn parse(
        raw: &[u8],
    ) -> Result<(Self, Option<u8>), DhcpV4ParseError> {
        let mut ret = Self::new();
        let mut msg_type: Option<u8> = None;
        let mut buf = Buffer::new(raw);

        while !buf.is_empty() {
            let code = buf.get_u8()?;
            if code == CODE_PAD {
                continue;
            } else if code == CODE_END {
                break;
            }
            let len = buf.get_u8().map_err(|_| underflow(code, None))?;
            let data = buf
                .get_bytes(len.into())
                .map_err(|_| underflow(code, Some(len)))?;

            if code == CODE_MESSAGE_TYPE {
                if data.len() != 1 {
                    return Err(DhcpV4ParseError::with_option(
                        DhcpV4ParseErrorKind::InvalidOptionLength,
                        code,
                        format!(
                            "DHCPv4 message type option should be 1 byte, \
                             got {len}"
                        ),
                    ));
                }
                if msg_type.is_some() {
                    return Err(DhcpV4ParseError::with_option(
                        DhcpV4ParseErrorKind::DuplicateMessageType,
                        code,
                        "DHCPv4 message type option found twice".to_string(),
                    ));
                }
                msg_type = Some(data[0]);
                continue;
            }

            match DhcpV4Option::parse(code, data)? {
                Some(opt) => ret.insert(opt),
                None => {
                    log::trace!("Skipping unknown DHCPv4 option {code}");
                }
            }
        }
        Ok((ret, msg_type))
    }

    /// Emit options in ascending code order. The message type and end
    /// options are written by the caller.
    pub(crate) fn emit(&self, buf: &mut BufferMut) -> Result<(), DhcpError> {
        let mut codes: Vec<DhcpV4OptionCode> =
            self.data.keys().cloned().collect();
        codes.sort_unstable();
        for code in codes {
            if let Some(opt) = self.data.get(&code) {
                opt.emit(buf)?;
            }
        }
        Ok(())
    }
}

fn underflow(code: u8, len: Option<u8>) -> DhcpV4ParseError {
    DhcpV4ParseError::with_option(
        DhcpV4ParseErrorKind::BufferUnderflow,
        code,
        match len {
            Some(len) => format!(
                "DHCPv4 option {code} declared length {len} but buffer \
                 ended early"
            ),
            None => format!("No length for DHCPv4 option {code}"),
        },
    )
}
