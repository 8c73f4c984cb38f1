// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use super::{
    frame::{
        gen_eth_packet, gen_ipv4_udp_packet, strip_framing, DhcpV4Encap,
        BOOTP_HEADER_LEN,
    },
    option::{DhcpV4Option, DhcpV4Options},
    parse_error::{DhcpV4ParseError, DhcpV4ParseErrorKind},
};
use crate::{
    Buffer, BufferMut, DhcpError, DhcpV4Config, DhcpV4Lease, ErrorKind,
};

#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum DhcpV4MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Inform = 8,
}

impl std::fmt::Display for DhcpV4MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discover => write!(f, "DISCOVER"),
            Self::Offer => write!(f, "OFFER"),
            Self::Request => write!(f, "REQUEST"),
            Self::Decline => write!(f, "DECLINE"),
            Self::Ack => write!(f, "ACK"),
            Self::Nak => write!(f, "NAK"),
            Self::Inform => write!(f, "INFORM"),
        }
    }
}

impl std::convert::TryFrom<u8> for DhcpV4MessageType {
    type Error = DhcpV4ParseError;

    fn try_from(d: u8) -> Result<Self, DhcpV4ParseError> {
        match d {
            d if d == Self::Discover as u8 => Ok(Self::Discover),
            d if d == Self::Offer as u8 => Ok(Self::Offer),
            d if d == Self::Request as u8 => Ok(Self::Request),
            d if d == Self::Decline as u8 => Ok(Self::Decline),
            d if d == Self::Ack as u8 => Ok(Self::Ack),
            d if d == Self::Nak as u8 => Ok(Self::Nak),
            d if d == Self::Inform as u8 => Ok(Self::Inform),
            _ => Err(DhcpV4ParseError::new(
                DhcpV4ParseErrorKind::UnknownMessageType,
                format!("DHCPv4 message type {d} is not supported"),
            )),
        }
    }
}

const MAX_CHADDR_LEN: usize = 16;
const MAX_SNAME_LEN: usize = 64;
const MAX_FILE_LEN: usize = 128;
const BOOTREQUEST: u8 = 1;
const BOOTREPLY: u8 = 2;
const ARP_HW_TYPE_ETHERNET: u8 = 1;
const HW_ADDR_LEN_ETHERNET: u8 = 6;
const FLAG_BROADCAST: u16 = 0x8000;
const DHCPV4_MAGIC_COOKIE: [u8; 4] = [99u8, 130, 83, 99];
const CODE_MESSAGE_TYPE: u8 = 53;
const CODE_END: u8 = 255;

/// Largest packet this crate emits, framing included.
pub(crate) const MAX_PACKET_LEN: usize = 1500;

/// Portion of hardware address fitting into the 16 bytes chaddr field.
pub(crate) fn wire_chaddr(chaddr: &[u8]) -> &[u8] {
    &chaddr[..std::cmp::min(chaddr.len(), MAX_CHADDR_LEN)]
}

/// Fields shared by all DHCPv4 message types.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DhcpV4Message {
    /// Transaction ID
    pub xid: u32,
    /// Seconds elapsed since client began address acquisition or renewal
    /// process.
    pub secs: u16,
    /// Ask server to reply with broadcast.
    pub broadcast: bool,
    /// Client IP address; only filled in if client is in BOUND, RENEW or
    /// REBINDING state.
    pub ciaddr: Ipv4Addr,
    /// 'your' (client) IP address.
    pub yiaddr: Ipv4Addr,
    /// IP address of next server to use in bootstrap.
    pub siaddr: Ipv4Addr,
    /// Relay agent IP address.
    pub giaddr: Ipv4Addr,
    /// Client hardware address, up to 16 bytes.
    pub chaddr: Vec<u8>,
    pub options: DhcpV4Options,
}

impl Default for DhcpV4Message {
    fn default() -> Self {
        Self {
            xid: 0,
            secs: 0,
            broadcast: false,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: Vec::new(),
            options: DhcpV4Options::new(),
        }
    }
}

impl DhcpV4Message {
    pub fn new(xid: u32, chaddr: &[u8]) -> Self {
        Self {
            xid,
            chaddr: chaddr.to_vec(),
            ..Default::default()
        }
    }

    fn emit(
        &self,
        op: u8,
        msg_type: DhcpV4MessageType,
        buf: &mut BufferMut,
    ) -> Result<(), DhcpError> {
        let chaddr = wire_chaddr(self.chaddr.as_slice());
        if chaddr.len() < self.chaddr.len() {
            log::warn!(
                "Client hardware address {:?} is longer than \
                 {MAX_CHADDR_LEN} bytes, truncated",
                self.chaddr
            );
        }
        buf.write_u8(op);
        buf.write_u8(ARP_HW_TYPE_ETHERNET);
        buf.write_u8(chaddr.len() as u8);
        // hops
        buf.write_u8(0);
        buf.write_u32_be(self.xid);
        buf.write_u16_be(self.secs);
        buf.write_u16_be(if self.broadcast { FLAG_BROADCAST } else { 0 });
        buf.write_ipv4(self.ciaddr);
        buf.write_ipv4(self.yiaddr);
        buf.write_ipv4(self.siaddr);
        buf.write_ipv4(self.giaddr);
        buf.write_bytes_padded(chaddr, MAX_CHADDR_LEN);
        buf.write_bytes_padded(&[], MAX_SNAME_LEN);
        buf.write_bytes_padded(&[], MAX_FILE_LEN);
        buf.write_bytes(&DHCPV4_MAGIC_COOKIE);
        buf.write_u8(CODE_MESSAGE_TYPE);
        buf.write_u8(1);
        buf.write_u8(msg_type as u8);
        self.options.emit(buf)?;
        buf.write_u8(CODE_END);
        Ok(())
    }

    /// Parse DHCP payload with UDP and lower layer headers purged.
    ///
    /// Return the message along with raw value of the message type
    /// option if found.
    fn parse(raw: &[u8]) -> Result<(Self, Option<u8>), DhcpV4ParseError> {
        if raw.len() < BOOTP_HEADER_LEN {
            return Err(DhcpV4ParseError::new(
                DhcpV4ParseErrorKind::TooShort(DhcpV4Encap::Bootp),
                format!(
                    "DHCP payload length {} is less than BOOTP header size \
                     {BOOTP_HEADER_LEN}",
                    raw.len()
                ),
            ));
        }
        let mut buf = Buffer::new(raw);
        // op and htype are not used to identify the message
        buf.skip(2)?;
        let hlen = match usize::from(buf.get_u8()?) {
            l if l > MAX_CHADDR_LEN => {
                log::debug!(
                    "Invalid hardware address length {l}, treating as \
                     ethernet"
                );
                usize::from(HW_ADDR_LEN_ETHERNET)
            }
            l => l,
        };
        // hops
        buf.skip(1)?;
        let mut ret = Self {
            xid: buf.get_u32_be()?,
            secs: buf.get_u16_be()?,
            broadcast: (buf.get_u16_be()? & FLAG_BROADCAST) > 0,
            ciaddr: buf.get_ipv4()?,
            yiaddr: buf.get_ipv4()?,
            siaddr: buf.get_ipv4()?,
            giaddr: buf.get_ipv4()?,
            chaddr: buf.get_bytes(MAX_CHADDR_LEN)?[..hlen].to_vec(),
            options: DhcpV4Options::new(),
        };
        buf.skip(MAX_SNAME_LEN + MAX_FILE_LEN)?;

        if buf.remain_len() < DHCPV4_MAGIC_COOKIE.len() {
            return Err(DhcpV4ParseError::new(
                DhcpV4ParseErrorKind::NoCookie,
                "No DHCP magic cookie found after BOOTP header".to_string(),
            ));
        }
        let magic_cookie = buf.get_bytes(DHCPV4_MAGIC_COOKIE.len())?;
        if magic_cookie != DHCPV4_MAGIC_COOKIE {
            return Err(DhcpV4ParseError::new(
                DhcpV4ParseErrorKind::BadMagicCookie,
                format!(
                    "DHCPv4 magic cookie not match, expected {:?}, got {:?}",
                    DHCPV4_MAGIC_COOKIE, magic_cookie
                ),
            ));
        }
        let (options, msg_type) = DhcpV4Options::parse(buf.get_remains())?;
        ret.options = options;
        Ok((ret, msg_type))
    }

    fn new_client(xid: u32, secs: u16, config: &DhcpV4Config) -> Self {
        let mut ret = Self::new(xid, config.src_mac.as_slice());
        ret.secs = secs;
        ret.broadcast = true;
        if !config.client_id.is_empty() {
            ret.options.insert(DhcpV4Option::ClientIdentifier(
                config.client_id.clone(),
            ));
        }
        if !config.host_name.is_empty() {
            ret.options
                .insert(DhcpV4Option::HostName(config.host_name.clone()));
        }
        if !config.vendor_class_id.is_empty() {
            ret.options.insert(DhcpV4Option::VendorClassIdentifier(
                config.vendor_class_id.clone(),
            ));
        }
        ret.options
            .insert(DhcpV4Option::MaxMessageSize(config.max_msg_size));
        ret.options.insert(DhcpV4Option::ParameterRequestList(
            config.request_opts.clone(),
        ));
        ret
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum DhcpV4Packet {
    Discover(DhcpV4Message),
    Offer(DhcpV4Message),
    Request(DhcpV4Message),
    Decline(DhcpV4Message),
    Ack(DhcpV4Message),
    Nak(DhcpV4Message),
    Inform(DhcpV4Message),
}

impl DhcpV4Packet {
    pub fn new(msg_type: DhcpV4MessageType, msg: DhcpV4Message) -> Self {
        match msg_type {
            DhcpV4MessageType::Discover => Self::Discover(msg),
            DhcpV4MessageType::Offer => Self::Offer(msg),
            DhcpV4MessageType::Request => Self::Request(msg),
            DhcpV4MessageType::Decline => Self::Decline(msg),
            DhcpV4MessageType::Ack => Self::Ack(msg),
            DhcpV4MessageType::Nak => Self::Nak(msg),
            DhcpV4MessageType::Inform => Self::Inform(msg),
        }
    }

    pub fn message_type(&self) -> DhcpV4MessageType {
        match self {
            Self::Discover(_) => DhcpV4MessageType::Discover,
            Self::Offer(_) => DhcpV4MessageType::Offer,
            Self::Request(_) => DhcpV4MessageType::Request,
            Self::Decline(_) => DhcpV4MessageType::Decline,
            Self::Ack(_) => DhcpV4MessageType::Ack,
            Self::Nak(_) => DhcpV4MessageType::Nak,
            Self::Inform(_) => DhcpV4MessageType::Inform,
        }
    }

    pub fn message(&self) -> &DhcpV4Message {
        match self {
            Self::Discover(m)
            | Self::Offer(m)
            | Self::Request(m)
            | Self::Decline(m)
            | Self::Ack(m)
            | Self::Nak(m)
            | Self::Inform(m) => m,
        }
    }

    pub fn message_mut(&mut self) -> &mut DhcpV4Message {
        match self {
            Self::Discover(m)
            | Self::Offer(m)
            | Self::Request(m)
            | Self::Decline(m)
            | Self::Ack(m)
            | Self::Nak(m)
            | Self::Inform(m) => m,
        }
    }

    /// Whether this message is sent by server (BOOTREPLY).
    pub fn is_server_reply(&self) -> bool {
        matches!(self, Self::Offer(_) | Self::Ack(_) | Self::Nak(_))
    }

    fn op(&self) -> u8 {
        if self.is_server_reply() {
            BOOTREPLY
        } else {
            BOOTREQUEST
        }
    }

    /// IPv4 source and destination used when framing with L2 or L3.
    fn ip_endpoints(&self) -> (Ipv4Addr, Ipv4Addr) {
        let msg = self.message();
        if self.is_server_reply() {
            let src = msg.options.server_identifier().unwrap_or(msg.siaddr);
            let dst = if msg.broadcast || msg.yiaddr.is_unspecified() {
                Ipv4Addr::BROADCAST
            } else {
                msg.yiaddr
            };
            (src, dst)
        } else {
            (msg.ciaddr, Ipv4Addr::BROADCAST)
        }
    }

    /// Serialize into wire format with requested encapsulation.
    pub fn build(
        &self,
        encap: DhcpV4Encap,
        dst_port: u16,
        src_port: u16,
    ) -> Result<Vec<u8>, DhcpError> {
        let msg = self.message();
        let mut buf = BufferMut::new(BOOTP_HEADER_LEN + 64);
        msg.emit(self.op(), self.message_type(), &mut buf)?;
        log::trace!("DHCP {} payload generated {:?}", self, buf.data);

        let ret = match encap {
            DhcpV4Encap::Bootp => buf.data,
            DhcpV4Encap::L3 => {
                let (src_ip, dst_ip) = self.ip_endpoints();
                gen_ipv4_udp_packet(
                    src_ip,
                    dst_ip,
                    src_port,
                    dst_port,
                    buf.data.as_slice(),
                )?
            }
            DhcpV4Encap::L2 => {
                let (src_ip, dst_ip) = self.ip_endpoints();
                gen_eth_packet(
                    msg.chaddr.as_slice(),
                    src_ip,
                    dst_ip,
                    src_port,
                    dst_port,
                    buf.data.as_slice(),
                )?
            }
        };
        if ret.len() > MAX_PACKET_LEN {
            return Err(DhcpError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "Generated DHCP {} packet is {} bytes, exceeding the \
                     maximum {MAX_PACKET_LEN} bytes",
                    self.message_type(),
                    ret.len()
                ),
            ));
        }
        Ok(ret)
    }

    /// Decode wire format with specified encapsulation.
    ///
    /// The variant is decided by DHCP message type option(53) only.
    pub fn parse(
        buf: &[u8],
        encap: DhcpV4Encap,
    ) -> Result<Self, DhcpV4ParseError> {
        let payload = strip_framing(buf, encap)?;
        let (msg, msg_type) = DhcpV4Message::parse(payload)?;
        let msg_type = match msg_type {
            Some(t) => DhcpV4MessageType::try_from(t)?,
            None => {
                return Err(DhcpV4ParseError::new(
                    DhcpV4ParseErrorKind::NoMessageType,
                    "No DHCP message type option(53) found".to_string(),
                ));
            }
        };
        let ret = Self::new(msg_type, msg);
        log::trace!("Parsed DHCP packet {ret:?}");
        Ok(ret)
    }

    pub(crate) fn new_discover(
        xid: u32,
        secs: u16,
        config: &DhcpV4Config,
    ) -> Self {
        Self::Discover(DhcpV4Message::new_client(xid, secs, config))
    }

    /// DHCPREQUEST in reply to an offer: `ciaddr` is left unspecified with
    /// requested IP address and server identifier options set.
    pub(crate) fn new_request(
        xid: u32,
        secs: u16,
        config: &DhcpV4Config,
        offer: &DhcpV4Lease,
    ) -> Self {
        let mut msg = DhcpV4Message::new_client(xid, secs, config);
        msg.options
            .insert(DhcpV4Option::RequestedIpAddress(offer.addr));
        if let Some(srv_id) = offer.srv_id {
            msg.options.insert(DhcpV4Option::ServerIdentifier(srv_id));
        }
        Self::Request(msg)
    }

    /// DHCPREQUEST extending current lease: `ciaddr` holds the leased
    /// address, no requested IP address nor server identifier.
    pub(crate) fn new_renew(
        xid: u32,
        secs: u16,
        config: &DhcpV4Config,
        lease: &DhcpV4Lease,
    ) -> Self {
        let mut msg = DhcpV4Message::new_client(xid, secs, config);
        msg.ciaddr = lease.addr;
        Self::Request(msg)
    }
}

impl std::fmt::Display for DhcpV4Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(xid {:#010x})", self.message_type(), self.message().xid)
    }
}
