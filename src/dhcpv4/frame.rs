// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use etherparse::{
    EtherType, Ethernet2HeaderSlice, IpDscp, IpHeaders, IpNumber, Ipv4Header,
    Ipv4HeaderSlice, PacketBuilder, UdpHeaderSlice,
};

use super::parse_error::{DhcpV4ParseError, DhcpV4ParseErrorKind};
use crate::{
    mac::{to_eth_mac, BROADCAST_MAC_ADDRESS},
    DhcpError, ErrorKind,
};

pub(crate) const CLIENT_PORT: u16 = 68;
pub(crate) const SERVER_PORT: u16 = 67;

pub(crate) const ETH_HEADER_LEN: usize = 14;
pub(crate) const IPV4_HEADER_LEN: usize = 20;
pub(crate) const UDP_HEADER_LEN: usize = 8;
// op(1) + htype(1) + hlen(1) + hops(1) + xid(4) + secs(2) + flags(2)
// + 4 addresses(16) + chaddr(16) + sname(64) + file(128)
pub(crate) const BOOTP_HEADER_LEN: usize = 236;

// TOS 0x10
const IP_DSCP_LOW_DELAY: IpDscp = match IpDscp::try_new(4) {
    Ok(v) => v,
    Err(_) => IpDscp::ZERO,
};
const IP_DEFAULT_TTL: u8 = 64;

/// How much framing surrounds the DHCP payload.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
pub enum DhcpV4Encap {
    /// Full ethernet frame: Ethernet + IPv4 + UDP + DHCP
    #[default]
    L2,
    /// IPv4 + UDP + DHCP
    L3,
    /// DHCP payload only
    Bootp,
}

impl DhcpV4Encap {
    /// Minimum buffer size holding a complete BOOTP header.
    pub fn min_len(&self) -> usize {
        match self {
            Self::L2 => {
                ETH_HEADER_LEN
                    + IPV4_HEADER_LEN
                    + UDP_HEADER_LEN
                    + BOOTP_HEADER_LEN
            }
            Self::L3 => IPV4_HEADER_LEN + UDP_HEADER_LEN + BOOTP_HEADER_LEN,
            Self::Bootp => BOOTP_HEADER_LEN,
        }
    }
}

impl std::fmt::Display for DhcpV4Encap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::L2 => "l2",
                Self::L3 => "l3",
                Self::Bootp => "bootp",
            }
        )
    }
}

/// One's complement of the one's complement sum of all 16 bits words.
/// Odd trailing byte is padded with zero.
pub fn internet_checksum(data: &[u8]) -> u16 {
    !fold_sum(sum_words(0, data))
}

/// UDP checksum including the IPv4 pseudo header. The checksum field of
/// `udp_segment` should be zero.
pub fn udp_checksum(src: Ipv4Addr, dst: Ipv4Addr, udp_segment: &[u8]) -> u16 {
    let mut sum = sum_words(0, &src.octets());
    sum = sum_words(sum, &dst.octets());
    sum += u32::from(IpNumber::UDP.0);
    sum += udp_segment.len() as u32;
    sum = sum_words(sum, udp_segment);
    !fold_sum(sum)
}

fn sum_words(mut sum: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for chunk in chunks.by_ref() {
        sum += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
        sum = (sum & 0xffff) + (sum >> 16);
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }
    sum
}

fn fold_sum(mut sum: u32) -> u16 {
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

fn gen_ipv4_header(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
) -> Result<IpHeaders, DhcpError> {
    // Payload length and checksum are filled by PacketBuilder
    let mut header = Ipv4Header::new(
        0,
        IP_DEFAULT_TTL,
        IpNumber::UDP,
        src_ip.octets(),
        dst_ip.octets(),
    )
    .map_err(|e| {
        DhcpError::new(
            ErrorKind::Bug,
            format!("Failed to generate IPv4 header: {e}"),
        )
    })?;
    header.dscp = IP_DSCP_LOW_DELAY;
    header.dont_fragment = true;
    Ok(IpHeaders::Ipv4(header, Default::default()))
}

/// Prepend UDP and IPv4 headers to DHCP payload.
pub(crate) fn gen_ipv4_udp_packet(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Result<Vec<u8>, DhcpError> {
    let builder = PacketBuilder::ip(gen_ipv4_header(src_ip, dst_ip)?)
        .udp(src_port, dst_port);
    let mut packet = Vec::<u8>::with_capacity(builder.size(payload.len()));
    builder.write(&mut packet, payload).map_err(|e| {
        DhcpError::new(
            ErrorKind::Bug,
            format!("Failed to generate IPv4 packet: {e}"),
        )
    })?;
    Ok(packet)
}

/// Prepend ethernet header with broadcast destination, IPv4 and UDP
/// headers to DHCP payload.
pub(crate) fn gen_eth_packet(
    src_mac: &[u8],
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Result<Vec<u8>, DhcpError> {
    let builder =
        PacketBuilder::ethernet2(to_eth_mac(src_mac), BROADCAST_MAC_ADDRESS)
            .ip(gen_ipv4_header(src_ip, dst_ip)?)
            .udp(src_port, dst_port);
    let mut packet = Vec::<u8>::with_capacity(builder.size(payload.len()));
    builder.write(&mut packet, payload).map_err(|e| {
        DhcpError::new(
            ErrorKind::Bug,
            format!("Failed to generate ethernet packet: {e}"),
        )
    })?;
    Ok(packet)
}

/// Remove the framing of specified encapsulation and return the DHCP payload.
pub(crate) fn strip_framing(
    buf: &[u8],
    encap: DhcpV4Encap,
) -> Result<&[u8], DhcpV4ParseError> {
    if buf.len() < encap.min_len() {
        return Err(DhcpV4ParseError::new(
            DhcpV4ParseErrorKind::TooShort(encap),
            format!(
                "Got {} bytes, expecting at least {} bytes for {encap} \
                 encapsulation",
                buf.len(),
                encap.min_len()
            ),
        ));
    }
    match encap {
        DhcpV4Encap::Bootp => Ok(buf),
        DhcpV4Encap::L3 => strip_ipv4_udp(buf),
        DhcpV4Encap::L2 => {
            let eth = Ethernet2HeaderSlice::from_slice(buf).map_err(|e| {
                DhcpV4ParseError::new(
                    DhcpV4ParseErrorKind::TooShort(DhcpV4Encap::L2),
                    format!("Invalid ethernet header: {e}"),
                )
            })?;
            if eth.ether_type() != EtherType::IPV4 {
                return Err(DhcpV4ParseError::new(
                    DhcpV4ParseErrorKind::WrongEthType,
                    format!(
                        "Expecting ether type IPv4, got {:#06x}",
                        eth.ether_type().0
                    ),
                ));
            }
            strip_ipv4_udp(&buf[eth.slice().len()..])
        }
    }
}

fn strip_ipv4_udp(buf: &[u8]) -> Result<&[u8], DhcpV4ParseError> {
    let version = buf.first().map(|b| b >> 4).unwrap_or_default();
    if version != 4 {
        return Err(DhcpV4ParseError::new(
            DhcpV4ParseErrorKind::NotIpv4,
            format!("Expecting IP version 4, got {version}"),
        ));
    }
    let ip = Ipv4HeaderSlice::from_slice(buf).map_err(|e| {
        DhcpV4ParseError::new(
            DhcpV4ParseErrorKind::InvalidIp,
            format!("Invalid IPv4 header: {e}"),
        )
    })?;
    if ip.protocol() != IpNumber::UDP {
        return Err(DhcpV4ParseError::new(
            DhcpV4ParseErrorKind::NotUdp,
            format!("Expecting UDP, got IP protocol {}", ip.protocol().0),
        ));
    }
    let udp_raw = &buf[ip.slice().len()..];
    let udp = UdpHeaderSlice::from_slice(udp_raw).map_err(|e| {
        DhcpV4ParseError::new(
            DhcpV4ParseErrorKind::TooShort(DhcpV4Encap::L3),
            format!("Invalid UDP header: {e}"),
        )
    })?;
    let src_port = udp.source_port();
    let dst_port = udp.destination_port();
    // Client port on either side, or relay to relay.
    if !(src_port == CLIENT_PORT
        || dst_port == CLIENT_PORT
        || (src_port == SERVER_PORT && dst_port == SERVER_PORT))
    {
        return Err(DhcpV4ParseError::new(
            DhcpV4ParseErrorKind::WrongPort,
            format!("Unexpected UDP ports: source {src_port} dest {dst_port}"),
        ));
    }

    let payload = &udp_raw[UDP_HEADER_LEN..];
    let udp_payload_len =
        usize::from(udp.length()).saturating_sub(UDP_HEADER_LEN);
    if udp_payload_len > 0 && udp_payload_len <= payload.len() {
        Ok(&payload[..udp_payload_len])
    } else {
        Ok(payload)
    }
}
