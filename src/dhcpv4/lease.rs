// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use super::msg::DhcpV4Message;
use crate::{DhcpError, DhcpV4Option, DhcpV4OptionCode, ErrorKind};

/// Lease time used when server grants a lease shorter than this.
pub(crate) const MIN_LEASE_TIME_SEC: u32 = 60;
const INFINITE_LEASE_TIME: u32 = u32::MAX;
const MIN_MTU: u16 = 1280;
const MAX_MTU: u16 = 1500;

/// Result of a successful negotiation.
#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub struct DhcpV4Lease {
    /// Assigned address, never unspecified
    pub addr: Ipv4Addr,
    pub prefix_length: u8,
    pub gateway: Option<Ipv4Addr>,
    pub dns_srvs: Vec<Ipv4Addr>,
    pub domain_name: Option<String>,
    pub srv_id: Option<Ipv4Addr>,
    pub vendor_info: Option<Vec<u8>>,
    /// Lease duration in seconds, 0 means infinite
    pub lease_time_sec: u32,
    /// 0 when server did not provide a MTU within [1280, 1500]
    pub mtu: u16,
}

impl Default for DhcpV4Lease {
    fn default() -> Self {
        Self {
            addr: Ipv4Addr::UNSPECIFIED,
            prefix_length: 0,
            gateway: None,
            dns_srvs: Vec::new(),
            domain_name: None,
            srv_id: None,
            vendor_info: None,
            lease_time_sec: 0,
            mtu: 0,
        }
    }
}

impl DhcpV4Lease {
    pub(crate) fn new_from_msg(msg: &DhcpV4Message) -> Result<Self, DhcpError> {
        let addr = if !msg.yiaddr.is_unspecified() {
            msg.yiaddr
        } else if !msg.ciaddr.is_unspecified() {
            msg.ciaddr
        } else {
            return Err(DhcpError::new(
                ErrorKind::NoLease,
                format!(
                    "DHCP message xid {:#010x} holds no address",
                    msg.xid
                ),
            ));
        };

        let prefix_length = match msg.options.get(DhcpV4OptionCode::SubnetMask)
        {
            Some(DhcpV4Option::SubnetMask(mask)) => mask_to_prefix(*mask)?,
            _ => classful_prefix_length(addr),
        };

        let mut ret = Self {
            addr,
            prefix_length,
            srv_id: msg.options.server_identifier(),
            ..Default::default()
        };

        if let Some(DhcpV4Option::Router(v)) =
            msg.options.get(DhcpV4OptionCode::Router)
        {
            ret.gateway = v.first().cloned();
        }
        if let Some(DhcpV4Option::DomainNameServer(v)) =
            msg.options.get(DhcpV4OptionCode::DomainNameServer)
        {
            ret.dns_srvs = v.clone();
        }
        if let Some(DhcpV4Option::DomainName(v)) =
            msg.options.get(DhcpV4OptionCode::DomainName)
        {
            ret.domain_name = Some(v.to_string());
        }
        if let Some(DhcpV4Option::VendorSpecificInfo(v)) =
            msg.options.get(DhcpV4OptionCode::VendorSpecificInfo)
        {
            ret.vendor_info = Some(v.clone());
        }
        ret.lease_time_sec = match msg
            .options
            .get(DhcpV4OptionCode::IpAddressLeaseTime)
        {
            Some(DhcpV4Option::IpAddressLeaseTime(INFINITE_LEASE_TIME))
            | None => 0,
            Some(DhcpV4Option::IpAddressLeaseTime(v))
                if *v < MIN_LEASE_TIME_SEC =>
            {
                log::warn!(
                    "Lease time {v} seconds is too short, using \
                     {MIN_LEASE_TIME_SEC} seconds instead"
                );
                MIN_LEASE_TIME_SEC
            }
            Some(DhcpV4Option::IpAddressLeaseTime(v)) => *v,
            Some(_) => 0,
        };
        if let Some(DhcpV4Option::InterfaceMtu(v)) =
            msg.options.get(DhcpV4OptionCode::InterfaceMtu)
        {
            if (MIN_MTU..=MAX_MTU).contains(v) {
                ret.mtu = *v;
            } else {
                log::debug!(
                    "Ignoring MTU {v} outside of [{MIN_MTU}, {MAX_MTU}]"
                );
            }
        }
        Ok(ret)
    }

    pub fn is_infinite(&self) -> bool {
        self.lease_time_sec == 0
    }
}

fn mask_to_prefix(mask: Ipv4Addr) -> Result<u8, DhcpError> {
    let mask = u32::from(mask);
    let prefix_length = mask.leading_ones();
    if mask.checked_shl(prefix_length).unwrap_or(0) != 0 {
        return Err(DhcpError::new(
            ErrorKind::InvalidDhcpMessage,
            format!(
                "Subnet mask {} is not contiguous",
                Ipv4Addr::from(mask)
            ),
        ));
    }
    Ok(prefix_length as u8)
}

/// Prefix length implied by the address class when no subnet mask given.
fn classful_prefix_length(addr: Ipv4Addr) -> u8 {
    match addr.octets()[0] {
        0..=127 => 8,
        128..=191 => 16,
        192..=223 => 24,
        _ => 32,
    }
}
