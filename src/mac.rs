// SPDX-License-Identifier: Apache-2.0

use crate::{DhcpError, ErrorKind};

pub(crate) const ETH_ALEN: usize = 6;

pub(crate) const BROADCAST_MAC_ADDRESS: [u8; ETH_ALEN] = [u8::MAX; ETH_ALEN];

pub(crate) fn parse_mac(mac: &str) -> Result<Vec<u8>, DhcpError> {
    let mut mac_bytes = Vec::new();
    for item in mac.split(':') {
        match u8::from_str_radix(item, 16) {
            Ok(i) => mac_bytes.push(i),
            Err(_) => {
                return Err(DhcpError::new(
                    ErrorKind::InvalidArgument,
                    format!(
                        "Invalid MAC address {mac}, expecting format \
                         01:02:2a:2c:f7:04"
                    ),
                ));
            }
        }
    }
    Ok(mac_bytes)
}

/// Copy the first 6 bytes of a hardware address, zero padding shorter ones.
pub(crate) fn to_eth_mac(mac: &[u8]) -> [u8; ETH_ALEN] {
    let mut ret = [0u8; ETH_ALEN];
    let len = std::cmp::min(mac.len(), ETH_ALEN);
    ret[..len].copy_from_slice(&mac[..len]);
    ret
}
