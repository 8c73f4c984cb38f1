// SPDX-License-Identifier: Apache-2.0

use futures::stream::TryStreamExt;
use rtnetlink::packet_route::link::LinkAttribute;

use crate::{DhcpError, ErrorKind};

/// Query interface index and MAC address of specified interface.
pub(crate) async fn get_iface_index_mac(
    iface_name: &str,
) -> Result<(u32, Vec<u8>), DhcpError> {
    let (connection, handle, _) = rtnetlink::new_connection()?;

    tokio::spawn(connection);

    let mut links = handle
        .link()
        .get()
        .match_name(iface_name.to_string())
        .execute();

    let Some(nl_msg) = links.try_next().await? else {
        return Err(DhcpError::new(
            ErrorKind::InvalidArgument,
            format!("Interface {iface_name} not found"),
        ));
    };
    let iface_index = nl_msg.header.index;
    for nla in nl_msg.attributes {
        if let LinkAttribute::Address(mac) = nla {
            if !mac.is_empty() {
                return Ok((iface_index, mac));
            }
        }
    }
    Err(DhcpError::new(
        ErrorKind::InvalidArgument,
        format!("Interface {iface_name} has no hardware address"),
    ))
}
