// SPDX-License-Identifier: Apache-2.0

mod bpf;
mod buffer;
mod dhcpv4;
mod error;
mod mac;
#[cfg(feature = "netlink")]
mod netlink;
mod time;


pub use crate::dhcpv4::{
    internet_checksum, udp_checksum, DhcpRawSocket, DhcpUdpV4Socket,
    DhcpV4Action, DhcpV4Client, DhcpV4ClientHandle, DhcpV4Config,
    DhcpV4Encap, DhcpV4ErrorEvent, DhcpV4Event, DhcpV4Lease,
    DhcpV4LinuxTransport, DhcpV4Machine, DhcpV4Message, DhcpV4MessageType,
    DhcpV4Notification, DhcpV4Option, DhcpV4OptionCode, DhcpV4Options,
    DhcpV4Packet, DhcpV4ParseError, DhcpV4ParseErrorKind, DhcpV4Scheduler,
    DhcpV4SendTarget, DhcpV4Socket, DhcpV4State, DhcpV4Timer,
    DhcpV4Transport,
};
pub use crate::error::{DhcpError, ErrorKind};

pub(crate) use crate::buffer::{Buffer, BufferMut};
pub(crate) use crate::error::ErrorContext;
