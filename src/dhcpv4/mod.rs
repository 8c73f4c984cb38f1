// SPDX-License-Identifier: Apache-2.0

mod client;
mod config;
mod event;
pub(crate) mod frame;
mod lease;
mod machine;
mod msg;
mod option;
mod parse_error;
mod socket;
mod state;

pub use self::{
    client::{DhcpV4Client, DhcpV4ClientHandle},
    config::DhcpV4Config,
    event::{
        DhcpV4Action, DhcpV4ErrorEvent, DhcpV4Event, DhcpV4Notification,
        DhcpV4SendTarget, DhcpV4Timer,
    },
    frame::{internet_checksum, udp_checksum, DhcpV4Encap},
    lease::DhcpV4Lease,
    machine::{DhcpV4Machine, DhcpV4Scheduler},
    msg::{DhcpV4Message, DhcpV4MessageType, DhcpV4Packet},
    option::{DhcpV4Option, DhcpV4OptionCode, DhcpV4Options},
    parse_error::{DhcpV4ParseError, DhcpV4ParseErrorKind},
    socket::{
        DhcpRawSocket, DhcpUdpV4Socket, DhcpV4LinuxTransport, DhcpV4Socket,
        DhcpV4Transport,
    },
    state::DhcpV4State,
};
