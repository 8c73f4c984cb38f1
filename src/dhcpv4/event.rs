// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use crate::{DhcpError, DhcpV4Lease, DhcpV4Packet, DhcpV4ParseError};

/// Input of [crate::DhcpV4Machine::process()].
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum DhcpV4Event {
    /// Start negotiation
    Start,
    /// Stop negotiation and close transport
    Stop,
    /// Stop and terminate the client
    Quit,
    /// Caller finished the action requested by
    /// [DhcpV4Notification::PreDhcpAction]
    PreDhcpActionDone,
    /// Caller finished configuring the address requested by
    /// [DhcpV4Notification::ConfigureAddress]
    AddressConfigured,
    PacketIn(Box<DhcpV4Packet>),
    ParseError(DhcpV4ParseError),
    /// Socket failure
    TransportError(DhcpError),
    Timer(DhcpV4Timer),
}

impl std::fmt::Display for DhcpV4Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Quit => write!(f, "quit"),
            Self::PreDhcpActionDone => write!(f, "pre_dhcp_action_done"),
            Self::AddressConfigured => write!(f, "address_configured"),
            Self::PacketIn(p) => write!(f, "packet_in({p})"),
            Self::ParseError(e) => write!(f, "parse_error({e})"),
            Self::TransportError(e) => write!(f, "transport_error({e})"),
            Self::Timer(t) => write!(f, "timer({t})"),
        }
    }
}

/// Timers armed through [crate::DhcpV4Scheduler]. At most one pending
/// timer per kind.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub enum DhcpV4Timer {
    /// Retransmission
    Kick,
    /// Absolute deadline of Requesting state
    Timeout,
    /// T1
    Renew,
    /// T2
    Rebind,
    /// Lease expired
    Expire,
}

impl std::fmt::Display for DhcpV4Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Kick => "kick",
                Self::Timeout => "timeout",
                Self::Renew => "renew",
                Self::Rebind => "rebind",
                Self::Expire => "expire",
            }
        )
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum DhcpV4SendTarget {
    Broadcast,
    /// Unicast to DHCP server
    Unicast(Ipv4Addr),
}

/// Output of [crate::DhcpV4Machine::process()], executed by the runtime in
/// order.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum DhcpV4Action {
    OpenTransport,
    CloseTransport,
    Send {
        packet: Box<DhcpV4Packet>,
        target: DhcpV4SendTarget,
    },
    Notify(DhcpV4Notification),
}

/// Message delivered to the controller of the client.
#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum DhcpV4Notification {
    /// Do the pre DHCP action and then call
    /// [crate::DhcpV4ClientHandle::pre_dhcp_action_done()]
    PreDhcpAction,
    Success(Box<DhcpV4Lease>),
    /// Lease lost or negotiation failed
    Failure,
    /// Configure the address and then call
    /// [crate::DhcpV4ClientHandle::address_configured()]
    ConfigureAddress { addr: Ipv4Addr, prefix_length: u8 },
    /// Remove the address previously configured
    ClearAddress,
    ErrorEvent(DhcpV4ErrorEvent),
    /// Client stopped and will not process any more command
    Terminated,
}

/// Error report for metrics, carrying [crate::DhcpV4ParseError::code()].
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DhcpV4ErrorEvent {
    pub code: u32,
    pub msg: String,
}

impl std::fmt::Display for DhcpV4ErrorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}: {}", self.code, self.msg)
    }
}
