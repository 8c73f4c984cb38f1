// SPDX-License-Identifier: Apache-2.0

/// DHCPv4 Client State
///
/// RFC 2131 Figure 5: State-transition diagram for DHCP clients, plus the
/// states waiting on the caller.
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash, Default)]
pub enum DhcpV4State {
    /// Not running, no socket opened
    #[default]
    Stopped,
    /// Waiting caller to finish pre DHCP action before negotiation
    WaitBeforeStart,
    /// Sending broadcast DHCPDISCOVER to server and waiting DHCPOFFER
    Init,
    /// Reserved by RFC 2131, client moves from Init to Requesting directly
    Selecting,
    /// Sending broadcast DHCPREQUEST to server and waiting DHCPACK
    Requesting,
    /// Reserved by RFC 2131, never entered
    InitReboot,
    /// Reserved by RFC 2131, never entered
    Rebooting,
    /// Lease acquired, waiting caller to configure the address
    ConfiguringInterface,
    /// Lease acquired, waiting T1/T2
    Bound,
    /// T1 expired, waiting caller to finish pre DHCP action before renewal
    WaitBeforeRenewal,
    /// T1 expired, sending unicast DHCPREQUEST and waiting DHCPACK
    Renewing,
    /// T2 expired, sending broadcast DHCPREQUEST and waiting DHCPACK
    Rebinding,
}

impl std::fmt::Display for DhcpV4State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::WaitBeforeStart => write!(f, "wait_before_start"),
            Self::Init => write!(f, "init"),
            Self::Selecting => write!(f, "selecting"),
            Self::Requesting => write!(f, "requesting"),
            Self::InitReboot => write!(f, "init_reboot"),
            Self::Rebooting => write!(f, "rebooting"),
            Self::ConfiguringInterface => write!(f, "configuring_interface"),
            Self::Bound => write!(f, "bound"),
            Self::WaitBeforeRenewal => write!(f, "wait_before_renewal"),
            Self::Renewing => write!(f, "renewing"),
            Self::Rebinding => write!(f, "rebinding"),
        }
    }
}

impl DhcpV4State {
    pub fn is_running(&self) -> bool {
        *self != Self::Stopped
    }

    /// Whether a lease is held and the address may be configured.
    pub fn holds_lease(&self) -> bool {
        matches!(
            self,
            Self::ConfiguringInterface
                | Self::Bound
                | Self::WaitBeforeRenewal
                | Self::Renewing
                | Self::Rebinding
        )
    }

    /// Whether packets are sent with retransmission in this state.
    pub fn is_retransmitting(&self) -> bool {
        matches!(
            self,
            Self::Init | Self::Requesting | Self::Renewing | Self::Rebinding
        )
    }
}
