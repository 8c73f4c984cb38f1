// SPDX-License-Identifier: Apache-2.0

use std::{collections::HashMap, net::Ipv4Addr, time::Duration};

use crate::{
    DhcpV4Action, DhcpV4Config, DhcpV4Message, DhcpV4MessageType,
    DhcpV4Notification, DhcpV4Option, DhcpV4Packet, DhcpV4Scheduler,
    DhcpV4SendTarget, DhcpV4Timer,
};

pub(crate) const TEST_NIC_CLI: &str = "dhcpcli";
pub(crate) const TEST_NIC_CLI_INDEX: u32 = 2;
pub(crate) const TEST_CLI_MAC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
const TEST_CLI_MAC_STR: &str = "00:11:22:33:44:55";

pub(crate) const TEST_DHCP_SRV_IP: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);
pub(crate) const TEST_LEASE_IP: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 99);
pub(crate) const TEST_LEASE_TIME: u32 = 3600;
const TEST_DNS_SRV: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

pub(crate) fn init_log() {
    let _ = env_logger::Builder::new()
        .filter(Some("dhcpv4_client"), log::LevelFilter::Trace)
        .is_test(true)
        .try_init();
}

pub(crate) fn new_test_config() -> DhcpV4Config {
    let mut config = DhcpV4Config::new(TEST_NIC_CLI);
    config
        .set_link(TEST_NIC_CLI_INDEX, TEST_CLI_MAC_STR)
        .unwrap()
        .set_host_name("foo1");
    config
}

/// Virtual clock recording armed timers instead of waiting.
#[derive(Debug, Default)]
pub(crate) struct VirtualScheduler {
    pub(crate) now: Duration,
    pub(crate) timers: HashMap<DhcpV4Timer, Duration>,
}

impl VirtualScheduler {
    pub(crate) fn deadline(&self, timer: DhcpV4Timer) -> Option<Duration> {
        self.timers.get(&timer).copied()
    }

    /// Remove the earliest pending timer and move the clock to its deadline.
    pub(crate) fn pop_next(&mut self) -> Option<DhcpV4Timer> {
        let (timer, at) = self
            .timers
            .iter()
            .min_by_key(|(timer, at)| (**at, **timer))
            .map(|(timer, at)| (*timer, *at))?;
        self.timers.remove(&timer);
        self.now = std::cmp::max(self.now, at);
        Some(timer)
    }

    /// Remove specified timer and move the clock to its deadline.
    pub(crate) fn pop(&mut self, timer: DhcpV4Timer) -> DhcpV4Timer {
        let at = self.timers.remove(&timer).unwrap();
        self.now = std::cmp::max(self.now, at);
        timer
    }
}

impl DhcpV4Scheduler for VirtualScheduler {
    fn now(&self) -> Duration {
        self.now
    }

    fn schedule(&mut self, timer: DhcpV4Timer, at: Duration) {
        self.timers.insert(timer, at);
    }

    fn cancel(&mut self, timer: DhcpV4Timer) {
        self.timers.remove(&timer);
    }
}

fn gen_reply(
    msg_type: DhcpV4MessageType,
    xid: u32,
    yiaddr: Ipv4Addr,
    lease_time: u32,
) -> DhcpV4Packet {
    let mut msg = DhcpV4Message::new(xid, &TEST_CLI_MAC);
    msg.yiaddr = yiaddr;
    msg.siaddr = TEST_DHCP_SRV_IP;
    msg.options
        .insert(DhcpV4Option::ServerIdentifier(TEST_DHCP_SRV_IP));
    msg.options
        .insert(DhcpV4Option::SubnetMask(Ipv4Addr::new(255, 255, 255, 0)));
    msg.options
        .insert(DhcpV4Option::Router(vec![TEST_DHCP_SRV_IP]));
    msg.options
        .insert(DhcpV4Option::DomainNameServer(vec![TEST_DNS_SRV]));
    msg.options
        .insert(DhcpV4Option::IpAddressLeaseTime(lease_time));
    DhcpV4Packet::new(msg_type, msg)
}

pub(crate) fn gen_offer(xid: u32) -> DhcpV4Packet {
    gen_reply(DhcpV4MessageType::Offer, xid, TEST_LEASE_IP, TEST_LEASE_TIME)
}

pub(crate) fn gen_ack(
    xid: u32,
    yiaddr: Ipv4Addr,
    lease_time: u32,
) -> DhcpV4Packet {
    gen_reply(DhcpV4MessageType::Ack, xid, yiaddr, lease_time)
}

pub(crate) fn gen_nak(xid: u32) -> DhcpV4Packet {
    let mut msg = DhcpV4Message::new(xid, &TEST_CLI_MAC);
    msg.options
        .insert(DhcpV4Option::ServerIdentifier(TEST_DHCP_SRV_IP));
    DhcpV4Packet::new(DhcpV4MessageType::Nak, msg)
}

pub(crate) fn sent_packets(
    actions: &[DhcpV4Action],
) -> Vec<(&DhcpV4Packet, DhcpV4SendTarget)> {
    actions
        .iter()
        .filter_map(|action| match action {
            DhcpV4Action::Send { packet, target } => {
                Some((packet.as_ref(), *target))
            }
            _ => None,
        })
        .collect()
}

pub(crate) fn notifications(
    actions: &[DhcpV4Action],
) -> Vec<&DhcpV4Notification> {
    actions
        .iter()
        .filter_map(|action| match action {
            DhcpV4Action::Notify(n) => Some(n),
            _ => None,
        })
        .collect()
}
