// SPDX-License-Identifier: Apache-2.0

use std::{net::Ipv4Addr, time::Duration};

use super::env::{
    gen_ack, gen_nak, gen_offer, init_log, new_test_config, notifications,
    sent_packets, VirtualScheduler, TEST_DHCP_SRV_IP, TEST_LEASE_IP,
    TEST_LEASE_TIME,
};
use crate::{
    DhcpV4Action, DhcpV4Encap, DhcpV4ErrorEvent, DhcpV4Event, DhcpV4Machine,
    DhcpV4MessageType, DhcpV4Notification, DhcpV4OptionCode, DhcpV4Packet,
    DhcpV4ParseErrorKind, DhcpV4SendTarget, DhcpV4State, DhcpV4Timer,
};

const TEST_SEED: u64 = 0x6d6f7a696d;

fn packet_in(packet: DhcpV4Packet) -> DhcpV4Event {
    DhcpV4Event::PacketIn(Box::new(packet))
}

fn fire(
    machine: &mut DhcpV4Machine,
    sched: &mut VirtualScheduler,
    timer: DhcpV4Timer,
) -> Vec<DhcpV4Action> {
    let timer = sched.pop(timer);
    machine.process(DhcpV4Event::Timer(timer), sched)
}

// Retransmission delay is the base randomized by 10%
fn assert_kick_after(sched: &VirtualScheduler, base: Duration) {
    let delay = sched.deadline(DhcpV4Timer::Kick).unwrap() - sched.now;
    assert!(delay >= base * 9 / 10, "{delay:?} too short for {base:?}");
    assert!(delay <= base * 11 / 10, "{delay:?} too long for {base:?}");
}

fn requesting_machine() -> (DhcpV4Machine, VirtualScheduler) {
    let mut sched = VirtualScheduler::default();
    let mut machine =
        DhcpV4Machine::new_with_seed(new_test_config(), TEST_SEED);
    machine.process(DhcpV4Event::Start, &mut sched);
    machine.process(packet_in(gen_offer(machine.xid())), &mut sched);
    assert_eq!(machine.state(), DhcpV4State::Requesting);
    (machine, sched)
}

fn bound_machine(lease_time: u32) -> (DhcpV4Machine, VirtualScheduler) {
    let (mut machine, mut sched) = requesting_machine();
    machine.process(
        packet_in(gen_ack(machine.xid(), TEST_LEASE_IP, lease_time)),
        &mut sched,
    );
    machine.process(DhcpV4Event::AddressConfigured, &mut sched);
    assert_eq!(machine.state(), DhcpV4State::Bound);
    (machine, sched)
}

#[test]
fn test_dhcpv4_discover_backoff_then_offer() {
    init_log();
    let mut sched = VirtualScheduler::default();
    let mut machine =
        DhcpV4Machine::new_with_seed(new_test_config(), TEST_SEED);

    let actions = machine.process(DhcpV4Event::Start, &mut sched);
    assert_eq!(actions[0], DhcpV4Action::OpenTransport);
    let sent = sent_packets(&actions);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.message_type(), DhcpV4MessageType::Discover);
    assert_eq!(sent[0].1, DhcpV4SendTarget::Broadcast);
    assert_eq!(machine.state(), DhcpV4State::Init);
    let xid = machine.xid();

    for base_secs in [2, 4, 8, 16] {
        assert_kick_after(&sched, Duration::from_secs(base_secs));
        let actions = fire(&mut machine, &mut sched, DhcpV4Timer::Kick);
        let sent = sent_packets(&actions);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.message_type(), DhcpV4MessageType::Discover);
        assert_eq!(sent[0].0.message().xid, xid);
        assert_eq!(
            u64::from(sent[0].0.message().secs),
            sched.now.as_secs()
        );
    }
    assert_kick_after(&sched, Duration::from_secs(32));
    assert_eq!(machine.state(), DhcpV4State::Init);

    let actions = machine.process(packet_in(gen_offer(xid)), &mut sched);
    assert_eq!(machine.state(), DhcpV4State::Requesting);
    let sent = sent_packets(&actions);
    assert_eq!(sent.len(), 1);
    let request = sent[0].0;
    assert_eq!(request.message_type(), DhcpV4MessageType::Request);
    assert_eq!(sent[0].1, DhcpV4SendTarget::Broadcast);
    assert_eq!(request.message().xid, xid);
    assert_eq!(request.message().ciaddr, Ipv4Addr::UNSPECIFIED);
    assert_eq!(
        request.message().options.requested_ip(),
        Some(TEST_LEASE_IP)
    );
    assert_eq!(
        request.message().options.server_identifier(),
        Some(TEST_DHCP_SRV_IP)
    );
    assert_kick_after(&sched, Duration::from_secs(2));
    assert_eq!(
        sched.deadline(DhcpV4Timer::Timeout),
        Some(sched.now + Duration::from_secs(18))
    );
}

#[test]
fn test_dhcpv4_ignore_reply_of_other_transaction() {
    init_log();
    let (mut machine, mut sched) = requesting_machine();
    let xid = machine.xid();

    let actions = machine.process(
        packet_in(gen_ack(
            xid.wrapping_add(1),
            TEST_LEASE_IP,
            TEST_LEASE_TIME,
        )),
        &mut sched,
    );
    assert!(actions.is_empty());
    assert_eq!(machine.state(), DhcpV4State::Requesting);

    let mut ack = gen_ack(xid, TEST_LEASE_IP, TEST_LEASE_TIME);
    ack.message_mut().chaddr = vec![0x00, 0x11, 0x22, 0x33, 0x44, 0x66];
    let actions = machine.process(packet_in(ack), &mut sched);
    assert!(actions.is_empty());
    assert_eq!(machine.state(), DhcpV4State::Requesting);

    // Late offer of the same transaction
    let actions = machine.process(packet_in(gen_offer(xid)), &mut sched);
    assert!(actions.is_empty());
    assert_eq!(machine.state(), DhcpV4State::Requesting);
}

#[test]
fn test_dhcpv4_ack_configure_and_bound() {
    init_log();
    let (mut machine, mut sched) = requesting_machine();
    sched.now = Duration::from_secs(5);

    let actions = machine.process(
        packet_in(gen_ack(machine.xid(), TEST_LEASE_IP, TEST_LEASE_TIME)),
        &mut sched,
    );
    assert_eq!(machine.state(), DhcpV4State::ConfiguringInterface);
    assert!(sent_packets(&actions).is_empty());
    let notifications = notifications(&actions);
    assert_eq!(notifications.len(), 2);
    match notifications[0] {
        DhcpV4Notification::Success(lease) => {
            assert_eq!(lease.addr, TEST_LEASE_IP);
            assert_eq!(lease.prefix_length, 24);
            assert_eq!(lease.gateway, Some(TEST_DHCP_SRV_IP));
            assert_eq!(lease.dns_srvs, vec![Ipv4Addr::new(8, 8, 8, 8)]);
            assert_eq!(lease.srv_id, Some(TEST_DHCP_SRV_IP));
            assert_eq!(lease.lease_time_sec, TEST_LEASE_TIME);
        }
        n => panic!("Expecting Success, got {n:?}"),
    }
    assert_eq!(
        notifications[1],
        &DhcpV4Notification::ConfigureAddress {
            addr: TEST_LEASE_IP,
            prefix_length: 24,
        }
    );
    // No retransmission nor request deadline while configuring
    assert!(sched.timers.is_empty());

    let actions = machine.process(DhcpV4Event::AddressConfigured, &mut sched);
    assert!(actions.is_empty());
    assert_eq!(machine.state(), DhcpV4State::Bound);
    assert_eq!(machine.lease().map(|l| l.addr), Some(TEST_LEASE_IP));
    assert_eq!(
        sched.deadline(DhcpV4Timer::Renew),
        Some(Duration::from_secs(5 + 1800))
    );
    assert_eq!(
        sched.deadline(DhcpV4Timer::Rebind),
        Some(Duration::from_secs(5 + 3150))
    );
    assert_eq!(
        sched.deadline(DhcpV4Timer::Expire),
        Some(Duration::from_secs(5 + 3600))
    );
    assert_eq!(sched.deadline(DhcpV4Timer::Kick), None);
}

#[test]
fn test_dhcpv4_requesting_nak() {
    init_log();
    let (mut machine, mut sched) = requesting_machine();
    let old_xid = machine.xid();

    let actions = machine.process(packet_in(gen_nak(old_xid)), &mut sched);
    assert_eq!(machine.state(), DhcpV4State::Init);
    assert!(notifications(&actions).is_empty());
    let sent = sent_packets(&actions);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.message_type(), DhcpV4MessageType::Discover);
    assert_eq!(sent[0].0.message().xid, machine.xid());
    assert_eq!(sched.deadline(DhcpV4Timer::Timeout), None);
}

#[test]
fn test_dhcpv4_requesting_timeout() {
    init_log();
    let (mut machine, mut sched) = requesting_machine();
    let start = sched.now;

    let mut request_count = 1;
    let actions = loop {
        let timer = sched.pop_next().unwrap();
        let actions =
            machine.process(DhcpV4Event::Timer(timer), &mut sched);
        if timer == DhcpV4Timer::Timeout {
            break actions;
        }
        assert_eq!(timer, DhcpV4Timer::Kick);
        let sent = sent_packets(&actions);
        assert_eq!(sent[0].0.message_type(), DhcpV4MessageType::Request);
        request_count += 1;
    };
    // Sent at 0s, 2s, 6s and 14s
    assert_eq!(request_count, 4);
    assert_eq!(sched.now, start + Duration::from_secs(18));
    assert_eq!(machine.state(), DhcpV4State::Init);
    let sent = sent_packets(&actions);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.message_type(), DhcpV4MessageType::Discover);
    assert_kick_after(&sched, Duration::from_secs(2));
}

#[test]
fn test_dhcpv4_renew_unicast_and_ack() {
    init_log();
    let (mut machine, mut sched) = bound_machine(TEST_LEASE_TIME);
    let bound_xid = machine.xid();

    let actions = fire(&mut machine, &mut sched, DhcpV4Timer::Renew);
    assert_eq!(machine.state(), DhcpV4State::Renewing);
    assert_eq!(sched.now, Duration::from_secs(1800));
    let sent = sent_packets(&actions);
    assert_eq!(sent.len(), 1);
    let (request, target) = sent[0];
    assert_eq!(target, DhcpV4SendTarget::Unicast(TEST_DHCP_SRV_IP));
    assert_eq!(request.message_type(), DhcpV4MessageType::Request);
    assert_ne!(request.message().xid, bound_xid);
    assert_eq!(request.message().xid, machine.xid());
    assert_eq!(request.message().ciaddr, TEST_LEASE_IP);
    assert_eq!(request.message().options.requested_ip(), None);
    assert_eq!(request.message().options.server_identifier(), None);
    // Rebind and expire timers stay armed
    assert_eq!(
        sched.deadline(DhcpV4Timer::Rebind),
        Some(Duration::from_secs(3150))
    );
    assert_eq!(
        sched.deadline(DhcpV4Timer::Expire),
        Some(Duration::from_secs(3600))
    );

    let actions = machine.process(
        packet_in(gen_ack(machine.xid(), TEST_LEASE_IP, TEST_LEASE_TIME)),
        &mut sched,
    );
    assert_eq!(machine.state(), DhcpV4State::Bound);
    let notifications = notifications(&actions);
    assert_eq!(notifications.len(), 1);
    assert!(matches!(notifications[0], DhcpV4Notification::Success(_)));
    assert_eq!(sched.deadline(DhcpV4Timer::Kick), None);
    assert_eq!(
        sched.deadline(DhcpV4Timer::Renew),
        Some(Duration::from_secs(1800 + 1800))
    );
    assert_eq!(
        sched.deadline(DhcpV4Timer::Rebind),
        Some(Duration::from_secs(1800 + 3150))
    );
    assert_eq!(
        sched.deadline(DhcpV4Timer::Expire),
        Some(Duration::from_secs(1800 + 3600))
    );
}

#[test]
fn test_dhcpv4_renew_without_server_id_broadcast() {
    init_log();
    let (mut machine, mut sched) = requesting_machine();
    let mut ack = gen_ack(machine.xid(), TEST_LEASE_IP, TEST_LEASE_TIME);
    ack.message_mut()
        .options
        .remove(DhcpV4OptionCode::ServerIdentifier);
    let actions = machine.process(packet_in(ack), &mut sched);
    match notifications(&actions).as_slice() {
        [DhcpV4Notification::Success(lease), ..] => {
            assert_eq!(lease.srv_id, None)
        }
        n => panic!("Expecting Success, got {n:?}"),
    }
    machine.process(DhcpV4Event::AddressConfigured, &mut sched);
    assert_eq!(machine.state(), DhcpV4State::Bound);

    let actions = fire(&mut machine, &mut sched, DhcpV4Timer::Renew);
    assert_eq!(machine.state(), DhcpV4State::Renewing);
    let sent = sent_packets(&actions);
    assert_eq!(sent.len(), 1);
    let (request, target) = sent[0];
    assert_eq!(target, DhcpV4SendTarget::Broadcast);
    assert_eq!(request.message_type(), DhcpV4MessageType::Request);
    assert_eq!(request.message().ciaddr, TEST_LEASE_IP);

    // Retransmission keeps broadcasting
    let actions = fire(&mut machine, &mut sched, DhcpV4Timer::Kick);
    let sent = sent_packets(&actions);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, DhcpV4SendTarget::Broadcast);

    machine.process(
        packet_in(gen_ack(machine.xid(), TEST_LEASE_IP, TEST_LEASE_TIME)),
        &mut sched,
    );
    assert_eq!(machine.state(), DhcpV4State::Bound);
}

#[test]
fn test_dhcpv4_renew_nak() {
    init_log();
    let (mut machine, mut sched) = bound_machine(TEST_LEASE_TIME);
    fire(&mut machine, &mut sched, DhcpV4Timer::Renew);
    assert_eq!(machine.state(), DhcpV4State::Renewing);

    let actions =
        machine.process(packet_in(gen_nak(machine.xid())), &mut sched);
    assert_eq!(machine.state(), DhcpV4State::Init);
    assert_eq!(machine.lease(), None);
    assert_eq!(
        notifications(&actions),
        vec![
            &DhcpV4Notification::Failure,
            &DhcpV4Notification::ClearAddress
        ]
    );
    let sent = sent_packets(&actions);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.message_type(), DhcpV4MessageType::Discover);
    assert_eq!(sched.deadline(DhcpV4Timer::Renew), None);
    assert_eq!(sched.deadline(DhcpV4Timer::Rebind), None);
    assert_eq!(sched.deadline(DhcpV4Timer::Expire), None);
}

#[test]
fn test_dhcpv4_renew_ack_with_other_address() {
    init_log();
    let (mut machine, mut sched) = bound_machine(TEST_LEASE_TIME);
    fire(&mut machine, &mut sched, DhcpV4Timer::Renew);

    let actions = machine.process(
        packet_in(gen_ack(
            machine.xid(),
            Ipv4Addr::new(192, 0, 2, 100),
            TEST_LEASE_TIME,
        )),
        &mut sched,
    );
    assert_eq!(machine.state(), DhcpV4State::Init);
    assert_eq!(
        notifications(&actions),
        vec![
            &DhcpV4Notification::Failure,
            &DhcpV4Notification::ClearAddress
        ]
    );
}

#[test]
fn test_dhcpv4_rebind_and_ack() {
    init_log();
    let (mut machine, mut sched) = bound_machine(TEST_LEASE_TIME);
    fire(&mut machine, &mut sched, DhcpV4Timer::Renew);
    let renew_xid = machine.xid();

    let actions = fire(&mut machine, &mut sched, DhcpV4Timer::Rebind);
    assert_eq!(machine.state(), DhcpV4State::Rebinding);
    assert_eq!(sched.now, Duration::from_secs(3150));
    assert_ne!(machine.xid(), renew_xid);
    let sent = sent_packets(&actions);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, DhcpV4SendTarget::Broadcast);
    assert_eq!(sent[0].0.message().ciaddr, TEST_LEASE_IP);
    assert_kick_after(&sched, Duration::from_secs(2));

    let actions = machine.process(
        packet_in(gen_ack(machine.xid(), TEST_LEASE_IP, TEST_LEASE_TIME)),
        &mut sched,
    );
    assert_eq!(machine.state(), DhcpV4State::Bound);
    assert!(matches!(
        notifications(&actions).as_slice(),
        [DhcpV4Notification::Success(_)]
    ));
    assert_eq!(
        sched.deadline(DhcpV4Timer::Expire),
        Some(Duration::from_secs(3150 + 3600))
    );
}

#[test]
fn test_dhcpv4_lease_expire() {
    init_log();
    let (mut machine, mut sched) = bound_machine(TEST_LEASE_TIME);
    fire(&mut machine, &mut sched, DhcpV4Timer::Renew);
    fire(&mut machine, &mut sched, DhcpV4Timer::Rebind);
    assert_eq!(machine.state(), DhcpV4State::Rebinding);

    let mut kick_count = 0;
    let actions = loop {
        let timer = sched.pop_next().unwrap();
        let actions =
            machine.process(DhcpV4Event::Timer(timer), &mut sched);
        if timer == DhcpV4Timer::Expire {
            break actions;
        }
        assert_eq!(timer, DhcpV4Timer::Kick);
        assert_eq!(machine.state(), DhcpV4State::Rebinding);
        kick_count += 1;
        assert!(kick_count < 100);
    };
    assert_eq!(sched.now, Duration::from_secs(3600));
    assert_eq!(machine.state(), DhcpV4State::Init);
    assert_eq!(machine.lease(), None);
    assert_eq!(
        notifications(&actions),
        vec![
            &DhcpV4Notification::Failure,
            &DhcpV4Notification::ClearAddress
        ]
    );
    let sent = sent_packets(&actions);
    assert_eq!(sent[0].0.message_type(), DhcpV4MessageType::Discover);
}

#[test]
fn test_dhcpv4_infinite_lease() {
    init_log();
    let (machine, sched) = bound_machine(u32::MAX);
    let lease = machine.lease().unwrap();
    assert_eq!(lease.lease_time_sec, 0);
    assert!(lease.is_infinite());
    assert!(sched.timers.is_empty());
}

#[test]
fn test_dhcpv4_pre_dhcp_action() {
    init_log();
    let mut config = new_test_config();
    config.set_pre_dhcp_action(true);
    let mut sched = VirtualScheduler::default();
    let mut machine = DhcpV4Machine::new_with_seed(config, TEST_SEED);

    let actions = machine.process(DhcpV4Event::Start, &mut sched);
    assert_eq!(machine.state(), DhcpV4State::WaitBeforeStart);
    assert_eq!(
        actions,
        vec![
            DhcpV4Action::OpenTransport,
            DhcpV4Action::Notify(DhcpV4Notification::PreDhcpAction),
        ]
    );
    assert!(sched.timers.is_empty());

    // Ignored until the hook completes
    let actions = machine.process(packet_in(gen_offer(0)), &mut sched);
    assert!(actions.is_empty());

    let actions = machine.process(DhcpV4Event::PreDhcpActionDone, &mut sched);
    assert_eq!(machine.state(), DhcpV4State::Init);
    assert_eq!(
        sent_packets(&actions)[0].0.message_type(),
        DhcpV4MessageType::Discover
    );

    machine.process(packet_in(gen_offer(machine.xid())), &mut sched);
    machine.process(
        packet_in(gen_ack(machine.xid(), TEST_LEASE_IP, TEST_LEASE_TIME)),
        &mut sched,
    );
    machine.process(DhcpV4Event::AddressConfigured, &mut sched);
    assert_eq!(machine.state(), DhcpV4State::Bound);

    let actions = fire(&mut machine, &mut sched, DhcpV4Timer::Renew);
    assert_eq!(machine.state(), DhcpV4State::WaitBeforeRenewal);
    assert_eq!(
        actions,
        vec![DhcpV4Action::Notify(DhcpV4Notification::PreDhcpAction)]
    );

    let actions = machine.process(DhcpV4Event::PreDhcpActionDone, &mut sched);
    assert_eq!(machine.state(), DhcpV4State::Renewing);
    let sent = sent_packets(&actions);
    assert_eq!(sent[0].1, DhcpV4SendTarget::Unicast(TEST_DHCP_SRV_IP));
}

#[test]
fn test_dhcpv4_stop_and_restart() {
    init_log();
    let (mut machine, mut sched) = bound_machine(TEST_LEASE_TIME);

    let actions = machine.process(DhcpV4Event::Stop, &mut sched);
    assert_eq!(machine.state(), DhcpV4State::Stopped);
    assert_eq!(
        actions,
        vec![
            DhcpV4Action::Notify(DhcpV4Notification::ClearAddress),
            DhcpV4Action::CloseTransport,
        ]
    );
    assert!(sched.timers.is_empty());
    assert_eq!(machine.lease(), None);

    // Stop again is no-op
    assert!(machine.process(DhcpV4Event::Stop, &mut sched).is_empty());

    let actions = machine.process(DhcpV4Event::Start, &mut sched);
    assert_eq!(actions[0], DhcpV4Action::OpenTransport);
    assert_eq!(machine.state(), DhcpV4State::Init);

    // Start when running is no-op
    assert!(machine.process(DhcpV4Event::Start, &mut sched).is_empty());
}

#[test]
fn test_dhcpv4_quit() {
    init_log();
    let mut sched = VirtualScheduler::default();
    let mut machine =
        DhcpV4Machine::new_with_seed(new_test_config(), TEST_SEED);
    assert_eq!(
        machine.process(DhcpV4Event::Quit, &mut sched),
        vec![DhcpV4Action::Notify(DhcpV4Notification::Terminated)]
    );

    let (mut machine, mut sched) = requesting_machine();
    let actions = machine.process(DhcpV4Event::Quit, &mut sched);
    assert_eq!(
        actions,
        vec![
            DhcpV4Action::CloseTransport,
            DhcpV4Action::Notify(DhcpV4Notification::Terminated),
        ]
    );
    assert_eq!(machine.state(), DhcpV4State::Stopped);
    assert!(sched.timers.is_empty());
}

#[test]
fn test_dhcpv4_transport_error() {
    init_log();
    let mut sched = VirtualScheduler::default();
    let mut machine =
        DhcpV4Machine::new_with_seed(new_test_config(), TEST_SEED);
    let error = crate::DhcpError::new(
        crate::ErrorKind::IoError,
        "Network is down".to_string(),
    );

    // Ignored when stopped
    assert!(machine
        .process(DhcpV4Event::TransportError(error.clone()), &mut sched)
        .is_empty());

    machine.process(DhcpV4Event::Start, &mut sched);
    let actions =
        machine.process(DhcpV4Event::TransportError(error.clone()), &mut sched);
    assert_eq!(machine.state(), DhcpV4State::Stopped);
    assert_eq!(
        actions,
        vec![
            DhcpV4Action::Notify(DhcpV4Notification::ErrorEvent(
                DhcpV4ErrorEvent {
                    code: DhcpV4ParseErrorKind::ReceiveError.code(),
                    msg: error.to_string(),
                }
            )),
            DhcpV4Action::Notify(DhcpV4Notification::Failure),
            DhcpV4Action::CloseTransport,
        ]
    );
    assert!(sched.timers.is_empty());
}

#[test]
fn test_dhcpv4_truncated_packet_reported() {
    init_log();
    let (mut machine, mut sched) = requesting_machine();

    let e = DhcpV4Packet::parse(&[0u8; 235], DhcpV4Encap::Bootp).unwrap_err();
    assert_eq!(e.kind(), DhcpV4ParseErrorKind::TooShort(DhcpV4Encap::Bootp));

    let actions =
        machine.process(DhcpV4Event::ParseError(e.clone()), &mut sched);
    assert_eq!(
        actions,
        vec![DhcpV4Action::Notify(DhcpV4Notification::ErrorEvent(
            DhcpV4ErrorEvent {
                code: e.code(),
                msg: e.to_string(),
            }
        ))]
    );
    assert_eq!(machine.state(), DhcpV4State::Requesting);
}
