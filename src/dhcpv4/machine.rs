// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{
    event::{
        DhcpV4Action, DhcpV4ErrorEvent, DhcpV4Event, DhcpV4Notification,
        DhcpV4SendTarget, DhcpV4Timer,
    },
    msg::wire_chaddr,
    parse_error::DhcpV4ParseErrorKind,
};
use crate::{
    DhcpV4Config, DhcpV4Lease, DhcpV4Message, DhcpV4Packet, DhcpV4State,
};

const INITIAL_RETRANS_INTERVAL: Duration = Duration::from_secs(2);
const MAX_RETRANS_INTERVAL: Duration = Duration::from_secs(128);
// Percent of retransmission interval
const RETRANS_JITTER: u32 = 10;
// Give up the offer if no ACK/NAK after this since entering Requesting
const REQUEST_TIMEOUT: Duration = Duration::from_secs(18);

/// Time source and timer service used by [DhcpV4Machine].
///
/// Times are offsets from an arbitrary monotonic epoch chosen by the
/// implementation.
pub trait DhcpV4Scheduler {
    fn now(&self) -> Duration;

    /// Fire [DhcpV4Event::Timer] at specified time, replacing pending timer
    /// of the same kind.
    fn schedule(&mut self, timer: DhcpV4Timer, at: Duration);

    fn cancel(&mut self, timer: DhcpV4Timer);
}

/// Per negotiation context.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub(crate) struct DhcpV4Transaction {
    pub(crate) xid: u32,
    pub(crate) start: Duration,
    pub(crate) retrans_interval: Duration,
    pub(crate) offer: Option<DhcpV4Lease>,
    pub(crate) lease: Option<DhcpV4Lease>,
    // None for infinite lease
    pub(crate) lease_expiry: Option<Duration>,
}

impl DhcpV4Transaction {
    fn new(xid: u32, start: Duration) -> Self {
        Self {
            xid,
            start,
            retrans_interval: INITIAL_RETRANS_INTERVAL,
            ..Default::default()
        }
    }

    fn elapsed_secs(&self, now: Duration) -> u16 {
        u16::try_from(now.saturating_sub(self.start).as_secs())
            .unwrap_or(u16::MAX)
    }
}

/// DHCPv4 negotiation state machine without any IO.
///
/// Every input goes through [DhcpV4Machine::process()] which returns the
/// actions for the caller to perform in order.
#[derive(Debug)]
pub struct DhcpV4Machine {
    config: DhcpV4Config,
    state: DhcpV4State,
    trans: DhcpV4Transaction,
    rng: StdRng,
}

impl DhcpV4Machine {
    pub fn new(config: DhcpV4Config) -> Self {
        Self {
            config,
            state: DhcpV4State::Stopped,
            trans: DhcpV4Transaction::default(),
            rng: StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Use deterministic random numbers for transaction ID and jitter.
    pub fn new_with_seed(config: DhcpV4Config, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new(config)
        }
    }

    pub fn state(&self) -> DhcpV4State {
        self.state
    }

    pub fn config(&self) -> &DhcpV4Config {
        &self.config
    }

    /// Transaction ID of current negotiation.
    pub fn xid(&self) -> u32 {
        self.trans.xid
    }

    /// Current lease, only available in lease holding states.
    pub fn lease(&self) -> Option<&DhcpV4Lease> {
        self.trans.lease.as_ref()
    }

    pub fn process(
        &mut self,
        event: DhcpV4Event,
        sched: &mut impl DhcpV4Scheduler,
    ) -> Vec<DhcpV4Action> {
        log::debug!("DHCPv4 state {} processing event {event}", self.state);
        let mut actions = Vec::new();
        match event {
            DhcpV4Event::Start => {
                if self.state == DhcpV4State::Stopped {
                    actions.push(DhcpV4Action::OpenTransport);
                    let next = if self.config.pre_dhcp_action {
                        DhcpV4State::WaitBeforeStart
                    } else {
                        DhcpV4State::Init
                    };
                    self.transit(next, sched, &mut actions);
                } else {
                    log::debug!("DHCPv4 client is already running");
                }
            }
            DhcpV4Event::Stop => {
                if self.state.is_running() {
                    self.transit(DhcpV4State::Stopped, sched, &mut actions);
                }
            }
            DhcpV4Event::Quit => {
                if self.state.is_running() {
                    self.transit(DhcpV4State::Stopped, sched, &mut actions);
                }
                actions.push(DhcpV4Action::Notify(
                    DhcpV4Notification::Terminated,
                ));
            }
            DhcpV4Event::PreDhcpActionDone => match self.state {
                DhcpV4State::WaitBeforeStart => {
                    self.transit(DhcpV4State::Init, sched, &mut actions)
                }
                DhcpV4State::WaitBeforeRenewal => {
                    self.transit(DhcpV4State::Renewing, sched, &mut actions)
                }
                _ => log::debug!(
                    "Ignoring unexpected pre DHCP action done in state {}",
                    self.state
                ),
            },
            DhcpV4Event::AddressConfigured => {
                if self.state == DhcpV4State::ConfiguringInterface {
                    self.transit(DhcpV4State::Bound, sched, &mut actions);
                } else {
                    log::debug!(
                        "Ignoring unexpected address configured in state {}",
                        self.state
                    );
                }
            }
            DhcpV4Event::PacketIn(packet) => {
                self.process_packet(*packet, sched, &mut actions)
            }
            DhcpV4Event::ParseError(e) => {
                log::warn!("Dropping malformed DHCPv4 packet: {e}");
                actions.push(DhcpV4Action::Notify(
                    DhcpV4Notification::ErrorEvent(DhcpV4ErrorEvent {
                        code: e.code(),
                        msg: e.to_string(),
                    }),
                ));
            }
            DhcpV4Event::TransportError(e) => {
                if self.state.is_running() {
                    log::error!("DHCPv4 transport failure: {e}");
                    actions.push(DhcpV4Action::Notify(
                        DhcpV4Notification::ErrorEvent(DhcpV4ErrorEvent {
                            code: DhcpV4ParseErrorKind::ReceiveError.code(),
                            msg: e.to_string(),
                        }),
                    ));
                    actions.push(DhcpV4Action::Notify(
                        DhcpV4Notification::Failure,
                    ));
                    self.transit(DhcpV4State::Stopped, sched, &mut actions);
                } else {
                    log::debug!("Ignoring transport error when stopped: {e}");
                }
            }
            DhcpV4Event::Timer(timer) => {
                self.process_timer(timer, sched, &mut actions)
            }
        }
        actions
    }

    fn process_timer(
        &mut self,
        timer: DhcpV4Timer,
        sched: &mut impl DhcpV4Scheduler,
        actions: &mut Vec<DhcpV4Action>,
    ) {
        match (timer, self.state) {
            (DhcpV4Timer::Kick, s) if s.is_retransmitting() => {
                self.kick(sched, actions)
            }
            (DhcpV4Timer::Timeout, DhcpV4State::Requesting) => {
                log::info!(
                    "No reply for DHCPREQUEST in {} seconds, restarting \
                     negotiation",
                    REQUEST_TIMEOUT.as_secs()
                );
                self.transit(DhcpV4State::Init, sched, actions);
            }
            (DhcpV4Timer::Renew, DhcpV4State::Bound) => {
                let next = if self.config.pre_dhcp_action {
                    DhcpV4State::WaitBeforeRenewal
                } else {
                    DhcpV4State::Renewing
                };
                self.transit(next, sched, actions);
            }
            (
                DhcpV4Timer::Rebind,
                DhcpV4State::Bound
                | DhcpV4State::WaitBeforeRenewal
                | DhcpV4State::Renewing,
            ) => self.transit(DhcpV4State::Rebinding, sched, actions),
            (DhcpV4Timer::Expire, s) if s.holds_lease() => {
                log::info!("DHCPv4 lease expired");
                actions.push(DhcpV4Action::Notify(DhcpV4Notification::Failure));
                self.transit(DhcpV4State::Init, sched, actions);
            }
            (timer, state) => {
                log::debug!("Ignoring timer {timer} in state {state}")
            }
        }
    }

    fn process_packet(
        &mut self,
        packet: DhcpV4Packet,
        sched: &mut impl DhcpV4Scheduler,
        actions: &mut Vec<DhcpV4Action>,
    ) {
        if !self.state.is_retransmitting() {
            log::debug!("Ignoring {packet} in state {}", self.state);
            return;
        }
        let msg = packet.message();
        if msg.xid != self.trans.xid {
            log::debug!(
                "Ignoring {packet}: transaction ID mismatch, expecting \
                 {:#010x}",
                self.trans.xid
            );
            return;
        }
        if msg.chaddr.as_slice() != wire_chaddr(&self.config.src_mac) {
            log::debug!(
                "Ignoring {packet}: client hardware address {:?} mismatch",
                msg.chaddr
            );
            return;
        }

        match (self.state, &packet) {
            (DhcpV4State::Init, DhcpV4Packet::Offer(msg)) => {
                if let Some(offer) = lease_from_msg(msg) {
                    log::info!(
                        "Got DHCP offer {}/{} from {:?}",
                        offer.addr,
                        offer.prefix_length,
                        offer.srv_id
                    );
                    self.trans.offer = Some(offer);
                    self.transit(DhcpV4State::Requesting, sched, actions);
                }
            }
            (DhcpV4State::Requesting, DhcpV4Packet::Ack(msg)) => {
                if let Some(lease) = lease_from_msg(msg) {
                    self.accept_lease(lease, sched, actions);
                    self.transit(
                        DhcpV4State::ConfiguringInterface,
                        sched,
                        actions,
                    );
                }
            }
            (DhcpV4State::Requesting, DhcpV4Packet::Nak(_)) => {
                log::info!("DHCP offer declined by server with NAK");
                self.trans.offer = None;
                self.transit(DhcpV4State::Init, sched, actions);
            }
            (
                DhcpV4State::Renewing | DhcpV4State::Rebinding,
                DhcpV4Packet::Ack(msg),
            ) => {
                let Some(lease) = lease_from_msg(msg) else {
                    return;
                };
                let cur_addr = self.trans.lease.as_ref().map(|l| l.addr);
                if cur_addr == Some(lease.addr) {
                    self.accept_lease(lease, sched, actions);
                    self.transit(DhcpV4State::Bound, sched, actions);
                } else {
                    log::warn!(
                        "Server granted {} while renewing {cur_addr:?}, \
                         restarting negotiation",
                        lease.addr
                    );
                    actions.push(DhcpV4Action::Notify(
                        DhcpV4Notification::Failure,
                    ));
                    self.transit(DhcpV4State::Init, sched, actions);
                }
            }
            (
                DhcpV4State::Renewing | DhcpV4State::Rebinding,
                DhcpV4Packet::Nak(_),
            ) => {
                log::info!("DHCP lease refresh refused by server with NAK");
                actions.push(DhcpV4Action::Notify(DhcpV4Notification::Failure));
                self.transit(DhcpV4State::Init, sched, actions);
            }
            (state, packet) => {
                log::debug!("Ignoring {packet} in state {state}");
            }
        }
    }

    fn accept_lease(
        &mut self,
        lease: DhcpV4Lease,
        sched: &mut impl DhcpV4Scheduler,
        actions: &mut Vec<DhcpV4Action>,
    ) {
        log::info!(
            "Got DHCP lease {}/{} for {} seconds",
            lease.addr,
            lease.prefix_length,
            lease.lease_time_sec
        );
        self.trans.lease_expiry = if lease.is_infinite() {
            None
        } else {
            Some(
                sched.now()
                    + Duration::from_secs(u64::from(lease.lease_time_sec)),
            )
        };
        self.trans.offer = None;
        self.trans.lease = Some(lease.clone());
        actions.push(DhcpV4Action::Notify(DhcpV4Notification::Success(
            Box::new(lease),
        )));
    }

    fn transit(
        &mut self,
        next: DhcpV4State,
        sched: &mut impl DhcpV4Scheduler,
        actions: &mut Vec<DhcpV4Action>,
    ) {
        let prev = self.state;
        log::debug!("DHCPv4 state {prev} -> {next}");

        if prev.is_retransmitting() {
            sched.cancel(DhcpV4Timer::Kick);
            sched.cancel(DhcpV4Timer::Timeout);
        }
        if prev.holds_lease() && !next.holds_lease() {
            sched.cancel(DhcpV4Timer::Renew);
            sched.cancel(DhcpV4Timer::Rebind);
            sched.cancel(DhcpV4Timer::Expire);
            self.trans.lease = None;
            self.trans.lease_expiry = None;
            actions.push(DhcpV4Action::Notify(
                DhcpV4Notification::ClearAddress,
            ));
        }
        if prev.is_running() && next == DhcpV4State::Stopped {
            self.trans = DhcpV4Transaction::default();
            actions.push(DhcpV4Action::CloseTransport);
        }

        self.state = next;

        match next {
            DhcpV4State::WaitBeforeStart | DhcpV4State::WaitBeforeRenewal => {
                actions.push(DhcpV4Action::Notify(
                    DhcpV4Notification::PreDhcpAction,
                ));
            }
            DhcpV4State::Init => {
                self.trans =
                    DhcpV4Transaction::new(self.rng.random(), sched.now());
                log::debug!("New DHCPv4 transaction {:#010x}", self.trans.xid);
                self.start_retransmit(sched, actions);
            }
            DhcpV4State::Requesting => {
                let now = sched.now();
                sched.schedule(DhcpV4Timer::Timeout, now + REQUEST_TIMEOUT);
                self.start_retransmit(sched, actions);
            }
            DhcpV4State::Renewing | DhcpV4State::Rebinding => {
                self.trans.xid = self.rng.random();
                self.trans.start = sched.now();
                log::debug!("New DHCPv4 transaction {:#010x}", self.trans.xid);
                self.start_retransmit(sched, actions);
            }
            DhcpV4State::ConfiguringInterface => {
                if let Some(lease) = self.trans.lease.as_ref() {
                    actions.push(DhcpV4Action::Notify(
                        DhcpV4Notification::ConfigureAddress {
                            addr: lease.addr,
                            prefix_length: lease.prefix_length,
                        },
                    ));
                }
            }
            DhcpV4State::Bound => self.arm_lease_timers(sched),
            DhcpV4State::Stopped
            | DhcpV4State::Selecting
            | DhcpV4State::InitReboot
            | DhcpV4State::Rebooting => (),
        }
    }

    fn arm_lease_timers(&mut self, sched: &mut impl DhcpV4Scheduler) {
        match self.trans.lease_expiry {
            Some(expiry) => {
                let now = sched.now();
                let remains = expiry.saturating_sub(now);
                log::debug!(
                    "Lease expires in {} seconds",
                    remains.as_secs()
                );
                sched.schedule(DhcpV4Timer::Renew, now + remains / 2);
                sched.schedule(DhcpV4Timer::Rebind, now + remains * 7 / 8);
                sched.schedule(DhcpV4Timer::Expire, expiry);
            }
            None => {
                log::debug!("Infinite lease, no renewal needed");
                sched.cancel(DhcpV4Timer::Renew);
                sched.cancel(DhcpV4Timer::Rebind);
                sched.cancel(DhcpV4Timer::Expire);
            }
        }
    }

    fn start_retransmit(
        &mut self,
        sched: &mut impl DhcpV4Scheduler,
        actions: &mut Vec<DhcpV4Action>,
    ) {
        self.trans.retrans_interval = INITIAL_RETRANS_INTERVAL;
        self.kick(sched, actions);
    }

    // Send packet of current state and schedule next retransmission
    fn kick(
        &mut self,
        sched: &mut impl DhcpV4Scheduler,
        actions: &mut Vec<DhcpV4Action>,
    ) {
        let now = sched.now();
        if let Some((packet, target)) = self.gen_packet(now) {
            actions.push(DhcpV4Action::Send {
                packet: Box::new(packet),
                target,
            });
        }
        let interval = self.trans.retrans_interval;
        let jitter = interval * RETRANS_JITTER / 100;
        let delay = interval - jitter
            + Duration::from_millis(
                self.rng.random_range(0..=(jitter * 2).as_millis() as u64),
            );
        sched.schedule(DhcpV4Timer::Kick, now + delay);
        self.trans.retrans_interval =
            std::cmp::min(interval * 2, MAX_RETRANS_INTERVAL);
    }

    fn gen_packet(
        &self,
        now: Duration,
    ) -> Option<(DhcpV4Packet, DhcpV4SendTarget)> {
        let xid = self.trans.xid;
        let secs = self.trans.elapsed_secs(now);
        match self.state {
            DhcpV4State::Init => Some((
                DhcpV4Packet::new_discover(xid, secs, &self.config),
                DhcpV4SendTarget::Broadcast,
            )),
            DhcpV4State::Requesting => {
                let Some(offer) = self.trans.offer.as_ref() else {
                    log::error!("BUG: Requesting state without offer");
                    return None;
                };
                Some((
                    DhcpV4Packet::new_request(xid, secs, &self.config, offer),
                    DhcpV4SendTarget::Broadcast,
                ))
            }
            DhcpV4State::Renewing | DhcpV4State::Rebinding => {
                let Some(lease) = self.trans.lease.as_ref() else {
                    log::error!("BUG: {} state without lease", self.state);
                    return None;
                };
                let packet =
                    DhcpV4Packet::new_renew(xid, secs, &self.config, lease);
                let target = match (self.state, lease.srv_id) {
                    (DhcpV4State::Renewing, Some(srv_id)) => {
                        DhcpV4SendTarget::Unicast(srv_id)
                    }
                    (DhcpV4State::Renewing, None) => {
                        log::warn!(
                            "Lease has no server identifier, which violates \
                             RFC 2131, broadcasting DHCPREQUEST for renewal"
                        );
                        DhcpV4SendTarget::Broadcast
                    }
                    _ => DhcpV4SendTarget::Broadcast,
                };
                Some((packet, target))
            }
            _ => None,
        }
    }
}

fn lease_from_msg(msg: &DhcpV4Message) -> Option<DhcpV4Lease> {
    match DhcpV4Lease::new_from_msg(msg) {
        Ok(l) => Some(l),
        Err(e) => {
            log::warn!("Ignoring DHCP reply without valid lease: {e}");
            None
        }
    }
}
