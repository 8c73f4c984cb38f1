// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::{HashMap, VecDeque},
    net::Ipv4Addr,
    sync::Arc,
    time::Duration,
};

use tokio::{
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

use super::{
    event::{
        DhcpV4Action, DhcpV4Event, DhcpV4Notification, DhcpV4SendTarget,
        DhcpV4Timer,
    },
    frame::{CLIENT_PORT, SERVER_PORT},
    machine::{DhcpV4Machine, DhcpV4Scheduler},
    socket::{DhcpV4LinuxTransport, DhcpV4Socket, DhcpV4Transport},
};
use crate::{
    time::{boot_time_now, DhcpTimer},
    DhcpError, DhcpV4Config, DhcpV4Packet, DhcpV4State, ErrorKind,
};

/// Timers backed by tokio tasks posting [DhcpV4Event::Timer] to the client
/// mailbox.
#[derive(Debug)]
pub(crate) struct DhcpV4TimerQueue {
    tx: UnboundedSender<DhcpV4Event>,
    pending: HashMap<DhcpV4Timer, (Duration, JoinHandle<()>)>,
}

impl DhcpV4TimerQueue {
    pub(crate) fn new(tx: UnboundedSender<DhcpV4Event>) -> Self {
        Self {
            tx,
            pending: HashMap::new(),
        }
    }

    /// Whether a fired timer is still the one armed.
    ///
    /// A task may fire right before being replaced or cancelled, leaving a
    /// stale event in the mailbox.
    pub(crate) fn take_due(&mut self, timer: DhcpV4Timer) -> bool {
        let now = self.now();
        match self.pending.get(&timer) {
            Some((deadline, _)) if *deadline <= now => {
                self.pending.remove(&timer);
                true
            }
            _ => {
                log::debug!("Dropping stale timer {timer}");
                false
            }
        }
    }

    pub(crate) fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.pending.drain() {
            handle.abort();
        }
    }
}

impl DhcpV4Scheduler for DhcpV4TimerQueue {
    fn now(&self) -> Duration {
        // Error already logged
        boot_time_now().unwrap_or_default()
    }

    fn schedule(&mut self, timer: DhcpV4Timer, at: Duration) {
        self.cancel(timer);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = DhcpTimer::new_at(at).wait().await {
                log::warn!("Falling back to tokio timer for {timer}: {e}");
                let now = boot_time_now().unwrap_or_default();
                tokio::time::sleep(at.saturating_sub(now)).await;
            }
            if tx.send(DhcpV4Event::Timer(timer)).is_err() {
                log::debug!("DHCPv4 client gone before timer {timer} fired");
            }
        });
        self.pending.insert(timer, (at, handle));
    }

    fn cancel(&mut self, timer: DhcpV4Timer) {
        if let Some((_, handle)) = self.pending.remove(&timer) {
            handle.abort();
        }
    }
}

/// Commands to a running [DhcpV4Client].
///
/// Every function fails once the client terminated.
#[derive(Debug, Clone)]
pub struct DhcpV4ClientHandle {
    tx: UnboundedSender<DhcpV4Event>,
}

impl DhcpV4ClientHandle {
    pub fn start(&self) -> Result<(), DhcpError> {
        self.send(DhcpV4Event::Start)
    }

    pub fn stop(&self) -> Result<(), DhcpError> {
        self.send(DhcpV4Event::Stop)
    }

    /// Stop and terminate [DhcpV4Client::run()].
    pub fn quit(&self) -> Result<(), DhcpError> {
        self.send(DhcpV4Event::Quit)
    }

    pub fn pre_dhcp_action_done(&self) -> Result<(), DhcpError> {
        self.send(DhcpV4Event::PreDhcpActionDone)
    }

    pub fn address_configured(&self) -> Result<(), DhcpError> {
        self.send(DhcpV4Event::AddressConfigured)
    }

    fn send(&self, event: DhcpV4Event) -> Result<(), DhcpError> {
        self.tx.send(event).map_err(|_| {
            DhcpError::new(
                ErrorKind::IoError,
                "DHCPv4 client has terminated".to_string(),
            )
        })
    }
}

/// Asynchronous DHCPv4 client driving [DhcpV4Machine].
///
/// Usage:
/// ```no_run
/// use dhcpv4_client::{DhcpV4Client, DhcpV4Config, DhcpV4Notification};
///
/// # async fn demo() -> Result<(), dhcpv4_client::DhcpError> {
/// let config = DhcpV4Config::new("eth1");
/// let (client, handle, mut notifications) =
///     DhcpV4Client::new(config).await?;
/// tokio::spawn(client.run());
/// handle.start()?;
/// while let Some(notification) = notifications.recv().await {
///     match notification {
///         DhcpV4Notification::ConfigureAddress { .. } => {
///             // Assign the address to interface
///             handle.address_configured()?;
///         }
///         DhcpV4Notification::Success(lease) => {
///             println!("Got lease {lease:?}");
///         }
///         DhcpV4Notification::Terminated => break,
///         _ => (),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct DhcpV4Client<T: DhcpV4Transport = DhcpV4LinuxTransport> {
    machine: DhcpV4Machine,
    transport: T,
    mailbox: UnboundedReceiver<DhcpV4Event>,
    mailbox_tx: UnboundedSender<DhcpV4Event>,
    notify_tx: UnboundedSender<DhcpV4Notification>,
    timers: DhcpV4TimerQueue,
    packet_socket: Option<(Arc<T::PacketSocket>, JoinHandle<()>)>,
    // Server address, socket and its receiver
    udp_socket: Option<(Ipv4Addr, Arc<T::UdpSocket>, JoinHandle<()>)>,
}

impl<T: DhcpV4Transport> std::fmt::Debug for DhcpV4Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhcpV4Client")
            .field("machine", &self.machine)
            .field("timers", &self.timers)
            .field("packet_socket", &self.packet_socket.is_some())
            .field(
                "udp_socket",
                &self.udp_socket.as_ref().map(|(srv, _, _)| srv),
            )
            .finish()
    }
}

impl DhcpV4Client<DhcpV4LinuxTransport> {
    /// Resolve interface through [DhcpV4Config::init()] and create client
    /// using `AF_PACKET` and UDP sockets.
    pub async fn new(
        mut config: DhcpV4Config,
    ) -> Result<
        (Self, DhcpV4ClientHandle, UnboundedReceiver<DhcpV4Notification>),
        DhcpError,
    > {
        config.init().await?;
        Ok(Self::with_transport(config, DhcpV4LinuxTransport))
    }
}

impl<T: DhcpV4Transport> DhcpV4Client<T> {
    /// Create client with specified transport, the `config` should have
    /// interface index and MAC address set already.
    pub fn with_transport(
        config: DhcpV4Config,
        transport: T,
    ) -> (Self, DhcpV4ClientHandle, UnboundedReceiver<DhcpV4Notification>)
    {
        let (mailbox_tx, mailbox) = unbounded_channel();
        let (notify_tx, notify_rx) = unbounded_channel();
        let handle = DhcpV4ClientHandle {
            tx: mailbox_tx.clone(),
        };
        let client = Self {
            machine: DhcpV4Machine::new(config),
            transport,
            mailbox,
            timers: DhcpV4TimerQueue::new(mailbox_tx.clone()),
            mailbox_tx,
            notify_tx,
            packet_socket: None,
            udp_socket: None,
        };
        (client, handle, notify_rx)
    }

    pub fn state(&self) -> DhcpV4State {
        self.machine.state()
    }

    /// Process commands, packets and timers until
    /// [DhcpV4ClientHandle::quit()].
    pub async fn run(mut self) {
        log::debug!(
            "DHCPv4 client started on interface {}",
            self.machine.config().iface_name()
        );
        while let Some(event) = self.mailbox.recv().await {
            if let DhcpV4Event::Timer(timer) = event {
                if !self.timers.take_due(timer) {
                    continue;
                }
            }
            let is_quit = event == DhcpV4Event::Quit;
            self.dispatch(event).await;
            if is_quit {
                break;
            }
        }
        self.close_transport();
        self.timers.cancel_all();
        log::debug!("DHCPv4 client terminated");
    }

    /// Feed one event to the machine and carry out the resulting actions.
    pub(crate) async fn dispatch(&mut self, event: DhcpV4Event) {
        let mut events = VecDeque::from([event]);
        while let Some(event) = events.pop_front() {
            let actions = self.machine.process(event, &mut self.timers);
            for action in actions {
                match action {
                    DhcpV4Action::OpenTransport => {
                        if let Err(e) = self.open_transport().await {
                            log::error!("Failed to open DHCPv4 transport: {e}");
                            // Remaining actions belong to a start which
                            // cannot proceed
                            events.push_back(DhcpV4Event::TransportError(e));
                            break;
                        }
                    }
                    DhcpV4Action::CloseTransport => self.close_transport(),
                    DhcpV4Action::Send { packet, target } => {
                        self.send(&packet, target).await
                    }
                    DhcpV4Action::Notify(notification) => {
                        log::debug!("DHCPv4 notification {notification:?}");
                        if self.notify_tx.send(notification).is_err() {
                            log::debug!(
                                "DHCPv4 notification receiver dropped"
                            );
                        }
                    }
                }
            }
        }
    }

    async fn open_transport(&mut self) -> Result<(), DhcpError> {
        self.close_transport();
        let socket = Arc::new(
            self.transport.open_packet(self.machine.config()).await?,
        );
        let receiver = spawn_receiver(socket.clone(), self.mailbox_tx.clone());
        self.packet_socket = Some((socket, receiver));
        Ok(())
    }

    fn close_transport(&mut self) {
        if let Some((_, receiver)) = self.packet_socket.take() {
            receiver.abort();
        }
        if let Some((_, _, receiver)) = self.udp_socket.take() {
            receiver.abort();
        }
    }

    async fn send(&mut self, packet: &DhcpV4Packet, target: DhcpV4SendTarget) {
        let timeout = self.machine.config().socket_timeout;
        let result = match target {
            DhcpV4SendTarget::Broadcast => match self.broadcast_socket() {
                Ok(socket) => send_packet(&*socket, packet, timeout).await,
                Err(e) => Err(e),
            },
            DhcpV4SendTarget::Unicast(srv_ip) => {
                match self.get_udp_socket(packet.message().ciaddr, srv_ip).await
                {
                    Ok(socket) => send_packet(&*socket, packet, timeout).await,
                    Err(e) => {
                        log::warn!(
                            "Failed to create UDP socket to {srv_ip}: {e}, \
                             fallback to broadcast"
                        );
                        match self.broadcast_socket() {
                            Ok(socket) => {
                                send_packet(&*socket, packet, timeout).await
                            }
                            Err(e) => Err(e),
                        }
                    }
                }
            }
        };
        match result {
            Ok(()) => log::debug!("Sent {packet} via {target:?}"),
            Err(e) => log::warn!("Failed to send {packet}: {e}"),
        }
    }

    fn broadcast_socket(&self) -> Result<Arc<T::PacketSocket>, DhcpError> {
        match self.packet_socket.as_ref() {
            Some((socket, _)) => Ok(socket.clone()),
            None => Err(DhcpError::new(
                ErrorKind::Bug,
                "No packet socket opened for broadcast".to_string(),
            )),
        }
    }

    async fn get_udp_socket(
        &mut self,
        src_ip: Ipv4Addr,
        srv_ip: Ipv4Addr,
    ) -> Result<Arc<T::UdpSocket>, DhcpError> {
        if let Some((cur_srv_ip, socket, _)) = self.udp_socket.as_ref() {
            if *cur_srv_ip == srv_ip {
                return Ok(socket.clone());
            }
        }
        if let Some((_, _, receiver)) = self.udp_socket.take() {
            receiver.abort();
        }
        let socket = Arc::new(
            self.transport
                .open_udp(self.machine.config(), src_ip, srv_ip)
                .await?,
        );
        let receiver = spawn_receiver(socket.clone(), self.mailbox_tx.clone());
        self.udp_socket = Some((srv_ip, socket.clone(), receiver));
        Ok(socket)
    }
}

async fn send_packet<S: DhcpV4Socket>(
    socket: &S,
    packet: &DhcpV4Packet,
    timeout: Duration,
) -> Result<(), DhcpError> {
    let buffer = packet.build(socket.encap(), SERVER_PORT, CLIENT_PORT)?;
    tokio::time::timeout(timeout, socket.send(&buffer)).await?
}

// Post every datagram to mailbox until socket failure
fn spawn_receiver<S: DhcpV4Socket>(
    socket: Arc<S>,
    tx: UnboundedSender<DhcpV4Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match socket.recv().await {
                Ok(buffer) => {
                    match DhcpV4Packet::parse(&buffer, socket.encap()) {
                        Ok(packet) => DhcpV4Event::PacketIn(Box::new(packet)),
                        Err(e) => DhcpV4Event::ParseError(e),
                    }
                }
                Err(e) => {
                    let _ = tx.send(DhcpV4Event::TransportError(e));
                    break;
                }
            };
            if tx.send(event).is_err() {
                break;
            }
        }
    })
}
