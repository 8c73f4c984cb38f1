// SPDX-License-Identifier: Apache-2.0

use std::{
    ffi::CString,
    future::Future,
    net::Ipv4Addr,
    os::fd::{AsRawFd, OwnedFd, RawFd},
};

use nix::{
    errno::Errno,
    sys::socket::{AddressFamily, MsgFlags, SockFlag, SockProtocol, SockType},
};
use tokio::{io::unix::AsyncFd, net::UdpSocket};

use super::{
    frame::{DhcpV4Encap, CLIENT_PORT, ETH_HEADER_LEN, SERVER_PORT},
    msg::MAX_PACKET_LEN,
};
use crate::{
    bpf::apply_dhcp_bpf,
    mac::{to_eth_mac, ETH_ALEN},
    DhcpError, DhcpV4Config, ErrorContext, ErrorKind,
};

const PACKET_HOST: u8 = 0; // a packet addressed to the local host

/// Datagram channel carrying framed DHCP packets.
///
/// `recv()` has no timeout; dropping the socket closes it.
pub trait DhcpV4Socket: Send + Sync + 'static {
    fn send(
        &self,
        buffer: &[u8],
    ) -> impl Future<Output = Result<(), DhcpError>> + Send;

    fn recv(&self) -> impl Future<Output = Result<Vec<u8>, DhcpError>> + Send;

    /// Framing of the datagrams sent and received by this socket.
    fn encap(&self) -> DhcpV4Encap;
}

/// Factory of sockets used by [crate::DhcpV4Client].
pub trait DhcpV4Transport: Send + 'static {
    /// Broadcast capable socket bound to the interface
    type PacketSocket: DhcpV4Socket;
    /// Socket connected to a DHCP server for unicast renewal
    type UdpSocket: DhcpV4Socket;

    fn open_packet(
        &mut self,
        config: &DhcpV4Config,
    ) -> impl Future<Output = Result<Self::PacketSocket, DhcpError>> + Send;

    fn open_udp(
        &mut self,
        config: &DhcpV4Config,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
    ) -> impl Future<Output = Result<Self::UdpSocket, DhcpError>> + Send;
}

/// `AF_PACKET` socket for broadcast and UDP socket for unicast.
#[derive(Debug, Default, Clone, Copy)]
pub struct DhcpV4LinuxTransport;

impl DhcpV4Transport for DhcpV4LinuxTransport {
    type PacketSocket = DhcpRawSocket;
    type UdpSocket = DhcpUdpV4Socket;

    async fn open_packet(
        &mut self,
        config: &DhcpV4Config,
    ) -> Result<DhcpRawSocket, DhcpError> {
        DhcpRawSocket::new(config)
    }

    async fn open_udp(
        &mut self,
        config: &DhcpV4Config,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
    ) -> Result<DhcpUdpV4Socket, DhcpError> {
        DhcpUdpV4Socket::new(config.iface_name(), src_ip, dst_ip).await
    }
}

#[derive(Debug)]
pub struct DhcpRawSocket {
    fd: AsyncFd<OwnedFd>,
}

impl DhcpRawSocket {
    pub fn new(config: &DhcpV4Config) -> Result<Self, DhcpError> {
        let fd = create_raw_eth_socket()?;

        apply_dhcp_bpf(fd.as_raw_fd())
            .context(format!("Interface {}", config.iface_name()))?;

        bind_raw_socket(
            fd.as_raw_fd(),
            libc::ETH_P_ALL,
            config.iface_index() as libc::c_int,
            &to_eth_mac(config.src_mac()),
        )
        .context(format!("Interface {}", config.iface_name()))?;

        log::debug!(
            "Raw socket {} created on interface {}",
            fd.as_raw_fd(),
            config.iface_name()
        );
        Ok(DhcpRawSocket {
            fd: AsyncFd::new(fd)?,
        })
    }
}

impl DhcpV4Socket for DhcpRawSocket {
    fn encap(&self) -> DhcpV4Encap {
        DhcpV4Encap::L2
    }

    async fn send(&self, eth_packet: &[u8]) -> Result<(), DhcpError> {
        let mut sent = 0;
        log::trace!("Sending ethernet packet: {eth_packet:?}");
        while sent < eth_packet.len() {
            let mut guard = self.fd.writable().await?;

            let _ = guard
                .try_io(|inner| {
                    sent += nix::sys::socket::send(
                        inner.get_ref().as_raw_fd(),
                        &eth_packet[sent..],
                        MsgFlags::empty(),
                    )?;
                    Ok(())
                })
                .map_err(|e| {
                    DhcpError::new(
                        ErrorKind::IoError,
                        format!("Failed to send packet to raw socket: {e:?}"),
                    )
                })?;
        }

        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, DhcpError> {
        let mut buffer = [0u8; ETH_HEADER_LEN + MAX_PACKET_LEN];
        let rc = loop {
            let mut guard = self.fd.readable().await?;

            if let Ok(s) = guard.try_io(|inner| {
                Ok(nix::sys::socket::recv(
                    inner.get_ref().as_raw_fd(),
                    &mut buffer,
                    MsgFlags::empty(),
                )?)
            }) {
                break s?;
            }
        };

        log::trace!("Raw socket received {:?}", &buffer[..rc]);
        Ok(buffer[..rc].to_vec())
    }
}

fn create_raw_eth_socket() -> Result<OwnedFd, DhcpError> {
    nix::sys::socket::socket(
        AddressFamily::Packet,
        SockType::Raw,
        SockFlag::SOCK_NONBLOCK,
        Some(SockProtocol::EthAll),
    )
    .map_err(|e| {
        DhcpError::new(
            ErrorKind::IoError,
            format!("Failed to create raw ethernet socket: {e}"),
        )
    })
}

fn bind_raw_socket(
    fd: RawFd,
    eth_protocol: libc::c_int,
    iface_index: libc::c_int,
    mac_address: &[u8; ETH_ALEN],
) -> Result<(), DhcpError> {
    let mut sll_addr: [libc::c_uchar; 8] = [0; 8];
    sll_addr[..ETH_ALEN].copy_from_slice(mac_address);

    let socket_addr = libc::sockaddr_ll {
        sll_family: libc::AF_PACKET as libc::c_ushort,
        sll_protocol: (eth_protocol as libc::c_ushort).to_be(),
        sll_ifindex: iface_index,
        sll_hatype: libc::ARPHRD_ETHER as libc::c_ushort,
        sll_pkttype: PACKET_HOST as libc::c_uchar,
        sll_halen: ETH_ALEN as libc::c_uchar,
        sll_addr,
    };

    // The fd is owned by caller and closed on drop when bind fails
    let rc = unsafe {
        libc::bind(
            fd,
            &socket_addr as *const libc::sockaddr_ll as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(DhcpError::new(
            ErrorKind::IoError,
            format!(
                "Failed to bind raw socket to interface index \
                 {iface_index}: {}",
                Errno::last()
            ),
        ));
    }
    Ok(())
}

#[derive(Debug)]
pub struct DhcpUdpV4Socket {
    socket: UdpSocket,
}

impl DhcpUdpV4Socket {
    pub async fn new(
        iface_name: &str,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
    ) -> Result<Self, DhcpError> {
        log::debug!(
            "Creating UDP socket from {src_ip}:{CLIENT_PORT} to \
             {dst_ip}:{SERVER_PORT}"
        );
        let socket = UdpSocket::bind((src_ip, CLIENT_PORT)).await?;
        bind_socket_to_iface(socket.as_raw_fd(), iface_name)?;
        socket.connect((dst_ip, SERVER_PORT)).await?;
        log::debug!("Finished UDP socket creation");

        Ok(Self { socket })
    }
}

impl DhcpV4Socket for DhcpUdpV4Socket {
    fn encap(&self) -> DhcpV4Encap {
        DhcpV4Encap::Bootp
    }

    async fn send(&self, packet: &[u8]) -> Result<(), DhcpError> {
        log::trace!("Sending DHCP packet: {packet:?}");
        let mut sent = 0;
        while sent < packet.len() {
            sent += self.socket.send(&packet[sent..]).await?;
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, DhcpError> {
        let mut buffer = [0u8; MAX_PACKET_LEN];
        let received = self.socket.recv(&mut buffer).await?;
        Ok(buffer[..received].to_vec())
    }
}

fn bind_socket_to_iface(fd: RawFd, iface_name: &str) -> Result<(), DhcpError> {
    let iface_name_cstr = CString::new(iface_name)?;
    let name_len = iface_name_cstr.as_bytes_with_nul().len();

    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            iface_name_cstr.as_ptr() as *const libc::c_void,
            name_len as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(DhcpError::new(
            ErrorKind::IoError,
            format!(
                "Failed to bind socket to interface {iface_name} with error: \
                 {}",
                Errno::last(),
            ),
        ));
    }
    Ok(())
}
