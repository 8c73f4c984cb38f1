// SPDX-License-Identifier: Apache-2.0

use crate::{DhcpError, ErrorKind};

// libc defines these constants as u32 while libc::sock_filter code is u16.
const BPF_LD: u16 = 0x00;
const BPF_LDX: u16 = 0x01;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;

const BPF_H: u16 = 0x08;
const BPF_B: u16 = 0x10;

const BPF_ABS: u16 = 0x20;
const BPF_IND: u16 = 0x40;
const BPF_MSH: u16 = 0xa0;

const BPF_JEQ: u16 = 0x10;
const BPF_JSET: u16 = 0x40;
const BPF_K: u16 = 0x00;

const ETHERTYPE_IP: u32 = 0x0800;
const IPPROTO_UDP: u32 = 17;
const DHCPV4_CLIENT_PORT: u32 = 68;

// Offsets in ethernet frame
const ETHER_TYPE_OFFSET: u32 = 12;
const ETHER_HEADER_LEN: u32 = 14;
const IP_HEADER_LEN_OFFSET: u32 = ETHER_HEADER_LEN;
const IP_FRAGMENT_OFFSET: u32 = ETHER_HEADER_LEN + 6;
const IP_PROTO_OFFSET: u32 = ETHER_HEADER_LEN + 9;
// Relative to the start of UDP header, X holds the IP header length
const UDP_DST_PORT_OFFSET: u32 = ETHER_HEADER_LEN + 2;
const IP_FRAGMENT_MASK: u32 = 0x1fff;

const fn bpf_stmt(code: u16, k: u32) -> libc::sock_filter {
    libc::sock_filter {
        code,
        jt: 0,
        jf: 0,
        k,
    }
}

const fn bpf_jump(code: u16, k: u32, jt: u8, jf: u8) -> libc::sock_filter {
    libc::sock_filter { code, jt, jf, k }
}

// Pass IPv4 UDP packets to port 68 which are not fragmented.
const DHCP_BPF_FILTER: [libc::sock_filter; 11] = [
    bpf_stmt(BPF_LD | BPF_H | BPF_ABS, ETHER_TYPE_OFFSET),
    bpf_jump(BPF_JMP | BPF_JEQ | BPF_K, ETHERTYPE_IP, 0, 8),
    bpf_stmt(BPF_LD | BPF_B | BPF_ABS, IP_PROTO_OFFSET),
    bpf_jump(BPF_JMP | BPF_JEQ | BPF_K, IPPROTO_UDP, 0, 6),
    bpf_stmt(BPF_LD | BPF_H | BPF_ABS, IP_FRAGMENT_OFFSET),
    bpf_jump(BPF_JMP | BPF_JSET | BPF_K, IP_FRAGMENT_MASK, 4, 0),
    bpf_stmt(BPF_LDX | BPF_B | BPF_MSH, IP_HEADER_LEN_OFFSET),
    bpf_stmt(BPF_LD | BPF_H | BPF_IND, UDP_DST_PORT_OFFSET),
    bpf_jump(BPF_JMP | BPF_JEQ | BPF_K, DHCPV4_CLIENT_PORT, 0, 1),
    // accept
    bpf_stmt(BPF_RET, u32::MAX),
    // drop
    bpf_stmt(BPF_RET, 0),
];

pub(crate) fn apply_dhcp_bpf(fd: libc::c_int) -> Result<(), DhcpError> {
    let mut filters = DHCP_BPF_FILTER;
    let bpf_prog = libc::sock_fprog {
        len: filters.len() as libc::c_ushort,
        filter: filters.as_mut_ptr(),
    };

    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ATTACH_FILTER,
            (&bpf_prog as *const libc::sock_fprog) as *const libc::c_void,
            std::mem::size_of::<libc::sock_fprog>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        let e = DhcpError::new(
            ErrorKind::IoError,
            format!(
                "Failed to apply socket BPF filter, error: {}",
                nix::errno::Errno::last()
            ),
        );
        log::error!("{e}");
        Err(e)
    } else {
        log::debug!("DHCP BPF filter attached to socket {fd}");
        Ok(())
    }
}
