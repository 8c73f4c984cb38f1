// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use crate::{mac::parse_mac, DhcpError, DhcpV4OptionCode, ErrorKind};

// https://www.iana.org/assignments/arp-parameters/arp-parameters.xhtml#arp-parameters-2
const ARP_HW_TYPE_ETHERNET: u8 = 1;

const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_MSG_SIZE: u16 = 1500;

const DEFAULT_REQUEST_OPTS: [DhcpV4OptionCode; 10] = [
    DhcpV4OptionCode::SubnetMask,
    DhcpV4OptionCode::Router,
    DhcpV4OptionCode::DomainNameServer,
    DhcpV4OptionCode::DomainName,
    DhcpV4OptionCode::InterfaceMtu,
    DhcpV4OptionCode::BroadcastAddress,
    DhcpV4OptionCode::IpAddressLeaseTime,
    DhcpV4OptionCode::RenewalTime,
    DhcpV4OptionCode::RebindingTime,
    DhcpV4OptionCode::VendorSpecificInfo,
];

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DhcpV4Config {
    pub(crate) iface_name: String,
    pub(crate) iface_index: u32,
    pub(crate) src_mac: Vec<u8>,
    pub(crate) client_id: Vec<u8>,
    // Track whether client_id should follow src_mac
    pub(crate) mac_as_client_id: bool,
    pub(crate) host_name: String,
    pub(crate) vendor_class_id: String,
    pub(crate) request_opts: Vec<DhcpV4OptionCode>,
    pub(crate) max_msg_size: u16,
    pub(crate) pre_dhcp_action: bool,
    pub(crate) socket_timeout: Duration,
}

impl Default for DhcpV4Config {
    fn default() -> Self {
        Self {
            iface_name: String::new(),
            iface_index: 0,
            src_mac: Vec::new(),
            client_id: Vec::new(),
            mac_as_client_id: true,
            host_name: String::new(),
            vendor_class_id: format!(
                "dhcpv4-client-{}",
                env!("CARGO_PKG_VERSION")
            ),
            request_opts: DEFAULT_REQUEST_OPTS.to_vec(),
            max_msg_size: DEFAULT_MAX_MSG_SIZE,
            pre_dhcp_action: false,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
        }
    }
}

impl DhcpV4Config {
    pub fn new(iface_name: &str) -> Self {
        Self {
            iface_name: iface_name.to_string(),
            ..Default::default()
        }
    }

    pub fn iface_name(&self) -> &str {
        self.iface_name.as_str()
    }

    pub fn iface_index(&self) -> u32 {
        self.iface_index
    }

    pub fn src_mac(&self) -> &[u8] {
        self.src_mac.as_slice()
    }

    /// Resolve interface index and MAC address through netlink unless
    /// [DhcpV4Config::set_link()] was used.
    pub async fn init(&mut self) -> Result<(), DhcpError> {
        if self.iface_index == 0 || self.src_mac.is_empty() {
            self.resolve_link().await?;
        }
        if self.mac_as_client_id {
            self.use_mac_as_client_id();
        }
        Ok(())
    }

    #[cfg(feature = "netlink")]
    async fn resolve_link(&mut self) -> Result<(), DhcpError> {
        let (iface_index, src_mac) =
            crate::netlink::get_iface_index_mac(&self.iface_name).await?;
        log::debug!(
            "Interface {} has index {iface_index} and MAC {src_mac:?}",
            self.iface_name
        );
        self.iface_index = iface_index;
        self.src_mac = src_mac;
        Ok(())
    }

    #[cfg(not(feature = "netlink"))]
    async fn resolve_link(&mut self) -> Result<(), DhcpError> {
        Err(DhcpError::new(
            ErrorKind::InvalidArgument,
            format!(
                "Interface index and MAC address of {} are required as \
                 netlink feature is disabled, please use \
                 DhcpV4Config::set_link()",
                self.iface_name
            ),
        ))
    }

    /// Set interface index and MAC address(e.g. "00:23:45:67:89:1a")
    /// explicitly, skipping netlink query.
    pub fn set_link(
        &mut self,
        iface_index: u32,
        mac: &str,
    ) -> Result<&mut Self, DhcpError> {
        if iface_index == 0 {
            return Err(DhcpError::new(
                ErrorKind::InvalidArgument,
                "Interface index 0 is invalid".to_string(),
            ));
        }
        self.iface_index = iface_index;
        self.src_mac = parse_mac(mac)?;
        if self.mac_as_client_id {
            self.use_mac_as_client_id();
        }
        Ok(self)
    }

    pub fn set_host_name(&mut self, host_name: &str) -> &mut Self {
        self.host_name = host_name.to_string();
        self
    }

    /// Vendor class identifier(60). Empty string means not sending it.
    pub fn set_vendor_class_id(&mut self, vendor_class_id: &str) -> &mut Self {
        self.vendor_class_id = vendor_class_id.to_string();
        self
    }

    /// Use `{0x01, MAC}` as client identifier. This is the default.
    pub fn use_mac_as_client_id(&mut self) -> &mut Self {
        self.mac_as_client_id = true;
        self.client_id = vec![ARP_HW_TYPE_ETHERNET];
        self.client_id.extend_from_slice(self.src_mac.as_slice());
        self
    }

    pub fn set_client_id(
        &mut self,
        client_id_type: u8,
        client_id: &[u8],
    ) -> &mut Self {
        // RFC 2132: 9.14. Client-identifier
        self.mac_as_client_id = false;
        self.client_id = vec![client_id_type];
        self.client_id.extend_from_slice(client_id);
        self
    }

    /// Override the parameter request list(55).
    pub fn set_request_opts(&mut self, opts: &[DhcpV4OptionCode]) -> &mut Self {
        self.request_opts = opts.to_vec();
        self
    }

    /// Timeout for each packet send.
    pub fn set_socket_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.socket_timeout = timeout;
        self
    }

    /// When enabled, client notifies
    /// [crate::DhcpV4Notification::PreDhcpAction] before starting
    /// negotiation or renewal, and waits
    /// [crate::DhcpV4ClientHandle::pre_dhcp_action_done()] before sending.
    pub fn set_pre_dhcp_action(&mut self, enabled: bool) -> &mut Self {
        self.pre_dhcp_action = enabled;
        self
    }
}
