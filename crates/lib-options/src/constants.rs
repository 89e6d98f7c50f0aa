//! Wire-format constants for DHCPv4 (RFC 2131/2132) and DHCPv6 (RFC 3315).

/// Marks the start of DHCP options in the v4 `options` field.
pub const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

/// Size of the fixed BOOTP/DHCP header up to the `options` field.
pub const DHCP_FIXED_NON_UDP: usize = 236;

/// IP and UDP header overhead counted against a client's maximum message
/// size.
pub const DHCP_UDP_OVERHEAD: usize = 20 + 8;

/// Fixed packet overhead: BOOTP header plus IP/UDP headers.
pub const DHCP_FIXED_LEN: usize = DHCP_FIXED_NON_UDP + DHCP_UDP_OVERHEAD;

/// Minimum legal maximum-message-size a client may advertise (option 57).
pub const MIN_MAX_MESSAGE_SIZE: usize = 576;

pub const DHCP_SNAME_LEN: usize = 64;
pub const DHCP_FILE_LEN: usize = 128;

/// Offsets of the overloadable header regions within the fixed header.
pub const SNAME_OFFSET: usize = 44;
pub const FILE_OFFSET: usize = 108;

/// Physical capacity of the v4 options field in an outbound packet.
pub const OPTIONS_FIELD_LEN: usize = 1236;

/// Hard cap on the emission priority list.
pub const PRIORITY_COUNT: usize = 300;

/// DHCPv4 message types (option 53 values).
pub const DHCPDISCOVER: u8 = 1;
pub const DHCPOFFER: u8 = 2;
pub const DHCPREQUEST: u8 = 3;
pub const DHCPDECLINE: u8 = 4;
pub const DHCPACK: u8 = 5;
pub const DHCPNAK: u8 = 6;
pub const DHCPRELEASE: u8 = 7;
pub const DHCPINFORM: u8 = 8;

/// DHCPv6 message types.
pub const DHCPV6_SOLICIT: u8 = 1;
pub const DHCPV6_ADVERTISE: u8 = 2;
pub const DHCPV6_REQUEST: u8 = 3;
pub const DHCPV6_REPLY: u8 = 7;
pub const DHCPV6_RELAY_FORW: u8 = 12;
pub const DHCPV6_RELAY_REPL: u8 = 13;

/// DHCPv4 option codes used by the engine itself.
pub mod v4 {
    pub const PAD: u32 = 0;
    pub const SUBNET_MASK: u32 = 1;
    pub const ROUTERS: u32 = 3;
    pub const DOMAIN_NAME_SERVERS: u32 = 6;
    pub const HOST_NAME: u32 = 12;
    pub const VENDOR_ENCAPSULATED_OPTIONS: u32 = 43;
    pub const REQUESTED_ADDRESS: u32 = 50;
    pub const LEASE_TIME: u32 = 51;
    pub const OPTION_OVERLOAD: u32 = 52;
    pub const MESSAGE_TYPE: u32 = 53;
    pub const SERVER_IDENTIFIER: u32 = 54;
    pub const PARAMETER_REQUEST_LIST: u32 = 55;
    pub const MESSAGE: u32 = 56;
    pub const MAX_MESSAGE_SIZE: u32 = 57;
    pub const NWIP_SUBOPTIONS: u32 = 63;
    pub const FQDN: u32 = 81;
    pub const AGENT_OPTIONS: u32 = 82;
    pub const ASSOCIATED_IP: u32 = 92;
    pub const SUBNET_SELECTION: u32 = 118;
    pub const END: u32 = 255;
}

/// DHCPv6 option codes used by the engine itself.
pub mod v6 {
    pub const ORO: u32 = 6;
    pub const VSIO: u32 = 17;
}

/// Sub-option codes of the FQDN (v4 option 81) universe.
pub mod fqdn {
    pub const NO_CLIENT_UPDATE: u32 = 1;
    pub const SERVER_UPDATE: u32 = 2;
    pub const ENCODED: u32 = 3;
    pub const RCODE1: u32 = 4;
    pub const RCODE2: u32 = 5;
    pub const HOSTNAME: u32 = 6;
    pub const DOMAINNAME: u32 = 7;
    pub const FQDN: u32 = 8;
    pub const SUBOPTION_COUNT: u32 = 8;
}

/// Sub-option codes of the NWIP (v4 option 63) universe.
pub mod nwip {
    pub const DOES_NOT_EXIST: u32 = 1;
    pub const EXISTS_IN_OPTIONS_AREA: u32 = 2;
}
