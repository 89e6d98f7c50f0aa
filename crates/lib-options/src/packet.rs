//! Decoded packets and the ingress dispatcher.
//!
//! The dispatcher accepts raw datagrams from the I/O layer, runs the
//! option parser over them and hands the decoded packet to the protocol
//! state machine behind [`PacketHandler`]. It never performs I/O itself.

use std::net::SocketAddr;

use inet::Address;

use crate::{
    constants,
    expr::{evaluate_option_cache, EvalContext},
    parse,
    store::OptionState,
    universe::{Registry, DHCP, DHCPV6},
    wire::{DecodeError, Decoder},
};

/// v6-specific packet fields, keyed by the two packet shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum V6Meta {
    /// A client/server message: type plus 3-byte transaction id.
    Message { transaction_id: [u8; 3] },
    /// A relay message: hop count plus link and peer addresses.
    Relay {
        hop_count: u8,
        link_address: Address,
        peer_address: Address,
    },
}

/// A decoded inbound packet. The raw bytes are retained for the lifetime
/// of the packet since parsed option values alias them.
#[derive(Debug)]
pub struct Packet {
    pub raw: Vec<u8>,
    pub interface: String,
    pub src: Option<SocketAddr>,
    pub dst: Option<SocketAddr>,
    pub options: OptionState,
    pub options_valid: bool,
    /// v4 message type from option 53; zero for BOOTP.
    pub packet_type: u8,
    /// v6 message type from the first byte; zero for v4 packets.
    pub v6_msg_type: u8,
    pub v6: Option<V6Meta>,
}

impl Packet {
    pub fn new(registry: &Registry, raw: Vec<u8>, interface: &str, src: Option<SocketAddr>) -> Self {
        Self {
            raw,
            interface: interface.into(),
            src,
            dst: None,
            options: OptionState::new(registry),
            options_valid: false,
            packet_type: 0,
            v6_msg_type: 0,
            v6: None,
        }
    }

    /// The v4 hardware address length field.
    pub fn hlen(&self) -> u8 {
        self.raw.get(2).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// The protocol state machine fed by the dispatcher. Implementations own
/// lease allocation and reply decisioning; the engine only decodes.
pub trait PacketHandler {
    fn dhcp(&mut self, packet: &Packet);
    fn bootp(&mut self, packet: &Packet);
    fn dhcpv6(&mut self, packet: &Packet);
}

pub struct Dispatcher<'a> {
    registry: &'a Registry,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Decode a raw v4 datagram and hand it to the state machine. Invalid
    /// packets are dropped here; per-packet errors never cross packet
    /// boundaries.
    pub fn dispatch(
        &self,
        handler: &mut dyn PacketHandler,
        interface: &str,
        raw: Vec<u8>,
        src: Option<SocketAddr>,
    ) {
        let mut packet = Packet::new(self.registry, raw, interface, src);

        if packet.hlen() > 16 {
            tracing::info!(interface, "discarding packet with bogus hlen");
            return;
        }

        // Only packets long enough to hold the cookie have options at all;
        // shorter ones are still dispatched as plain BOOTP.
        if packet.len() >= constants::DHCP_FIXED_NON_UDP + 4 {
            if let Err(err) = parse::parse_options(&mut packet, self.registry) {
                tracing::error!(interface, %err, "dropping unparseable packet");
                return;
            }

            if packet.options_valid {
                let dhcp = self.registry.universe(DHCP);
                let msg_type = packet
                    .options
                    .lookup(dhcp, constants::v4::MESSAGE_TYPE)
                    .and_then(|oc| evaluate_option_cache(oc, &EvalContext::default()))
                    .map(|data| data.as_slice()[0]);
                packet.packet_type = msg_type.unwrap_or(0);
            }
        }

        if packet.packet_type != 0 {
            handler.dhcp(&packet);
        } else {
            handler.bootp(&packet);
        }
    }

    /// Decode a raw v6 datagram and hand it to the state machine.
    pub fn dispatch6(
        &self,
        handler: &mut dyn PacketHandler,
        interface: &str,
        raw: Vec<u8>,
        src: Option<SocketAddr>,
    ) {
        let (msg_type, meta, header_len) = match Self::decode_v6_header(&raw) {
            Ok(header) => header,
            Err(err) => {
                tracing::info!(interface, len = raw.len(), %err, "dropping short v6 packet");
                return;
            }
        };

        let mut packet = Packet::new(self.registry, raw, interface, src);
        packet.v6_msg_type = msg_type;
        packet.v6 = Some(meta);

        {
            let Packet { raw, options, .. } = &mut packet;
            let v6 = self.registry.universe(DHCPV6);
            if let Err(err) =
                parse::parse_option_buffer(options, &raw[header_len..], self.registry, v6)
            {
                tracing::error!(interface, %err, "dropping unparseable v6 packet");
                return;
            }
        }
        packet.options_valid = true;

        handler.dhcpv6(&packet);
    }

    /// Read the fixed v6 header: relay messages carry a hop count and a
    /// link/peer address pair, everything else a 3-byte transaction id.
    fn decode_v6_header(raw: &[u8]) -> Result<(u8, V6Meta, usize), DecodeError> {
        let mut dec = Decoder::new(raw);
        let msg_type = dec.read_u8()?;

        if msg_type == constants::DHCPV6_RELAY_FORW || msg_type == constants::DHCPV6_RELAY_REPL {
            let hop_count = dec.read_u8()?;
            let link_address = Address::from_bytes(dec.read_slice(16)?)
                .expect("relay link-address slice is 16 bytes");
            let peer_address = Address::from_bytes(dec.read_slice(16)?)
                .expect("relay peer-address slice is 16 bytes");
            Ok((
                msg_type,
                V6Meta::Relay {
                    hop_count,
                    link_address,
                    peer_address,
                },
                dec.position(),
            ))
        } else {
            let xid = dec.read_slice(3)?;
            Ok((
                msg_type,
                V6Meta::Message {
                    transaction_id: [xid[0], xid[1], xid[2]],
                },
                dec.position(),
            ))
        }
    }
}
