//! Universe registry: one record per option namespace, describing its tag
//! and length widths, terminator, duplicate handling, storage discipline
//! and encapsulation behavior.
//!
//! The registry is built once at startup and treated as immutable while
//! requests are in flight. Identity is the universe's index.

use std::collections::HashMap;

use thiserror::Error;

use crate::{
    catalog::{Catalog, CatalogError},
    wire::{get_u16, get_u32, put_u16, put_u32},
};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Universe name {0:?} registered twice")]
    DuplicateName(String),

    #[error("Universe {name} end tag {end:#x} does not fit its tag width")]
    EndTagTooWide { name: String, end: u32 },

    #[error("Universe {name} encapsulating option {code} refers to unregistered universe {carrier}")]
    BadCarrier {
        name: String,
        code: u32,
        carrier: usize,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagWidth {
    One,
    Two,
    Four,
}

impl TagWidth {
    pub fn size(&self) -> usize {
        match self {
            TagWidth::One => 1,
            TagWidth::Two => 2,
            TagWidth::Four => 4,
        }
    }

    pub fn fits(&self, code: u32) -> bool {
        match self {
            TagWidth::One => code <= 0xff,
            TagWidth::Two => code <= 0xffff,
            TagWidth::Four => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthWidth {
    /// The payload consumes the remainder of the enclosing buffer.
    Zero,
    One,
    Two,
    Four,
}

impl LengthWidth {
    pub fn size(&self) -> usize {
        match self {
            LengthWidth::Zero => 0,
            LengthWidth::One => 1,
            LengthWidth::Two => 2,
            LengthWidth::Four => 4,
        }
    }
}

/// How an option state stores this universe's entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Keyed by code; random access dominates.
    Hashed,
    /// An ordered chain; emission order equals configuration order.
    Linked,
}

/// How an encapsulated payload of this universe is decoded into a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceDecoder {
    /// The generic tag/length walk.
    Standard,
    /// The FQDN option's flags/rcodes/name layout.
    Fqdn,
}

/// How configured entries of this universe are re-assembled into the
/// payload of its carrier option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encapsulator {
    /// Emit every stored entry in tag/length/value form.
    Standard,
    /// Rebuild the wire FQDN option from its sub-options.
    Fqdn,
    /// NWIP framing: an empty space still announces itself, a populated
    /// one leads with the exists-in-options-area sub-option.
    Nwip,
}

/// The option descriptor (in another universe) that carries this
/// universe's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncOpt {
    pub universe: usize,
    pub code: u32,
}

#[derive(Debug)]
pub struct Universe {
    pub name: String,
    pub index: usize,
    pub tag_width: TagWidth,
    pub length_width: LengthWidth,
    /// Tag that pads the stream by one position (DHCPv4 only).
    pub pad_tag: Option<u32>,
    /// Tag that terminates the stream.
    pub end_tag: Option<u32>,
    /// Concatenate repeated occurrences into one value instead of
    /// chaining them.
    pub concat_duplicates: bool,
    pub enc_opt: Option<EncOpt>,
    pub storage: Storage,
    pub decoder: SpaceDecoder,
    pub encapsulator: Encapsulator,
    /// Set on per-enterprise VSIO child universes.
    pub enterprise_id: Option<u32>,
}

impl Universe {
    pub fn tag_size(&self) -> usize {
        self.tag_width.size()
    }

    pub fn length_size(&self) -> usize {
        self.length_width.size()
    }

    pub fn get_tag(&self, bytes: &[u8]) -> u32 {
        match self.tag_width {
            TagWidth::One => bytes[0] as u32,
            TagWidth::Two => get_u16(bytes) as u32,
            TagWidth::Four => get_u32(bytes),
        }
    }

    pub fn store_tag(&self, bytes: &mut [u8], code: u32) {
        match self.tag_width {
            TagWidth::One => bytes[0] = code as u8,
            TagWidth::Two => put_u16(bytes, code as u16),
            TagWidth::Four => put_u32(bytes, code),
        }
    }

    /// Read a length field. Callers handle [`LengthWidth::Zero`] themselves
    /// since the length is then implied by the enclosing buffer.
    pub fn get_length(&self, bytes: &[u8]) -> usize {
        match self.length_width {
            LengthWidth::Zero => 0,
            LengthWidth::One => bytes[0] as usize,
            LengthWidth::Two => get_u16(bytes) as usize,
            LengthWidth::Four => get_u32(bytes) as usize,
        }
    }

    pub fn store_length(&self, bytes: &mut [u8], length: usize) {
        match self.length_width {
            LengthWidth::Zero => {}
            LengthWidth::One => bytes[0] = length as u8,
            LengthWidth::Two => put_u16(bytes, length as u16),
            LengthWidth::Four => put_u32(bytes, length as u32),
        }
    }
}

/// Well-known universe indices; fixed by registration order in
/// [`Registry::standard`].
pub const DHCP: usize = 0;
pub const DHCPV6: usize = 1;
pub const VENDOR: usize = 2;
pub const AGENT: usize = 3;
pub const NWIP: usize = 4;
pub const FQDN: usize = 5;
pub const SITE: usize = 6;
pub const VSIO: usize = 7;

pub struct Registry {
    universes: Vec<Universe>,
    by_name: HashMap<String, usize>,
    catalog: Catalog,
}

impl Registry {
    /// Build the standard registry: the DHCPv4 and DHCPv6 spaces, the
    /// vendor, relay-agent, NWIP and FQDN sub-spaces, the site-local space
    /// and the enterprise-scoped VSIO container. Inconsistent tables are
    /// fatal here, before any packet is accepted.
    pub fn standard() -> Self {
        Self::try_standard().expect("standard option tables are consistent")
    }

    fn try_standard() -> Result<Self, RegistryError> {
        let mut registry = Self {
            universes: Vec::new(),
            by_name: HashMap::new(),
            catalog: Catalog::default(),
        };

        registry.register(
            "dhcp",
            TagWidth::One,
            LengthWidth::One,
            Some(0),
            Some(255),
            true,
            None,
            Storage::Hashed,
            SpaceDecoder::Standard,
            Encapsulator::Standard,
        )?;
        registry.register(
            "dhcp6",
            TagWidth::Two,
            LengthWidth::Two,
            None,
            None,
            false,
            None,
            Storage::Hashed,
            SpaceDecoder::Standard,
            Encapsulator::Standard,
        )?;
        registry.register(
            "vendor",
            TagWidth::One,
            LengthWidth::One,
            Some(0),
            Some(255),
            true,
            Some(EncOpt {
                universe: DHCP,
                code: crate::constants::v4::VENDOR_ENCAPSULATED_OPTIONS,
            }),
            Storage::Hashed,
            SpaceDecoder::Standard,
            Encapsulator::Standard,
        )?;
        registry.register(
            "agent",
            TagWidth::One,
            LengthWidth::One,
            None,
            None,
            false,
            Some(EncOpt {
                universe: DHCP,
                code: crate::constants::v4::AGENT_OPTIONS,
            }),
            Storage::Hashed,
            SpaceDecoder::Standard,
            Encapsulator::Standard,
        )?;
        registry.register(
            "nwip",
            TagWidth::One,
            LengthWidth::One,
            None,
            None,
            false,
            Some(EncOpt {
                universe: DHCP,
                code: crate::constants::v4::NWIP_SUBOPTIONS,
            }),
            Storage::Hashed,
            SpaceDecoder::Standard,
            Encapsulator::Nwip,
        )?;
        registry.register(
            "fqdn",
            TagWidth::One,
            LengthWidth::One,
            None,
            None,
            false,
            Some(EncOpt {
                universe: DHCP,
                code: crate::constants::v4::FQDN,
            }),
            Storage::Linked,
            SpaceDecoder::Fqdn,
            Encapsulator::Fqdn,
        )?;
        registry.register(
            "site",
            TagWidth::One,
            LengthWidth::One,
            Some(0),
            Some(255),
            true,
            None,
            Storage::Hashed,
            SpaceDecoder::Standard,
            Encapsulator::Standard,
        )?;
        registry.register(
            "vsio",
            TagWidth::Four,
            LengthWidth::Zero,
            None,
            None,
            false,
            Some(EncOpt {
                universe: DHCPV6,
                code: crate::constants::v6::VSIO,
            }),
            Storage::Hashed,
            SpaceDecoder::Standard,
            Encapsulator::Standard,
        )?;

        registry.standard_enumerations();
        registry.standard_dhcp_table()?;
        registry.standard_dhcp6_table()?;
        registry.standard_subspace_tables()?;

        Ok(registry)
    }

    #[allow(clippy::too_many_arguments)]
    fn register(
        &mut self,
        name: &str,
        tag_width: TagWidth,
        length_width: LengthWidth,
        pad_tag: Option<u32>,
        end_tag: Option<u32>,
        concat_duplicates: bool,
        enc_opt: Option<EncOpt>,
        storage: Storage,
        decoder: SpaceDecoder,
        encapsulator: Encapsulator,
    ) -> Result<usize, RegistryError> {
        if self.by_name.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.into()));
        }
        if let Some(end) = end_tag {
            if !tag_width.fits(end) {
                return Err(RegistryError::EndTagTooWide {
                    name: name.into(),
                    end,
                });
            }
        }
        if let Some(enc) = &enc_opt {
            if enc.universe >= self.universes.len() {
                return Err(RegistryError::BadCarrier {
                    name: name.into(),
                    code: enc.code,
                    carrier: enc.universe,
                });
            }
        }

        let index = self.universes.len();
        let table = self.catalog.push_table();
        debug_assert_eq!(index, table);

        self.universes.push(Universe {
            name: name.into(),
            index,
            tag_width,
            length_width,
            pad_tag,
            end_tag,
            concat_duplicates,
            enc_opt,
            storage,
            decoder,
            encapsulator,
            enterprise_id: None,
        });
        self.by_name.insert(name.into(), index);
        Ok(index)
    }

    /// Register the sub-universe for one VSIO enterprise number. Intended
    /// for configuration load, before the registry is frozen. Returns the
    /// existing index if the enterprise was already registered.
    pub fn register_vsio_enterprise(&mut self, enterprise_id: u32) -> Result<usize, RegistryError> {
        let name = format!("vsio-{}", enterprise_id);
        if let Some(index) = self.by_name.get(&name) {
            return Ok(*index);
        }

        let index = self.register(
            &name,
            TagWidth::Two,
            LengthWidth::Two,
            None,
            None,
            false,
            Some(EncOpt {
                universe: VSIO,
                code: enterprise_id,
            }),
            Storage::Hashed,
            SpaceDecoder::Standard,
            Encapsulator::Standard,
        )?;
        self.universes[index].enterprise_id = Some(enterprise_id);

        // The carrier descriptor inside the VSIO container: its tag is the
        // enterprise number and its payload is the child space.
        self.catalog
            .define(VSIO, enterprise_id, &name, &format!("E{}.", name))?;
        Ok(index)
    }

    pub fn universe(&self, index: usize) -> &Universe {
        &self.universes[index]
    }

    pub fn universe_count(&self) -> usize {
        self.universes.len()
    }

    pub fn find_universe(&self, name: &str) -> Option<&Universe> {
        self.by_name.get(name).map(|i| &self.universes[*i])
    }

    pub fn universes(&self) -> impl Iterator<Item = &Universe> {
        self.universes.iter()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn standard_enumerations(&mut self) {
        self.catalog.define_enumeration(
            "netbios-node-type",
            1,
            &[("B-node", 1), ("P-node", 2), ("M-node", 4), ("H-node", 8)],
        );
        self.catalog.define_enumeration(
            "status-codes",
            2,
            &[
                ("success", 0),
                ("unspec-fail", 1),
                ("no-addrs-avail", 2),
                ("no-binding", 3),
                ("not-on-link", 4),
                ("use-multicast", 5),
            ],
        );
    }

    fn standard_dhcp_table(&mut self) -> Result<(), RegistryError> {
        const TABLE: &[(u32, &str, &str)] = &[
            (1, "subnet-mask", "I"),
            (2, "time-offset", "l"),
            (3, "routers", "IA"),
            (4, "time-servers", "IA"),
            (5, "ien116-name-servers", "IA"),
            (6, "domain-name-servers", "IA"),
            (7, "log-servers", "IA"),
            (8, "cookie-servers", "IA"),
            (9, "lpr-servers", "IA"),
            (10, "impress-servers", "IA"),
            (11, "resource-location-servers", "IA"),
            (12, "host-name", "X"),
            (13, "boot-size", "S"),
            (14, "merit-dump", "t"),
            (15, "domain-name", "t"),
            (16, "swap-server", "I"),
            (17, "root-path", "t"),
            (18, "extensions-path", "t"),
            (19, "ip-forwarding", "f"),
            (20, "non-local-source-routing", "f"),
            (21, "policy-filter", "IIA"),
            (22, "max-dgram-reassembly", "S"),
            (23, "default-ip-ttl", "B"),
            (24, "path-mtu-aging-timeout", "L"),
            (25, "path-mtu-plateau-table", "SA"),
            (26, "interface-mtu", "S"),
            (27, "all-subnets-local", "f"),
            (28, "broadcast-address", "I"),
            (29, "perform-mask-discovery", "f"),
            (30, "mask-supplier", "f"),
            (31, "router-discovery", "f"),
            (32, "router-solicitation-address", "I"),
            (33, "static-routes", "IIA"),
            (34, "trailer-encapsulation", "f"),
            (35, "arp-cache-timeout", "L"),
            (36, "ieee802-3-encapsulation", "f"),
            (37, "default-tcp-ttl", "B"),
            (38, "tcp-keepalive-interval", "L"),
            (39, "tcp-keepalive-garbage", "f"),
            (40, "nis-domain", "t"),
            (41, "nis-servers", "IA"),
            (42, "ntp-servers", "IA"),
            (43, "vendor-encapsulated-options", "E."),
            (44, "netbios-name-servers", "IA"),
            (45, "netbios-dd-server", "IA"),
            (46, "netbios-node-type", "Nnetbios-node-type."),
            (47, "netbios-scope", "X"),
            (48, "font-servers", "IA"),
            (49, "x-display-manager", "IA"),
            (50, "dhcp-requested-address", "I"),
            (51, "dhcp-lease-time", "T"),
            (52, "dhcp-option-overload", "B"),
            (53, "dhcp-message-type", "B"),
            (54, "dhcp-server-identifier", "I"),
            (55, "dhcp-parameter-request-list", "BA"),
            (56, "dhcp-message", "t"),
            (57, "dhcp-max-message-size", "S"),
            (58, "dhcp-renewal-time", "L"),
            (59, "dhcp-rebinding-time", "L"),
            (60, "vendor-class-identifier", "X"),
            (61, "dhcp-client-identifier", "X"),
            (63, "nwip-suboptions", "Enwip."),
            (66, "tftp-server-name", "t"),
            (67, "bootfile-name", "t"),
            (81, "fqdn", "Efqdn."),
            (82, "agent-options", "Eagent."),
            (92, "associated-ip", "IA"),
            (118, "subnet-selection", "I"),
        ];

        for (code, name, format) in TABLE {
            self.catalog.define(DHCP, *code, name, format)?;
        }
        Ok(())
    }

    fn standard_dhcp6_table(&mut self) -> Result<(), RegistryError> {
        const TABLE: &[(u32, &str, &str)] = &[
            (1, "client-id", "X"),
            (2, "server-id", "X"),
            (3, "ia-na", "X"),
            (4, "ia-ta", "X"),
            (5, "ia-addr", "X"),
            (6, "oro", "SA"),
            (7, "preference", "B"),
            (8, "elapsed-time", "S"),
            (9, "relay-msg", "X"),
            (11, "auth", "X"),
            (12, "unicast", "X"),
            (13, "status-code", "Nstatus-codes.t"),
            (14, "rapid-commit", "X"),
            (15, "user-class", "X"),
            (16, "vendor-class", "X"),
            (17, "vsio", "Evsio."),
            (18, "interface-id", "X"),
            (19, "reconf-msg", "B"),
            (20, "reconf-accept", "X"),
            (23, "name-servers", "X"),
            (24, "domain-search", "D"),
            (25, "ia-pd", "X"),
            (26, "ia-prefix", "X"),
            (31, "sntp-servers", "X"),
            (32, "info-refresh-time", "T"),
        ];

        for (code, name, format) in TABLE {
            self.catalog.define(DHCPV6, *code, name, format)?;
        }
        Ok(())
    }

    fn standard_subspace_tables(&mut self) -> Result<(), RegistryError> {
        const AGENT_TABLE: &[(u32, &str, &str)] =
            &[(1, "circuit-id", "X"), (2, "remote-id", "X")];
        for (code, name, format) in AGENT_TABLE {
            self.catalog.define(AGENT, *code, name, format)?;
        }

        const NWIP_TABLE: &[(u32, &str, &str)] = &[
            (1, "illegal-1", "F"),
            (2, "illegal-2", "F"),
            (5, "nsq-broadcast", "f"),
            (6, "preferred-dss", "IA"),
            (7, "nearest-nwip-server", "IA"),
            (8, "autoretries", "B"),
            (9, "autoretry-secs", "B"),
            (10, "nwip-1-1", "f"),
            (11, "primary-dss", "I"),
        ];
        for (code, name, format) in NWIP_TABLE {
            self.catalog.define(NWIP, *code, name, format)?;
        }

        const FQDN_TABLE: &[(u32, &str, &str)] = &[
            (1, "no-client-update", "f"),
            (2, "server-update", "f"),
            (3, "encoded", "f"),
            (4, "rcode1", "B"),
            (5, "rcode2", "B"),
            (6, "hostname", "t"),
            (7, "domainname", "t"),
            (8, "fqdn", "t"),
        ];
        for (code, name, format) in FQDN_TABLE {
            self.catalog.define(FQDN, *code, name, format)?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("universes", &self.universes.len())
            .finish()
    }
}
