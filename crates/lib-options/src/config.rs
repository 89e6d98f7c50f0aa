//! Declarative option configuration.
//!
//! The host's configuration layer hands the engine a TOML table of option
//! values per universe; this module turns it into a configured
//! [`OptionState`], applying the composition operators and registering
//! VSIO enterprise spaces along the way.
//!
//! ```toml
//! site-code-min = 224
//! site-universe = "site"
//! vsio-enterprises = [311]
//!
//! [options.dhcp]
//! routers = { type = "ip-list", value = ["192.0.2.1"] }
//! domain-name = { type = "str", value = "example.org" }
//!
//! [options.site]
//! "224" = { type = "hex", value = "c0ffee" }
//! ```

use std::{collections::HashMap, net::Ipv4Addr};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    store::{ComposeOp, DataString, OptionCache, OptionState},
    universe::{Registry, RegistryError},
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error while deserializing TOML: {0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("Unknown option space {0:?}")]
    UnknownSpace(String),

    #[error("Unknown option {name:?} in space {space}")]
    UnknownOption { space: String, name: String },

    #[error("Bad hex value for option {option}: {source}")]
    BadHex {
        option: String,
        source: hex::FromHexError,
    },

    #[error("Unknown site universe {0:?}")]
    UnknownSiteUniverse(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    #[serde(rename = "site-code-min", default)]
    site_code_min: u32,

    #[serde(rename = "site-universe", default)]
    site_universe: Option<String>,

    #[serde(rename = "vsio-enterprises", default)]
    vsio_enterprises: Vec<u32>,

    #[serde(default)]
    options: HashMap<String, HashMap<String, RawOption>>,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    #[serde(flatten)]
    data: RawValue,

    #[serde(default)]
    op: ComposeOp,
}

/// Typed option values as they appear in the configuration file. All
/// integers are stored big-endian, as on the wire.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
enum RawValue {
    Ip(Ipv4Addr),
    IpList(Vec<Ipv4Addr>),
    U8(u8),
    U16(u16),
    U32(u32),
    Str(String),
    Hex(String),
    Flag(bool),
}

impl RawValue {
    fn encode(&self, option: &str) -> Result<Vec<u8>, ConfigError> {
        Ok(match self {
            RawValue::Ip(ip) => ip.octets().to_vec(),
            RawValue::IpList(ips) => ips.iter().flat_map(|ip| ip.octets()).collect(),
            RawValue::U8(n) => vec![*n],
            RawValue::U16(n) => n.to_be_bytes().to_vec(),
            RawValue::U32(n) => n.to_be_bytes().to_vec(),
            RawValue::Str(s) => s.as_bytes().to_vec(),
            RawValue::Hex(s) => hex::decode(s).map_err(|source| ConfigError::BadHex {
                option: option.into(),
                source,
            })?,
            RawValue::Flag(b) => vec![u8::from(*b)],
        })
    }
}

/// Parse a configuration document into a configured option state.
///
/// The registry is still mutable here: VSIO enterprise spaces named by
/// the configuration are registered before the first packet is parsed,
/// after which the registry is frozen.
pub fn load_option_state(source: &str, registry: &mut Registry) -> Result<OptionState, ConfigError> {
    let raw: RawConfig = toml::from_str(source)?;

    for enterprise in &raw.vsio_enterprises {
        registry.register_vsio_enterprise(*enterprise)?;
    }

    let mut state = OptionState::new(registry);
    state.site_code_min = raw.site_code_min;
    if let Some(name) = &raw.site_universe {
        state.site_universe = registry
            .find_universe(name)
            .ok_or_else(|| ConfigError::UnknownSiteUniverse(name.clone()))?
            .index;
    }

    for (space, entries) in &raw.options {
        let universe = registry
            .find_universe(space)
            .ok_or_else(|| ConfigError::UnknownSpace(space.clone()))?;

        for (key, entry) in entries {
            // Keys are option names from the catalog, or numeric codes;
            // numeric codes may name options the catalog has no
            // descriptor for.
            let code = match key.parse::<u32>() {
                Ok(code) => code,
                Err(_) => registry
                    .catalog()
                    .lookup_name(universe.index, key)
                    .ok_or_else(|| ConfigError::UnknownOption {
                        space: space.clone(),
                        name: key.clone(),
                    })?
                    .code,
            };

            let bytes = entry.data.encode(key)?;
            let option = registry.catalog().lookup_or_unknown(universe.index, code);
            let oc = OptionCache::from_data(option, DataString::from_vec(bytes));
            state.set_option(universe, oc, entry.op);
        }
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        expr::{evaluate_option_cache, EvalContext},
        universe::{DHCP, SITE},
    };

    fn value_of(state: &OptionState, registry: &Registry, universe: usize, code: u32) -> Vec<u8> {
        let u = registry.universe(universe);
        let oc = state.lookup(u, code).expect("option configured");
        evaluate_option_cache(oc, &EvalContext::default())
            .expect("value evaluates")
            .as_slice()
            .to_vec()
    }

    #[test]
    fn test_load_basic_options() {
        let mut registry = Registry::standard();
        let state = load_option_state(
            r#"
            [options.dhcp]
            routers = { type = "ip-list", value = ["192.0.2.1", "192.0.2.2"] }
            domain-name = { type = "str", value = "example.org" }
            dhcp-lease-time = { type = "u32", value = 3600 }
            "#,
            &mut registry,
        )
        .unwrap();

        assert_eq!(
            value_of(&state, &registry, DHCP, 3),
            &[192, 0, 2, 1, 192, 0, 2, 2]
        );
        assert_eq!(value_of(&state, &registry, DHCP, 15), b"example.org");
        assert_eq!(value_of(&state, &registry, DHCP, 51), &[0, 0, 14, 16]);
    }

    #[test]
    fn test_numeric_codes_and_site_settings() {
        let mut registry = Registry::standard();
        let state = load_option_state(
            r#"
            site-code-min = 224
            site-universe = "site"

            [options.site]
            "224" = { type = "hex", value = "c0ffee" }
            "#,
            &mut registry,
        )
        .unwrap();

        assert_eq!(state.site_code_min, 224);
        assert_eq!(state.site_universe, SITE);
        assert_eq!(value_of(&state, &registry, SITE, 224), &[0xc0, 0xff, 0xee]);
    }

    #[test]
    fn test_compose_op() {
        let mut registry = Registry::standard();
        // Two keys on the same code cannot express ordering, so apply the
        // append in a second document against the same state shape.
        let mut state = load_option_state(
            r#"
            [options.dhcp]
            domain-name = { type = "str", value = "a" }
            "#,
            &mut registry,
        )
        .unwrap();

        let dhcp = registry.universe(DHCP);
        let option = registry.catalog().lookup_or_unknown(DHCP, 15);
        state.set_option(
            dhcp,
            OptionCache::from_data(option, DataString::copied(b"b")),
            ComposeOp::Append,
        );

        assert_eq!(value_of(&state, &registry, DHCP, 15), b"ab");
    }

    #[test]
    fn test_vsio_enterprise_registration() {
        let mut registry = Registry::standard();
        let state = load_option_state(
            r#"
            vsio-enterprises = [311]

            [options.vsio-311]
            "1" = { type = "hex", value = "beef" }
            "#,
            &mut registry,
        )
        .unwrap();

        let child = registry.find_universe("vsio-311").unwrap();
        assert_eq!(
            value_of(&state, &registry, child.index, 1),
            &[0xbe, 0xef]
        );
    }

    #[test]
    fn test_unknown_space_rejected() {
        let mut registry = Registry::standard();
        let err = load_option_state(
            r#"
            [options.nonesuch]
            "1" = { type = "u8", value = 1 }
            "#,
            &mut registry,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSpace(_)));
    }

    #[test]
    fn test_unknown_option_name_rejected() {
        let mut registry = Registry::standard();
        let err = load_option_state(
            r#"
            [options.dhcp]
            no-such-option = { type = "u8", value = 1 }
            "#,
            &mut registry,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption { .. }));
    }

    #[test]
    fn test_bad_hex_rejected() {
        let mut registry = Registry::standard();
        let err = load_option_state(
            r#"
            [options.dhcp]
            "224" = { type = "hex", value = "zz" }
            "#,
            &mut registry,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::BadHex { .. }));
    }
}
