//! The option catalog: per-universe tables mapping numeric option codes to
//! descriptors (name, compiled format, encapsulated-space hint), plus the
//! named enumerations that `N` format atoms refer to.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;

use crate::format::{Format, FormatError};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Bad format for option {name} ({code}): {source}")]
    BadFormat {
        name: String,
        code: u32,
        source: FormatError,
    },

    #[error("Duplicate option code {code} in universe {universe}")]
    DuplicateCode { universe: usize, code: u32 },
}

/// A value enumeration referenced by `N<space>.` format atoms.
#[derive(Debug, Clone)]
pub struct Enumeration {
    pub name: String,
    /// Width in bytes of an encoded value: 1, 2 or 4.
    pub width: usize,
    pub values: Vec<(String, u32)>,
}

impl Enumeration {
    pub fn name_of(&self, value: u32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
    }
}

/// Describes one option within a universe.
#[derive(Debug)]
pub struct OptionDescriptor {
    pub universe: usize,
    pub code: u32,
    pub name: String,
    pub format: Format,
}

impl OptionDescriptor {
    fn new(universe: usize, code: u32, name: &str, format: &str) -> Result<Self, CatalogError> {
        let format = Format::parse(format).map_err(|source| CatalogError::BadFormat {
            name: name.into(),
            code,
            source,
        })?;

        Ok(Self {
            universe,
            code,
            name: name.into(),
            format,
        })
    }
}

#[derive(Debug, Default)]
struct Table {
    by_code: HashMap<u32, Arc<OptionDescriptor>>,
    by_name: HashMap<String, u32>,
}

/// Option tables for every registered universe. Frozen together with the
/// universe registry once startup completes.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: Vec<Table>,
    enumerations: HashMap<String, Enumeration>,
}

impl Catalog {
    /// Make room for one more universe's table; returns its index.
    pub(crate) fn push_table(&mut self) -> usize {
        self.tables.push(Table::default());
        self.tables.len() - 1
    }

    pub(crate) fn define(
        &mut self,
        universe: usize,
        code: u32,
        name: &str,
        format: &str,
    ) -> Result<(), CatalogError> {
        let descriptor = Arc::new(OptionDescriptor::new(universe, code, name, format)?);
        let table = &mut self.tables[universe];

        if table.by_code.insert(code, descriptor).is_some() {
            return Err(CatalogError::DuplicateCode { universe, code });
        }
        table.by_name.insert(name.into(), code);
        Ok(())
    }

    pub(crate) fn define_enumeration(
        &mut self,
        name: &str,
        width: usize,
        values: &[(&str, u32)],
    ) {
        self.enumerations.insert(
            name.into(),
            Enumeration {
                name: name.into(),
                width,
                values: values.iter().map(|(n, v)| ((*n).into(), *v)).collect(),
            },
        );
    }

    pub fn lookup(&self, universe: usize, code: u32) -> Option<Arc<OptionDescriptor>> {
        self.tables.get(universe)?.by_code.get(&code).cloned()
    }

    pub fn lookup_name(&self, universe: usize, name: &str) -> Option<Arc<OptionDescriptor>> {
        let code = self.tables.get(universe)?.by_name.get(name)?;
        self.lookup(universe, *code)
    }

    /// The descriptor for a code, or a synthetic `unknown-<code>`
    /// descriptor with a hex format so the value survives a round trip.
    /// Synthetic descriptors are not entered into the tables; a hostile
    /// peer must not be able to grow process-wide state.
    pub fn lookup_or_unknown(&self, universe: usize, code: u32) -> Arc<OptionDescriptor> {
        if let Some(descriptor) = self.lookup(universe, code) {
            return descriptor;
        }

        tracing::debug!(universe, code, "synthesizing descriptor for unknown option");
        Arc::new(OptionDescriptor {
            universe,
            code,
            name: format!("unknown-{}", code),
            format: Format::parse("X").expect("default option format is well-formed"),
        })
    }

    pub fn find_enumeration(&self, name: &str) -> Option<&Enumeration> {
        self.enumerations.get(name)
    }

    pub fn enumerations(&self) -> &HashMap<String, Enumeration> {
        &self.enumerations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_lookup() {
        let mut catalog = Catalog::default();
        let u = catalog.push_table();
        catalog.define(u, 1, "subnet-mask", "I").unwrap();

        let descriptor = catalog.lookup(u, 1).unwrap();
        assert_eq!(descriptor.name, "subnet-mask");
        assert_eq!(catalog.lookup_name(u, "subnet-mask").unwrap().code, 1);
        assert!(catalog.lookup(u, 2).is_none());
    }

    #[test]
    fn test_unknown_descriptor() {
        let mut catalog = Catalog::default();
        let u = catalog.push_table();

        let descriptor = catalog.lookup_or_unknown(u, 250);
        assert_eq!(descriptor.name, "unknown-250");
        assert_eq!(descriptor.format.raw(), "X");
        // Synthetics are not retained.
        assert!(catalog.lookup(u, 250).is_none());
    }

    #[test]
    fn test_bad_format_rejected() {
        let mut catalog = Catalog::default();
        let u = catalog.push_table();
        assert!(catalog.define(u, 1, "broken", "IZ").is_err());
    }

    #[test]
    fn test_enumeration() {
        let mut catalog = Catalog::default();
        catalog.define_enumeration("node-type", 1, &[("B-node", 1), ("P-node", 2)]);

        let e = catalog.find_enumeration("node-type").unwrap();
        assert_eq!(e.width, 1);
        assert_eq!(e.name_of(2), Some("P-node"));
        assert_eq!(e.name_of(9), None);
    }
}
