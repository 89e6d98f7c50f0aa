//! Per-packet and per-configuration storage of option values.
//!
//! An [`OptionState`] holds one optional container per registered
//! universe: a code-keyed map for universes where random access dominates,
//! or an insertion-ordered chain for universes whose emission order must
//! equal configuration order. Values share the underlying packet buffer
//! through [`DataString`] so parsing does not copy per entry.

use std::{collections::HashMap, sync::Arc};

use serde::Deserialize;

use crate::{
    catalog::OptionDescriptor,
    expr::Expr,
    universe::{Registry, Storage, Universe},
};

/// A byte string aliasing a shared, reference-counted buffer.
#[derive(Clone)]
pub struct DataString {
    buffer: Arc<[u8]>,
    offset: usize,
    len: usize,
    /// The data was NUL-padded on the wire.
    pub terminated: bool,
}

impl DataString {
    pub fn empty() -> Self {
        Self {
            buffer: Arc::from(&[][..]),
            offset: 0,
            len: 0,
            terminated: false,
        }
    }

    /// Copy `bytes` into a fresh shared buffer.
    pub fn copied(bytes: &[u8]) -> Self {
        Self::from_vec(bytes.to_vec())
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self {
            buffer: Arc::from(bytes),
            offset: 0,
            len,
            terminated: false,
        }
    }

    /// Alias a range of an existing shared buffer.
    pub fn slice(buffer: &Arc<[u8]>, offset: usize, len: usize) -> Self {
        debug_assert!(offset + len <= buffer.len());
        Self {
            buffer: Arc::clone(buffer),
            offset,
            len,
            terminated: false,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[self.offset..self.offset + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop `count` trailing bytes.
    pub fn truncate(&mut self, count: usize) {
        self.len = self.len.saturating_sub(count);
    }

    pub fn concat(&self, other: &DataString) -> DataString {
        let mut bytes = Vec::with_capacity(self.len + other.len);
        bytes.extend_from_slice(self.as_slice());
        bytes.extend_from_slice(other.as_slice());
        Self::from_vec(bytes)
    }
}

impl PartialEq for DataString {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for DataString {}

impl std::fmt::Debug for DataString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DataString({:02x?})", self.as_slice())
    }
}

#[derive(Debug, Clone)]
pub enum CacheValue {
    /// A constant byte string, usually aliasing the packet buffer.
    Data(DataString),
    /// An unevaluated expression from the configuration layer.
    Expression(Expr),
}

/// One stored option value, bound to its descriptor. Repeated occurrences
/// in universes that do not concatenate duplicates hang off `next` in
/// insertion order.
#[derive(Debug, Clone)]
pub struct OptionCache {
    pub option: Arc<OptionDescriptor>,
    pub value: CacheValue,
    /// Trailing NULs were stripped at parse time and must be restored on
    /// emission for this client.
    pub had_nulls: bool,
    pub next: Option<Box<OptionCache>>,
}

impl OptionCache {
    pub fn from_data(option: Arc<OptionDescriptor>, data: DataString) -> Self {
        Self {
            option,
            value: CacheValue::Data(data),
            had_nulls: false,
            next: None,
        }
    }

    pub fn from_expression(option: Arc<OptionDescriptor>, expression: Expr) -> Self {
        Self {
            option,
            value: CacheValue::Expression(expression),
            had_nulls: false,
            next: None,
        }
    }

    pub fn code(&self) -> u32 {
        self.option.code
    }

    fn take_expression(&mut self) -> Expr {
        match &self.value {
            CacheValue::Data(data) => Expr::Const(data.clone()),
            CacheValue::Expression(expression) => expression.clone(),
        }
    }
}

/// Configuration-time composition operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComposeOp {
    /// Write only if no value exists for the code.
    Default,
    /// Unconditional replace.
    Supersede,
    /// Alias of supersede, used on the client emission path.
    Send,
    /// New value follows the existing one.
    Append,
    /// New value precedes the existing one.
    Prepend,
}

impl Default for ComposeOp {
    fn default() -> Self {
        ComposeOp::Supersede
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Hashed(HashMap<u32, OptionCache>),
    Linked(Vec<OptionCache>),
}

impl Slot {
    fn new(storage: Storage) -> Self {
        match storage {
            Storage::Hashed => Slot::Hashed(HashMap::new()),
            Storage::Linked => Slot::Linked(Vec::new()),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Slot::Hashed(map) => map.is_empty(),
            Slot::Linked(chain) => chain.is_empty(),
        }
    }
}

/// A keyed collection of option caches, one container per universe.
#[derive(Debug, Clone)]
pub struct OptionState {
    slots: Vec<Option<Slot>>,
    /// Codes at or above this value resolve in `site_universe` instead of
    /// the DHCP universe during assembly.
    pub site_code_min: u32,
    pub site_universe: usize,
}

impl OptionState {
    pub fn new(registry: &Registry) -> Self {
        Self {
            slots: (0..registry.universe_count()).map(|_| None).collect(),
            site_code_min: 0,
            site_universe: crate::universe::DHCP,
        }
    }

    fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)?.as_ref()
    }

    fn slot_mut(&mut self, universe: &Universe) -> &mut Slot {
        if self.slots.len() <= universe.index {
            self.slots.resize_with(universe.index + 1, || None);
        }
        self.slots[universe.index].get_or_insert_with(|| Slot::new(universe.storage))
    }

    /// Whether any entry is stored under the universe with this index.
    pub fn has_entries(&self, index: usize) -> bool {
        self.slot(index).map(|s| !s.is_empty()).unwrap_or(false)
    }

    pub fn lookup(&self, universe: &Universe, code: u32) -> Option<&OptionCache> {
        match self.slot(universe.index)? {
            Slot::Hashed(map) => map.get(&code),
            Slot::Linked(chain) => chain.iter().find(|oc| oc.code() == code),
        }
    }

    pub fn lookup_mut(&mut self, universe: &Universe, code: u32) -> Option<&mut OptionCache> {
        match self.slots.get_mut(universe.index)?.as_mut()? {
            Slot::Hashed(map) => map.get_mut(&code),
            Slot::Linked(chain) => chain.iter_mut().find(|oc| oc.code() == code),
        }
    }

    /// Store an entry, replacing any existing entry (and its chain) for
    /// the same code.
    pub fn save(&mut self, universe: &Universe, oc: OptionCache) {
        let code = oc.code();
        match self.slot_mut(universe) {
            Slot::Hashed(map) => {
                map.insert(code, oc);
            }
            Slot::Linked(chain) => match chain.iter_mut().find(|e| e.code() == code) {
                Some(existing) => *existing = oc,
                None => chain.push(oc),
            },
        }
    }

    /// Store a repeated occurrence: appended to the tail of the existing
    /// entry's chain, or stored plainly if the code is new.
    pub fn save_chained(&mut self, universe: &Universe, oc: OptionCache) {
        match self.lookup_mut(universe, oc.code()) {
            Some(existing) => {
                let mut tail = existing;
                while tail.next.is_some() {
                    tail = tail.next.as_mut().unwrap();
                }
                tail.next = Some(Box::new(oc));
            }
            None => self.save(universe, oc),
        }
    }

    pub fn delete(&mut self, universe: &Universe, code: u32) {
        if let Some(Some(slot)) = self.slots.get_mut(universe.index) {
            match slot {
                Slot::Hashed(map) => {
                    map.remove(&code);
                }
                Slot::Linked(chain) => chain.retain(|oc| oc.code() != code),
            }
        }
    }

    /// Visit every entry stored under `universe`. Hashed universes are
    /// visited in arbitrary order, linked universes in insertion order.
    pub fn foreach(&self, universe: &Universe, f: &mut dyn FnMut(&OptionCache)) {
        if let Some(slot) = self.slot(universe.index) {
            match slot {
                Slot::Hashed(map) => {
                    for oc in map.values() {
                        f(oc);
                    }
                }
                Slot::Linked(chain) => {
                    for oc in chain {
                        f(oc);
                    }
                }
            }
        }
    }

    /// The codes present under `universe`.
    pub fn codes(&self, universe: &Universe) -> Vec<u32> {
        let mut codes = Vec::new();
        self.foreach(universe, &mut |oc| codes.push(oc.code()));
        codes
    }

    /// Add a constant option value under a known code; unknown codes are
    /// rejected. A convenience for state machines building replies.
    pub fn add_option(
        &mut self,
        registry: &Registry,
        universe: &Universe,
        code: u32,
        data: &[u8],
    ) -> bool {
        let option = match registry.catalog().lookup(universe.index, code) {
            Some(option) => option,
            None => {
                tracing::error!(universe = %universe.name, code, "attempt to add unknown option");
                return false;
            }
        };

        let oc = OptionCache::from_expression(option, Expr::Const(DataString::copied(data)));
        self.save(universe, oc);
        true
    }

    /// Apply a configuration statement to the store.
    pub fn set_option(&mut self, universe: &Universe, oc: OptionCache, op: ComposeOp) {
        match op {
            ComposeOp::Default => {
                if self.lookup(universe, oc.code()).is_none() {
                    self.save(universe, oc);
                }
            }
            ComposeOp::Supersede | ComposeOp::Send => self.save(universe, oc),
            ComposeOp::Append | ComposeOp::Prepend => {
                let mut incoming = oc;
                let existing = match self.lookup_mut(universe, incoming.code()) {
                    Some(existing) => existing,
                    None => {
                        self.save(universe, incoming);
                        return;
                    }
                };

                // A constant value is promoted to a constant-data
                // expression before the two halves are glued together.
                let old = existing.take_expression();
                let new = incoming.take_expression();
                let combined = match op {
                    ComposeOp::Append => Expr::concat(old, new),
                    _ => Expr::concat(new, old),
                };

                let option = Arc::clone(&existing.option);
                self.save(universe, OptionCache::from_expression(option, combined));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{evaluate_option_cache, EvalContext};
    use crate::universe::{DHCP, FQDN};

    fn cache(registry: &Registry, universe: usize, code: u32, bytes: &[u8]) -> OptionCache {
        let option = registry.catalog().lookup_or_unknown(universe, code);
        OptionCache::from_data(option, DataString::copied(bytes))
    }

    #[test]
    fn test_save_replaces() {
        let registry = Registry::standard();
        let dhcp = registry.universe(DHCP);
        let mut state = OptionState::new(&registry);

        state.save(dhcp, cache(&registry, DHCP, 12, b"one"));
        state.save(dhcp, cache(&registry, DHCP, 12, b"two"));

        let oc = state.lookup(dhcp, 12).unwrap();
        match &oc.value {
            CacheValue::Data(data) => assert_eq!(data.as_slice(), b"two"),
            _ => panic!("expected data"),
        }
        assert!(oc.next.is_none());
    }

    #[test]
    fn test_save_chained() {
        let registry = Registry::standard();
        let dhcp = registry.universe(DHCP);
        let mut state = OptionState::new(&registry);

        state.save_chained(dhcp, cache(&registry, DHCP, 61, b"a"));
        state.save_chained(dhcp, cache(&registry, DHCP, 61, b"b"));
        state.save_chained(dhcp, cache(&registry, DHCP, 61, b"c"));

        let first = state.lookup(dhcp, 61).unwrap();
        let second = first.next.as_ref().unwrap();
        let third = second.next.as_ref().unwrap();
        assert!(third.next.is_none());
    }

    #[test]
    fn test_linked_preserves_order() {
        let registry = Registry::standard();
        let fqdn = registry.universe(FQDN);
        let mut state = OptionState::new(&registry);

        for code in [5, 1, 3] {
            state.save(fqdn, cache(&registry, FQDN, code, &[code as u8]));
        }
        assert_eq!(state.codes(fqdn), vec![5, 1, 3]);
    }

    #[test]
    fn test_delete() {
        let registry = Registry::standard();
        let dhcp = registry.universe(DHCP);
        let mut state = OptionState::new(&registry);

        state.save(dhcp, cache(&registry, DHCP, 12, b"gone"));
        state.delete(dhcp, 12);
        assert!(state.lookup(dhcp, 12).is_none());
        assert!(!state.has_entries(DHCP));
    }

    #[test]
    fn test_compose_default() {
        let registry = Registry::standard();
        let dhcp = registry.universe(DHCP);
        let mut state = OptionState::new(&registry);

        state.set_option(dhcp, cache(&registry, DHCP, 15, b"first"), ComposeOp::Default);
        state.set_option(dhcp, cache(&registry, DHCP, 15, b"second"), ComposeOp::Default);

        let oc = state.lookup(dhcp, 15).unwrap();
        let data = evaluate_option_cache(oc, &EvalContext::default()).unwrap();
        assert_eq!(data.as_slice(), b"first");
    }

    #[test]
    fn test_compose_append_prepend() {
        let registry = Registry::standard();
        let dhcp = registry.universe(DHCP);
        let mut state = OptionState::new(&registry);

        state.set_option(dhcp, cache(&registry, DHCP, 15, b"mid"), ComposeOp::Supersede);
        state.set_option(dhcp, cache(&registry, DHCP, 15, b"-end"), ComposeOp::Append);
        state.set_option(dhcp, cache(&registry, DHCP, 15, b"pre-"), ComposeOp::Prepend);

        let oc = state.lookup(dhcp, 15).unwrap();
        let data = evaluate_option_cache(oc, &EvalContext::default()).unwrap();
        assert_eq!(data.as_slice(), b"pre-mid-end");
    }
}
