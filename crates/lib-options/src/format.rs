//! The option format mini-DSL.
//!
//! Every option descriptor carries a short schema string whose characters
//! describe the wire layout of the option's value (`I` an IPv4 address,
//! `t` free text, `IA` an array of IPv4 addresses, `Efqdn.` a fully
//! encapsulated sub-space, and so on). Formats are compiled once into an
//! atom list when the catalog is built so nothing re-parses the string per
//! packet.

use std::collections::HashMap;

use thiserror::Error;

use crate::catalog::Enumeration;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("Unknown format atom '{atom}' in \"{format}\"")]
    UnknownAtom { atom: char, format: String },

    #[error("Unterminated space name in \"{format}\"")]
    UnterminatedSpaceName { format: String },

    #[error("Empty enumeration name in \"{format}\"")]
    EmptyEnumerationName { format: String },

    #[error("'c' atom is illegal except after 'D' atom in \"{format}\"")]
    StrayCompressHint { format: String },

    #[error("'e' atom without a following 'E' encapsulation in \"{format}\"")]
    PartialWithoutEncapsulation { format: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatAtom {
    /// `I`, an IPv4 address.
    Ipv4,
    /// `l` / `L`, signed / unsigned 32-bit integers.
    Int32,
    Uint32,
    /// `T`, a lease duration; 0xffffffff prints as "infinite".
    LeaseTime,
    /// `s` / `S`, signed / unsigned 16-bit integers.
    Int16,
    Uint16,
    /// `b` / `B`, signed / unsigned bytes.
    Int8,
    Uint8,
    /// `f`, a boolean flag; `F`, a flag that is always true.
    Flag,
    FlagAlwaysTrue,
    /// `t`, NVT ASCII text of arbitrary length.
    Text,
    /// `d`, a domain name in text form.
    DomainName,
    /// `D`, a list of RFC 1035 wire-format names; `compressed` is set by a
    /// following `c` hint.
    DomainList { compressed: bool },
    /// `X`, printed as text when the payload is printable, hex otherwise.
    HexOrAscii,
    /// `x`, always hex.
    Hex,
    /// `N<space>.`, a value from a named enumeration.
    Enum(String),
    /// `E<space>.` full encapsulation, or the `e` marker for an option
    /// whose fixed atoms precede an encapsulated remainder. An empty space
    /// name defers to the configured vendor space.
    Encapsulation { space: String, partial: bool },
    /// `A` array of the whole preceding sequence, `a` of the last atom.
    ArrayAll,
    Array,
    /// `o`, the preceding atom is optional at the end of the payload.
    Optional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    raw: String,
    atoms: Vec<FormatAtom>,
}

impl Format {
    pub fn parse(format: &str) -> Result<Self, FormatError> {
        let mut atoms = Vec::new();
        let mut chars = format.chars();
        let mut saw_partial = false;
        let mut saw_full = false;

        while let Some(c) = chars.next() {
            let atom = match c {
                'I' => FormatAtom::Ipv4,
                'l' => FormatAtom::Int32,
                'L' => FormatAtom::Uint32,
                'T' => FormatAtom::LeaseTime,
                's' => FormatAtom::Int16,
                'S' => FormatAtom::Uint16,
                'b' => FormatAtom::Int8,
                'B' => FormatAtom::Uint8,
                'f' => FormatAtom::Flag,
                'F' => FormatAtom::FlagAlwaysTrue,
                't' => FormatAtom::Text,
                'd' => FormatAtom::DomainName,
                'D' => FormatAtom::DomainList { compressed: false },
                'X' => FormatAtom::HexOrAscii,
                'x' => FormatAtom::Hex,
                'A' => FormatAtom::ArrayAll,
                'a' => FormatAtom::Array,
                'o' => FormatAtom::Optional,
                'c' => {
                    // Compression hint, only legal directly after a name
                    // list atom.
                    match atoms.last_mut() {
                        Some(FormatAtom::DomainList { compressed }) => {
                            *compressed = true;
                            continue;
                        }
                        _ => {
                            return Err(FormatError::StrayCompressHint {
                                format: format.into(),
                            })
                        }
                    }
                }
                'e' => {
                    saw_partial = true;
                    FormatAtom::Encapsulation {
                        space: String::new(),
                        partial: true,
                    }
                }
                'E' => {
                    saw_full = true;
                    let space = consume_space_name(&mut chars).ok_or_else(|| {
                        FormatError::UnterminatedSpaceName {
                            format: format.into(),
                        }
                    })?;
                    FormatAtom::Encapsulation {
                        space,
                        partial: false,
                    }
                }
                'N' => {
                    let space = consume_space_name(&mut chars).ok_or_else(|| {
                        FormatError::UnterminatedSpaceName {
                            format: format.into(),
                        }
                    })?;
                    if space.is_empty() {
                        return Err(FormatError::EmptyEnumerationName {
                            format: format.into(),
                        });
                    }
                    FormatAtom::Enum(space)
                }
                atom => {
                    return Err(FormatError::UnknownAtom {
                        atom,
                        format: format.into(),
                    })
                }
            };
            atoms.push(atom);
        }

        if saw_partial && !saw_full {
            return Err(FormatError::PartialWithoutEncapsulation {
                format: format.into(),
            });
        }

        Ok(Self {
            raw: format.into(),
            atoms,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn atoms(&self) -> &[FormatAtom] {
        &self.atoms
    }

    /// Whether the option's value is an encapsulated sub-space. Returns the
    /// encapsulation marker if the format opens with `E` or `e`.
    pub fn encapsulation(&self) -> Option<(&str, bool)> {
        match self.atoms.first() {
            Some(FormatAtom::Encapsulation { partial: true, .. }) => {
                // The space name lives on the E atom further along.
                self.encapsulated_space().map(|space| (space, true))
            }
            Some(FormatAtom::Encapsulation {
                space,
                partial: false,
            }) => Some((space.as_str(), false)),
            _ => None,
        }
    }

    /// The name of the encapsulated space, wherever the `E` atom appears.
    pub fn encapsulated_space(&self) -> Option<&str> {
        self.atoms.iter().find_map(|atom| match atom {
            FormatAtom::Encapsulation {
                space,
                partial: false,
            } => Some(space.as_str()),
            _ => None,
        })
    }

    /// True when the value ultimately carries NUL-terminatable text, per
    /// the termination rules of RFC 2132 section 2. Arbitrary-length atoms
    /// other than text make the answer false outright.
    pub fn has_text(&self) -> bool {
        for atom in &self.atoms {
            match atom {
                FormatAtom::Text | FormatAtom::DomainName => return true,
                FormatAtom::ArrayAll
                | FormatAtom::Array
                | FormatAtom::HexOrAscii
                | FormatAtom::Hex
                | FormatAtom::DomainList { .. } => return false,
                _ => {}
            }
        }
        false
    }

    /// The minimum number of bytes a value must carry before any variable
    /// or inconsistent length atoms begin.
    pub fn min_length(&self, enumerations: &HashMap<String, Enumeration>) -> usize {
        let mut min_len = 0usize;
        let mut last_size = 0usize;

        for atom in &self.atoms {
            match atom {
                FormatAtom::Ipv4
                | FormatAtom::Int32
                | FormatAtom::Uint32
                | FormatAtom::LeaseTime => {
                    min_len += 4;
                    last_size = 4;
                }
                FormatAtom::Int16 | FormatAtom::Uint16 => {
                    min_len += 2;
                    last_size = 2;
                }
                FormatAtom::Int8
                | FormatAtom::Uint8
                | FormatAtom::Flag
                | FormatAtom::FlagAlwaysTrue => {
                    min_len += 1;
                    last_size = 1;
                }
                FormatAtom::Enum(name) => match enumerations.get(name) {
                    Some(espace) => {
                        min_len += espace.width;
                        last_size = espace.width;
                    }
                    None => {
                        tracing::error!(enumeration = %name, format = %self.raw,
                                        "unknown enumeration in format");
                        return usize::MAX;
                    }
                },
                FormatAtom::Optional => {
                    min_len = min_len.saturating_sub(last_size);
                }
                FormatAtom::Encapsulation { .. }
                | FormatAtom::Text
                | FormatAtom::DomainName
                | FormatAtom::DomainList { .. }
                | FormatAtom::HexOrAscii
                | FormatAtom::Hex
                | FormatAtom::ArrayAll
                | FormatAtom::Array => return min_len,
            }
        }

        min_len
    }
}

fn consume_space_name(chars: &mut std::str::Chars<'_>) -> Option<String> {
    let mut name = String::new();
    for c in chars.by_ref() {
        if c == '.' {
            return Some(name);
        }
        name.push(c);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_atoms() {
        let f = Format::parse("IA").unwrap();
        assert_eq!(f.atoms(), &[FormatAtom::Ipv4, FormatAtom::ArrayAll]);
        assert!(!f.has_text());
    }

    #[test]
    fn test_encapsulation_name() {
        let f = Format::parse("Efqdn.").unwrap();
        assert_eq!(f.encapsulation(), Some(("fqdn", false)));

        let f = Format::parse("E.").unwrap();
        assert_eq!(f.encapsulation(), Some(("", false)));
    }

    #[test]
    fn test_partial_encapsulation() {
        let f = Format::parse("eSEnwip.").unwrap();
        assert_eq!(f.encapsulation(), Some(("nwip", true)));

        assert!(matches!(
            Format::parse("eS"),
            Err(FormatError::PartialWithoutEncapsulation { .. })
        ));
    }

    #[test]
    fn test_unknown_atom() {
        assert!(matches!(
            Format::parse("IZ"),
            Err(FormatError::UnknownAtom { atom: 'Z', .. })
        ));
    }

    #[test]
    fn test_compress_hint() {
        let f = Format::parse("Dc").unwrap();
        assert_eq!(f.atoms(), &[FormatAtom::DomainList { compressed: true }]);
        assert!(Format::parse("Ic").is_err());
    }

    #[test]
    fn test_has_text() {
        assert!(Format::parse("t").unwrap().has_text());
        assert!(Format::parse("d").unwrap().has_text());
        assert!(!Format::parse("X").unwrap().has_text());
        assert!(!Format::parse("Dc").unwrap().has_text());
    }

    #[test]
    fn test_min_length() {
        let enums = HashMap::new();
        assert_eq!(Format::parse("IL").unwrap().min_length(&enums), 8);
        assert_eq!(Format::parse("SBo").unwrap().min_length(&enums), 2);
        assert_eq!(Format::parse("Bt").unwrap().min_length(&enums), 1);
        assert_eq!(Format::parse("IA").unwrap().min_length(&enums), 4);
    }
}
