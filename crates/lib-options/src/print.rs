//! Render option bytes in human-readable form, driven by the option's
//! format atoms. Two output modes exist: config echo (quoted strings,
//! comma separators) and plain display (spaces); hex bytes always join
//! with colons.

use inet::Address;

use crate::{
    catalog::{Enumeration, OptionDescriptor},
    format::FormatAtom,
    name,
    universe::Registry,
    wire::{get_u16, get_u32},
};

/// What one rendered element of the value looks like.
enum Elem<'a> {
    Text,
    DomainList,
    Enum(Option<&'a Enumeration>),
    Ipv4,
    Int32,
    Uint32,
    LeaseTime,
    Int16,
    Uint16,
    Int8,
    Uint8,
    HexByte,
    Flag,
}

/// Format an option value so a human can easily read it.
///
/// Under-length payloads are reported and render as a placeholder.
pub fn pretty_print_option(
    option: &OptionDescriptor,
    data: &[u8],
    registry: &Registry,
    emit_commas: bool,
    emit_quotes: bool,
) -> String {
    let mut comma = if emit_commas { ',' } else { ' ' };

    // Size the value per the format and flatten it to renderable elements.
    let mut elems: Vec<Elem<'_>> = Vec::new();
    let mut hunksize = 0usize;
    let mut opthunk = 0usize;
    let mut hunkinc = 0usize;
    // -1: single hunk; -2: arbitrary-length tail; 0: array of hunks.
    let mut numhunk = -1i32;

    for atom in option.format.atoms() {
        if numhunk == 0 {
            tracing::error!(option = %option.name, format = %option.format.raw(),
                            "extra codes in format string");
            break;
        }
        match atom {
            FormatAtom::Array | FormatAtom::ArrayAll => {
                numhunk = 0;
            }
            FormatAtom::HexOrAscii | FormatAtom::Encapsulation { partial: false, .. } => {
                // Print as text when every byte is printable (a trailing
                // NUL is tolerated), as colon-hex otherwise.
                let printable = data
                    .iter()
                    .enumerate()
                    .all(|(k, b)| is_printable(*b) || (k + 1 == data.len() && *b == 0));
                if printable {
                    elems.push(Elem::Text);
                    numhunk = -2;
                } else {
                    elems.push(Elem::HexByte);
                    hunksize += 1;
                    comma = ':';
                    numhunk = 0;
                }
            }
            FormatAtom::Encapsulation { partial: true, .. } => {}
            FormatAtom::Hex => {
                elems.push(Elem::HexByte);
                hunksize += 1;
                hunkinc = 1;
                comma = ':';
                numhunk = 0;
            }
            FormatAtom::Text | FormatAtom::DomainName => {
                elems.push(Elem::Text);
                numhunk = -2;
            }
            FormatAtom::DomainList { .. } => {
                elems.push(Elem::DomainList);
                numhunk = -2;
            }
            FormatAtom::Enum(space) => {
                let espace = registry.catalog().find_enumeration(space);
                let width = espace.map(|e| e.width).unwrap_or(1);
                elems.push(Elem::Enum(espace));
                hunksize += width;
                hunkinc = width;
            }
            FormatAtom::Ipv4 => {
                elems.push(Elem::Ipv4);
                hunksize += 4;
                hunkinc = 4;
            }
            FormatAtom::Int32 => {
                elems.push(Elem::Int32);
                hunksize += 4;
                hunkinc = 4;
            }
            FormatAtom::Uint32 => {
                elems.push(Elem::Uint32);
                hunksize += 4;
                hunkinc = 4;
            }
            FormatAtom::LeaseTime => {
                elems.push(Elem::LeaseTime);
                hunksize += 4;
                hunkinc = 4;
            }
            FormatAtom::Int16 => {
                elems.push(Elem::Int16);
                hunksize += 2;
                hunkinc = 2;
            }
            FormatAtom::Uint16 => {
                elems.push(Elem::Uint16);
                hunksize += 2;
                hunkinc = 2;
            }
            FormatAtom::Int8 => {
                elems.push(Elem::Int8);
                hunksize += 1;
                hunkinc = 1;
            }
            FormatAtom::Uint8 => {
                elems.push(Elem::Uint8);
                hunksize += 1;
                hunkinc = 1;
            }
            FormatAtom::Flag | FormatAtom::FlagAlwaysTrue => {
                elems.push(Elem::Flag);
                hunksize += 1;
                hunkinc = 1;
            }
            FormatAtom::Optional => {
                opthunk += hunkinc;
            }
        }
    }

    if hunksize.saturating_sub(opthunk) > data.len() {
        tracing::error!(option = %option.name, expected = hunksize, got = data.len(),
                        "option value shorter than its format requires");
        return "<error>".into();
    }
    if numhunk == -1 && hunksize < data.len() {
        tracing::error!(option = %option.name, extra = data.len() - hunksize,
                        "extra bytes in option value");
    }

    let numhunk = match numhunk {
        0 => {
            let n = if hunksize > 0 { data.len() / hunksize } else { 1 };
            if n * hunksize < data.len() {
                tracing::error!(option = %option.name,
                                extra = data.len() - n * hunksize,
                                "extra bytes at end of array");
            }
            n.max(1)
        }
        _ => 1,
    };

    let mut out = String::new();
    let mut pos = 0usize;

    'hunks: for i in 0..numhunk {
        for (j, elem) in elems.iter().enumerate() {
            match elem {
                Elem::Text => {
                    pretty_text(&mut out, &data[pos..], emit_quotes);
                    pos = data.len();
                }
                Elem::DomainList => {
                    while pos < data.len() {
                        if pos > 0 {
                            if emit_quotes {
                                out.push(',');
                            }
                            out.push(' ');
                        }
                        match name::unpack(data, pos) {
                            Ok((labels, consumed)) => {
                                if emit_quotes {
                                    pretty_domain(&mut out, &labels);
                                } else {
                                    out.push_str(&name::to_dotted(&labels));
                                }
                                pos += consumed;
                            }
                            Err(err) => {
                                tracing::error!(option = %option.name, %err,
                                                "invalid domain list");
                                break;
                            }
                        }
                    }
                }
                Elem::Enum(espace) => {
                    let width = espace.map(|e| e.width).unwrap_or(1);
                    if pos + width > data.len() {
                        break 'hunks;
                    }
                    let value = match width {
                        1 => data[pos] as u32,
                        2 => get_u16(&data[pos..]) as u32,
                        _ => get_u32(&data[pos..]),
                    };
                    match espace.and_then(|e| e.name_of(value)) {
                        Some(name) => out.push_str(name),
                        None => out.push_str(&value.to_string()),
                    }
                    pos += width;
                }
                Elem::Ipv4 => {
                    if pos + 4 > data.len() {
                        break 'hunks;
                    }
                    let addr = Address::from_bytes(&data[pos..pos + 4])
                        .expect("4-byte slice is a valid address");
                    out.push_str(&addr.to_string());
                    pos += 4;
                }
                Elem::Int32 => {
                    if pos + 4 > data.len() {
                        break 'hunks;
                    }
                    out.push_str(&(get_u32(&data[pos..]) as i32).to_string());
                    pos += 4;
                }
                Elem::Uint32 => {
                    if pos + 4 > data.len() {
                        break 'hunks;
                    }
                    out.push_str(&get_u32(&data[pos..]).to_string());
                    pos += 4;
                }
                Elem::LeaseTime => {
                    if pos + 4 > data.len() {
                        break 'hunks;
                    }
                    match get_u32(&data[pos..]) {
                        u32::MAX => out.push_str("infinite"),
                        t => out.push_str(&t.to_string()),
                    }
                    pos += 4;
                }
                Elem::Int16 => {
                    if pos + 2 > data.len() {
                        break 'hunks;
                    }
                    out.push_str(&(get_u16(&data[pos..]) as i16).to_string());
                    pos += 2;
                }
                Elem::Uint16 => {
                    if pos + 2 > data.len() {
                        break 'hunks;
                    }
                    out.push_str(&get_u16(&data[pos..]).to_string());
                    pos += 2;
                }
                Elem::Int8 => {
                    if pos >= data.len() {
                        break 'hunks;
                    }
                    out.push_str(&(data[pos] as i8).to_string());
                    pos += 1;
                }
                Elem::Uint8 => {
                    if pos >= data.len() {
                        break 'hunks;
                    }
                    out.push_str(&data[pos].to_string());
                    pos += 1;
                }
                Elem::HexByte => {
                    if pos >= data.len() {
                        break 'hunks;
                    }
                    out.push_str(&format!("{:x}", data[pos]));
                    pos += 1;
                }
                Elem::Flag => {
                    if pos >= data.len() {
                        break 'hunks;
                    }
                    out.push_str(if data[pos] != 0 { "true" } else { "false" });
                    pos += 1;
                }
            }

            if pos == data.len() && i + 1 >= numhunk {
                break 'hunks;
            }
            if j + 1 < elems.len() && comma != ':' {
                out.push(' ');
            }
        }
        if i + 1 < numhunk {
            out.push(comma);
        }
        if pos == data.len() {
            break;
        }
    }

    out
}

fn is_printable(b: u8) -> bool {
    b.is_ascii_graphic() || b == b' '
}

/// Config-language escaping: backslash doubles, quote characters and `$`
/// and backtick get a backslash, anything unprintable becomes an octal
/// escape.
fn pretty_escape(out: &mut String, bytes: &[u8]) {
    for (k, b) in bytes.iter().enumerate() {
        if !is_printable(*b) {
            // Skip a trailing NUL.
            if k + 1 == bytes.len() && *b == 0 {
                continue;
            }
            out.push_str(&format!("\\{:03o}", b));
        } else if matches!(*b, b'"' | b'\'' | b'$' | b'`' | b'\\') {
            out.push('\\');
            out.push(*b as char);
        } else {
            out.push(*b as char);
        }
    }
}

fn pretty_text(out: &mut String, bytes: &[u8], emit_quotes: bool) {
    if emit_quotes {
        out.push('"');
    }
    pretty_escape(out, bytes);
    if emit_quotes {
        out.push('"');
    }
}

/// Quote a label sequence the way the configuration language writes
/// domain names: every label followed by a dot.
fn pretty_domain(out: &mut String, labels: &[u8]) {
    out.push('"');
    let mut pos = 0usize;
    while pos < labels.len() {
        let len = labels[pos] as usize;
        pos += 1;
        if len == 0 || pos + len > labels.len() {
            break;
        }
        pretty_escape(out, &labels[pos..pos + len]);
        out.push('.');
        pos += len;
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::{DHCP, DHCPV6};

    fn print(registry: &Registry, universe: usize, code: u32, data: &[u8]) -> String {
        let option = registry.catalog().lookup_or_unknown(universe, code);
        pretty_print_option(&option, data, registry, false, false)
    }

    #[test]
    fn test_single_address() {
        let registry = Registry::standard();
        assert_eq!(
            print(&registry, DHCP, 1, &[255, 255, 255, 0]),
            "255.255.255.0"
        );
    }

    #[test]
    fn test_address_array() {
        let registry = Registry::standard();
        assert_eq!(
            print(&registry, DHCP, 3, &[192, 0, 2, 1, 192, 0, 2, 2]),
            "192.0.2.1 192.0.2.2"
        );
    }

    #[test]
    fn test_address_array_commas() {
        let registry = Registry::standard();
        let option = registry.catalog().lookup_or_unknown(DHCP, 3);
        assert_eq!(
            pretty_print_option(&option, &[192, 0, 2, 1, 192, 0, 2, 2], &registry, true, false),
            "192.0.2.1,192.0.2.2"
        );
    }

    #[test]
    fn test_text_quoting_and_escapes() {
        let registry = Registry::standard();
        let option = registry.catalog().lookup_or_unknown(DHCP, 15);

        assert_eq!(
            pretty_print_option(&option, b"lan.example", &registry, false, true),
            "\"lan.example\""
        );
        assert_eq!(
            pretty_print_option(&option, b"a\"b\x01", &registry, false, true),
            "\"a\\\"b\\001\""
        );
    }

    #[test]
    fn test_hex_or_ascii_decision() {
        let registry = Registry::standard();
        // Printable: renders as text.
        assert_eq!(print(&registry, DHCP, 60, b"udhcp"), "udhcp");
        // Unprintable: renders as colon-hex.
        assert_eq!(print(&registry, DHCP, 61, &[0x01, 0xab, 0xcd]), "1:ab:cd");
    }

    #[test]
    fn test_lease_time_infinite() {
        let registry = Registry::standard();
        assert_eq!(print(&registry, DHCP, 51, &[0, 0, 0, 60]), "60");
        assert_eq!(print(&registry, DHCP, 51, &[255, 255, 255, 255]), "infinite");
    }

    #[test]
    fn test_enumeration_names() {
        let registry = Registry::standard();
        assert_eq!(print(&registry, DHCP, 46, &[2]), "P-node");
        assert_eq!(print(&registry, DHCP, 46, &[9]), "9");
    }

    #[test]
    fn test_under_length_is_error() {
        let registry = Registry::standard();
        assert_eq!(print(&registry, DHCP, 1, &[255, 255]), "<error>");
    }

    #[test]
    fn test_flag() {
        let registry = Registry::standard();
        assert_eq!(print(&registry, DHCP, 19, &[1]), "true");
        assert_eq!(print(&registry, DHCP, 19, &[0]), "false");
    }

    #[test]
    fn test_domain_list() {
        let registry = Registry::standard();
        let encoded = b"\x04host\x07example\x03com\x00\x05other\x03org\x00";
        assert_eq!(
            print(&registry, DHCPV6, 24, encoded),
            "host.example.com other.org"
        );
    }

    #[test]
    fn test_domain_list_quoted() {
        let registry = Registry::standard();
        let option = registry.catalog().lookup_or_unknown(DHCPV6, 24);
        let encoded = b"\x03com\x00";
        assert_eq!(
            pretty_print_option(&option, encoded, &registry, false, true),
            "\"com.\""
        );
    }

    #[test]
    fn test_parameter_request_list() {
        let registry = Registry::standard();
        assert_eq!(print(&registry, DHCP, 55, &[1, 3, 6]), "1 3 6");
    }
}
