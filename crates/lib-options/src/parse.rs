//! Option parsing and reassembly: walks the variable-length option
//! regions of inbound packets into an [`OptionState`], recursing into
//! encapsulated sub-universes and the v4 overload regions.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    catalog::OptionDescriptor,
    constants::{self, fqdn, v4, MAGIC_COOKIE},
    packet::Packet,
    store::{CacheValue, DataString, OptionCache, OptionState},
    universe::{LengthWidth, Registry, SpaceDecoder, Universe, DHCP, FQDN},
};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("option {option} ({code}:{len}) in space {universe} larger than buffer")]
    LengthOverrun {
        universe: String,
        option: String,
        code: u32,
        len: usize,
    },

    #[error("fqdn option too short ({0} bytes)")]
    FqdnTooShort(usize),

    #[error("fqdn label length {0} exceeds 63")]
    FqdnLabelTooLong(usize),

    #[error("fqdn tag longer than buffer")]
    FqdnTagOverrun,
}

/// Parse all available options out of a v4 packet.
///
/// A missing magic cookie marks the options invalid but is not an error.
/// After the primary parse, an OPTION_OVERLOAD value extends the walk into
/// the `file` and/or `sname` header regions. A parse failure mid-stream is
/// forgiven when a valid server message type was already captured: some
/// servers ship a mangled domain-name option followed by junk, and clients
/// interoperate better by accepting what parsed. Client packets get no
/// such leniency.
pub fn parse_options(packet: &mut Packet, registry: &Registry) -> Result<(), ParseError> {
    let dhcp = registry.universe(DHCP);
    packet.options_valid = false;

    if packet.raw.len() < constants::DHCP_FIXED_NON_UDP + 4 {
        return Ok(());
    }

    let cookie_at = constants::DHCP_FIXED_NON_UDP;
    if packet.raw[cookie_at..cookie_at + 4] != MAGIC_COOKIE {
        return Ok(());
    }

    let Packet { raw, options, .. } = packet;
    if let Err(err) = parse_option_buffer(options, &raw[cookie_at + 4..], registry, dhcp) {
        let forgiven = options
            .lookup(dhcp, v4::MESSAGE_TYPE)
            .and_then(first_data_byte)
            .map(|ty| {
                ty == constants::DHCPOFFER || ty == constants::DHCPACK || ty == constants::DHCPNAK
            })
            .unwrap_or(false);

        if !forgiven {
            return Err(err);
        }
        tracing::warn!(%err, "accepting corrupt options from server message");
    }

    let overload = options
        .lookup(dhcp, v4::OPTION_OVERLOAD)
        .and_then(first_data_byte)
        .unwrap_or(0);

    if overload & 1 != 0 {
        let file = &raw[constants::FILE_OFFSET..constants::FILE_OFFSET + constants::DHCP_FILE_LEN];
        parse_option_buffer(options, file, registry, dhcp)?;
    }
    if overload & 2 != 0 {
        let sname =
            &raw[constants::SNAME_OFFSET..constants::SNAME_OFFSET + constants::DHCP_SNAME_LEN];
        parse_option_buffer(options, sname, registry, dhcp)?;
    }

    packet.options_valid = true;
    Ok(())
}

fn first_data_byte(oc: &OptionCache) -> Option<u8> {
    match &oc.value {
        CacheValue::Data(data) => data.as_slice().first().copied(),
        CacheValue::Expression(_) => None,
    }
}

/// Parse one option buffer under a universe into the state. The buffer is
/// copied once into a shared region so stored entries alias it without
/// lifetime risk.
pub fn parse_option_buffer(
    state: &mut OptionState,
    buffer: &[u8],
    registry: &Registry,
    universe: &Universe,
) -> Result<(), ParseError> {
    let bp: Arc<[u8]> = Arc::from(buffer);
    let length = buffer.len();
    let mut offset = 0usize;

    while offset + universe.tag_size() <= length {
        let code = universe.get_tag(&bp[offset..]);
        if universe.end_tag == Some(code) {
            break;
        }
        offset += universe.tag_size();

        // Pad options don't have a length.
        if universe.pad_tag == Some(code) {
            continue;
        }

        let len = match universe.length_width {
            // A zero-length-size space consumes the rest of the buffer.
            LengthWidth::Zero => length - offset,
            _ => {
                if offset + universe.length_size() > length {
                    return Err(overrun(registry, universe, code, 65536));
                }
                let len = universe.get_length(&bp[offset..]);
                offset += universe.length_size();
                len
            }
        };

        if offset + len > length {
            return Err(overrun(registry, universe, code, len));
        }

        let option = registry.catalog().lookup(universe.index, code);

        // If the option is an encapsulation, parse the sub-space. A pure
        // encapsulation that decodes consumes the payload; a partial one
        // (or a failed decode) keeps the raw bytes as well.
        let mut consumed = false;
        if let Some(opt) = &option {
            if let Some((_, partial)) = opt.format.encapsulation() {
                let decoded = parse_encapsulated_suboptions(
                    state,
                    opt,
                    &bp[offset..offset + len],
                    registry,
                    None,
                );
                consumed = decoded && !partial;
            }
        }

        if !consumed {
            enum Existing {
                None,
                Concat,
                Chain,
            }
            let existing = match state.lookup(universe, code) {
                None => Existing::None,
                Some(_) if universe.concat_duplicates => Existing::Concat,
                Some(_) => Existing::Chain,
            };

            match existing {
                Existing::Concat => {
                    let oc = state.lookup_mut(universe, code).unwrap();
                    if let CacheValue::Data(old) = &oc.value {
                        let merged = old.concat(&DataString::slice(&bp, offset, len));
                        oc.value = CacheValue::Data(merged);
                    }
                }
                Existing::Chain => {
                    let descriptor = option
                        .clone()
                        .unwrap_or_else(|| registry.catalog().lookup_or_unknown(universe.index, code));
                    let oc =
                        OptionCache::from_data(descriptor, DataString::slice(&bp, offset, len));
                    state.save_chained(universe, oc);
                }
                Existing::None => {
                    save_option_buffer(state, registry, universe, &bp, offset, len, code, true);
                }
            }
        }

        offset += len;
    }

    Ok(())
}

fn overrun(registry: &Registry, universe: &Universe, code: u32, len: usize) -> ParseError {
    let name = registry
        .catalog()
        .lookup(universe.index, code)
        .map(|o| o.name.clone())
        .unwrap_or_else(|| "<unknown>".into());
    tracing::error!(
        universe = %universe.name,
        option = %name,
        code,
        len,
        "option larger than buffer"
    );
    ParseError::LengthOverrun {
        universe: universe.name.clone(),
        option: name,
        code,
        len,
    }
}

/// Decode an encapsulated payload into its sub-universe. Returns whether
/// the caller may treat the payload as consumed, which it never may for
/// partial (`e`) encapsulations: their fixed prefix still has to be kept
/// raw alongside the decoded sub-options.
pub fn parse_encapsulated_suboptions(
    state: &mut OptionState,
    opt: &OptionDescriptor,
    payload: &[u8],
    registry: &Registry,
    vendor_space: Option<&str>,
) -> bool {
    let (space, partial) = match opt.format.encapsulation() {
        Some(enc) => enc,
        None => return false,
    };

    let space = if space.is_empty() {
        match vendor_space {
            Some(name) => name,
            None => return false,
        }
    } else {
        space
    };

    let sub = match registry.find_universe(space) {
        Some(sub) => sub,
        None => {
            tracing::error!(
                option = %opt.name,
                code = opt.code,
                space,
                "encapsulated option refers to unknown option space"
            );
            return false;
        }
    };

    let decoded = match sub.decoder {
        SpaceDecoder::Standard => parse_option_buffer(state, payload, registry, sub).is_ok(),
        SpaceDecoder::Fqdn => fqdn_universe_decode(state, payload, registry).is_ok(),
    };

    decoded && !partial
}

/// Store one option value, honoring the tag width, stripping trailing
/// NULs from text options (remembering them in `had_nulls`) and replacing
/// any existing entry for the code.
#[allow(clippy::too_many_arguments)]
fn save_option_buffer(
    state: &mut OptionState,
    registry: &Registry,
    universe: &Universe,
    bp: &Arc<[u8]>,
    offset: usize,
    len: usize,
    code: u32,
    terminated: bool,
) {
    if !universe.tag_width.fits(code) {
        tracing::error!(universe = %universe.name, code, "option code out of tag range");
        return;
    }

    let option = registry.catalog().lookup_or_unknown(universe.index, code);

    let mut data = DataString::slice(bp, offset, len);
    data.terminated = terminated;

    // Strip NUL padding from text options, per RFC 2132 section 2. The
    // flag lets emission restore the NULs for clients that sent them.
    let mut had_nulls = false;
    if option.format.has_text() {
        let min_len = option.format.min_length(registry.catalog().enumerations());
        while data.len() > min_len && data.as_slice().last() == Some(&0) {
            data.truncate(1);
            had_nulls = true;
        }
    }

    let mut oc = OptionCache::from_data(option, data);
    oc.had_nulls = had_nulls;
    state.save(universe, oc);
}

/// Decode the wire form of the client FQDN option (v4 code 81) into the
/// canonical sub-universe: flag and rcode sub-options plus the hostname,
/// domain name and whole name, whichever of the ASCII or DNS-label layouts
/// the client chose.
pub fn fqdn_universe_decode(
    state: &mut OptionState,
    buffer: &[u8],
    registry: &Registry,
) -> Result<(), ParseError> {
    let fqdn_universe = registry.universe(FQDN);
    let mut length = buffer.len();

    if length < 3 {
        return Err(ParseError::FqdnTooShort(length));
    }

    // Working layout: flags and rcodes unpacked into the first five bytes,
    // then the name. Slices into this buffer become the sub-option values.
    let mut data = vec![0u8; length + 4];
    data[0] = u8::from(buffer[0] & 4 != 0); // encoded
    data[1] = u8::from(buffer[0] & 2 != 0); // no-client-update
    data[2] = u8::from(buffer[0] & 1 != 0); // server-update
    data[3..3 + length - 1].copy_from_slice(&buffer[1..length]);

    let encoded = data[0] != 0;
    let mut hostname = None;
    let mut domainname = None;
    let mut whole = None;

    if !encoded {
        // Some broken clients NUL-terminate this option.
        if buffer[length - 1] == 0 {
            length -= 1;
            data[1] = 1;
        }

        // The first '.' terminates the hostname component; a name without
        // one is a non-qualified label and has no domain part.
        let name = if length > 3 { &buffer[3..length] } else { &[][..] };
        let host_len = name.iter().position(|&b| b == b'.').unwrap_or(name.len());

        if host_len > 0 {
            hostname = Some((5, host_len));
        }
        if length > 4 + host_len {
            domainname = Some((6 + host_len, length - 4 - host_len));
        }
        if length > 3 {
            whole = Some((5, length - 3));
        }
    } else {
        let mut pos = 5usize;
        let mut total_len = 0usize;
        let mut first_len = 0usize;
        let mut terminated = false;

        while pos < length + 2 {
            let label = data[pos] as usize;
            if label > 63 {
                tracing::info!("fancy bits in fqdn option");
                return Err(ParseError::FqdnLabelTooLong(label));
            }
            if label == 0 {
                terminated = true;
                break;
            }
            if pos + label > length + 3 {
                tracing::info!("fqdn tag longer than buffer");
                return Err(ParseError::FqdnTagOverrun);
            }

            if first_len == 0 {
                first_len = label;
            }
            data[pos] = b'.';
            pos += label + 1;
            total_len += label + 1;
        }

        // One dot too many was counted; the last label carries none.
        total_len = total_len.saturating_sub(1);

        // An unterminated name is a single non-qualified label.
        if !terminated {
            first_len = total_len;
        }

        if first_len > 0 {
            hostname = Some((6, first_len));
        }
        if total_len > 0 && first_len != total_len {
            domainname = Some((7 + first_len, total_len - first_len - 1));
        }
        if total_len > 0 {
            whole = Some((6, total_len));
        }
    }

    let bp: Arc<[u8]> = Arc::from(data);
    let mut save = |code: u32, offset: usize, len: usize, terminated: bool| {
        save_option_buffer(state, registry, fqdn_universe, &bp, offset, len, code, terminated);
    };

    save(fqdn::ENCODED, 0, 1, false);
    if let Some((offset, len)) = hostname {
        save(fqdn::HOSTNAME, offset, len, false);
    }
    if let Some((offset, len)) = domainname {
        save(fqdn::DOMAINNAME, offset, len, true);
    }
    if let Some((offset, len)) = whole {
        save(fqdn::FQDN, offset, len, true);
    }
    save(fqdn::NO_CLIENT_UPDATE, 1, 1, false);
    save(fqdn::SERVER_UPDATE, 2, 1, false);
    save(fqdn::RCODE1, 3, 1, false);
    save(fqdn::RCODE2, 4, 1, false);

    Ok(())
}
