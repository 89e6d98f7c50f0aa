//! Option assembly: packs configured option values into outbound packets
//! under size, priority, split, overload and encapsulation rules.
//!
//! The v4 path stages everything into one scratch buffer whose tail
//! doubles as the overload regions, then splits it back out into the
//! packet's `options`, `file` and `sname` fields. The v6 path is a plain
//! two-byte-tag walk with no overload and no splitting.

use std::sync::Arc;

use crate::{
    constants::{self, v4, MAGIC_COOKIE},
    expr::{evaluate_option_cache, EvalContext},
    store::{DataString, OptionState},
    universe::{Encapsulator, Registry, Universe, DHCP, DHCPV6, FQDN, VSIO},
    wire::get_u16,
};

/// The pieces of an outbound v4 packet the assembler writes into.
pub struct ReplyBuffers {
    pub options: [u8; constants::OPTIONS_FIELD_LEN],
    pub file: [u8; constants::DHCP_FILE_LEN],
    pub sname: [u8; constants::DHCP_SNAME_LEN],
}

impl Default for ReplyBuffers {
    fn default() -> Self {
        Self {
            options: [0; constants::OPTIONS_FIELD_LEN],
            file: [0; constants::DHCP_FILE_LEN],
            sname: [0; constants::DHCP_SNAME_LEN],
        }
    }
}

/// Assembly knobs that are fixed per reply.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssembleParams<'a> {
    /// Configured maximum message size; zero means unspecified.
    pub max_message_size: usize,
    /// Overload regions the caller permits: bit 0 `file`, bit 1 `sname`.
    pub overload: u8,
    /// NUL-terminate text options for this client.
    pub terminate: bool,
    /// The inbound packet was BOOTP.
    pub bootp: bool,
    /// The client's parameter request list, in its order.
    pub prl: Option<&'a [u8]>,
    /// Name of the option space `E.`-format options resolve to.
    pub vendor_space: Option<&'a str>,
}

/// Cons up the option region of a v4 reply. Returns the number of bytes
/// used in `out.options` (cookie included); zero tells the caller to drop
/// the reply.
pub fn cons_options(
    registry: &Registry,
    inpacket: Option<&crate::packet::Packet>,
    in_options: Option<&OptionState>,
    cfg_options: &OptionState,
    out: &mut ReplyBuffers,
    params: &AssembleParams<'_>,
) -> usize {
    let dhcp = registry.universe(DHCP);
    let ctx = EvalContext {
        packet: inpacket,
        in_options,
        cfg_options: Some(cfg_options),
    };

    // If the client advertised a maximum message size and it is tighter
    // than the configured one, honor the client.
    let mut mms = params.max_message_size;
    if let Some(packet) = inpacket {
        if let Some(oc) = packet.options.lookup(dhcp, v4::MAX_MESSAGE_SIZE) {
            if let Some(data) = evaluate_option_cache(oc, &ctx) {
                if data.len() >= 2 {
                    let advertised = get_u16(data.as_slice()) as usize;
                    if mms == 0 || advertised < mms {
                        mms = advertised;
                    }
                }
            }
        }
    }

    let mut main_buffer_size = if mms != 0 {
        mms.saturating_sub(constants::DHCP_FIXED_LEN)
            .max(constants::MIN_MAX_MESSAGE_SIZE - constants::DHCP_FIXED_LEN)
    } else if params.bootp {
        match inpacket {
            Some(packet) => packet.len().saturating_sub(constants::DHCP_FIXED_LEN).max(64),
            None => 64,
        }
    } else {
        constants::MIN_MAX_MESSAGE_SIZE - constants::DHCP_FIXED_LEN
    };

    // Hard ceilings: the scratch buffer less whatever the overload
    // regions claim, and the physical options field.
    let overload = params.overload & 3;
    let mb_max = 4096
        - if overload & 1 != 0 { constants::DHCP_FILE_LEN } else { 0 }
        - if overload & 2 != 0 { constants::DHCP_SNAME_LEN } else { 0 };
    main_buffer_size = main_buffer_size
        .min(mb_max)
        .min(constants::OPTIONS_FIELD_LEN);

    let priority_list = build_priority_list(registry, cfg_options, params.prl);

    let (ofbuf1, ofbuf2) = if overload != 0 {
        (
            main_buffer_size - 4,
            if overload == 3 {
                main_buffer_size - 4 + constants::DHCP_FILE_LEN
            } else {
                0
            },
        )
    } else {
        (0, 0)
    };

    let buflen = main_buffer_size - 4
        + if overload & 1 != 0 { constants::DHCP_FILE_LEN } else { 0 }
        + if overload & 2 != 0 { constants::DHCP_SNAME_LEN } else { 0 };
    let mut buffer = vec![0u8; buflen];

    let mut ocount = 0u8;
    let option_size = store_options(
        Some(&mut ocount),
        &mut buffer,
        &ctx,
        cfg_options,
        &priority_list,
        ofbuf1,
        ofbuf2,
        params.terminate,
        params.vendor_space,
        registry,
    );
    if option_size == 0 {
        return 0;
    }

    let overload_used = if overload != 0 {
        if ocount == 1 && overload & 1 != 0 {
            1
        } else if ocount == 1 && overload & 2 != 0 {
            2
        } else if ocount == 3 {
            3
        } else {
            0
        }
    } else {
        0
    };

    // The cookie up front, then the main region.
    out.options[..4].copy_from_slice(&MAGIC_COOKIE);
    let mut mainbufix = 4;
    out.options[mainbufix..mainbufix + option_size].copy_from_slice(&buffer[..option_size]);
    mainbufix += option_size;

    if overload_used != 0 && mainbufix + 3 <= constants::OPTIONS_FIELD_LEN {
        out.options[mainbufix] = v4::OPTION_OVERLOAD as u8;
        out.options[mainbufix + 1] = 1;
        out.options[mainbufix + 2] = overload_used;
        mainbufix += 3;

        if overload_used & 1 != 0 {
            out.file
                .copy_from_slice(&buffer[ofbuf1..ofbuf1 + constants::DHCP_FILE_LEN]);
        }
        if overload_used & 2 != 0 {
            // With only one secondary region packed, its data sits at
            // ofbuf1 regardless of which region it becomes.
            let src = if ofbuf2 != 0 { ofbuf2 } else { ofbuf1 };
            out.sname
                .copy_from_slice(&buffer[src..src + constants::DHCP_SNAME_LEN]);
        }
    }

    let mut agentix = mainbufix;
    let need_endopt = mainbufix < main_buffer_size;

    // Relay agent information goes last in the main buffer, past the
    // client-controlled ordering.
    agentix += store_options(
        None,
        &mut out.options[agentix..],
        &ctx,
        cfg_options,
        &[v4::AGENT_OPTIONS],
        0,
        0,
        false,
        None,
        registry,
    );

    if agentix < constants::OPTIONS_FIELD_LEN && need_endopt {
        out.options[agentix] = v4::END as u8;
        agentix += 1;
    }

    agentix
}

fn build_priority_list(
    registry: &Registry,
    cfg_options: &OptionState,
    prl: Option<&[u8]>,
) -> Vec<u32> {
    let dhcp = registry.universe(DHCP);

    // Protocol-mandatory options come first, always.
    let mut priority_list: Vec<u32> = vec![
        v4::MESSAGE_TYPE,
        v4::SERVER_IDENTIFIER,
        v4::LEASE_TIME,
        v4::MESSAGE,
        v4::REQUESTED_ADDRESS,
        v4::ASSOCIATED_IP,
    ];

    match prl {
        Some(prl) if !prl.is_empty() => {
            if cfg_options.lookup(dhcp, v4::SUBNET_SELECTION).is_some()
                && priority_list.len() < constants::PRIORITY_COUNT
            {
                priority_list.push(v4::SUBNET_SELECTION);
            }

            let room = constants::PRIORITY_COUNT - priority_list.len();
            for &code in prl.iter().take(room) {
                // The client cannot change the delivery order of the
                // relay agent information option.
                if code as u32 != v4::AGENT_OPTIONS {
                    priority_list.push(code as u32);
                }
            }

            // Not explicitly requested, so lowest priority: the FQDN
            // reply, and a subnet mask some client implementations have
            // come to rely on.
            if priority_list.len() < constants::PRIORITY_COUNT {
                priority_list.push(v4::FQDN);
            }
            if priority_list.len() < constants::PRIORITY_COUNT {
                priority_list.push(v4::SUBNET_MASK);
            }
        }
        _ => {
            priority_list.extend_from_slice(&[
                v4::SUBNET_MASK,
                v4::ROUTERS,
                v4::DOMAIN_NAME_SERVERS,
                v4::HOST_NAME,
                v4::FQDN,
            ]);

            // Everything configured in the DHCP space below the site-code
            // cutoff, then everything configured at or above it in the
            // site space. With no distinct site space both walks read the
            // DHCP space.
            if cfg_options.site_code_min > 0 {
                for code in cfg_options.codes(dhcp) {
                    if code < cfg_options.site_code_min
                        && priority_list.len() < constants::PRIORITY_COUNT
                        && code != v4::AGENT_OPTIONS
                    {
                        priority_list.push(code);
                    }
                }
            }
            let site = registry.universe(cfg_options.site_universe);
            for code in cfg_options.codes(site) {
                if code >= cfg_options.site_code_min
                    && priority_list.len() < constants::PRIORITY_COUNT
                    && code != v4::AGENT_OPTIONS
                {
                    priority_list.push(code);
                }
            }

            // Encapsulation carriers for every non-empty sub-universe
            // hanging off the DHCP space.
            for universe in registry.universes() {
                if let Some(enc) = universe.enc_opt {
                    if enc.universe == DHCP
                        && cfg_options.has_entries(universe.index)
                        && priority_list.len() < constants::PRIORITY_COUNT
                        && enc.code != v4::AGENT_OPTIONS
                    {
                        priority_list.push(enc.code);
                    }
                }
            }

            // The vendor space can't stand on its own.
            if priority_list.len() < constants::PRIORITY_COUNT {
                priority_list.push(v4::VENDOR_ENCAPSULATED_OPTIONS);
            }
        }
    }

    priority_list
}

/// Store the priority-listed options into `buffer`, overflowing into the
/// cutoff regions when allowed. Returns the bytes used before the first
/// cutoff; `ocount` reports which cutoff regions were used.
#[allow(clippy::too_many_arguments)]
pub fn store_options(
    mut ocount: Option<&mut u8>,
    buffer: &mut [u8],
    ctx: &EvalContext<'_>,
    cfg_options: &OptionState,
    priority_list: &[u32],
    first_cutoff: usize,
    second_cutoff: usize,
    terminate: bool,
    vendor_space: Option<&str>,
    registry: &Registry,
) -> usize {
    let buflen = buffer.len();

    if first_cutoff != 0 && first_cutoff >= buflen {
        tracing::error!(first_cutoff, buflen, "invalid first cutoff");
        return 0;
    }
    if second_cutoff != 0 && second_cutoff >= buflen {
        tracing::error!(second_cutoff, buflen, "invalid second cutoff");
        return 0;
    }
    let bufend = if first_cutoff != 0 { first_cutoff } else { buflen };
    let sbufend = if second_cutoff != 0 { second_cutoff } else { buflen };

    // Eliminate all but the first occurrence of each code without
    // otherwise disturbing the order.
    let mut priority: Vec<u32> = Vec::with_capacity(priority_list.len());
    for &code in priority_list {
        if !priority.contains(&code) {
            priority.push(code);
        }
    }

    let dhcp = registry.universe(DHCP);
    let mut bufix = 0usize;
    let mut six = 0usize;
    let mut tix = 0usize;

    for (i, &code) in priority.iter().enumerate() {
        // Codes above the cutoff live in the site option space.
        let u = if code >= cfg_options.site_code_min {
            registry.universe(cfg_options.site_universe)
        } else {
            dhcp
        };

        let oc = cfg_options.lookup(u, code);
        let option = oc
            .map(|oc| Arc::clone(&oc.option))
            .or_else(|| registry.catalog().lookup(u.index, code));

        // For an encapsulating option, assemble the referenced sub-space.
        let mut encapsulation = Vec::new();
        let mut have_encapsulation = false;
        if let Some(opt) = &option {
            if let Some((space, _)) = opt.format.encapsulation() {
                let space = if space.is_empty() {
                    vendor_space.unwrap_or("")
                } else {
                    space
                };
                if !space.is_empty() {
                    have_encapsulation =
                        option_space_encapsulate(&mut encapsulation, ctx, cfg_options, space, registry);
                }
            }
        }

        // No data available for this option.
        if oc.is_none() && !have_encapsulation {
            continue;
        }

        let mut od = Vec::new();
        if let Some(oc) = oc {
            match evaluate_option_cache(oc, ctx) {
                Some(data) => od.extend_from_slice(data.as_slice()),
                // An empty value reads as absent, but a full encapsulation
                // is still emitted.
                None if !have_encapsulation => continue,
                None => {}
            }
        }
        od.extend_from_slice(&encapsulation);

        let mut length = od.len();
        if length == 0 {
            continue;
        }

        let tto = terminate && option.as_ref().map(|o| o.format.has_text()).unwrap_or(false);
        if tto {
            length += 1;
        }

        // Options longer than 255 bytes go out as multiple hunks of the
        // same code; shorter ones split only if no single region holds
        // them.
        let mut splitup = length > 255;
        let mut ix = 0usize;
        let optstart = bufix;
        let soptstart = six;
        let toptstart = tix;

        while length > 0 {
            #[derive(Clone, Copy)]
            enum Region {
                Main,
                Second,
                Third,
            }

            let mut incr = length;
            let region = if !splitup
                && ((six == 0 && tix == 0 && i == priority.len() - 1 && bufix + 2 + length < bufend)
                    || bufix + 5 + length < bufend)
            {
                Region::Main
            } else if !splitup && first_cutoff != 0 && first_cutoff + six + 3 + length < sbufend {
                Region::Second
            } else if !splitup && second_cutoff != 0 && second_cutoff + tix + 3 + length < buflen {
                Region::Third
            } else {
                splitup = true;
                if bufix + 6 < bufend {
                    incr = bufend - bufix - 5;
                    Region::Main
                } else if first_cutoff != 0 && first_cutoff + six + 4 < sbufend {
                    incr = sbufend - (first_cutoff + six) - 3;
                    Region::Second
                } else if second_cutoff != 0 && second_cutoff + tix + 4 < buflen {
                    incr = buflen - (second_cutoff + tix) - 3;
                    Region::Third
                } else {
                    // Give up, roll back this option on all cursors.
                    tracing::debug!(code, "no room left, option skipped");
                    bufix = optstart;
                    six = soptstart;
                    tix = toptstart;
                    break;
                }
            };

            incr = incr.min(length).min(255);

            let pos = match region {
                Region::Main => bufix,
                Region::Second => first_cutoff + six,
                Region::Third => second_cutoff + tix,
            };
            buffer[pos] = code as u8;
            buffer[pos + 1] = incr as u8;
            if tto && incr == length {
                if incr > 1 {
                    buffer[pos + 2..pos + 1 + incr].copy_from_slice(&od[ix..ix + incr - 1]);
                }
                buffer[pos + 1 + incr] = 0;
            } else {
                buffer[pos + 2..pos + 2 + incr].copy_from_slice(&od[ix..ix + incr]);
            }

            length -= incr;
            ix += incr;
            match region {
                Region::Main => bufix += 2 + incr,
                Region::Second => six += 2 + incr,
                Region::Third => tix += 2 + incr,
            }
        }
    }

    // Terminate and pad the overload regions that were used.
    if first_cutoff != 0 && six > 0 {
        if first_cutoff + six >= sbufend {
            tracing::error!("second buffer overflow in overloaded options");
        } else {
            buffer[first_cutoff + six] = v4::END as u8;
            for b in &mut buffer[first_cutoff + six + 1..sbufend] {
                *b = v4::PAD as u8;
            }
        }
        if let Some(ocount) = ocount.as_deref_mut() {
            *ocount |= 1;
        }
    }
    if second_cutoff != 0 && tix > 0 {
        if second_cutoff + tix >= buflen {
            tracing::error!("third buffer overflow in overloaded options");
        } else {
            buffer[second_cutoff + tix] = v4::END as u8;
            for b in &mut buffer[second_cutoff + tix + 1..buflen] {
                *b = v4::PAD as u8;
            }
        }
        if let Some(ocount) = ocount.as_deref_mut() {
            *ocount |= 2;
        }
    }

    if (six > 0 || tix > 0) && bufix + 3 > bufend {
        tracing::error!("not enough space for the overload option");
    }

    bufix
}

/// Assemble a named option space into `result` as the payload of its
/// carrier option: the space's own entries first, then any configured
/// sub-universe whose pure-`E` carrier lives in this space and was not
/// overridden by an explicit value.
pub fn option_space_encapsulate(
    result: &mut Vec<u8>,
    ctx: &EvalContext<'_>,
    cfg_options: &OptionState,
    space: &str,
    registry: &Registry,
) -> bool {
    let universe = match registry.find_universe(space) {
        Some(universe) => universe,
        None => {
            tracing::error!(space, "option space does not exist, but is configured");
            return false;
        }
    };

    let mut status = encapsulate_universe(result, ctx, cfg_options, universe, registry);

    for sub in registry.universes() {
        let enc = match sub.enc_opt {
            Some(enc) if enc.universe == universe.index => enc,
            _ => continue,
        };
        if !cfg_options.has_entries(sub.index) {
            continue;
        }
        let carrier = match registry.catalog().lookup(universe.index, enc.code) {
            Some(carrier) => carrier,
            None => continue,
        };
        if !matches!(carrier.format.encapsulation(), Some((_, false))) {
            continue;
        }
        // An explicit value for the carrier overrides the child space.
        if cfg_options.lookup(universe, enc.code).is_some() {
            continue;
        }

        let mut sub_payload = Vec::new();
        if encapsulate_universe(&mut sub_payload, ctx, cfg_options, sub, registry)
            && append_option(result, universe, enc.code, &sub_payload)
        {
            status = true;
        }
    }

    status
}

fn encapsulate_universe(
    result: &mut Vec<u8>,
    ctx: &EvalContext<'_>,
    cfg_options: &OptionState,
    universe: &Universe,
    registry: &Registry,
) -> bool {
    match universe.encapsulator {
        Encapsulator::Standard => {
            let mut status = false;
            cfg_options.foreach(universe, &mut |oc| {
                if store_option(result, ctx, cfg_options, universe, oc, registry) {
                    status = true;
                }
            });
            status
        }
        Encapsulator::Fqdn => fqdn_space_encapsulate(result, ctx, cfg_options, registry),
        Encapsulator::Nwip => nwip_space_encapsulate(result, ctx, cfg_options, universe, registry),
    }
}

/// Append one evaluated option to an encapsulation payload. An option
/// whose format carries a partial (`e`) encapsulation gets the referenced
/// sub-space appended to its own value first.
fn store_option(
    result: &mut Vec<u8>,
    ctx: &EvalContext<'_>,
    cfg_options: &OptionState,
    universe: &Universe,
    oc: &crate::store::OptionCache,
    registry: &Registry,
) -> bool {
    let mut value = match evaluate_option_cache(oc, ctx) {
        Some(data) => data.as_slice().to_vec(),
        None => return false,
    };

    if matches!(oc.option.format.encapsulation(), Some((_, true))) {
        if let Some(space) = oc.option.format.encapsulated_space() {
            if let Some(sub) = registry.find_universe(space) {
                encapsulate_universe(&mut value, ctx, cfg_options, sub, registry);
            } else {
                tracing::error!(
                    option = %oc.option.name,
                    code = oc.option.code,
                    space,
                    "option refers to unknown option space"
                );
            }
        }
    }

    append_option(result, universe, oc.option.code, &value)
}

/// Write `<tag><length><value>` in the universe's widths.
fn append_option(result: &mut Vec<u8>, universe: &Universe, code: u32, value: &[u8]) -> bool {
    if value.is_empty() {
        return false;
    }

    let mut scratch = [0u8; 4];
    universe.store_tag(&mut scratch, code);
    result.extend_from_slice(&scratch[..universe.tag_size()]);

    if universe.length_size() > 0 {
        universe.store_length(&mut scratch, value.len());
        result.extend_from_slice(&scratch[..universe.length_size()]);
    }

    result.extend_from_slice(value);
    true
}

/// Rebuild the wire FQDN option (flags, rcodes, then the name in ASCII or
/// DNS-label form) from the configured sub-universe.
fn fqdn_space_encapsulate(
    result: &mut Vec<u8>,
    ctx: &EvalContext<'_>,
    cfg_options: &OptionState,
    registry: &Registry,
) -> bool {
    let fqdn_universe = registry.universe(FQDN);
    if !cfg_options.has_entries(FQDN) {
        return false;
    }

    let mut values: [Option<DataString>; constants::fqdn::SUBOPTION_COUNT as usize + 1] =
        Default::default();
    cfg_options.foreach(fqdn_universe, &mut |oc| {
        let code = oc.code() as usize;
        if code < values.len() {
            values[code] = evaluate_option_cache(oc, ctx);
        }
    });

    let flag = |code: u32| {
        values[code as usize]
            .as_ref()
            .map(|v| v.as_slice().first().copied().unwrap_or(0) != 0)
            .unwrap_or(false)
    };
    let byte = |code: u32| {
        values[code as usize]
            .as_ref()
            .and_then(|v| v.as_slice().first().copied())
            .unwrap_or(0)
    };

    let mut out = vec![0u8; 3];
    if flag(constants::fqdn::NO_CLIENT_UPDATE) {
        out[0] |= 2;
    }
    if flag(constants::fqdn::SERVER_UPDATE) {
        out[0] |= 1;
    }
    out[1] = byte(constants::fqdn::RCODE1);
    out[2] = byte(constants::fqdn::RCODE2);

    let name = values[constants::fqdn::FQDN as usize]
        .as_ref()
        .map(|v| v.as_slice().to_vec())
        .unwrap_or_default();

    if flag(constants::fqdn::ENCODED) {
        out[0] |= 4;
        let mut i = 0usize;
        while i < name.len() {
            let mut j = i;
            while j < name.len() && name[j] != b'.' {
                j += 1;
            }
            out.push((j - i) as u8);
            out.extend_from_slice(&name[i..j]);
            i = j;
            if i < name.len() && name[i] == b'.' {
                i += 1;
            }
        }
        // A trailing dot marks a fully qualified name; encode the root.
        if name.last() == Some(&b'.') {
            out.push(0);
        }
    } else {
        out.extend_from_slice(&name);
    }

    result.extend_from_slice(&out);
    true
}

/// NWIP framing from RFC 2242: an empty space is announced with the
/// does-not-exist sub-option, a populated one is led by
/// exists-in-options-area.
fn nwip_space_encapsulate(
    result: &mut Vec<u8>,
    ctx: &EvalContext<'_>,
    cfg_options: &OptionState,
    universe: &Universe,
    registry: &Registry,
) -> bool {
    let mut inner = Vec::new();
    let mut any = false;
    cfg_options.foreach(universe, &mut |oc| {
        if store_option(&mut inner, ctx, cfg_options, universe, oc, registry) {
            any = true;
        }
    });

    if any {
        result.push(constants::nwip::EXISTS_IN_OPTIONS_AREA as u8);
        result.push(0);
        result.extend_from_slice(&inner);
    } else {
        result.push(constants::nwip::DOES_NOT_EXIST as u8);
        result.push(0);
    }
    true
}

/// Store the options of a v6 reply: required options first, then the
/// client's ORO without duplicates, then one VSIO option per configured
/// enterprise. Returns bytes written.
pub fn store_options6(
    buffer: &mut [u8],
    ctx: &EvalContext<'_>,
    opt_state: &OptionState,
    required_opts: &[u32],
    oro: &[u8],
    registry: &Registry,
) -> usize {
    let buflen = buffer.len();
    let v6 = registry.universe(DHCPV6);

    // The option code carrying the VSIO container, found by following the
    // encapsulation chain up to the DHCPv6 universe.
    let mut vsio_code = None;
    let mut enc = registry.universe(VSIO).enc_opt;
    while let Some(e) = enc {
        if e.universe == DHCPV6 {
            vsio_code = Some(e.code);
            break;
        }
        enc = registry.universe(e.universe).enc_opt;
    }
    let vsio_code = match vsio_code {
        Some(code) => code,
        None => {
            tracing::error!("no VSIO option code found");
            return 0;
        }
    };

    let mut bufpos = 0usize;
    let mut vsio_wanted = false;

    let emit = |bufpos: &mut usize, buffer: &mut [u8], code: u32| {
        let oc = match opt_state.lookup(v6, code) {
            Some(oc) => oc,
            None => return,
        };
        match evaluate_option_cache(oc, ctx) {
            Some(data) => {
                if data.len() + 4 <= buflen - *bufpos {
                    crate::wire::put_u16(&mut buffer[*bufpos..], code as u16);
                    crate::wire::put_u16(&mut buffer[*bufpos + 2..], data.len() as u16);
                    buffer[*bufpos + 4..*bufpos + 4 + data.len()].copy_from_slice(data.as_slice());
                    *bufpos += 4 + data.len();
                } else {
                    tracing::debug!(code, "no space for option");
                }
            }
            None => tracing::debug!(code, "option evaluated to nothing"),
        }
    };

    for &code in required_opts {
        if code == vsio_code {
            vsio_wanted = true;
        }
        emit(&mut bufpos, buffer, code);
    }

    for pair in oro.chunks_exact(2) {
        let code = get_u16(pair) as u32;

        // Already included because it is required.
        if required_opts.contains(&code) {
            continue;
        }
        if code == vsio_code {
            vsio_wanted = true;
        }
        emit(&mut bufpos, buffer, code);
    }

    if vsio_wanted {
        for sub in registry.universes() {
            let enterprise = match sub.enc_opt {
                Some(enc) if enc.universe == VSIO => enc.code,
                _ => continue,
            };
            if !opt_state.has_entries(sub.index) {
                continue;
            }

            let mut inner = Vec::new();
            opt_state.foreach(sub, &mut |oc| {
                if let Some(data) = evaluate_option_cache(oc, ctx) {
                    let mut piece = Vec::new();
                    append_option(&mut piece, sub, oc.code(), data.as_slice());
                    inner.extend_from_slice(&piece);
                }
            });

            if inner.is_empty() {
                continue;
            }
            if bufpos + 8 + inner.len() > buflen {
                tracing::debug!(enterprise, "no space for VSIO option");
                continue;
            }

            crate::wire::put_u16(&mut buffer[bufpos..], vsio_code as u16);
            crate::wire::put_u16(&mut buffer[bufpos + 2..], (inner.len() + 4) as u16);
            crate::wire::put_u32(&mut buffer[bufpos + 4..], enterprise);
            buffer[bufpos + 8..bufpos + 8 + inner.len()].copy_from_slice(&inner);
            bufpos += 8 + inner.len();
        }
    }

    bufpos
}

/// Collect the codes present in a v6 option state, including the carrier
/// codes of configured sub-universes, as a server-side ORO.
pub fn build_server_oro(opt_state: &OptionState, registry: &Registry) -> Vec<u8> {
    let v6 = registry.universe(DHCPV6);
    let mut oro = Vec::new();

    opt_state.foreach(v6, &mut |oc| {
        oro.extend_from_slice(&(oc.code() as u16).to_be_bytes());
    });

    for universe in registry.universes() {
        if !opt_state.has_entries(universe.index) {
            continue;
        }
        let mut enc = universe.enc_opt;
        while let Some(e) = enc {
            if e.universe == DHCPV6 {
                oro.extend_from_slice(&(e.code as u16).to_be_bytes());
                break;
            }
            enc = registry.universe(e.universe).enc_opt;
        }
    }

    oro
}
