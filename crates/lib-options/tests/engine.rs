//! End-to-end exercises of the parse and assembly paths.

use options::{
    constants, cons_options, load_option_state, parse_option_buffer, store_options6,
    AssembleParams, DataString, EvalContext, OptionCache, OptionState, Registry, ReplyBuffers,
    AGENT, DHCP, DHCPV6,
};

/// Walk a v4 TLV stream into (code, payload) pairs, stopping at END and
/// skipping PAD.
fn tlvs(buf: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < buf.len() {
        let code = buf[i];
        if code == 255 {
            break;
        }
        if code == 0 {
            i += 1;
            continue;
        }
        let len = buf[i + 1] as usize;
        out.push((code, buf[i + 2..i + 2 + len].to_vec()));
        i += 2 + len;
    }
    out
}

/// Walk a v6 TLV stream into (code, payload) pairs.
fn tlvs6(buf: &[u8]) -> Vec<(u16, Vec<u8>)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i + 4 <= buf.len() {
        let code = u16::from_be_bytes([buf[i], buf[i + 1]]);
        let len = u16::from_be_bytes([buf[i + 2], buf[i + 3]]) as usize;
        out.push((code, buf[i + 4..i + 4 + len].to_vec()));
        i += 4 + len;
    }
    out
}

fn save_raw(registry: &Registry, state: &mut OptionState, universe: usize, code: u32, data: &[u8]) {
    let option = registry.catalog().lookup_or_unknown(universe, code);
    state.save(
        registry.universe(universe),
        OptionCache::from_data(option, DataString::copied(data)),
    );
}

#[test]
fn test_parse_then_emit_round_trip() {
    let registry = Registry::standard();
    let dhcp = registry.universe(DHCP);

    #[rustfmt::skip]
    let stream: Vec<u8> = vec![
        53, 1, 5,
        54, 4, 192, 0, 2, 1,
        51, 4, 0, 0, 14, 16,
        1, 4, 255, 255, 255, 0,
        3, 8, 192, 0, 2, 1, 192, 0, 2, 254,
        15, 3, b'l', b'a', b'n',
        255,
    ];

    let mut state = OptionState::new(&registry);
    parse_option_buffer(&mut state, &stream, &registry, dhcp).unwrap();

    let mut out = ReplyBuffers::default();
    let params = AssembleParams {
        prl: Some(&[53, 54, 51, 1, 3, 15]),
        ..Default::default()
    };
    let len = cons_options(&registry, None, None, &state, &mut out, &params);
    assert!(len > 4);

    assert_eq!(out.options[..4], constants::MAGIC_COOKIE);
    assert_eq!(tlvs(&out.options[4..len]), tlvs(&stream));
}

#[test]
fn test_split_and_rejoin() {
    let registry = Registry::standard();
    let dhcp = registry.universe(DHCP);

    let big: Vec<u8> = (0..400u32).map(|i| (i % 251) as u8).collect();
    let mut state = OptionState::new(&registry);
    save_raw(&registry, &mut state, DHCP, 12, &big);

    let mut out = ReplyBuffers::default();
    let params = AssembleParams {
        max_message_size: 700,
        prl: Some(&[12]),
        ..Default::default()
    };
    let len = cons_options(&registry, None, None, &state, &mut out, &params);

    let emitted = tlvs(&out.options[4..len]);
    let hunks: Vec<_> = emitted.iter().filter(|(code, _)| *code == 12).collect();
    assert_eq!(hunks.len(), 2);
    assert_eq!(hunks[0].1.len() + hunks[1].1.len(), 400);

    let mut rejoined = hunks[0].1.clone();
    rejoined.extend_from_slice(&hunks[1].1);
    assert_eq!(rejoined, big);

    // A universe that concatenates duplicates reproduces the single
    // original entry on re-parse.
    let mut reparsed = OptionState::new(&registry);
    parse_option_buffer(&mut reparsed, &out.options[4..len], &registry, dhcp).unwrap();
    let oc = reparsed.lookup(dhcp, 12).expect("host-name reassembled");
    assert!(oc.next.is_none());
    let data = options::evaluate_option_cache(oc, &EvalContext::default()).unwrap();
    assert_eq!(data.as_slice(), &big[..]);
}

#[test]
fn test_overload_completeness() {
    let registry = Registry::standard();

    let mut state = OptionState::new(&registry);
    save_raw(&registry, &mut state, DHCP, 128, &vec![0xaa; 250]);
    save_raw(&registry, &mut state, DHCP, 129, &vec![0xbb; 150]);
    save_raw(&registry, &mut state, DHCP, 130, &vec![0xcc; 60]);

    let mut out = ReplyBuffers::default();
    let params = AssembleParams {
        max_message_size: 576,
        overload: 3,
        prl: Some(&[128, 129, 130]),
        ..Default::default()
    };
    let len = cons_options(&registry, None, None, &state, &mut out, &params);
    assert!(len > 0);

    // Option 52 is present in the main buffer with the full mask.
    let emitted = tlvs(&out.options[4..len]);
    let overload = emitted
        .iter()
        .find(|(code, _)| *code == 52)
        .expect("overload option present");
    assert_eq!(overload.1, vec![3]);

    // Every byte of all three options made it out.
    let mut all = Vec::new();
    for (code, payload) in emitted
        .iter()
        .chain(tlvs(&out.file).iter())
        .chain(tlvs(&out.sname).iter())
    {
        if (128..=130).contains(code) {
            all.push((*code, payload.clone()));
        }
    }
    let total: usize = all.iter().map(|(_, p)| p.len()).sum();
    assert_eq!(total, 250 + 150 + 60);

    // Each used region ends with END before any padding.
    let file_end = out.file.iter().position(|&b| b == 255).expect("END in file");
    assert!(out.file[file_end + 1..].iter().all(|&b| b == 0));
    let sname_end = out
        .sname
        .iter()
        .position(|&b| b == 255)
        .expect("END in sname");
    assert!(out.sname[sname_end + 1..].iter().all(|&b| b == 0));
}

#[test]
fn test_priority_order_and_agent_tail() {
    let registry = Registry::standard();

    let mut state = OptionState::new(&registry);
    save_raw(&registry, &mut state, DHCP, 53, &[5]);
    save_raw(&registry, &mut state, DHCP, 1, &[255, 255, 255, 0]);
    save_raw(&registry, &mut state, DHCP, 12, b"peach");
    save_raw(&registry, &mut state, AGENT, 1, &[0xde, 0xad]);

    let mut out = ReplyBuffers::default();
    let params = AssembleParams {
        // The client asks for 82 mid-list; it may not reorder it.
        prl: Some(&[12, 82, 1]),
        ..Default::default()
    };
    let len = cons_options(&registry, None, None, &state, &mut out, &params);

    let codes: Vec<u8> = tlvs(&out.options[4..len]).iter().map(|(c, _)| *c).collect();
    assert_eq!(codes, vec![53, 12, 1, 82]);

    let emitted = tlvs(&out.options[4..len]);
    let agent = emitted.iter().find(|(code, _)| *code == 82).unwrap();
    assert_eq!(agent.1, vec![1, 2, 0xde, 0xad]);
}

#[test]
fn test_prl_duplicate_emitted_once() {
    let registry = Registry::standard();

    let mut state = OptionState::new(&registry);
    save_raw(&registry, &mut state, DHCP, 12, b"once");

    let mut out = ReplyBuffers::default();
    let params = AssembleParams {
        prl: Some(&[12, 12]),
        ..Default::default()
    };
    let len = cons_options(&registry, None, None, &state, &mut out, &params);

    let hunks = tlvs(&out.options[4..len])
        .iter()
        .filter(|(code, _)| *code == 12)
        .count();
    assert_eq!(hunks, 1);
}

#[test]
fn test_bootp_size_floor() {
    let registry = Registry::standard();

    let mut state = OptionState::new(&registry);
    save_raw(&registry, &mut state, DHCP, 53, &[5]);
    save_raw(&registry, &mut state, DHCP, 12, &vec![0x61; 100]);

    let mut out = ReplyBuffers::default();
    let params = AssembleParams {
        bootp: true,
        prl: Some(&[12]),
        ..Default::default()
    };
    let len = cons_options(&registry, None, None, &state, &mut out, &params);

    // 64 bytes of option room: the message type fits, the 100-byte
    // host-name is rolled back rather than truncated.
    let codes: Vec<u8> = tlvs(&out.options[4..len]).iter().map(|(c, _)| *c).collect();
    assert!(codes.contains(&53));
    assert!(!codes.contains(&12));
}

#[test]
fn test_terminated_text_option() {
    let registry = Registry::standard();

    let mut state = OptionState::new(&registry);
    save_raw(&registry, &mut state, DHCP, 15, b"lan");

    let mut out = ReplyBuffers::default();
    let params = AssembleParams {
        terminate: true,
        prl: Some(&[15]),
        ..Default::default()
    };
    let len = cons_options(&registry, None, None, &state, &mut out, &params);

    let emitted = tlvs(&out.options[4..len]);
    let domain = emitted.iter().find(|(code, _)| *code == 15).unwrap();
    assert_eq!(domain.1, b"lan\0");
}

#[test]
fn test_vendor_space_emitted_without_explicit_value() {
    let registry = Registry::standard();

    // Only vendor sub-options are configured; option 43 itself has no
    // value, but the encapsulation still goes out.
    let mut state = OptionState::new(&registry);
    save_raw(
        &registry,
        &mut state,
        options::VENDOR,
        1,
        &[0x11, 0x22],
    );

    let mut out = ReplyBuffers::default();
    let params = AssembleParams {
        prl: Some(&[43]),
        vendor_space: Some("vendor"),
        ..Default::default()
    };
    let len = cons_options(&registry, None, None, &state, &mut out, &params);

    let emitted = tlvs(&out.options[4..len]);
    let vendor = emitted.iter().find(|(code, _)| *code == 43).unwrap();
    assert_eq!(vendor.1, vec![1, 2, 0x11, 0x22]);
}

#[test]
fn test_store_options6_required_then_oro() {
    let registry = Registry::standard();
    let mut state = OptionState::new(&registry);

    save_raw(&registry, &mut state, DHCPV6, 1, &[0x01]);
    save_raw(&registry, &mut state, DHCPV6, 2, &[0x02]);
    save_raw(&registry, &mut state, DHCPV6, 3, &[0x03]);
    save_raw(&registry, &mut state, DHCPV6, 23, &[0x17]);

    let mut buf = vec![0u8; 512];
    let len = store_options6(
        &mut buf,
        &EvalContext::default(),
        &state,
        &[1, 2],
        &[0, 3, 0, 23],
        &registry,
    );

    let codes: Vec<u16> = tlvs6(&buf[..len]).iter().map(|(c, _)| *c).collect();
    assert_eq!(codes, vec![1, 2, 3, 23]);
}

#[test]
fn test_store_options6_vsio() {
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

    let mut buf = vec![0u8; 512];
    let len = store_options6(
        &mut buf,
        &EvalContext::default(),
        &state,
        &[],
        &[0, 17],
        &registry,
    );

    let emitted = tlvs6(&buf[..len]);
    assert_eq!(emitted.len(), 1);
    let (code, payload) = &emitted[0];
    assert_eq!(*code, 17);
    // Enterprise number, then the inner TLV stream.
    assert_eq!(&payload[..4], &[0, 0, 1, 55]);
    assert_eq!(&payload[4..], &[0, 1, 0, 2, 0xbe, 0xef]);
}

#[test]
fn test_build_server_oro() {
    let mut registry = Registry::standard();
    let state = load_option_state(
        r#"
        vsio-enterprises = [311]

        [options.dhcp6]
        preference = { type = "u8", value = 10 }

        [options.vsio-311]
        "1" = { type = "hex", value = "beef" }
        "#,
        &mut registry,
    )
    .unwrap();

    let oro = options::build_server_oro(&state, &registry);
    let codes: Vec<u16> = oro
        .chunks_exact(2)
        .map(|p| u16::from_be_bytes([p[0], p[1]]))
        .collect();

    // The directly configured option plus the carrier of the configured
    // VSIO enterprise space.
    assert!(codes.contains(&7));
    assert!(codes.contains(&17));
}

#[test]
fn test_fqdn_wire_reassembly() {
    let registry = Registry::standard();
    let fqdn = registry.universe(options::FQDN);
    let mut state = OptionState::new(&registry);

    let set = |state: &mut OptionState, code: u32, data: &[u8]| {
        let option = registry.catalog().lookup_or_unknown(options::FQDN, code);
        state.save(fqdn, OptionCache::from_data(option, DataString::copied(data)));
    };
    set(&mut state, constants::fqdn::SERVER_UPDATE, &[1]);
    set(&mut state, constants::fqdn::FQDN, b"host.example.com");

    let mut out = ReplyBuffers::default();
    let params = AssembleParams {
        prl: Some(&[81]),
        ..Default::default()
    };
    let len = cons_options(&registry, None, None, &state, &mut out, &params);

    let emitted = tlvs(&out.options[4..len]);
    let wire = emitted.iter().find(|(code, _)| *code == 81).unwrap();
    // Flags: server-update; rcodes zero; ASCII name follows.
    assert_eq!(wire.1[0], 1);
    assert_eq!(&wire.1[3..], b"host.example.com");
}
