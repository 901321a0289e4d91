//! Integration tests for winfw
//!
//! These tests drive the public API end to end against the in-memory policy engine:
//! the two-phase listing protocol, add/list round trips, profile defaulting, truncation at the
//! record bound, partial enumeration failures and handle release on every path.
//!
//! ```bash
//! cargo test --test integration_tests
//! ```

#![allow(clippy::uninlined_format_args)]

use winfw::core::error::{NativeError, hresult};
use winfw::core::firewall::Ports;
use winfw::core::memory::MemoryEngine;
use winfw::core::native::{Attribute, FlagAttribute};
use winfw::core::record::{RECORD_SIZE, RECORD_VERSION, TEXT_FIELD_BYTES};
use winfw::{
    Action, Direction, Error, Firewall, FirewallRule, ListStatus, Profile, ProfileSet, Protocol,
    RuleRecord,
};

const DOMAIN: i32 = 0x1;
const PRIVATE: i32 = 0x2;
const PUBLIC: i32 = 0x4;

fn firewall() -> Firewall<MemoryEngine> {
    Firewall::new(MemoryEngine::new())
}

/// Rule shaped like the ones the Windows samples create
fn sample_rule(name: &str) -> FirewallRule {
    FirewallRule {
        description: "Allow incoming network traffic over port 2400 coming from LAN interface type"
            .to_string(),
        application: r"C:\Program Files\Sample\sample.exe".to_string(),
        protocol: Protocol::Tcp(Ports::local("2400-2450")),
        local_addresses: "LocalSubnet".to_string(),
        direction: Direction::In,
        action: Action::Allow,
        interface_types: "LAN".to_string(),
        enabled: true,
        grouping: "Sample Rule Group".to_string(),
        ..FirewallRule::named(name)
    }
}

fn list_records(fw: &Firewall<MemoryEngine>) -> Vec<RuleRecord> {
    let probe = fw.list_rules(None).unwrap();
    let mut buffer = vec![0u8; probe.required_size];
    let outcome = fw.list_rules(Some(buffer.as_mut_slice())).unwrap();
    assert_eq!(outcome.status, ListStatus::Ok);
    RuleRecord::read_many(&buffer, outcome.records_written).unwrap()
}

fn assert_released(fw: &Firewall<MemoryEngine>) {
    assert_eq!(fw.engine().open_handles(), 0, "native handles still open");
    assert_eq!(fw.engine().apartment_depth(), 0, "runtime left initialized");
}

#[test]
fn test_two_phase_listing() {
    let fw = firewall();
    for name in ["one", "two", "three"] {
        fw.add(&sample_rule(name)).unwrap();
    }

    let probe = fw.list_rules(None).unwrap();
    assert_eq!(probe.status, ListStatus::InsufficientBuffer);
    assert_eq!(probe.rule_count, 3);
    assert_eq!(probe.required_size, 3 * RECORD_SIZE);
    assert_eq!(probe.records_written, 0);

    let mut empty: [u8; 0] = [];
    let zero = fw.list_rules(Some(&mut empty[..])).unwrap();
    assert_eq!(zero.status, ListStatus::InsufficientBuffer);
    assert_eq!(zero.required_size, probe.required_size);

    let mut buffer = vec![0u8; probe.required_size];
    let filled = fw.list_rules(Some(buffer.as_mut_slice())).unwrap();
    assert_eq!(filled.status, ListStatus::Ok);
    assert_eq!(filled.records_written, 3);
    assert_eq!(filled.skipped, 0);

    let version = u32::from_le_bytes(buffer[..4].try_into().unwrap());
    assert_eq!(version, RECORD_VERSION);
    assert_released(&fw);
}

#[test]
fn test_oversized_buffer_is_accepted() {
    let fw = firewall();
    fw.add(&sample_rule("only")).unwrap();
    let mut buffer = vec![0u8; 4 * RECORD_SIZE];
    let outcome = fw.list_rules(Some(buffer.as_mut_slice())).unwrap();
    assert_eq!(outcome.status, ListStatus::Ok);
    assert_eq!(outcome.records_written, 1);
    assert!(buffer[RECORD_SIZE..].iter().all(|b| *b == 0));
}

#[test]
fn test_add_then_list_round_trip() {
    let fw = firewall();
    fw.engine().set_active_profiles(PRIVATE);
    let rule = FirewallRule {
        interfaces: vec!["Ethernet".to_string(), "Wi-Fi".to_string()],
        edge_traversal: true,
        ..sample_rule("PER_INTERFACETYPE_RULE")
    };
    fw.add_rule(&RuleRecord::from(&rule)).unwrap();

    let records = list_records(&fw);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.name, "PER_INTERFACETYPE_RULE");
    assert_eq!(record.protocol, 6);
    assert_eq!(record.local_ports, "2400-2450");
    assert_eq!(record.icmp_type, "");
    assert_eq!(record.profile1, "");
    assert_eq!(record.profile2, "Private");
    assert_eq!(record.profile3, "");
    assert_eq!(record.direction, 1);
    assert_eq!(record.action, 1);
    assert_eq!(record.interfaces, "Ethernet,Wi-Fi");
    assert!(record.enabled);
    assert!(record.edge_traversal);

    let typed = FirewallRule::try_from(record).unwrap();
    assert_eq!(
        typed,
        FirewallRule {
            profiles: ProfileSet::EMPTY.with(Profile::Private),
            ..rule
        }
    );
}

#[test]
fn test_icmp_rule_carries_no_ports() {
    let fw = firewall();
    let mut record = RuleRecord::from(&FirewallRule {
        protocol: Protocol::Icmpv6 {
            icmp_types: "128:*".to_string(),
        },
        ..FirewallRule::named("ping6")
    });
    // Ports supplied alongside an ICMP protocol are dropped, not sent to the engine
    record.local_ports = "80".to_string();
    fw.add_rule(&record).unwrap();

    let listed = &list_records(&fw)[0];
    assert_eq!(listed.protocol, 58);
    assert_eq!(listed.icmp_type, "128:*");
    assert_eq!(listed.local_ports, "");
}

#[test]
fn test_public_excluded_when_shared() {
    let fw = firewall();
    fw.engine().set_active_profiles(PRIVATE | PUBLIC);
    fw.add(&FirewallRule::named("shared")).unwrap();
    let rule = fw.find_rule("shared").unwrap().unwrap();
    assert_eq!(rule.profiles, ProfileSet::EMPTY.with(Profile::Private));

    fw.engine().set_active_profiles(DOMAIN | PRIVATE | PUBLIC);
    fw.add(&FirewallRule::named("all-active")).unwrap();
    let rule = fw.find_rule("all-active").unwrap().unwrap();
    assert!(!rule.profiles.contains(Profile::Public));
    assert!(rule.profiles.contains(Profile::Domain));
}

#[test]
fn test_public_kept_when_alone() {
    let fw = firewall();
    fw.engine().set_active_profiles(PUBLIC);
    fw.add(&FirewallRule::named("cafe")).unwrap();
    let record = &list_records(&fw)[0];
    assert_eq!(record.profile1, "");
    assert_eq!(record.profile2, "");
    assert_eq!(record.profile3, "Public");
}

#[test]
fn test_name_truncation_boundary() {
    let fw = firewall();
    let exact = "a".repeat(TEXT_FIELD_BYTES);
    let over = format!("{}b", "c".repeat(TEXT_FIELD_BYTES));

    let record = RuleRecord {
        name: over.clone(),
        ..RuleRecord::default()
    };
    assert_eq!(record.overflowing_fields(), ["name"]);

    fw.add_rule(&RuleRecord {
        name: exact.clone(),
        ..RuleRecord::default()
    })
    .unwrap();
    fw.add_rule(&record).unwrap();

    let names: Vec<_> = list_records(&fw).into_iter().map(|r| r.name).collect();
    assert_eq!(names[0], exact);
    assert_eq!(names[1], over[..TEXT_FIELD_BYTES]);
}

#[test]
fn test_partial_failure_tolerance() {
    let fw = firewall();
    fw.add(&sample_rule("before")).unwrap();
    fw.engine().insert_foreign_element();
    fw.add(&sample_rule("after")).unwrap();

    let probe = fw.list_rules(None).unwrap();
    assert_eq!(probe.rule_count, 3);
    let mut buffer = vec![0u8; probe.required_size];
    let outcome = fw.list_rules(Some(buffer.as_mut_slice())).unwrap();
    assert_eq!(outcome.status, ListStatus::Ok);
    assert_eq!(outcome.records_written, probe.rule_count - 1);
    assert_eq!(outcome.skipped, 1);

    let records = RuleRecord::read_many(&buffer, outcome.records_written).unwrap();
    for (record, name) in records.iter().zip(["before", "after"]) {
        let expected = RuleRecord::from(&FirewallRule {
            profiles: ProfileSet::from_bits(DOMAIN | PRIVATE),
            ..sample_rule(name)
        });
        assert_eq!(record, &expected);
    }
    assert_released(&fw);
}

#[test]
fn test_remove_missing_rule_leaves_others() {
    let fw = firewall();
    fw.add(&sample_rule("keep-1")).unwrap();
    fw.add(&sample_rule("keep-2")).unwrap();

    let err = fw.remove_rule("missing").unwrap_err();
    assert!(matches!(err, Error::RuleNotFoundOrRemoveFailed { ref name, .. } if name == "missing"));
    assert_eq!(err.native().unwrap().code, hresult::E_NOT_FOUND);
    assert_eq!(fw.engine().names(), ["keep-1", "keep-2"]);

    fw.remove_rule("keep-1").unwrap();
    assert_eq!(fw.engine().names(), ["keep-2"]);
    assert_released(&fw);
}

#[test]
fn test_remove_uses_exact_names() {
    let fw = firewall();
    fw.add(&sample_rule("Rule")).unwrap();
    assert!(fw.remove_rule("rule").is_err());
    assert!(fw.remove_rule("Rule ").is_err());
    assert_eq!(fw.rule_count().unwrap(), 1);
}

#[test]
fn test_add_failures_map_to_distinct_errors() {
    let fw = firewall();
    fw.engine()
        .fail_profile_query(NativeError::new(hresult::E_FAIL));
    assert!(matches!(
        fw.add(&sample_rule("a")),
        Err(Error::ProfileQueryFailed(_))
    ));
    assert_released(&fw);

    let fw = firewall();
    fw.engine()
        .fail_create_rule(NativeError::new(hresult::REGDB_E_CLASSNOTREG));
    assert!(matches!(
        fw.add(&sample_rule("a")),
        Err(Error::RuleConstructionFailed(_))
    ));
    assert_released(&fw);

    let fw = firewall();
    fw.engine()
        .fail_insert(NativeError::new(hresult::E_ACCESSDENIED));
    let err = fw.add(&sample_rule("a")).unwrap_err();
    assert!(matches!(err, Error::CollectionInsertFailed { .. }));
    assert!(err.translate().user_message.contains("permissions"));
    assert!(fw.engine().is_empty());
    assert_released(&fw);
}

#[test]
fn test_enable_disable_round_trip() {
    let fw = firewall();
    fw.add(&FirewallRule {
        enabled: false,
        ..sample_rule("toggle")
    })
    .unwrap();

    fw.set_rule_enabled("toggle", true).unwrap();
    assert!(list_records(&fw)[0].enabled);

    fw.engine().fail_attribute_writes(
        Attribute::Flag(FlagAttribute::Enabled),
        NativeError::new(hresult::E_ACCESSDENIED),
    );
    assert!(matches!(
        fw.set_rule_enabled("toggle", false),
        Err(Error::RuleUpdateFailed { .. })
    ));
    assert!(list_records(&fw)[0].enabled);
    assert_released(&fw);
}

#[test]
fn test_rules_json_output() {
    let fw = firewall();
    fw.add(&sample_rule("json")).unwrap();
    let listing = fw.rules().unwrap();
    let json = serde_json::to_value(&listing).unwrap();
    assert_eq!(json["reported_count"], 1);
    assert_eq!(json["rules"][0]["name"], "json");
    assert_eq!(json["rules"][0]["protocol"]["kind"], "tcp");
    assert_eq!(json["rules"][0]["profiles"][0], "Domain");
}

#[test]
fn test_record_bytes_survive_process_boundary() {
    let fw = firewall();
    fw.add(&sample_rule("wire")).unwrap();
    let probe = fw.list_rules(None).unwrap();
    let mut buffer = vec![0u8; probe.required_size];
    fw.list_rules(Some(buffer.as_mut_slice())).unwrap();

    // Another consumer re-reads the same bytes independently
    let copy = buffer.clone();
    let record = RuleRecord::read_from(&copy).unwrap();
    assert_eq!(record.name, "wire");

    let mut tampered = copy;
    tampered[..4].copy_from_slice(&2u32.to_le_bytes());
    assert!(matches!(
        RuleRecord::read_from(&tampered),
        Err(Error::RecordVersionMismatch { found: 2, .. })
    ));
}
