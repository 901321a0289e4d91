//! Conversion between native rule objects and [`FirewallRule`]
//!
//! Decoding reads each attribute independently. A failed read leaves that field at its
//! default and the rest of the rule is still decoded. Encoding sets each attribute in turn;
//! individual set failures are logged and skipped, since the engine reports anything fatal
//! when the rule is inserted.

use crate::core::firewall::{Action, Direction, FirewallRule, Ports, ProfileSet, Protocol};
use crate::core::native::{Attribute, FlagAttribute, IntAttribute, NativeRule, TextAttribute};

fn read<T: Default>(attr: Attribute, result: Result<T, crate::core::error::NativeError>) -> T {
    result.unwrap_or_else(|e| {
        tracing::debug!("failed to read rule attribute {attr}: {e}");
        T::default()
    })
}

fn text(rule: &impl NativeRule, attr: TextAttribute) -> String {
    read(Attribute::Text(attr), rule.text(attr))
}

fn flag(rule: &impl NativeRule, attr: FlagAttribute) -> bool {
    read(Attribute::Flag(attr), rule.flag(attr))
}

fn int(rule: &impl NativeRule, attr: IntAttribute) -> Option<i32> {
    rule.int(attr)
        .map_err(|e| tracing::debug!("failed to read rule attribute {attr}: {e}"))
        .ok()
}

/// Decodes one native rule. Never fails; unreadable attributes keep their defaults.
pub fn decode(rule: &impl NativeRule) -> FirewallRule {
    // Ports and ICMP types are only read when the protocol says they exist
    let protocol = match int(rule, IntAttribute::Protocol) {
        Some(number) if Protocol::carries_ports(number) => Protocol::from_parts(
            number,
            String::new(),
            Ports::new(
                text(rule, TextAttribute::LocalPorts),
                text(rule, TextAttribute::RemotePorts),
            ),
        ),
        Some(number) if Protocol::carries_icmp(number) => Protocol::from_parts(
            number,
            text(rule, TextAttribute::IcmpTypesAndCodes),
            Ports::default(),
        ),
        Some(number) => Protocol::from_parts(number, String::new(), Ports::default()),
        None => Protocol::default(),
    };

    let direction = int(rule, IntAttribute::Direction)
        .map(|raw| {
            Direction::from_native(raw).unwrap_or_else(|| {
                tracing::debug!("unknown rule direction {raw}, reporting any");
                Direction::Any
            })
        })
        .unwrap_or_default();
    let action = int(rule, IntAttribute::Action)
        .map(Action::from_native_lossy)
        .unwrap_or_default();

    FirewallRule {
        name: text(rule, TextAttribute::Name),
        description: text(rule, TextAttribute::Description),
        application: text(rule, TextAttribute::ApplicationName),
        service: text(rule, TextAttribute::ServiceName),
        protocol,
        local_addresses: text(rule, TextAttribute::LocalAddresses),
        remote_addresses: text(rule, TextAttribute::RemoteAddresses),
        profiles: int(rule, IntAttribute::Profiles)
            .map(ProfileSet::from_bits)
            .unwrap_or_default(),
        direction,
        action,
        interface_types: text(rule, TextAttribute::InterfaceTypes),
        interfaces: read(Attribute::Interfaces, rule.interfaces()),
        enabled: flag(rule, FlagAttribute::Enabled),
        grouping: text(rule, TextAttribute::Grouping),
        edge_traversal: flag(rule, FlagAttribute::EdgeTraversal),
    }
}

fn write(attr: Attribute, result: Result<(), crate::core::error::NativeError>) {
    if let Err(e) = result {
        tracing::debug!("failed to set rule attribute {attr}: {e}");
    }
}

fn set_text(target: &impl NativeRule, attr: TextAttribute, value: &str) {
    write(Attribute::Text(attr), target.set_text(attr, value));
}

/// Writes `rule` into a fresh native object, assigning `profiles` as its profile set.
///
/// The rule's own profile set is not used; new rules follow the active profiles.
pub fn encode(rule: &FirewallRule, profiles: ProfileSet, target: &impl NativeRule) {
    set_text(target, TextAttribute::Name, &rule.name);
    set_text(target, TextAttribute::Description, &rule.description);
    set_text(target, TextAttribute::ApplicationName, &rule.application);
    set_text(target, TextAttribute::ServiceName, &rule.service);

    // Protocol goes first: the engine rejects ports or ICMP types for a protocol without them
    write(
        Attribute::Int(IntAttribute::Protocol),
        target.set_int(IntAttribute::Protocol, rule.protocol.number()),
    );
    if let Some(icmp) = rule.protocol.icmp_types() {
        set_text(target, TextAttribute::IcmpTypesAndCodes, icmp);
    }
    if let Some(ports) = rule.protocol.ports() {
        set_text(target, TextAttribute::LocalPorts, &ports.local);
        set_text(target, TextAttribute::RemotePorts, &ports.remote);
    }

    set_text(target, TextAttribute::LocalAddresses, &rule.local_addresses);
    set_text(target, TextAttribute::RemoteAddresses, &rule.remote_addresses);
    if rule.direction != Direction::Any {
        write(
            Attribute::Int(IntAttribute::Direction),
            target.set_int(IntAttribute::Direction, rule.direction.native()),
        );
    }
    write(
        Attribute::Int(IntAttribute::Action),
        target.set_int(IntAttribute::Action, rule.action.native()),
    );
    set_text(target, TextAttribute::InterfaceTypes, &rule.interface_types);
    if !rule.interfaces.is_empty() {
        write(Attribute::Interfaces, target.set_interfaces(&rule.interfaces));
    }
    write(
        Attribute::Flag(FlagAttribute::Enabled),
        target.set_flag(FlagAttribute::Enabled, rule.enabled),
    );
    set_text(target, TextAttribute::Grouping, &rule.grouping);
    write(
        Attribute::Int(IntAttribute::Profiles),
        target.set_int(IntAttribute::Profiles, profiles.bits()),
    );
    write(
        Attribute::Flag(FlagAttribute::EdgeTraversal),
        target.set_flag(FlagAttribute::EdgeTraversal, rule.edge_traversal),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{NativeError, hresult};
    use crate::core::firewall::Profile;
    use crate::core::memory::MemoryEngine;
    use crate::core::native::{PolicyEngine, PolicyHandle};

    fn fresh_rule(engine: &MemoryEngine) -> crate::core::memory::MemoryRule {
        engine.initialize().unwrap();
        engine.open_policy().unwrap().create_rule().unwrap()
    }

    #[test]
    fn test_encode_then_decode_tcp_rule() {
        let engine = MemoryEngine::new();
        let native = fresh_rule(&engine);
        let rule = FirewallRule {
            description: "web".to_string(),
            protocol: Protocol::Tcp(Ports::new("80,443", "")),
            direction: Direction::In,
            action: Action::Allow,
            interfaces: vec!["Ethernet".to_string()],
            enabled: true,
            ..FirewallRule::named("http")
        };
        let profiles = ProfileSet::EMPTY.with(Profile::Domain);
        encode(&rule, profiles, &native);

        let decoded = decode(&native);
        assert_eq!(decoded, FirewallRule { profiles, ..rule });
    }

    #[test]
    fn test_decode_icmp_rule_skips_ports() {
        let engine = MemoryEngine::new();
        let native = fresh_rule(&engine);
        native.set_int(IntAttribute::Protocol, 6).unwrap();
        native.set_text(TextAttribute::LocalPorts, "22").unwrap();
        // Ports left over from the previous protocol must not leak into the decoded rule
        native.set_int(IntAttribute::Protocol, 58).unwrap();
        native.set_text(TextAttribute::IcmpTypesAndCodes, "128:*").unwrap();

        let decoded = decode(&native);
        assert_eq!(
            decoded.protocol,
            Protocol::Icmpv6 {
                icmp_types: "128:*".to_string()
            }
        );
    }

    #[test]
    fn test_failed_attribute_read_keeps_default() {
        let engine = MemoryEngine::new();
        let native = fresh_rule(&engine);
        native.set_text(TextAttribute::Name, "partial").unwrap();
        native.set_text(TextAttribute::Description, "hidden").unwrap();
        native.set_flag(FlagAttribute::Enabled, true).unwrap();
        engine.fail_attribute_reads(
            Attribute::Text(TextAttribute::Description),
            NativeError::new(hresult::E_FAIL),
        );

        let decoded = decode(&native);
        assert_eq!(decoded.name, "partial");
        assert_eq!(decoded.description, "");
        assert!(decoded.enabled);
    }

    #[test]
    fn test_failed_protocol_read_defaults_to_any() {
        let engine = MemoryEngine::new();
        let native = fresh_rule(&engine);
        native.set_int(IntAttribute::Protocol, 6).unwrap();
        native.set_text(TextAttribute::LocalPorts, "80").unwrap();
        engine.fail_attribute_reads(
            Attribute::Int(IntAttribute::Protocol),
            NativeError::new(hresult::E_FAIL),
        );

        assert_eq!(decode(&native).protocol, Protocol::Any);
    }

    #[test]
    fn test_unknown_direction_reports_any() {
        let engine = MemoryEngine::new();
        let native = fresh_rule(&engine);
        native.set_int(IntAttribute::Direction, 3).unwrap();
        assert_eq!(decode(&native).direction, Direction::Any);
    }

    #[test]
    fn test_nonzero_action_decodes_as_allow() {
        let engine = MemoryEngine::new();
        let native = fresh_rule(&engine);
        native.set_int(IntAttribute::Action, 5).unwrap();
        assert_eq!(decode(&native).action, Action::Allow);
        native.set_int(IntAttribute::Action, 0).unwrap();
        assert_eq!(decode(&native).action, Action::Block);
    }

    #[test]
    fn test_any_direction_leaves_native_default() {
        let engine = MemoryEngine::new();
        let native = fresh_rule(&engine);
        let rule = FirewallRule {
            direction: Direction::Any,
            ..FirewallRule::named("any")
        };
        encode(&rule, ProfileSet::ALL, &native);
        assert_eq!(native.int(IntAttribute::Direction).unwrap(), 1);
    }

    #[test]
    fn test_encode_ignores_rule_profiles() {
        let engine = MemoryEngine::new();
        let native = fresh_rule(&engine);
        let rule = FirewallRule {
            profiles: ProfileSet::ALL,
            ..FirewallRule::named("p")
        };
        encode(&rule, ProfileSet::EMPTY.with(Profile::Private), &native);
        assert_eq!(native.int(IntAttribute::Profiles).unwrap(), 0x2);
    }
}
