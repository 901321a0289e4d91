//! Shared test utilities for core module tests
//!
//! Provides common test helpers to avoid duplication across test suites.
//! This module is only compiled in test mode.

use crate::core::firewall::{Action, Direction, FirewallRule, Ports, ProfileSet, Protocol};
use crate::core::memory::MemoryEngine;
use crate::core::policy::Firewall;

/// Creates an enabled inbound TCP allow rule.
///
/// This is the canonical helper for creating test rules.
///
/// # Arguments
///
/// * `name` - The rule name
/// * `port` - Local port, or `None` for any port
pub fn create_test_rule(name: &str, port: Option<u16>) -> FirewallRule {
    FirewallRule {
        description: format!("{name} test rule"),
        protocol: Protocol::Tcp(Ports::local(
            port.map(|p| p.to_string()).unwrap_or_default(),
        )),
        direction: Direction::In,
        action: Action::Allow,
        enabled: true,
        ..FirewallRule::named(name)
    }
}

/// Creates a firewall over a fresh in-memory engine seeded with `rules` in order.
///
/// Seeded rules keep their own profile sets; rules added through the firewall get the
/// active profiles (Domain and Private unless changed).
pub fn firewall_with(rules: &[FirewallRule]) -> Firewall<MemoryEngine> {
    let engine = MemoryEngine::new();
    for rule in rules {
        engine.insert_rule(rule);
    }
    Firewall::new(engine)
}

/// Asserts that every handle and the runtime were released
pub fn assert_released(fw: &Firewall<MemoryEngine>) {
    assert_eq!(fw.engine().open_handles(), 0, "native handles still open");
    assert_eq!(fw.engine().apartment_depth(), 0, "runtime left initialized");
}

/// `rule` as it reads back after being added with the given active profiles
pub fn as_added(rule: &FirewallRule, active: i32) -> FirewallRule {
    FirewallRule {
        profiles: ProfileSet::from_bits(active).for_new_rule(),
        ..rule.clone()
    }
}
