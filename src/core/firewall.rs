//! Typed firewall rule model
//!
//! [`FirewallRule`] is the Rust-side view of one native rule. Fields whose meaning depends on
//! each other in the native object are expressed as types here:
//!
//! - [`Protocol`] is a tagged union, so port fields only exist for TCP/UDP and ICMP type
//!   specifiers only exist for ICMP rules.
//! - [`ProfileSet`] is the profile bitmask, iterated in canonical order (Domain, Private, Public).
//!
//! # Example
//!
//! ```
//! use winfw::core::firewall::{Action, FirewallRule, Ports, Protocol};
//!
//! let rule = FirewallRule {
//!     protocol: Protocol::Tcp(Ports::local("2400-2450")),
//!     action: Action::Allow,
//!     interface_types: "LAN".to_string(),
//!     ..FirewallRule::named("PER_INTERFACETYPE_RULE")
//! };
//! assert_eq!(rule.protocol.number(), 6);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::IntoEnumIterator;

/// IANA protocol numbers and the native "any" sentinel
pub mod protocol_number {
    pub const ICMPV4: i32 = 1;
    pub const TCP: i32 = 6;
    pub const UDP: i32 = 17;
    pub const ICMPV6: i32 = 58;
    /// `NET_FW_IP_PROTOCOL_ANY`
    pub const ANY: i32 = 256;
}

/// Local and remote port specifiers in native syntax (e.g. `"80,443"`, `"2400-2450"`, `"RPC"`)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ports {
    #[serde(default)]
    pub local: String,
    #[serde(default)]
    pub remote: String,
}

impl Ports {
    pub fn new(local: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }

    pub fn local(local: impl Into<String>) -> Self {
        Self::new(local, String::new())
    }
}

/// Protocol selector together with the fields that only exist for that protocol
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Protocol {
    Tcp(Ports),
    Udp(Ports),
    Icmpv4 {
        #[serde(default)]
        icmp_types: String,
    },
    Icmpv6 {
        #[serde(default)]
        icmp_types: String,
    },
    #[default]
    Any,
    /// Any other IP protocol number; carries no protocol-specific fields
    Other { number: i32 },
}

impl Protocol {
    /// Builds a protocol from its number, keeping only the fields that number makes meaningful.
    pub fn from_parts(number: i32, icmp_types: String, ports: Ports) -> Self {
        match number {
            protocol_number::TCP => Protocol::Tcp(ports),
            protocol_number::UDP => Protocol::Udp(ports),
            protocol_number::ICMPV4 => Protocol::Icmpv4 { icmp_types },
            protocol_number::ICMPV6 => Protocol::Icmpv6 { icmp_types },
            protocol_number::ANY => Protocol::Any,
            number => Protocol::Other { number },
        }
    }

    /// Native protocol number
    pub const fn number(&self) -> i32 {
        match self {
            Protocol::Tcp(_) => protocol_number::TCP,
            Protocol::Udp(_) => protocol_number::UDP,
            Protocol::Icmpv4 { .. } => protocol_number::ICMPV4,
            Protocol::Icmpv6 { .. } => protocol_number::ICMPV6,
            Protocol::Any => protocol_number::ANY,
            Protocol::Other { number } => *number,
        }
    }

    /// Whether rules with this protocol number carry ports
    pub const fn carries_ports(number: i32) -> bool {
        matches!(number, protocol_number::TCP | protocol_number::UDP)
    }

    /// Whether rules with this protocol number carry ICMP type specifiers
    pub const fn carries_icmp(number: i32) -> bool {
        matches!(number, protocol_number::ICMPV4 | protocol_number::ICMPV6)
    }

    pub fn ports(&self) -> Option<&Ports> {
        match self {
            Protocol::Tcp(ports) | Protocol::Udp(ports) => Some(ports),
            _ => None,
        }
    }

    pub fn icmp_types(&self) -> Option<&str> {
        match self {
            Protocol::Icmpv4 { icmp_types } | Protocol::Icmpv6 { icmp_types } => Some(icmp_types),
            _ => None,
        }
    }

    /// Returns display name for rendering
    pub const fn display_name(&self) -> &'static str {
        match self {
            Protocol::Tcp(_) => "TCP",
            Protocol::Udp(_) => "UDP",
            Protocol::Icmpv4 { .. } => "ICMPv4",
            Protocol::Icmpv6 { .. } => "ICMPv6",
            Protocol::Any => "Any",
            Protocol::Other { .. } => "Other",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Other { number } => write!(f, "{number}"),
            other => f.write_str(other.display_name()),
        }
    }
}

/// Network-context category a rule applies to.
///
/// Declaration order is the canonical order used for the three profile fields of a record.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
    strum::IntoStaticStr,
)]
pub enum Profile {
    #[strum(serialize = "Domain")]
    Domain,
    #[strum(serialize = "Private")]
    Private,
    #[strum(serialize = "Public")]
    Public,
}

impl Profile {
    /// `NET_FW_PROFILE_TYPE2` bit
    pub const fn bit(self) -> i32 {
        match self {
            Profile::Domain => 0x1,
            Profile::Private => 0x2,
            Profile::Public => 0x4,
        }
    }
}

/// Set of profiles encoded as the native bitmask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Profile>", from = "Vec<Profile>")]
pub struct ProfileSet(i32);

impl ProfileSet {
    pub const EMPTY: ProfileSet = ProfileSet(0);
    pub const ALL: ProfileSet = ProfileSet(0x7);

    /// Keeps only the known profile bits; `NET_FW_PROFILE2_ALL` decodes to all three.
    pub const fn from_bits(mask: i32) -> Self {
        ProfileSet(mask & Self::ALL.0)
    }

    pub const fn bits(self) -> i32 {
        self.0
    }

    pub const fn contains(self, profile: Profile) -> bool {
        self.0 & profile.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn with(self, profile: Profile) -> Self {
        ProfileSet(self.0 | profile.bit())
    }

    #[must_use]
    pub const fn without(self, profile: Profile) -> Self {
        ProfileSet(self.0 & !profile.bit())
    }

    /// Members in canonical order
    pub fn iter(self) -> impl Iterator<Item = Profile> {
        Profile::iter().filter(move |p| self.contains(*p))
    }

    /// Profiles a newly added rule is assigned, given the currently active ones.
    ///
    /// Public is dropped when it is active alongside any other profile; it is kept only when
    /// it is the sole active profile.
    #[must_use]
    pub const fn for_new_rule(self) -> Self {
        if self.contains(Profile::Public) && self.0 != Profile::Public.bit() {
            self.without(Profile::Public)
        } else {
            self
        }
    }
}

impl FromIterator<Profile> for ProfileSet {
    fn from_iter<I: IntoIterator<Item = Profile>>(iter: I) -> Self {
        iter.into_iter().fold(ProfileSet::EMPTY, ProfileSet::with)
    }
}

impl From<Vec<Profile>> for ProfileSet {
    fn from(profiles: Vec<Profile>) -> Self {
        profiles.into_iter().collect()
    }
}

impl From<ProfileSet> for Vec<Profile> {
    fn from(set: ProfileSet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Display for ProfileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("None");
        }
        let names: Vec<&'static str> = self.iter().map(<&'static str>::from).collect();
        f.write_str(&names.join(", "))
    }
}

/// Traffic direction the rule applies to
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum Direction {
    #[default]
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "out")]
    Out,
    /// Direction the engine reported outside `NET_FW_RULE_DIRECTION`; left unset on add
    #[strum(serialize = "any")]
    Any,
}

impl Direction {
    /// `NET_FW_RULE_DIRECTION` value, `0` for [`Direction::Any`]
    pub const fn native(self) -> i32 {
        match self {
            Direction::In => 1,
            Direction::Out => 2,
            Direction::Any => 0,
        }
    }

    pub const fn from_native(value: i32) -> Option<Self> {
        match value {
            0 => Some(Direction::Any),
            1 => Some(Direction::In),
            2 => Some(Direction::Out),
            _ => None,
        }
    }
}

/// What happens to matching traffic
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum Action {
    #[default]
    #[strum(serialize = "block")]
    Block,
    #[strum(serialize = "allow")]
    Allow,
}

impl Action {
    /// `NET_FW_ACTION` value
    pub const fn native(self) -> i32 {
        match self {
            Action::Block => 0,
            Action::Allow => 1,
        }
    }

    pub const fn from_native(value: i32) -> Option<Self> {
        match value {
            0 => Some(Action::Block),
            1 => Some(Action::Allow),
            _ => None,
        }
    }

    /// How the engine reads a stored action: anything but `0` allows
    pub const fn from_native_lossy(value: i32) -> Self {
        if value == 0 { Action::Block } else { Action::Allow }
    }
}

/// Separator between interface names in the flat record's `interfaces` field
pub const INTERFACE_SEPARATOR: &str = ",";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirewallRule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Executable path the rule is scoped to
    #[serde(default)]
    pub application: String,
    /// Service short name the rule is scoped to
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub local_addresses: String,
    #[serde(default)]
    pub remote_addresses: String,
    #[serde(default)]
    pub profiles: ProfileSet,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub interface_types: String,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub grouping: String,
    #[serde(default)]
    pub edge_traversal: bool,
}

impl FirewallRule {
    /// Default rule with the given name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Interface list joined the way the flat record stores it
    pub fn interfaces_joined(&self) -> String {
        self.interfaces.join(INTERFACE_SEPARATOR)
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "name: {}", self.name)?;
        writeln!(f, "description: {}", self.description)?;
        writeln!(f, "application name: {}", self.application)?;
        writeln!(f, "service name: {}", self.service)?;
        writeln!(f, "protocol: {}", self.protocol)?;
        if let Some(icmp) = self.protocol.icmp_types() {
            writeln!(f, "icmp types: {icmp}")?;
        }
        if let Some(ports) = self.protocol.ports() {
            writeln!(f, "local ports: {}", ports.local)?;
            writeln!(f, "remote ports: {}", ports.remote)?;
        }
        writeln!(f, "local addresses: {}", self.local_addresses)?;
        writeln!(f, "remote addresses: {}", self.remote_addresses)?;
        writeln!(f, "profiles: {}", self.profiles)?;
        writeln!(f, "direction: {}", self.direction)?;
        writeln!(f, "action: {}", self.action)?;
        writeln!(f, "interface types: {}", self.interface_types)?;
        writeln!(f, "interfaces: {}", self.interfaces_joined())?;
        writeln!(f, "enabled: {}", self.enabled)?;
        writeln!(f, "grouping: {}", self.grouping)?;
        write!(f, "edge traversal: {}", self.edge_traversal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_iteration_is_canonical() {
        let set: ProfileSet = [Profile::Public, Profile::Domain].into_iter().collect();
        let order: Vec<Profile> = set.iter().collect();
        assert_eq!(order, vec![Profile::Domain, Profile::Public]);
    }

    #[test]
    fn test_all_profiles_mask_decodes_to_three() {
        let set = ProfileSet::from_bits(0x7FFF_FFFF);
        assert_eq!(set, ProfileSet::ALL);
        assert_eq!(set.to_string(), "Domain, Private, Public");
    }

    #[test]
    fn test_new_rule_drops_public_when_shared() {
        let active = ProfileSet::EMPTY.with(Profile::Private).with(Profile::Public);
        assert_eq!(
            active.for_new_rule(),
            ProfileSet::EMPTY.with(Profile::Private)
        );

        let all = ProfileSet::ALL;
        assert!(!all.for_new_rule().contains(Profile::Public));
        assert!(all.for_new_rule().contains(Profile::Domain));
    }

    #[test]
    fn test_new_rule_keeps_sole_public() {
        let active = ProfileSet::EMPTY.with(Profile::Public);
        assert_eq!(active.for_new_rule(), active);
    }

    #[test]
    fn test_new_rule_without_public_unchanged() {
        let active = ProfileSet::EMPTY.with(Profile::Domain);
        assert_eq!(active.for_new_rule(), active);
    }

    #[test]
    fn test_protocol_from_parts_keeps_relevant_fields() {
        let ports = Ports::new("80", "1024-65535");
        let tcp = Protocol::from_parts(6, "8:*".to_string(), ports.clone());
        assert_eq!(tcp, Protocol::Tcp(ports.clone()));
        assert!(tcp.icmp_types().is_none());

        let icmp = Protocol::from_parts(1, "8:*".to_string(), ports.clone());
        assert_eq!(icmp.icmp_types(), Some("8:*"));
        assert!(icmp.ports().is_none());

        let gre = Protocol::from_parts(47, "8:*".to_string(), ports);
        assert_eq!(gre, Protocol::Other { number: 47 });
        assert_eq!(gre.number(), 47);
    }

    #[test]
    fn test_direction_and_action_native_values() {
        assert_eq!(Direction::from_native(2), Some(Direction::Out));
        assert_eq!(Direction::from_native(0), Some(Direction::Any));
        assert_eq!(Direction::from_native(3), None);
        assert_eq!(Action::from_native(Action::Allow.native()), Some(Action::Allow));
        assert_eq!(Action::from_native(-1), None);
        assert_eq!(Action::from_native_lossy(-1), Action::Allow);
        assert_eq!(Action::from_native_lossy(0), Action::Block);
    }

    #[test]
    fn test_profile_set_display() {
        let set = ProfileSet::EMPTY.with(Profile::Private).with(Profile::Public);
        assert_eq!(set.to_string(), "Private, Public");
        assert_eq!(ProfileSet::EMPTY.to_string(), "None");
    }

    #[test]
    fn test_rule_json_shape() {
        let rule = FirewallRule {
            protocol: Protocol::Udp(Ports::local("53")),
            profiles: ProfileSet::EMPTY.with(Profile::Private),
            ..FirewallRule::named("dns")
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["protocol"]["kind"], "udp");
        assert_eq!(json["protocol"]["local"], "53");
        assert_eq!(json["profiles"][0], "Private");

        let back: FirewallRule = serde_json::from_value(json).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn test_display_hides_fields_of_other_protocols() {
        let rule = FirewallRule {
            protocol: Protocol::Icmpv4 {
                icmp_types: "8:*".to_string(),
            },
            ..FirewallRule::named("ping")
        };
        let text = rule.to_string();
        assert!(text.contains("icmp types: 8:*"));
        assert!(!text.contains("local ports"));
    }
}
