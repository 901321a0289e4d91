//! Flat, fixed-size rule record
//!
//! [`RuleRecord`] is the boundary form of a rule: every attribute is either a bounded UTF-8
//! text slot or a fixed-width integer, so a caller can pre-allocate storage for `n` rules as
//! `n * RECORD_SIZE` bytes without knowing anything about the native object model.
//!
//! # Layout (schema v1, little-endian)
//!
//! ```text
//! u32   version
//! text  name, description, app_name, service_name
//! i32   protocol
//! text  icmp_type, local_ports, remote_ports, local_addresses, remote_addresses,
//!       profile1, profile2, profile3
//! i32   direction, action
//! text  interface_types, interfaces
//! i32   enabled
//! text  grouping
//! i32   edge_traversal
//! ```
//!
//! Each text slot is [`TEXT_FIELD_BYTES`] bytes, zero-padded. A value ends at its first NUL byte
//! or at the end of the slot. Longer values are truncated at the last whole character that fits.

use crate::core::error::{Error, Result};
use crate::core::firewall::{
    Action, Direction, FirewallRule, INTERFACE_SEPARATOR, Ports, Profile, ProfileSet, Protocol,
};
use crate::utils::truncate_utf8;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::IntoEnumIterator;

/// Schema version written at the start of every record
pub const RECORD_VERSION: u32 = 1;

/// Byte budget of one text slot
pub const TEXT_FIELD_BYTES: usize = 1024;

const TEXT_FIELDS: usize = 15;
const INT_FIELDS: usize = 5;

/// Size in bytes of one serialized record
pub const RECORD_SIZE: usize = 4 + TEXT_FIELDS * TEXT_FIELD_BYTES + INT_FIELDS * 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub name: String,
    pub description: String,
    pub app_name: String,
    pub service_name: String,
    pub protocol: i32,
    pub icmp_type: String,
    pub local_ports: String,
    pub remote_ports: String,
    pub local_addresses: String,
    pub remote_addresses: String,
    pub profile1: String,
    pub profile2: String,
    pub profile3: String,
    pub direction: i32,
    pub action: i32,
    pub interface_types: String,
    pub interfaces: String,
    pub enabled: bool,
    pub grouping: String,
    pub edge_traversal: bool,
}

impl Default for RuleRecord {
    fn default() -> Self {
        RuleRecord::from(&FirewallRule::default())
    }
}

impl RuleRecord {
    /// Text attributes with their field names, in layout order
    pub fn text_fields(&self) -> [(&'static str, &str); TEXT_FIELDS] {
        [
            ("name", &self.name),
            ("description", &self.description),
            ("app_name", &self.app_name),
            ("service_name", &self.service_name),
            ("icmp_type", &self.icmp_type),
            ("local_ports", &self.local_ports),
            ("remote_ports", &self.remote_ports),
            ("local_addresses", &self.local_addresses),
            ("remote_addresses", &self.remote_addresses),
            ("profile1", &self.profile1),
            ("profile2", &self.profile2),
            ("profile3", &self.profile3),
            ("interface_types", &self.interface_types),
            ("interfaces", &self.interfaces),
            ("grouping", &self.grouping),
        ]
    }

    fn text_fields_mut(&mut self) -> [&mut String; TEXT_FIELDS] {
        [
            &mut self.name,
            &mut self.description,
            &mut self.app_name,
            &mut self.service_name,
            &mut self.icmp_type,
            &mut self.local_ports,
            &mut self.remote_ports,
            &mut self.local_addresses,
            &mut self.remote_addresses,
            &mut self.profile1,
            &mut self.profile2,
            &mut self.profile3,
            &mut self.interface_types,
            &mut self.interfaces,
            &mut self.grouping,
        ]
    }

    /// Names of text fields longer than [`TEXT_FIELD_BYTES`] that encoding would truncate
    pub fn overflowing_fields(&self) -> Vec<&'static str> {
        self.text_fields()
            .into_iter()
            .filter(|(_, value)| value.len() > TEXT_FIELD_BYTES)
            .map(|(name, _)| name)
            .collect()
    }

    /// Returns a copy with every text field cut to its slot size
    #[must_use]
    pub fn truncated(&self) -> Self {
        let mut out = self.clone();
        for field in out.text_fields_mut() {
            let keep = truncate_utf8(field, TEXT_FIELD_BYTES).len();
            field.truncate(keep);
        }
        out
    }

    /// Serializes into the first [`RECORD_SIZE`] bytes of `out`
    pub fn write_to(&self, out: &mut [u8]) -> Result<()> {
        if out.len() < RECORD_SIZE {
            return Err(Error::RecordBufferTooSmall {
                required: RECORD_SIZE,
                available: out.len(),
            });
        }
        let mut w = SlotWriter {
            buf: &mut out[..RECORD_SIZE],
            pos: 0,
        };
        w.int(RECORD_VERSION as i32);
        w.text(&self.name);
        w.text(&self.description);
        w.text(&self.app_name);
        w.text(&self.service_name);
        w.int(self.protocol);
        w.text(&self.icmp_type);
        w.text(&self.local_ports);
        w.text(&self.remote_ports);
        w.text(&self.local_addresses);
        w.text(&self.remote_addresses);
        w.text(&self.profile1);
        w.text(&self.profile2);
        w.text(&self.profile3);
        w.int(self.direction);
        w.int(self.action);
        w.text(&self.interface_types);
        w.text(&self.interfaces);
        w.int(i32::from(self.enabled));
        w.text(&self.grouping);
        w.int(i32::from(self.edge_traversal));
        debug_assert_eq!(w.pos, RECORD_SIZE);
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; RECORD_SIZE];
        // Cannot fail: the buffer is exactly one record long
        let _ = self.write_to(&mut out);
        out
    }

    /// Deserializes one record from the first [`RECORD_SIZE`] bytes of `bytes`
    pub fn read_from(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RECORD_SIZE {
            return Err(Error::RecordBufferTooSmall {
                required: RECORD_SIZE,
                available: bytes.len(),
            });
        }
        let mut r = SlotReader { buf: bytes, pos: 0 };
        let version = r.int() as u32;
        if version != RECORD_VERSION {
            return Err(Error::RecordVersionMismatch {
                found: version,
                expected: RECORD_VERSION,
            });
        }
        Ok(RuleRecord {
            name: r.text(),
            description: r.text(),
            app_name: r.text(),
            service_name: r.text(),
            protocol: r.int(),
            icmp_type: r.text(),
            local_ports: r.text(),
            remote_ports: r.text(),
            local_addresses: r.text(),
            remote_addresses: r.text(),
            profile1: r.text(),
            profile2: r.text(),
            profile3: r.text(),
            direction: r.int(),
            action: r.int(),
            interface_types: r.text(),
            interfaces: r.text(),
            enabled: r.int() != 0,
            grouping: r.text(),
            edge_traversal: r.int() != 0,
        })
    }

    /// Reads `count` consecutive records from a buffer filled by `list_rules`
    pub fn read_many(bytes: &[u8], count: usize) -> Result<Vec<Self>> {
        (0..count)
            .map(|i| {
                let start = i * RECORD_SIZE;
                RuleRecord::read_from(bytes.get(start..).unwrap_or_default())
            })
            .collect()
    }
}

struct SlotWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl SlotWriter<'_> {
    fn text(&mut self, value: &str) {
        let slot = &mut self.buf[self.pos..self.pos + TEXT_FIELD_BYTES];
        slot.fill(0);
        let value = truncate_utf8(value, TEXT_FIELD_BYTES);
        slot[..value.len()].copy_from_slice(value.as_bytes());
        self.pos += TEXT_FIELD_BYTES;
    }

    fn int(&mut self, value: i32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&value.to_le_bytes());
        self.pos += 4;
    }
}

struct SlotReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl SlotReader<'_> {
    fn text(&mut self) -> String {
        let slot = &self.buf[self.pos..self.pos + TEXT_FIELD_BYTES];
        self.pos += TEXT_FIELD_BYTES;
        let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
        String::from_utf8_lossy(&slot[..end]).into_owned()
    }

    fn int(&mut self) -> i32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        i32::from_le_bytes(bytes)
    }
}

impl From<&FirewallRule> for RuleRecord {
    fn from(rule: &FirewallRule) -> Self {
        let bounded = |s: &str| truncate_utf8(s, TEXT_FIELD_BYTES).to_string();
        let mut profiles = Profile::iter().map(|p| {
            if rule.profiles.contains(p) {
                p.to_string()
            } else {
                String::new()
            }
        });
        let (local_ports, remote_ports) = rule
            .protocol
            .ports()
            .map(|p| (bounded(&p.local), bounded(&p.remote)))
            .unwrap_or_default();

        RuleRecord {
            name: bounded(&rule.name),
            description: bounded(&rule.description),
            app_name: bounded(&rule.application),
            service_name: bounded(&rule.service),
            protocol: rule.protocol.number(),
            icmp_type: rule.protocol.icmp_types().map(bounded).unwrap_or_default(),
            local_ports,
            remote_ports,
            local_addresses: bounded(&rule.local_addresses),
            remote_addresses: bounded(&rule.remote_addresses),
            profile1: profiles.next().unwrap_or_default(),
            profile2: profiles.next().unwrap_or_default(),
            profile3: profiles.next().unwrap_or_default(),
            direction: rule.direction.native(),
            action: rule.action.native(),
            interface_types: bounded(&rule.interface_types),
            interfaces: bounded(&rule.interfaces_joined()),
            enabled: rule.enabled,
            grouping: bounded(&rule.grouping),
            edge_traversal: rule.edge_traversal,
        }
    }
}

impl TryFrom<&RuleRecord> for FirewallRule {
    type Error = Error;

    fn try_from(record: &RuleRecord) -> Result<Self> {
        let direction = Direction::from_native(record.direction).ok_or(Error::InvalidRecord {
            field: "direction",
            value: record.direction,
        })?;
        let action = Action::from_native(record.action).ok_or(Error::InvalidRecord {
            field: "action",
            value: record.action,
        })?;
        // Slots are matched by name, so a caller placing "Public" in profile1 still works
        let profiles: ProfileSet = [&record.profile1, &record.profile2, &record.profile3]
            .into_iter()
            .filter_map(|slot| Profile::from_str(slot.trim()).ok())
            .collect();

        Ok(FirewallRule {
            name: record.name.clone(),
            description: record.description.clone(),
            application: record.app_name.clone(),
            service: record.service_name.clone(),
            protocol: Protocol::from_parts(
                record.protocol,
                record.icmp_type.clone(),
                Ports::new(record.local_ports.clone(), record.remote_ports.clone()),
            ),
            local_addresses: record.local_addresses.clone(),
            remote_addresses: record.remote_addresses.clone(),
            profiles,
            direction,
            action,
            interface_types: record.interface_types.clone(),
            interfaces: split_interfaces(&record.interfaces),
            enabled: record.enabled,
            grouping: record.grouping.clone(),
            edge_traversal: record.edge_traversal,
        })
    }
}

/// Inverse of [`FirewallRule::interfaces_joined`]: names are kept byte for byte
fn split_interfaces(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        return Vec::new();
    }
    joined.split(INTERFACE_SEPARATOR).map(String::from).collect()
}
