//! Core firewall rule access
//!
//! This module contains the rule model and the marshalling between it and the native policy
//! engine. It provides:
//!
//! - [`firewall`]: Typed rule model (protocol, profiles, direction, action)
//! - [`record`]: Fixed-size, versioned flat record for crossing a byte boundary
//! - [`native`]: Traits the policy engine is accessed through
//! - [`scope`]: Scoped runtime initialization
//! - [`codec`]: Native rule object to and from [`firewall::FirewallRule`]
//! - [`enumerate`]: Two-phase listing, lookup and count
//! - [`mutate`]: Add, remove, enable and disable
//! - [`policy`]: The [`policy::Firewall`] entry point
//! - [`memory`]: In-memory engine for tests and non-Windows hosts
//! - [`error`]: Error types for firewall operations

pub mod codec;
pub mod enumerate;
pub mod error;
pub mod firewall;
pub mod memory;
pub mod mutate;
pub mod native;
pub mod policy;
pub mod record;
pub mod scope;
#[cfg(windows)]
pub mod windows;

#[cfg(test)]
pub mod test_helpers;
