//! winfw - Windows Firewall rule access
//!
//! Enumerates, creates and deletes rules of the host firewall policy, and carries them across
//! a byte boundary in a fixed-size, versioned record.
//!
//! # Architecture
//!
//! - [`core`] - Rule model, record format, native engine access and the [`Firewall`] entry point
//! - [`audit`] - JSON-lines audit trail of rule changes
//! - [`config`] - Configuration persistence
//! - [`utils`] - Utility functions (platform directories, bounded strings)
//!
//! # Example
//!
//! ```
//! use winfw::core::memory::MemoryEngine;
//! use winfw::core::record::RECORD_SIZE;
//! use winfw::{Firewall, FirewallRule, ListStatus};
//!
//! let fw = Firewall::new(MemoryEngine::new());
//! fw.add(&FirewallRule::named("example")).unwrap();
//!
//! let probe = fw.list_rules(None).unwrap();
//! assert_eq!(probe.status, ListStatus::InsufficientBuffer);
//!
//! let mut buffer = vec![0; probe.required_size];
//! let filled = fw.list_rules(Some(&mut buffer[..])).unwrap();
//! assert_eq!(filled.records_written, 1);
//! assert_eq!(buffer.len(), RECORD_SIZE);
//! ```

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod utils;

// Re-export commonly used types
pub use core::enumerate::{Enumeration, ListOutcome, ListStatus};
pub use core::error::{Error, Result};
pub use core::firewall::{Action, Direction, FirewallRule, Profile, ProfileSet, Protocol};
pub use core::policy::Firewall;
pub use core::record::RuleRecord;
