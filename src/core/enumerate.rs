//! Collection enumeration
//!
//! [`Firewall::list_rules`] implements the two-phase buffer protocol: a probe that reports the
//! size a caller must allocate, then a fill that writes one [`RuleRecord`] per rule. Between
//! the two calls the collection may change; nothing here locks it. [`Firewall::rules`] is the
//! same walk returning owned rules without any pre-sizing.

use crate::core::codec;
use crate::core::error::{Error, Result};
use crate::core::firewall::FirewallRule;
use crate::core::native::{PolicyEngine, RuleCollection};
use crate::core::policy::Firewall;
use crate::core::record::{RECORD_SIZE, RuleRecord};
use crate::core::scope::EnvironmentScope;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ListStatus {
    Ok,
    /// Nothing was written; retry with at least `required_size` bytes
    InsufficientBuffer,
}

/// Result of one [`Firewall::list_rules`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListOutcome {
    pub status: ListStatus,
    /// `rule_count * RECORD_SIZE`
    pub required_size: usize,
    /// Count reported by the collection when the call started
    pub rule_count: usize,
    pub records_written: usize,
    /// Elements walked but not written: unconvertible, or beyond the buffer
    pub skipped: usize,
}

impl ListOutcome {
    fn probe(rule_count: usize) -> Self {
        Self {
            status: ListStatus::InsufficientBuffer,
            required_size: rule_count * RECORD_SIZE,
            rule_count,
            records_written: 0,
            skipped: 0,
        }
    }
}

/// Rules decoded by one walk of the collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Enumeration {
    pub rules: Vec<FirewallRule>,
    pub reported_count: usize,
    pub skipped: usize,
}

impl<E: PolicyEngine> Firewall<E> {
    /// Number of rules in the live collection
    pub fn rule_count(&self) -> Result<usize> {
        let scope = EnvironmentScope::acquire(self.engine())?;
        let (_policy, rules) = scope.open_rules()?;
        let count = rules.count().map_err(Error::PolicyUnavailable)?;
        tracing::debug!("rule_count: {count}");
        Ok(count)
    }

    /// Two-phase listing into a caller buffer.
    ///
    /// With `None`, or a buffer shorter than `rule_count * RECORD_SIZE`, only the probe runs
    /// and the status is [`ListStatus::InsufficientBuffer`]. Otherwise records are written
    /// back to back in collection order.
    pub fn list_rules(&self, buffer: Option<&mut [u8]>) -> Result<ListOutcome> {
        let scope = EnvironmentScope::acquire(self.engine())?;
        let (_policy, rules) = scope.open_rules()?;
        let rule_count = rules.count().map_err(Error::PolicyUnavailable)?;
        let probe = ListOutcome::probe(rule_count);

        let Some(buffer) = buffer.filter(|b| b.len() >= probe.required_size) else {
            tracing::debug!(
                "list_rules: probe, {rule_count} rules need {} bytes",
                probe.required_size
            );
            return Ok(probe);
        };

        let slots = buffer.len() / RECORD_SIZE;
        let mut written = 0;
        let mut skipped = 0;
        for (index, element) in rules.cursor().map_err(Error::PolicyUnavailable)?.enumerate() {
            let native = match element {
                Ok(native) => native,
                Err(e) => {
                    tracing::warn!("skipping collection element {index}: {e}");
                    skipped += 1;
                    continue;
                }
            };
            if written == slots {
                tracing::warn!("skipping collection element {index}: buffer holds {slots} records");
                skipped += 1;
                continue;
            }
            let record = RuleRecord::from(&codec::decode(&native));
            record.write_to(&mut buffer[written * RECORD_SIZE..])?;
            written += 1;
        }

        tracing::debug!("list_rules: wrote {written} of {rule_count} rules, skipped {skipped}");
        Ok(ListOutcome {
            status: ListStatus::Ok,
            records_written: written,
            skipped,
            ..probe
        })
    }

    /// Decodes every rule in collection order
    pub fn rules(&self) -> Result<Enumeration> {
        let scope = EnvironmentScope::acquire(self.engine())?;
        let (_policy, rules) = scope.open_rules()?;
        let reported_count = rules.count().map_err(Error::PolicyUnavailable)?;

        let mut out = Enumeration {
            rules: Vec::with_capacity(reported_count),
            reported_count,
            skipped: 0,
        };
        for (index, element) in rules.cursor().map_err(Error::PolicyUnavailable)?.enumerate() {
            match element {
                Ok(native) => out.rules.push(codec::decode(&native)),
                Err(e) => {
                    tracing::warn!("skipping collection element {index}: {e}");
                    out.skipped += 1;
                }
            }
        }

        tracing::debug!(
            "rules: decoded {} of {reported_count}, skipped {}",
            out.rules.len(),
            out.skipped
        );
        Ok(out)
    }

    /// Looks up one rule by exact name. A failed lookup is reported as `None`.
    pub fn find_rule(&self, name: &str) -> Result<Option<FirewallRule>> {
        let scope = EnvironmentScope::acquire(self.engine())?;
        let (_policy, rules) = scope.open_rules()?;
        match rules.item(name) {
            Ok(native) => Ok(Some(codec::decode(&native))),
            Err(e) => {
                tracing::debug!("find_rule '{name}': {e}");
                Ok(None)
            }
        }
    }
}
