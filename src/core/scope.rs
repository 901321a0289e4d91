//! Scoped acquisition of the native runtime and the policy handle

use crate::core::error::{Error, Result};
use crate::core::native::{Apartment, PolicyEngine, PolicyHandle};

/// Guard over per-thread runtime initialization.
///
/// Releases the runtime on drop only when this scope initialized it. Handles obtained inside
/// the scope must be dropped first; declare them after the scope so reverse drop order holds.
#[must_use = "the runtime is released as soon as the scope is dropped"]
pub struct EnvironmentScope<'e, E: PolicyEngine> {
    engine: &'e E,
    apartment: Apartment,
}

impl<'e, E: PolicyEngine> EnvironmentScope<'e, E> {
    pub fn acquire(engine: &'e E) -> Result<Self> {
        let apartment = engine.initialize().map_err(|e| {
            tracing::debug!("runtime initialization failed: {e}");
            Error::EnvironmentInit(e)
        })?;
        if apartment == Apartment::Borrowed {
            tracing::trace!("runtime already initialized by caller, borrowing it");
        }
        Ok(Self { engine, apartment })
    }

    pub fn apartment(&self) -> Apartment {
        self.apartment
    }

    /// Opens the policy singleton, valid for the lifetime of this scope
    pub fn open_policy(&self) -> Result<E::Policy> {
        self.engine
            .open_policy()
            .map_err(Error::PolicyUnavailable)
    }

    /// Opens the policy and its live rule collection
    pub fn open_rules(
        &self,
    ) -> Result<(E::Policy, <E::Policy as PolicyHandle>::Rules)> {
        let policy = self.open_policy()?;
        let rules = policy.rules().map_err(Error::PolicyUnavailable)?;
        Ok((policy, rules))
    }
}

impl<E: PolicyEngine> Drop for EnvironmentScope<'_, E> {
    fn drop(&mut self) {
        if self.apartment == Apartment::Entered {
            self.engine.uninitialize();
        }
    }
}
