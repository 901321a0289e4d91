//! Entry point over a policy engine
//!
//! [`Firewall`] owns one [`PolicyEngine`] and exposes the public operations. Each operation
//! acquires its own [`EnvironmentScope`](crate::core::scope::EnvironmentScope) and policy handle
//! and releases both before returning, so no native state outlives a call.
//!
//! Enumeration lives in [`enumerate`](crate::core::enumerate), mutation in
//! [`mutate`](crate::core::mutate).

use crate::core::native::PolicyEngine;

pub struct Firewall<E: PolicyEngine> {
    engine: E,
}

impl<E: PolicyEngine> Firewall<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

#[cfg(windows)]
impl Firewall<crate::core::windows::WindowsEngine> {
    /// Firewall backed by the Windows Firewall policy of this host
    pub fn system() -> Self {
        Self::new(crate::core::windows::WindowsEngine)
    }
}

impl<E: PolicyEngine + Default> Default for Firewall<E> {
    fn default() -> Self {
        Self::new(E::default())
    }
}
