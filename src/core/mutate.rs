//! Single-rule mutations against the live collection

use crate::core::codec;
use crate::core::error::{Error, Result};
use crate::core::firewall::{FirewallRule, ProfileSet};
use crate::core::native::{FlagAttribute, NativeRule, PolicyEngine, PolicyHandle, RuleCollection};
use crate::core::policy::Firewall;
use crate::core::record::RuleRecord;
use crate::core::scope::EnvironmentScope;

impl<E: PolicyEngine> Firewall<E> {
    /// Adds a rule given as a flat record.
    ///
    /// Text fields are cut to their slot size first, so the inserted rule matches what a later
    /// [`list_rules`](Self::list_rules) returns. The record's profile slots are ignored.
    pub fn add_rule(&self, record: &RuleRecord) -> Result<()> {
        let rule = FirewallRule::try_from(&record.truncated())?;
        self.add(&rule)
    }

    /// Adds a rule scoped to the currently active profiles.
    ///
    /// When Public is active together with another profile, the new rule is not applied to
    /// Public. `rule.profiles` is ignored.
    pub fn add(&self, rule: &FirewallRule) -> Result<()> {
        let scope = EnvironmentScope::acquire(self.engine())?;
        let (policy, rules) = scope.open_rules()?;
        let active = policy
            .current_profile_types()
            .map_err(Error::ProfileQueryFailed)?;
        let profiles = ProfileSet::from_bits(active).for_new_rule();

        let native = policy
            .create_rule()
            .map_err(Error::RuleConstructionFailed)?;
        codec::encode(rule, profiles, &native);

        match rules.add(&native) {
            Ok(()) => {
                tracing::debug!("add_rule '{}': inserted for {profiles}", rule.name);
                Ok(())
            }
            Err(source) => {
                tracing::debug!("add_rule '{}': rejected: {source}", rule.name);
                Err(Error::CollectionInsertFailed {
                    name: rule.name.clone(),
                    source,
                })
            }
        }
    }

    /// Removes the first rule whose name matches exactly
    pub fn remove_rule(&self, name: &str) -> Result<()> {
        let scope = EnvironmentScope::acquire(self.engine())?;
        let (_policy, rules) = scope.open_rules()?;
        rules.remove(name).map_err(|source| {
            tracing::debug!("remove_rule '{name}': {source}");
            Error::RuleNotFoundOrRemoveFailed {
                name: name.to_string(),
                source,
            }
        })?;
        tracing::debug!("remove_rule '{name}': removed");
        Ok(())
    }

    /// Enables or disables an existing rule in place
    pub fn set_rule_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let scope = EnvironmentScope::acquire(self.engine())?;
        let (_policy, rules) = scope.open_rules()?;
        let native = rules
            .item(name)
            .map_err(|source| Error::RuleNotFoundOrRemoveFailed {
                name: name.to_string(),
                source,
            })?;
        native
            .set_flag(FlagAttribute::Enabled, enabled)
            .map_err(|source| Error::RuleUpdateFailed {
                name: name.to_string(),
                source,
            })?;
        tracing::debug!("set_rule_enabled '{name}': {enabled}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{NativeError, hresult};
    use crate::core::firewall::{Ports, Profile, Protocol};
    use crate::core::memory::MemoryEngine;
    use crate::core::native::Attribute;

    fn firewall() -> Firewall<MemoryEngine> {
        Firewall::new(MemoryEngine::new())
    }

    #[test]
    fn test_add_uses_active_profiles() {
        let fw = firewall();
        fw.engine().set_active_profiles(Profile::Domain.bit());
        fw.add(&FirewallRule {
            profiles: ProfileSet::ALL,
            ..FirewallRule::named("scoped")
        })
        .unwrap();
        let stored = fw.find_rule("scoped").unwrap().unwrap();
        assert_eq!(stored.profiles, ProfileSet::EMPTY.with(Profile::Domain));
    }

    #[test]
    fn test_add_drops_shared_public_profile() {
        let fw = firewall();
        fw.engine().set_active_profiles(0x2 | 0x4);
        fw.add(&FirewallRule::named("private-only")).unwrap();
        let stored = fw.find_rule("private-only").unwrap().unwrap();
        assert_eq!(stored.profiles, ProfileSet::EMPTY.with(Profile::Private));
    }

    #[test]
    fn test_add_rule_from_record() {
        let fw = firewall();
        let record = RuleRecord::from(&FirewallRule {
            protocol: Protocol::Udp(Ports::local("53")),
            ..FirewallRule::named("dns")
        });
        fw.add_rule(&record).unwrap();
        let stored = fw.find_rule("dns").unwrap().unwrap();
        assert_eq!(stored.protocol, Protocol::Udp(Ports::local("53")));
    }

    #[test]
    fn test_add_rule_rejects_invalid_action() {
        let fw = firewall();
        let record = RuleRecord {
            action: 7,
            ..RuleRecord::from(&FirewallRule::named("bad"))
        };
        assert!(matches!(
            fw.add_rule(&record),
            Err(Error::InvalidRecord { field: "action", value: 7 })
        ));
        assert!(fw.engine().is_empty());
    }

    #[test]
    fn test_add_failure_points() {
        let cases: [(fn(&MemoryEngine, NativeError), fn(&Error) -> bool); 3] = [
            (MemoryEngine::fail_profile_query, |e| {
                matches!(e, Error::ProfileQueryFailed(_))
            }),
            (MemoryEngine::fail_create_rule, |e| {
                matches!(e, Error::RuleConstructionFailed(_))
            }),
            (MemoryEngine::fail_insert, |e| {
                matches!(e, Error::CollectionInsertFailed { .. })
            }),
        ];
        for (inject, expected) in cases {
            let fw = firewall();
            inject(fw.engine(), NativeError::new(hresult::E_ACCESSDENIED));
            let err = fw.add(&FirewallRule::named("x")).unwrap_err();
            assert!(expected(&err), "unexpected error: {err}");
            assert!(fw.engine().is_empty());
            assert_eq!(fw.engine().open_handles(), 0);
            assert_eq!(fw.engine().apartment_depth(), 0);
        }
    }

    #[test]
    fn test_remove_absent_rule() {
        let fw = firewall();
        fw.engine().insert_rule(&FirewallRule::named("keep"));
        let err = fw.remove_rule("gone").unwrap_err();
        assert!(matches!(err, Error::RuleNotFoundOrRemoveFailed { .. }));
        assert_eq!(fw.engine().names(), ["keep"]);
    }

    #[test]
    fn test_set_rule_enabled() {
        let fw = firewall();
        fw.engine().insert_rule(&FirewallRule::named("toggle"));
        fw.set_rule_enabled("toggle", true).unwrap();
        assert!(fw.find_rule("toggle").unwrap().unwrap().enabled);
        fw.set_rule_enabled("toggle", false).unwrap();
        assert!(!fw.find_rule("toggle").unwrap().unwrap().enabled);
    }

    #[test]
    fn test_set_rule_enabled_failures() {
        let fw = firewall();
        assert!(matches!(
            fw.set_rule_enabled("missing", true),
            Err(Error::RuleNotFoundOrRemoveFailed { .. })
        ));

        fw.engine().insert_rule(&FirewallRule::named("locked"));
        fw.engine().fail_attribute_writes(
            Attribute::Flag(FlagAttribute::Enabled),
            NativeError::new(hresult::E_ACCESSDENIED),
        );
        assert!(matches!(
            fw.set_rule_enabled("locked", true),
            Err(Error::RuleUpdateFailed { .. })
        ));
    }
}
