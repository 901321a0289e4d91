//! In-memory policy engine
//!
//! Implements the native object model on top of a `Vec`, for tests and for hosts without
//! Windows Firewall. It mirrors the native engine where the core depends on it:
//!
//! - the runtime must be initialized before the policy can be opened
//! - a fresh rule object starts with the native defaults (any protocol, inbound, allow,
//!   all profiles)
//! - ports are rejected unless the protocol is TCP or UDP, ICMP types unless it is ICMP
//! - lookups and removals of unknown names fail with "file not found"
//!
//! Every handle it hands out is counted until dropped, and any native call can be made to
//! fail, so tests can check both failure mapping and release on every exit path.

use crate::core::codec;
use crate::core::error::{NativeError, hresult};
use crate::core::firewall::{FirewallRule, Protocol};
use crate::core::native::{
    Apartment, Attribute, Cursor, FlagAttribute, IntAttribute, NativeRule, PolicyEngine,
    PolicyHandle, RuleCollection, TextAttribute,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// `CO_E_NOTINITIALIZED`
const CO_E_NOTINITIALIZED: u32 = 0x8004_01F0;

/// `NET_FW_PROFILE2_ALL`
const ALL_PROFILES: i32 = 0x7FFF_FFFF;

#[derive(Debug, Default)]
struct RuleState {
    texts: HashMap<TextAttribute, String>,
    ints: HashMap<IntAttribute, i32>,
    flags: HashMap<FlagAttribute, bool>,
    interfaces: Vec<String>,
}

impl RuleState {
    fn new() -> Self {
        let mut state = RuleState::default();
        state.ints.insert(IntAttribute::Protocol, 256);
        state.ints.insert(IntAttribute::Direction, 1);
        state.ints.insert(IntAttribute::Action, 1);
        state.ints.insert(IntAttribute::Profiles, ALL_PROFILES);
        state
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Rule(Arc<Mutex<RuleState>>),
    /// Collection element that is not a rule object
    Foreign,
}

#[derive(Debug, Default)]
struct Faults {
    initialize: Option<NativeError>,
    borrowed: bool,
    open_policy: Option<NativeError>,
    rules: Option<NativeError>,
    count: Option<NativeError>,
    profile_query: Option<NativeError>,
    create_rule: Option<NativeError>,
    insert: Option<NativeError>,
    reads: HashMap<Attribute, NativeError>,
    writes: HashMap<Attribute, NativeError>,
}

#[derive(Debug)]
struct Shared {
    entries: Vec<Entry>,
    active_profiles: i32,
    faults: Faults,
    apartment_depth: usize,
    uninitialize_calls: usize,
    open_handles: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory engine; clones share the same rule collection
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    shared: Arc<Mutex<Shared>>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Empty collection with Domain and Private active
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                entries: Vec::new(),
                active_profiles: 0x3,
                faults: Faults::default(),
                apartment_depth: 0,
                uninitialize_calls: 0,
                open_handles: 0,
            })),
        }
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        lock(&self.shared)
    }

    fn check_initialized(&self) -> Result<(), NativeError> {
        let shared = self.shared();
        if shared.apartment_depth == 0 && !shared.faults.borrowed {
            return Err(NativeError::new(CO_E_NOTINITIALIZED));
        }
        Ok(())
    }

    pub fn set_active_profiles(&self, mask: i32) {
        self.shared().active_profiles = mask;
    }

    /// Appends a rule as-is, including its own profile set
    pub fn insert_rule(&self, rule: &FirewallRule) {
        let state = Arc::new(Mutex::new(RuleState::new()));
        {
            let detached = MemoryRule {
                state: Arc::clone(&state),
                engine: self.clone(),
                _handle: None,
            };
            codec::encode(rule, rule.profiles, &detached);
        }
        self.shared().entries.push(Entry::Rule(state));
    }

    /// Appends an element that cannot be converted to a rule object
    pub fn insert_foreign_element(&self) {
        self.shared().entries.push(Entry::Foreign);
    }

    /// Makes runtime initialization fail
    pub fn fail_initialize(&self, err: NativeError) {
        self.shared().faults.initialize = Some(err);
    }

    /// Simulates a caller that already initialized the runtime in another mode
    pub fn borrow_apartment(&self) {
        self.shared().faults.borrowed = true;
    }

    pub fn fail_open_policy(&self, err: NativeError) {
        self.shared().faults.open_policy = Some(err);
    }

    pub fn fail_rules(&self, err: NativeError) {
        self.shared().faults.rules = Some(err);
    }

    pub fn fail_count(&self, err: NativeError) {
        self.shared().faults.count = Some(err);
    }

    pub fn fail_profile_query(&self, err: NativeError) {
        self.shared().faults.profile_query = Some(err);
    }

    pub fn fail_create_rule(&self, err: NativeError) {
        self.shared().faults.create_rule = Some(err);
    }

    pub fn fail_insert(&self, err: NativeError) {
        self.shared().faults.insert = Some(err);
    }

    /// Makes every read of `attr` fail on every rule object
    pub fn fail_attribute_reads(&self, attr: Attribute, err: NativeError) {
        self.shared().faults.reads.insert(attr, err);
    }

    /// Makes every write of `attr` fail on every rule object
    pub fn fail_attribute_writes(&self, attr: Attribute, err: NativeError) {
        self.shared().faults.writes.insert(attr, err);
    }

    /// Number of collection elements, foreign ones included
    pub fn len(&self) -> usize {
        self.shared().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rule names in collection order
    pub fn names(&self) -> Vec<String> {
        let entries = self.shared().entries.clone();
        entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Rule(state) => Some(
                    lock(state)
                        .texts
                        .get(&TextAttribute::Name)
                        .cloned()
                        .unwrap_or_default(),
                ),
                Entry::Foreign => None,
            })
            .collect()
    }

    /// Handles currently alive (policy, collection, cursor, rule objects)
    pub fn open_handles(&self) -> usize {
        self.shared().open_handles
    }

    /// Outstanding `initialize` calls not yet balanced by `uninitialize`
    pub fn apartment_depth(&self) -> usize {
        self.shared().apartment_depth
    }

    pub fn uninitialize_calls(&self) -> usize {
        self.shared().uninitialize_calls
    }
}

/// Counts one live handle until dropped
#[derive(Debug)]
struct HandleToken {
    shared: Arc<Mutex<Shared>>,
}

impl HandleToken {
    fn new(engine: &MemoryEngine) -> Self {
        engine.shared().open_handles += 1;
        Self {
            shared: Arc::clone(&engine.shared),
        }
    }
}

impl Drop for HandleToken {
    fn drop(&mut self) {
        let mut shared = lock(&self.shared);
        shared.open_handles = shared.open_handles.saturating_sub(1);
    }
}

impl PolicyEngine for MemoryEngine {
    type Policy = MemoryPolicy;

    fn initialize(&self) -> Result<Apartment, NativeError> {
        let mut shared = self.shared();
        if let Some(err) = shared.faults.initialize {
            return Err(err);
        }
        if shared.faults.borrowed {
            return Ok(Apartment::Borrowed);
        }
        shared.apartment_depth += 1;
        Ok(Apartment::Entered)
    }

    fn uninitialize(&self) {
        let mut shared = self.shared();
        shared.apartment_depth = shared.apartment_depth.saturating_sub(1);
        shared.uninitialize_calls += 1;
    }

    fn open_policy(&self) -> Result<MemoryPolicy, NativeError> {
        self.check_initialized()?;
        if let Some(err) = self.shared().faults.open_policy {
            return Err(err);
        }
        Ok(MemoryPolicy {
            engine: self.clone(),
            _handle: HandleToken::new(self),
        })
    }
}

#[derive(Debug)]
pub struct MemoryPolicy {
    engine: MemoryEngine,
    _handle: HandleToken,
}

impl PolicyHandle for MemoryPolicy {
    type Rules = MemoryRules;

    fn rules(&self) -> Result<MemoryRules, NativeError> {
        if let Some(err) = self.engine.shared().faults.rules {
            return Err(err);
        }
        Ok(MemoryRules {
            engine: self.engine.clone(),
            _handle: HandleToken::new(&self.engine),
        })
    }

    fn current_profile_types(&self) -> Result<i32, NativeError> {
        let shared = self.engine.shared();
        match shared.faults.profile_query {
            Some(err) => Err(err),
            None => Ok(shared.active_profiles),
        }
    }

    fn create_rule(&self) -> Result<MemoryRule, NativeError> {
        if let Some(err) = self.engine.shared().faults.create_rule {
            return Err(err);
        }
        Ok(MemoryRule {
            state: Arc::new(Mutex::new(RuleState::new())),
            engine: self.engine.clone(),
            _handle: Some(HandleToken::new(&self.engine)),
        })
    }
}

#[derive(Debug)]
pub struct MemoryRules {
    engine: MemoryEngine,
    _handle: HandleToken,
}

impl MemoryRules {
    fn find(&self, name: &str) -> Option<Arc<Mutex<RuleState>>> {
        let entries = self.engine.shared().entries.clone();
        entries.into_iter().find_map(|entry| match entry {
            Entry::Rule(state)
                if lock(&state).texts.get(&TextAttribute::Name).map(String::as_str)
                    == Some(name) =>
            {
                Some(state)
            }
            _ => None,
        })
    }
}

impl RuleCollection for MemoryRules {
    type Rule = MemoryRule;

    fn count(&self) -> Result<usize, NativeError> {
        let shared = self.engine.shared();
        match shared.faults.count {
            Some(err) => Err(err),
            None => Ok(shared.entries.len()),
        }
    }

    fn cursor(&self) -> Result<Cursor<'_, MemoryRule>, NativeError> {
        let snapshot = self.engine.shared().entries.clone();
        let token = HandleToken::new(&self.engine);
        let engine = self.engine.clone();
        Ok(Box::new(snapshot.into_iter().map(move |entry| {
            let _cursor = &token;
            match entry {
                Entry::Rule(state) => Ok(MemoryRule {
                    state,
                    engine: engine.clone(),
                    _handle: Some(HandleToken::new(&engine)),
                }),
                Entry::Foreign => Err(NativeError::new(hresult::DISP_E_TYPEMISMATCH)),
            }
        })))
    }

    fn add(&self, rule: &MemoryRule) -> Result<(), NativeError> {
        let mut shared = self.engine.shared();
        if let Some(err) = shared.faults.insert {
            return Err(err);
        }
        shared.entries.push(Entry::Rule(Arc::clone(&rule.state)));
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), NativeError> {
        let target = self
            .find(name)
            .ok_or(NativeError::new(hresult::E_NOT_FOUND))?;
        self.engine.shared().entries.retain(|entry| match entry {
            Entry::Rule(state) => !Arc::ptr_eq(state, &target),
            Entry::Foreign => true,
        });
        Ok(())
    }

    fn item(&self, name: &str) -> Result<MemoryRule, NativeError> {
        let state = self
            .find(name)
            .ok_or(NativeError::new(hresult::E_NOT_FOUND))?;
        Ok(MemoryRule {
            state,
            engine: self.engine.clone(),
            _handle: Some(HandleToken::new(&self.engine)),
        })
    }
}

/// Reference to one rule object; shares state with the collection entry it came from
#[derive(Debug)]
pub struct MemoryRule {
    state: Arc<Mutex<RuleState>>,
    engine: MemoryEngine,
    _handle: Option<HandleToken>,
}

impl MemoryRule {
    fn read_fault(&self, attr: Attribute) -> Result<(), NativeError> {
        match self.engine.shared().faults.reads.get(&attr) {
            Some(err) => Err(*err),
            None => Ok(()),
        }
    }

    fn write_fault(&self, attr: Attribute) -> Result<(), NativeError> {
        match self.engine.shared().faults.writes.get(&attr) {
            Some(err) => Err(*err),
            None => Ok(()),
        }
    }

    fn protocol(&self) -> i32 {
        lock(&self.state)
            .ints
            .get(&IntAttribute::Protocol)
            .copied()
            .unwrap_or_default()
    }
}

impl NativeRule for MemoryRule {
    fn text(&self, attr: TextAttribute) -> Result<String, NativeError> {
        self.read_fault(Attribute::Text(attr))?;
        Ok(lock(&self.state).texts.get(&attr).cloned().unwrap_or_default())
    }

    fn set_text(&self, attr: TextAttribute, value: &str) -> Result<(), NativeError> {
        self.write_fault(Attribute::Text(attr))?;
        let protocol = self.protocol();
        let allowed = match attr {
            TextAttribute::LocalPorts | TextAttribute::RemotePorts => {
                Protocol::carries_ports(protocol)
            }
            TextAttribute::IcmpTypesAndCodes => Protocol::carries_icmp(protocol),
            _ => true,
        };
        if !allowed && !value.is_empty() {
            return Err(NativeError::new(hresult::E_INVALIDARG));
        }
        lock(&self.state).texts.insert(attr, value.to_string());
        Ok(())
    }

    fn int(&self, attr: IntAttribute) -> Result<i32, NativeError> {
        self.read_fault(Attribute::Int(attr))?;
        Ok(lock(&self.state).ints.get(&attr).copied().unwrap_or_default())
    }

    fn set_int(&self, attr: IntAttribute, value: i32) -> Result<(), NativeError> {
        self.write_fault(Attribute::Int(attr))?;
        lock(&self.state).ints.insert(attr, value);
        Ok(())
    }

    fn flag(&self, attr: FlagAttribute) -> Result<bool, NativeError> {
        self.read_fault(Attribute::Flag(attr))?;
        Ok(lock(&self.state).flags.get(&attr).copied().unwrap_or_default())
    }

    fn set_flag(&self, attr: FlagAttribute, value: bool) -> Result<(), NativeError> {
        self.write_fault(Attribute::Flag(attr))?;
        lock(&self.state).flags.insert(attr, value);
        Ok(())
    }

    fn interfaces(&self) -> Result<Vec<String>, NativeError> {
        self.read_fault(Attribute::Interfaces)?;
        Ok(lock(&self.state).interfaces.clone())
    }

    fn set_interfaces(&self, interfaces: &[String]) -> Result<(), NativeError> {
        self.write_fault(Attribute::Interfaces)?;
        lock(&self.state).interfaces = interfaces.to_vec();
        Ok(())
    }
}
