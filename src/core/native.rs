//! Narrow interface to the native firewall policy engine
//!
//! The core never touches the engine's object model directly. It talks to four capabilities:
//!
//! - [`PolicyEngine`]: per-thread runtime initialization and the policy singleton
//! - [`PolicyHandle`]: the live rule collection, active profiles, and new rule objects
//! - [`RuleCollection`]: count, cursor, insert, remove and lookup by name
//! - [`NativeRule`]: attribute reads and writes on one rule object
//!
//! Every handle type releases its native reference on `Drop`, so early returns release
//! everything acquired so far.

use crate::core::error::NativeError;

/// Text attributes of a native rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum TextAttribute {
    Name,
    Description,
    ApplicationName,
    ServiceName,
    IcmpTypesAndCodes,
    LocalPorts,
    RemotePorts,
    LocalAddresses,
    RemoteAddresses,
    InterfaceTypes,
    Grouping,
}

/// Integer attributes of a native rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum IntAttribute {
    Protocol,
    Direction,
    Action,
    Profiles,
}

/// Boolean attributes of a native rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum FlagAttribute {
    Enabled,
    EdgeTraversal,
}

/// Any native rule attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Text(TextAttribute),
    Int(IntAttribute),
    Flag(FlagAttribute),
    Interfaces,
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attribute::Text(a) => write!(f, "{a}"),
            Attribute::Int(a) => write!(f, "{a}"),
            Attribute::Flag(a) => write!(f, "{a}"),
            Attribute::Interfaces => f.write_str("Interfaces"),
        }
    }
}

/// Outcome of runtime initialization on the calling thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Apartment {
    /// This call initialized the runtime and must balance it with `uninitialize`
    Entered,
    /// The caller already owns the runtime in another mode; nothing to release
    Borrowed,
}

/// One native rule object.
///
/// Setters take `&self`: native objects are reference-counted handles with interior state.
pub trait NativeRule {
    fn text(&self, attr: TextAttribute) -> Result<String, NativeError>;
    fn set_text(&self, attr: TextAttribute, value: &str) -> Result<(), NativeError>;
    fn int(&self, attr: IntAttribute) -> Result<i32, NativeError>;
    fn set_int(&self, attr: IntAttribute, value: i32) -> Result<(), NativeError>;
    fn flag(&self, attr: FlagAttribute) -> Result<bool, NativeError>;
    fn set_flag(&self, attr: FlagAttribute, value: bool) -> Result<(), NativeError>;
    fn interfaces(&self) -> Result<Vec<String>, NativeError>;
    fn set_interfaces(&self, interfaces: &[String]) -> Result<(), NativeError>;
}

/// Cursor over a rule collection.
///
/// Yields `Err` for an element that cannot be converted to a rule object; the walk may
/// continue past it.
pub type Cursor<'a, R> = Box<dyn Iterator<Item = Result<R, NativeError>> + 'a>;

/// The engine-owned, ordered set of rules
pub trait RuleCollection {
    type Rule: NativeRule;

    fn count(&self) -> Result<usize, NativeError>;
    fn cursor(&self) -> Result<Cursor<'_, Self::Rule>, NativeError>;
    fn add(&self, rule: &Self::Rule) -> Result<(), NativeError>;
    fn remove(&self, name: &str) -> Result<(), NativeError>;
    fn item(&self, name: &str) -> Result<Self::Rule, NativeError>;
}

/// Handle to the policy singleton
pub trait PolicyHandle {
    type Rules: RuleCollection;

    fn rules(&self) -> Result<Self::Rules, NativeError>;
    /// Bitmask of currently active profiles
    fn current_profile_types(&self) -> Result<i32, NativeError>;
    /// Creates a detached rule object ready to be populated and inserted
    fn create_rule(&self) -> Result<<Self::Rules as RuleCollection>::Rule, NativeError>;
}

/// Provider of the native object system and the policy singleton
pub trait PolicyEngine {
    type Policy: PolicyHandle;

    fn initialize(&self) -> Result<Apartment, NativeError>;
    /// Balances one `initialize` that returned [`Apartment::Entered`]
    fn uninitialize(&self);
    fn open_policy(&self) -> Result<Self::Policy, NativeError>;
}

/// Native rule type reachable from an engine
pub type EngineRule<E> =
    <<<E as PolicyEngine>::Policy as PolicyHandle>::Rules as RuleCollection>::Rule;
