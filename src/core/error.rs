use thiserror::Error;

/// Well-known `HRESULT` values reported by the firewall policy engine and the COM runtime.
pub mod hresult {
    /// Unspecified failure
    pub const E_FAIL: u32 = 0x8000_4005;
    /// Interface not supported by the element
    pub const E_NOINTERFACE: u32 = 0x8000_4002;
    /// `HRESULT_FROM_WIN32(ERROR_ACCESS_DENIED)`
    pub const E_ACCESSDENIED: u32 = 0x8007_0005;
    /// `HRESULT_FROM_WIN32(ERROR_FILE_NOT_FOUND)`, returned for unknown rule names
    pub const E_NOT_FOUND: u32 = 0x8007_0002;
    /// `HRESULT_FROM_WIN32(ERROR_INVALID_PARAMETER)`
    pub const E_INVALIDARG: u32 = 0x8007_0057;
    /// `VARIANT` could not be coerced to the requested type
    pub const DISP_E_TYPEMISMATCH: u32 = 0x8002_0005;
    /// Thread already initialized with a different apartment model
    pub const RPC_E_CHANGED_MODE: u32 = 0x8001_0106;
    /// COM class not registered
    pub const REGDB_E_CLASSNOTREG: u32 = 0x8004_0154;
    /// `HRESULT_FROM_WIN32(ERROR_SERVICE_NOT_ACTIVE)`, firewall service stopped
    pub const E_SERVICE_NOT_ACTIVE: u32 = 0x8007_0426;
}

/// A failed call into the native policy engine, carrying its `HRESULT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("HRESULT {code:#010x}")]
pub struct NativeError {
    pub code: u32,
}

impl NativeError {
    pub const fn new(code: u32) -> Self {
        Self { code }
    }
}

/// Core error types for winfw
#[derive(Debug, Error)]
pub enum Error {
    /// The COM runtime could not be initialized for the calling thread
    #[error("COM initialization failed: {0}")]
    EnvironmentInit(#[source] NativeError),

    /// The policy object, its rule collection or its rule count could not be obtained
    #[error("Firewall policy unavailable: {0}")]
    PolicyUnavailable(#[source] NativeError),

    /// The active profile bitmask could not be read
    #[error("Failed to query active firewall profiles: {0}")]
    ProfileQueryFailed(#[source] NativeError),

    /// A new native rule object could not be created
    #[error("Failed to construct firewall rule: {0}")]
    RuleConstructionFailed(#[source] NativeError),

    /// The rule collection rejected the new rule
    #[error("Firewall rejected rule '{name}': {source}")]
    CollectionInsertFailed {
        name: String,
        #[source]
        source: NativeError,
    },

    /// Removal or lookup by name failed; the engine does not say which
    #[error("Rule '{name}' not found or could not be removed: {source}")]
    RuleNotFoundOrRemoveFailed {
        name: String,
        #[source]
        source: NativeError,
    },

    /// An existing rule could not be modified in place
    #[error("Failed to update rule '{name}': {source}")]
    RuleUpdateFailed {
        name: String,
        #[source]
        source: NativeError,
    },

    /// Byte slice too short to hold or contain one record
    #[error("Record buffer too small: {available} bytes, need {required}")]
    RecordBufferTooSmall { required: usize, available: usize },

    /// Record was written by an incompatible schema
    #[error("Record schema version mismatch: found v{found}, expected v{expected}")]
    RecordVersionMismatch { found: u32, expected: u32 },

    /// Numeric record field outside its enumeration
    #[error("Invalid {field} value in record: {value}")]
    InvalidRecord { field: &'static str, value: i32 },

    /// No native policy engine on this platform
    #[error("Windows Firewall is only available on Windows")]
    Unsupported,

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns the native failure behind this error, if any.
    pub fn native(&self) -> Option<NativeError> {
        match self {
            Error::EnvironmentInit(e)
            | Error::PolicyUnavailable(e)
            | Error::ProfileQueryFailed(e)
            | Error::RuleConstructionFailed(e) => Some(*e),
            Error::CollectionInsertFailed { source, .. }
            | Error::RuleNotFoundOrRemoveFailed { source, .. }
            | Error::RuleUpdateFailed { source, .. } => Some(*source),
            _ => None,
        }
    }

    /// Translates this error into a message with actionable suggestions.
    pub fn translate(&self) -> ErrorTranslation {
        match self.native() {
            Some(native) => HresultPattern::match_error(native),
            None => ErrorTranslation::new(self.to_string()),
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub help_url: Option<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
            help_url: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }
}

/// Table of known `HRESULT`s and their translations
pub struct HresultPattern;

impl HresultPattern {
    /// Matches a native failure against known codes and returns a user-friendly translation.
    pub fn match_error(err: NativeError) -> ErrorTranslation {
        match err.code {
            hresult::E_ACCESSDENIED => {
                ErrorTranslation::new("Insufficient permissions to modify firewall rules")
                    .with_suggestion("Run the command from an elevated (Administrator) prompt")
                    .with_suggestion("Group Policy may lock local rule changes: gpresult /r")
                    .with_help("https://learn.microsoft.com/windows/security/operating-system-security/network-security/windows-firewall/")
            }
            hresult::E_NOT_FOUND => ErrorTranslation::new("No firewall rule with that name")
                .with_suggestion("Rule names are matched exactly, including case and spaces")
                .with_suggestion("List existing rules: winfw list"),
            hresult::E_SERVICE_NOT_ACTIVE => {
                ErrorTranslation::new("The Windows Firewall service is not running")
                    .with_suggestion("Check the service state: sc query mpssvc")
                    .with_suggestion("Start it: net start mpssvc")
            }
            hresult::REGDB_E_CLASSNOTREG => {
                ErrorTranslation::new("The firewall policy COM class is not registered")
                    .with_suggestion("This host does not provide Windows Firewall with Advanced Security")
            }
            hresult::RPC_E_CHANGED_MODE => ErrorTranslation::new(
                "The calling thread already uses a different COM apartment model",
            )
            .with_suggestion("Call from a thread that has not initialized COM as multithreaded"),
            hresult::E_INVALIDARG => ErrorTranslation::new("The firewall rejected a rule attribute")
                .with_suggestion("Ports are only accepted for TCP and UDP rules")
                .with_suggestion("ICMP types are only accepted for ICMP rules")
                .with_suggestion("Check address and port syntax, e.g. 80,443 or 10.0.0.0/8"),
            _ => ErrorTranslation::new(format!("Firewall error: {err}"))
                .with_suggestion("Check the detailed error code for more information")
                .with_help("https://learn.microsoft.com/windows/win32/com/com-error-codes"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
