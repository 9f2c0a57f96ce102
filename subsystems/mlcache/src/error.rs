//! # Error Types
//!
//! The scoring core never fails: events about unknown groups or entries are
//! no-ops and counter overflow is defined behavior. Errors only exist at the
//! boundary of the engine (configuration, stats node registration,
//! lifecycle).

use core::fmt;

/// Result type for engine operations
pub type MlCacheResult<T> = Result<T, MlCacheError>;

/// Engine error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MlCacheError {
    /// A configuration field is out of range
    InvalidConfig(&'static str),
    /// The stats node could not be registered with the host
    StatsRegistration,
    /// A stats node with the same name already exists
    AlreadyRegistered,
    /// The engine was already initialized
    AlreadyInitialized,
    /// The engine has been shut down
    ShutDown,
}

impl MlCacheError {
    /// Is this error fatal to engine initialization?
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MlCacheError::StatsRegistration | MlCacheError::AlreadyRegistered
        )
    }
}

impl fmt::Display for MlCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlCacheError::InvalidConfig(field) => write!(f, "invalid configuration: {}", field),
            MlCacheError::StatsRegistration => write!(f, "failed to register stats node"),
            MlCacheError::AlreadyRegistered => write!(f, "stats node already registered"),
            MlCacheError::AlreadyInitialized => write!(f, "engine already initialized"),
            MlCacheError::ShutDown => write!(f, "engine has been shut down"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_display() {
        assert_eq!(
            MlCacheError::InvalidConfig("scale").to_string(),
            "invalid configuration: scale"
        );
        assert_eq!(
            MlCacheError::StatsRegistration.to_string(),
            "failed to register stats node"
        );
    }

    #[test]
    fn test_fatal_errors() {
        assert!(MlCacheError::StatsRegistration.is_fatal());
        assert!(MlCacheError::AlreadyRegistered.is_fatal());
        assert!(!MlCacheError::InvalidConfig("scale").is_fatal());
        assert!(!MlCacheError::ShutDown.is_fatal());
    }
}
