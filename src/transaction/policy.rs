//! What happens when a long transaction is created under a key that is already registered.
//!
//! - Replace: the new root takes over the key; contexts obtained from the old root keep
//!   working but can no longer be reached through the registry.
//! - Reject: creation fails with `ScopeError::AlreadyExists`.

use std::fmt;

/// Policy for duplicate long transaction keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateKeyPolicy {
    /// Overwrite the existing registration.
    #[default]
    Replace,

    /// Refuse to overwrite the existing registration.
    Reject,
}

impl DuplicateKeyPolicy {
    /// Check if an existing registration may be overwritten.
    pub fn allows_replace(&self) -> bool {
        matches!(self, DuplicateKeyPolicy::Replace)
    }

    /// Get a human-readable description of this policy.
    pub fn description(&self) -> &'static str {
        match self {
            DuplicateKeyPolicy::Replace => "A new long transaction replaces the old registration",
            DuplicateKeyPolicy::Reject => "Creating a long transaction under a used key fails",
        }
    }
}

impl fmt::Display for DuplicateKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateKeyPolicy::Replace => write!(f, "replace"),
            DuplicateKeyPolicy::Reject => write!(f, "reject"),
        }
    }
}

impl std::str::FromStr for DuplicateKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "replace" | "overwrite" => Ok(DuplicateKeyPolicy::Replace),
            "reject" | "fail" => Ok(DuplicateKeyPolicy::Reject),
            _ => Err(format!("unknown duplicate key policy: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        assert_eq!(DuplicateKeyPolicy::default(), DuplicateKeyPolicy::Replace);
        assert!(DuplicateKeyPolicy::default().allows_replace());
        assert!(!DuplicateKeyPolicy::Reject.allows_replace());
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!(
            "Replace".parse::<DuplicateKeyPolicy>().unwrap(),
            DuplicateKeyPolicy::Replace
        );
        assert_eq!(
            " fail ".parse::<DuplicateKeyPolicy>().unwrap(),
            DuplicateKeyPolicy::Reject
        );
        assert!("merge".parse::<DuplicateKeyPolicy>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for policy in [DuplicateKeyPolicy::Replace, DuplicateKeyPolicy::Reject] {
            assert_eq!(policy.to_string().parse::<DuplicateKeyPolicy>().unwrap(), policy);
        }
    }
}
