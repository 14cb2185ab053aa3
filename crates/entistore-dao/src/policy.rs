use std::fmt;

use entistore_store::Consistency;
use serde::{Deserialize, Serialize};

/// Whether a DAO's key lookups and writes go through the shared cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    Enabled,
    #[default]
    Disabled,
}

impl CachePolicy {
    pub fn is_enabled(self) -> bool {
        self == Self::Enabled
    }
}

impl From<bool> for CachePolicy {
    fn from(cache_needed: bool) -> Self {
        if cache_needed {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Cache and consistency settings of one DAO instance.
///
/// Fixed at construction; there is no per-call override. Callers needing a
/// different policy build a separate DAO.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DaoPolicy {
    pub cache: CachePolicy,
    pub consistency: Consistency,
}

impl DaoPolicy {
    /// Eventually consistent reads, cached when `cache_needed` is set.
    pub fn cached(cache_needed: bool) -> Self {
        Self {
            cache: cache_needed.into(),
            consistency: Consistency::Eventual,
        }
    }

    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }
}

impl fmt::Display for DaoPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache={} consistency={}", self.cache, self.consistency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_flag_maps_to_policy() {
        assert_eq!(CachePolicy::from(true), CachePolicy::Enabled);
        assert!(!CachePolicy::from(false).is_enabled());
    }

    #[test]
    fn cached_policies_read_eventually() {
        let policy = DaoPolicy::cached(true);
        assert_eq!(policy.consistency, Consistency::Eventual);
        assert!(policy.cache.is_enabled());
        assert_eq!(
            policy.with_consistency(Consistency::Strong).to_string(),
            "cache=enabled consistency=strong"
        );
    }

    #[test]
    fn default_policy() {
        assert_eq!(DaoPolicy::default(), DaoPolicy::cached(false));
    }
}
