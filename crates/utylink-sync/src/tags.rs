//! The client's capability tag set.

use std::collections::BTreeSet;

use crate::game::{TAG_AP, TAG_DEATHLINK, TAG_ONLINE};

/// Tags sent with `Connect` and `ConnectUpdate`. Always contains `AP`.
///
/// Outlives sessions: toggling deathlink while disconnected takes effect
/// on the next connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new(deathlink: bool, online: bool) -> Self {
        let mut tags = Self(BTreeSet::from([TAG_AP.to_string()]));
        tags.set(TAG_DEATHLINK, deathlink);
        tags.set(TAG_ONLINE, online);
        tags
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn deathlink(&self) -> bool {
        self.contains(TAG_DEATHLINK)
    }

    pub fn online(&self) -> bool {
        self.contains(TAG_ONLINE)
    }

    /// Adds or removes `tag`. Returns `true` if the set changed.
    pub fn set(&mut self, tag: &str, enabled: bool) -> bool {
        if enabled {
            self.0.insert(tag.to_string())
        } else {
            self.0.remove(tag)
        }
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl Default for TagSet {
    fn default() -> Self {
        Self::new(false, true)
    }
}
