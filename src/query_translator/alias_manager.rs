//! Table Alias Manager
//!
//! Hands out table aliases for one query translation. Aliases are keyed by
//! the join path that reaches a table, not by the table name: resolving two
//! properties through the same join prefix reuses the alias (and therefore
//! the join), while reaching the same table through a different path gets a
//! fresh alias.
//!
//! Minted aliases are `<table prefix>_<counter>`. The counter is shared by all
//! aliases of the translation and the prefix never contains `_`, so two
//! minted aliases can never collide.
//!
//! A manager is created per translation and dropped afterwards; aliases never
//! leak between independent filter expressions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::feature_catalog::{JoinSegment, SegmentId};

pub const DEFAULT_ALIAS_PREFIX_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableAlias(pub String);

impl TableAlias {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a join path prefix within one translation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathKey {
    feature_type: String,
    segments: Vec<SegmentId>,
}

impl PathKey {
    /// Key of a feature type's root table
    pub fn root(feature_type: &str) -> Self {
        PathKey {
            feature_type: feature_type.to_string(),
            segments: Vec::new(),
        }
    }

    /// Key of the path that walks `prefix` from the feature type's root table
    pub fn for_prefix(feature_type: &str, prefix: &[JoinSegment]) -> Self {
        PathKey {
            feature_type: feature_type.to_string(),
            segments: prefix.iter().map(|s| s.id.clone()).collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Result of an alias request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasAssignment {
    pub alias: TableAlias,
    /// False when the prefix was already aliased earlier in this translation
    pub is_new: bool,
}

#[derive(Debug)]
pub struct AliasManager {
    prefix_len: usize,
    counter: usize,
    assigned: HashMap<PathKey, TableAlias>,
}

impl Default for AliasManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasManager {
    pub fn new() -> Self {
        Self::with_prefix_len(DEFAULT_ALIAS_PREFIX_LEN)
    }

    pub fn with_prefix_len(prefix_len: usize) -> Self {
        AliasManager {
            prefix_len: prefix_len.max(1),
            counter: 0,
            assigned: HashMap::new(),
        }
    }

    /// Alias of the feature type's primary table, minted once per translation
    pub fn root_alias(&mut self, feature_type: &str, table: &str) -> AliasAssignment {
        self.alias_for(PathKey::root(feature_type), table)
    }

    /// Stable alias for a join path prefix ending at `table`
    pub fn alias_for(&mut self, key: PathKey, table: &str) -> AliasAssignment {
        if let Some(existing) = self.assigned.get(&key) {
            return AliasAssignment {
                alias: existing.clone(),
                is_new: false,
            };
        }

        let alias = self.mint(table);
        log::debug!(
            "Minted alias '{}' for table '{}' ({} segment(s) from root of '{}')",
            alias,
            table,
            key.segments.len(),
            key.feature_type
        );
        self.assigned.insert(key, alias.clone());
        AliasAssignment { alias, is_new: true }
    }

    pub fn lookup(&self, key: &PathKey) -> Option<&TableAlias> {
        self.assigned.get(key)
    }

    /// Number of aliases minted so far
    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }

    fn mint(&mut self, table: &str) -> TableAlias {
        self.counter += 1;
        // Drop any schema qualifier
        let unqualified = table.rsplit('.').next().unwrap_or(table);
        let mut prefix: String = unqualified
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .take(self.prefix_len)
            .collect();
        if !prefix.starts_with(|c: char| c.is_ascii_alphabetic()) {
            prefix.insert(0, 't');
        }
        TableAlias(format!("{}_{}", prefix, self.counter))
    }
}
