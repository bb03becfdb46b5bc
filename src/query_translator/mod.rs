//! Query translation support: turns abstract property paths of filter
//! expressions into alias qualified SQL column references plus the joins a
//! SQL statement builder needs to reach them.

pub mod alias_manager;
pub mod join_clause;
pub mod property_mapper;

pub use alias_manager::{AliasAssignment, AliasManager, PathKey, TableAlias};
pub use join_clause::{JoinClause, JoinType};
pub use property_mapper::{MappedValueKind, PropertyNameMapper, PropertyNameMapping};
