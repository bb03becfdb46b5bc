use serde::{Deserialize, Serialize};
use std::fmt;

use super::alias_manager::TableAlias;
use crate::feature_catalog::JoinStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JoinType {
    Inner,
    /// Keeps features whose related rows are missing
    #[default]
    LeftOuter,
}

impl JoinType {
    fn keyword(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::LeftOuter => "LEFT OUTER JOIN",
        }
    }
}

/// A join emitted while resolving property paths:
/// `LEFT OUTER JOIN <table> AS <alias> ON <source_alias>.<k> = <alias>.<k>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: String,
    pub alias: TableAlias,
    pub source_alias: TableAlias,
    /// (source column, target column) pairs, ANDed together
    pub conditions: Vec<(String, String)>,
}

impl JoinClause {
    pub fn from_step(
        step: &JoinStep,
        source_alias: TableAlias,
        alias: TableAlias,
        join_type: JoinType,
    ) -> Self {
        JoinClause {
            join_type,
            table: step.to_table.clone(),
            alias,
            source_alias,
            conditions: step
                .key_pairs()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }

    pub fn to_sql(&self) -> String {
        let on = self
            .conditions
            .iter()
            .map(|(from, to)| {
                format!(
                    "{} = {}",
                    column_ref(&self.source_alias, from),
                    column_ref(&self.alias, to)
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ");
        format!(
            "{} {} AS {} ON {}",
            self.join_type.keyword(),
            quote_identifier(&self.table),
            self.alias,
            on
        )
    }
}

impl fmt::Display for JoinClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_sql())
    }
}

/// `alias.column`, quoting the column when it is not a plain identifier
pub fn column_ref(alias: &TableAlias, column: &str) -> String {
    format!("{}.{}", alias, quote_identifier(column))
}

/// Schema qualified names are quoted per part
pub(crate) fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| {
            if needs_quoting(part) {
                format!("\"{}\"", part.replace('"', "\"\""))
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn needs_quoting(part: &str) -> bool {
    part.is_empty()
        || part.starts_with(|c: char| c.is_ascii_digit())
        || part.chars().any(|c| !c.is_alphanumeric() && c != '_')
}
