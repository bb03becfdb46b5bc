//! Property-Path Resolver
//!
//! Maps property paths of a filter expression to alias qualified column
//! references, collecting the joins needed to reach them. One
//! [`PropertyNameMapper`] serves one query translation: all property names of
//! that translation share its [`AliasManager`], so shared join prefixes are
//! aliased and joined exactly once.
//!
//! ```ignore
//! let mut mapper = PropertyNameMapper::new(&model);
//! let street = mapper.map_property_str("app:Road", "app:address/app:street")?;
//! let city = mapper.map_property_str("app:Road", "app:address/app:city")?;
//! // street.column_ref() == "addr_2.street", one join to `addresses` in total
//! let from = mapper.from_clause("app:Road")?;
//! ```

use super::alias_manager::{AliasManager, PathKey, TableAlias};
use super::join_clause::{column_ref, quote_identifier, JoinClause, JoinType};
use crate::feature_catalog::{
    CodecCapability, JoinPath, MappingError, MappingModel, PropertyPath, Terminal,
};

/// What kind of value a mapped column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappedValueKind {
    Primitive,
    Geometry { srid: Option<u32> },
    Identifier,
}

/// Outcome of mapping one property name
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyNameMapping {
    pub table_alias: TableAlias,
    pub column: String,
    pub kind: MappedValueKind,
    pub codec: CodecCapability,
    /// Joins first emitted by this mapping; empty when every join was
    /// already emitted earlier in the translation
    pub new_joins: Vec<JoinClause>,
}

impl PropertyNameMapping {
    /// `alias.column` as used in WHERE / ORDER BY clauses
    pub fn column_ref(&self) -> String {
        column_ref(&self.table_alias, &self.column)
    }

    /// Convert a filter literal compared against this property into SQL
    pub fn literal_to_sql(&self, literal: &str) -> Result<String, MappingError> {
        self.codec.encode(literal)
    }
}

#[derive(Debug, Clone)]
struct RootTable {
    feature_type: String,
    table: String,
    alias: TableAlias,
}

pub struct PropertyNameMapper<'a> {
    model: &'a MappingModel,
    aliases: AliasManager,
    join_type: JoinType,
    roots: Vec<RootTable>,
    joins: Vec<JoinClause>,
    /// Feature type each entry of `joins` belongs to
    join_owners: Vec<String>,
}

impl<'a> PropertyNameMapper<'a> {
    pub fn new(model: &'a MappingModel) -> Self {
        Self::with_alias_manager(model, AliasManager::new())
    }

    pub fn with_alias_manager(model: &'a MappingModel, aliases: AliasManager) -> Self {
        PropertyNameMapper {
            model,
            aliases,
            join_type: JoinType::default(),
            roots: Vec::new(),
            joins: Vec::new(),
            join_owners: Vec::new(),
        }
    }

    pub fn with_join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = join_type;
        self
    }

    /// Parse `path` and map it, see [`Self::map_property_name`]
    pub fn map_property_str(
        &mut self,
        feature_type: &str,
        path: &str,
    ) -> Result<PropertyNameMapping, MappingError> {
        let path = PropertyPath::parse(path)?;
        self.map_property_name(feature_type, &path)
    }

    /// Map a property path of `feature_type` to a column reference
    ///
    /// The path is resolved against the model before any alias is allocated,
    /// so a failed mapping leaves the translation state untouched.
    pub fn map_property_name(
        &mut self,
        feature_type: &str,
        path: &PropertyPath,
    ) -> Result<PropertyNameMapping, MappingError> {
        let join_path = self.model.resolve_path(feature_type, path)?;
        log::debug!("Mapping '{}' of '{}' via {}", path, feature_type, join_path);

        let mut current = self.root_for(&join_path.feature_type, &join_path.root_table);
        let mut new_joins = Vec::new();

        for (i, segment) in join_path.segments.iter().enumerate() {
            let key = PathKey::for_prefix(&join_path.feature_type, &join_path.segments[..=i]);
            let assignment = self.aliases.alias_for(key, &segment.step.to_table);
            if assignment.is_new {
                let clause = JoinClause::from_step(
                    &segment.step,
                    current.clone(),
                    assignment.alias.clone(),
                    self.join_type,
                );
                log::debug!("Emitting join: {}", clause);
                self.joins.push(clause.clone());
                self.join_owners.push(join_path.feature_type.clone());
                new_joins.push(clause);
            }
            current = assignment.alias;
        }

        Ok(to_mapping(&join_path, current, new_joins))
    }

    /// Alias of the feature type's primary table in this translation
    pub fn root_alias(&mut self, feature_type: &str) -> Result<TableAlias, MappingError> {
        let ft = self
            .model
            .feature_type(feature_type)
            .ok_or_else(|| MappingError::UnknownFeatureType {
                feature_type: feature_type.to_string(),
            })?;
        let name = ft.name.to_string();
        let table = ft.table.clone();
        Ok(self.root_for(&name, &table))
    }

    /// All joins emitted so far, in emission order, each exactly once
    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    /// `FROM` clause body for `feature_type`: the aliased root table followed
    /// by every join emitted for it
    pub fn from_clause(&mut self, feature_type: &str) -> Result<String, MappingError> {
        let alias = self.root_alias(feature_type)?;
        let root = self
            .roots
            .iter()
            .find(|r| r.alias == alias)
            .map(|r| (r.feature_type.clone(), r.table.clone()))
            .ok_or_else(|| MappingError::UnknownFeatureType {
                feature_type: feature_type.to_string(),
            })?;
        let (ft_name, table) = root;

        let mut sql = format!("{} AS {}", quote_identifier(&table), alias);
        for (clause, owner) in self.joins.iter().zip(&self.join_owners) {
            if *owner == ft_name {
                sql.push(' ');
                sql.push_str(&clause.to_sql());
            }
        }
        Ok(sql)
    }

    pub fn alias_manager(&self) -> &AliasManager {
        &self.aliases
    }

    /// Finish the translation, keeping only the emitted joins
    pub fn into_joins(self) -> Vec<JoinClause> {
        self.joins
    }

    fn root_for(&mut self, feature_type: &str, table: &str) -> TableAlias {
        let assignment = self.aliases.root_alias(feature_type, table);
        if assignment.is_new {
            self.roots.push(RootTable {
                feature_type: feature_type.to_string(),
                table: table.to_string(),
                alias: assignment.alias.clone(),
            });
        }
        assignment.alias
    }
}

fn to_mapping(
    join_path: &JoinPath,
    alias: TableAlias,
    new_joins: Vec<JoinClause>,
) -> PropertyNameMapping {
    let kind = match &join_path.terminal {
        Terminal::Column { .. } => MappedValueKind::Primitive,
        Terminal::GeometryColumn { srid, .. } => MappedValueKind::Geometry { srid: *srid },
        Terminal::Identifier { .. } => MappedValueKind::Identifier,
    };
    PropertyNameMapping {
        table_alias: alias,
        column: join_path.terminal.column().to_string(),
        kind,
        codec: join_path.terminal.codec(),
        new_joins,
    }
}
