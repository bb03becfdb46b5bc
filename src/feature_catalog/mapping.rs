use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::errors::{MappingError, SchemaConfigError};
use super::property_path::{PathStep, PropertyPath, QName};
use super::value_codec::{CodecCapability, PrimitiveType, ValueCodec};

/// One relational join hop: `from_table.from_columns = to_table.to_columns`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinStep {
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
}

impl JoinStep {
    pub fn new(from_table: &str, from_column: &str, to_table: &str, to_column: &str) -> Self {
        JoinStep {
            from_table: from_table.to_string(),
            from_columns: vec![from_column.to_string()],
            to_table: to_table.to_string(),
            to_columns: vec![to_column.to_string()],
        }
    }

    /// Key column pairs of the join predicate
    pub fn key_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.from_columns
            .iter()
            .map(String::as_str)
            .zip(self.to_columns.iter().map(String::as_str))
    }
}

/// Storage of a geometry property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryStorage {
    /// Geometry stored in a plain column
    Column { column: String, srid: Option<u32> },
    /// Geometry computed from an SQL expression at query time
    Derived { expression: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    Primitive {
        column: String,
        primitive: PrimitiveType,
    },
    Geometry(GeometryStorage),
    /// Nested properties stored in the table reached by the owning property's joins
    Complex { properties: Vec<PropertyMapping> },
}

/// Mapping of one (possibly complex) property onto the relational schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMapping {
    pub name: QName,
    /// Joins from the owning table to the table holding the value
    pub joins: Vec<JoinStep>,
    pub kind: PropertyKind,
}

impl PropertyMapping {
    pub fn primitive(name: &str, column: &str, primitive: PrimitiveType) -> Result<Self, SchemaConfigError> {
        Ok(PropertyMapping {
            name: parse_config_name(name)?,
            joins: Vec::new(),
            kind: PropertyKind::Primitive {
                column: column.to_string(),
                primitive,
            },
        })
    }

    pub fn geometry(name: &str, storage: GeometryStorage) -> Result<Self, SchemaConfigError> {
        Ok(PropertyMapping {
            name: parse_config_name(name)?,
            joins: Vec::new(),
            kind: PropertyKind::Geometry(storage),
        })
    }

    pub fn complex(name: &str, properties: Vec<PropertyMapping>) -> Result<Self, SchemaConfigError> {
        Ok(PropertyMapping {
            name: parse_config_name(name)?,
            joins: Vec::new(),
            kind: PropertyKind::Complex { properties },
        })
    }

    pub fn with_joins(mut self, joins: Vec<JoinStep>) -> Self {
        self.joins = joins;
        self
    }

    fn target_table<'a>(&'a self, owner_table: &'a str) -> &'a str {
        self.joins
            .last()
            .map(|j| j.to_table.as_str())
            .unwrap_or(owner_table)
    }
}

/// Mapping of a feature type onto its root table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureTypeMapping {
    pub name: QName,
    pub table: String,
    pub id_column: String,
    /// Primitive type of `id_column`, used to encode identifier literals
    pub id_primitive: PrimitiveType,
    pub properties: Vec<PropertyMapping>,
}

impl FeatureTypeMapping {
    pub fn new(name: &str, table: &str, id_column: &str) -> Result<Self, SchemaConfigError> {
        Ok(FeatureTypeMapping {
            name: parse_config_name(name)?,
            table: table.to_string(),
            id_column: id_column.to_string(),
            id_primitive: PrimitiveType::String,
            properties: Vec::new(),
        })
    }

    pub fn with_id_primitive(mut self, primitive: PrimitiveType) -> Self {
        self.id_primitive = primitive;
        self
    }

    pub fn with_property(mut self, property: PropertyMapping) -> Self {
        self.properties.push(property);
        self
    }

    fn validate(&self) -> Result<(), SchemaConfigError> {
        let ft = self.name.to_string();
        if self.table.is_empty() || self.id_column.is_empty() {
            return Err(SchemaConfigError::feature_type_error(
                &ft,
                "table and id column must not be empty",
            ));
        }
        validate_properties(&ft, &self.table, &HashSet::new(), &self.properties, 0)
    }
}

/// `ancestors` holds every table on the join chain leading to `owner_table`
fn validate_properties<'a>(
    feature_type: &str,
    owner_table: &'a str,
    ancestors: &HashSet<&'a str>,
    properties: &'a [PropertyMapping],
    depth: usize,
) -> Result<(), SchemaConfigError> {
    let mut seen = HashSet::new();
    for property in properties {
        if !seen.insert(&property.name) {
            return Err(SchemaConfigError::feature_type_error(
                feature_type,
                format!("duplicate property `{}`", property.name),
            ));
        }
        let visited = validate_join_chain(
            feature_type,
            &property.name,
            owner_table,
            ancestors,
            &property.joins,
        )?;

        match &property.kind {
            PropertyKind::Primitive { column, .. }
            | PropertyKind::Geometry(GeometryStorage::Column { column, .. })
                if column.is_empty() =>
            {
                return Err(SchemaConfigError::feature_type_error(
                    feature_type,
                    format!("property `{}` has an empty column", property.name),
                ));
            }
            PropertyKind::Complex { .. } if depth > 0 => {
                return Err(SchemaConfigError::feature_type_error(
                    feature_type,
                    format!(
                        "property `{}` nests complex properties deeper than one level",
                        property.name
                    ),
                ));
            }
            PropertyKind::Complex { properties: nested } => {
                if nested.is_empty() {
                    return Err(SchemaConfigError::feature_type_error(
                        feature_type,
                        format!("complex property `{}` has no properties", property.name),
                    ));
                }
                validate_properties(
                    feature_type,
                    property.target_table(owner_table),
                    &visited,
                    nested,
                    depth + 1,
                )?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Returns the tables visited from the root table through the end of `joins`
fn validate_join_chain<'a>(
    feature_type: &str,
    property: &QName,
    owner_table: &'a str,
    ancestors: &HashSet<&'a str>,
    joins: &'a [JoinStep],
) -> Result<HashSet<&'a str>, SchemaConfigError> {
    let mut visited = ancestors.clone();
    visited.insert(owner_table);
    let mut current = owner_table;
    for step in joins {
        if step.from_table != current {
            return Err(SchemaConfigError::feature_type_error(
                feature_type,
                format!(
                    "join chain of `{}` is not contiguous: expected a step from `{}`, found `{}`",
                    property, current, step.from_table
                ),
            ));
        }
        if step.from_columns.is_empty() || step.from_columns.len() != step.to_columns.len() {
            return Err(SchemaConfigError::feature_type_error(
                feature_type,
                format!(
                    "join `{}` -> `{}` of `{}` needs matching, non-empty key column lists",
                    step.from_table, step.to_table, property
                ),
            ));
        }
        if !visited.insert(step.to_table.as_str()) {
            return Err(SchemaConfigError::feature_type_error(
                feature_type,
                format!(
                    "join chain of `{}` revisits table `{}`",
                    property, step.to_table
                ),
            ));
        }
        current = step.to_table.as_str();
    }
    Ok(visited)
}

fn parse_config_name(name: &str) -> Result<QName, SchemaConfigError> {
    QName::parse(name).map_err(|e| SchemaConfigError::InvalidConfig {
        message: e.to_string(),
    })
}

/// Identity of a join segment inside the mapping tree
///
/// Two resolutions share a segment only when they reach it through the same
/// property, never merely because they join the same table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentId {
    /// `/` separated names of the owning property chain
    pub owner: String,
    pub step: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSegment {
    pub id: SegmentId,
    pub step: JoinStep,
}

/// Where the resolved value lives once the joins are walked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Column {
        column: String,
        codec: CodecCapability,
    },
    GeometryColumn {
        column: String,
        srid: Option<u32>,
        codec: CodecCapability,
    },
    /// The feature identifier column of the root table
    Identifier {
        column: String,
        primitive: PrimitiveType,
    },
}

impl Terminal {
    pub fn column(&self) -> &str {
        match self {
            Terminal::Column { column, .. }
            | Terminal::GeometryColumn { column, .. }
            | Terminal::Identifier { column, .. } => column,
        }
    }

    pub fn codec(&self) -> CodecCapability {
        match self {
            Terminal::Column { codec, .. } | Terminal::GeometryColumn { codec, .. } => {
                codec.clone()
            }
            Terminal::Identifier { primitive, .. } => {
                CodecCapability::Supported(ValueCodec::new(*primitive))
            }
        }
    }
}

/// Full relational path from a feature type's root table to a property value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPath {
    pub feature_type: String,
    pub root_table: String,
    pub segments: Vec<JoinSegment>,
    pub terminal: Terminal,
}

impl JoinPath {
    /// Table holding the terminal column
    pub fn terminal_table(&self) -> &str {
        self.segments
            .last()
            .map(|s| s.step.to_table.as_str())
            .unwrap_or(&self.root_table)
    }
}

impl fmt::Display for JoinPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root_table)?;
        for segment in &self.segments {
            write!(f, " -> {}", segment.step.to_table)?;
        }
        write!(f, ".{}", self.terminal.column())
    }
}

const GEOMETRY_LITERALS_UNSUPPORTED: &str =
    "geometry values are converted by the storage geometry codec, not as SQL literals";

/// Immutable description of every mapped feature type
///
/// Loaded once and shared read-only (typically behind an `Arc`) by all
/// concurrent query translations.
#[derive(Debug, Clone, Default)]
pub struct MappingModel {
    feature_types: Vec<FeatureTypeMapping>,
}

impl MappingModel {
    pub fn new(feature_types: Vec<FeatureTypeMapping>) -> Result<Self, SchemaConfigError> {
        let mut seen = HashSet::new();
        for ft in &feature_types {
            if !seen.insert(&ft.name) {
                return Err(SchemaConfigError::InvalidConfig {
                    message: format!("duplicate feature type `{}`", ft.name),
                });
            }
            ft.validate()?;
        }
        log::info!(
            "Feature mapping model built with {} feature type(s)",
            feature_types.len()
        );
        Ok(MappingModel { feature_types })
    }

    pub fn feature_types(&self) -> &[FeatureTypeMapping] {
        &self.feature_types
    }

    /// Look up a feature type by `prefix:local` or, when unambiguous, by local name
    pub fn feature_type(&self, name: &str) -> Option<&FeatureTypeMapping> {
        let wanted = QName::parse(name).ok()?;
        find_by_name(&self.feature_types, &wanted, |ft| &ft.name)
    }

    /// Resolve `path` on `feature_type` into the joins and column that store it
    pub fn resolve_path(
        &self,
        feature_type: &str,
        path: &PropertyPath,
    ) -> Result<JoinPath, MappingError> {
        let ft = self
            .feature_type(feature_type)
            .ok_or_else(|| MappingError::UnknownFeatureType {
                feature_type: feature_type.to_string(),
            })?;
        let ft_name = ft.name.to_string();

        let stripped;
        let path = match (path.steps().first(), path.without_first()) {
            (Some(PathStep::Element(first)), Some(rest)) if first.matches_local(&ft.name) => {
                stripped = rest;
                &stripped
            }
            _ => path,
        };

        if path.is_identifier() {
            return Ok(JoinPath {
                feature_type: ft_name,
                root_table: ft.table.clone(),
                segments: Vec::new(),
                terminal: Terminal::Identifier {
                    column: ft.id_column.clone(),
                    primitive: ft.id_primitive,
                },
            });
        }

        let unmappable = || MappingError::unmappable(&ft_name, path.to_string());
        let mut steps = path.steps().iter();
        let first = match steps.next() {
            Some(PathStep::Element(name)) => name,
            _ => return Err(unmappable()),
        };
        let property =
            find_by_name(&ft.properties, first, |p| &p.name).ok_or_else(unmappable)?;

        let mut segments = Vec::new();
        let owner = property.name.to_string();
        push_segments(&mut segments, &owner, &property.joins);

        let leaf = match &property.kind {
            PropertyKind::Complex { properties } => {
                let nested_name = match steps.next() {
                    Some(PathStep::Element(name)) => name,
                    Some(PathStep::Attribute(_)) => return Err(unmappable()),
                    None => {
                        return Err(MappingError::UnsupportedPropertyKind {
                            feature_type: ft_name.clone(),
                            path: path.to_string(),
                            reason: "complex property has no single storage column".to_string(),
                        })
                    }
                };
                let nested =
                    find_by_name(properties, nested_name, |p| &p.name).ok_or_else(unmappable)?;
                let nested_owner = format!("{}/{}", owner, nested.name);
                push_segments(&mut segments, &nested_owner, &nested.joins);
                nested
            }
            _ => property,
        };

        if steps.next().is_some() {
            return Err(unmappable());
        }

        let terminal = match &leaf.kind {
            PropertyKind::Primitive { column, primitive } => Terminal::Column {
                column: column.clone(),
                codec: CodecCapability::Supported(ValueCodec::new(*primitive)),
            },
            PropertyKind::Geometry(GeometryStorage::Column { column, srid }) => {
                Terminal::GeometryColumn {
                    column: column.clone(),
                    srid: *srid,
                    codec: CodecCapability::Unsupported(GEOMETRY_LITERALS_UNSUPPORTED.to_string()),
                }
            }
            PropertyKind::Geometry(GeometryStorage::Derived { expression }) => {
                return Err(MappingError::UnsupportedPropertyKind {
                    feature_type: ft_name.clone(),
                    path: path.to_string(),
                    reason: format!("derived geometry `{}` is not a plain column", expression),
                })
            }
            // Validation keeps complex properties one level deep
            PropertyKind::Complex { .. } => return Err(unmappable()),
        };

        Ok(JoinPath {
            feature_type: ft_name,
            root_table: ft.table.clone(),
            segments,
            terminal,
        })
    }
}

fn push_segments(segments: &mut Vec<JoinSegment>, owner: &str, joins: &[JoinStep]) {
    segments.extend(joins.iter().enumerate().map(|(i, step)| JoinSegment {
        id: SegmentId {
            owner: owner.to_string(),
            step: i,
        },
        step: step.clone(),
    }));
}

/// Exact name match first, then a unique match on the local name
fn find_by_name<'a, T>(
    items: &'a [T],
    wanted: &QName,
    name_of: impl Fn(&T) -> &QName,
) -> Option<&'a T> {
    if let Some(exact) = items.iter().find(|i| name_of(i).matches_exactly(wanted)) {
        return Some(exact);
    }
    let mut by_local = items.iter().filter(|i| name_of(i).matches_local(wanted));
    match (by_local.next(), by_local.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}
