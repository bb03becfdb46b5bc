//! Feature mapping configuration management.
//!
//! Loads feature type mapping definitions from YAML and turns them into the
//! immutable [`MappingModel`] used for query translation.
//!
//! ```yaml
//! name: roads              # Optional configuration name
//! feature_types:
//!   - name: app:Road       # Feature type name
//!     table: roads         # Root table
//!     id_column: road_id   # Feature identifier column
//!     id_type: integer     # Optional, defaults to string
//!     properties:
//!       - name: app:name
//!         column: name
//!         type: string     # string | integer | decimal | boolean | date | timestamp
//!       - name: app:geom
//!         geometry: { column: geom, srid: 4326 }
//!       - name: app:address            # complex property
//!         joins:
//!           - { from_table: roads, from_columns: address_id, to_table: addresses, to_columns: id }
//!         properties:
//!           - { name: app:street, column: street }
//! ```
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::errors::SchemaConfigError;
use super::mapping::{
    FeatureTypeMapping, GeometryStorage, JoinStep, MappingModel, PropertyKind, PropertyMapping,
};
use super::property_path::QName;
use super::value_codec::PrimitiveType;

/// Key column list supporting both single and composite keys
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum KeyColumns {
    /// Single column key
    Single(String),
    /// Composite key (multiple columns)
    Composite(Vec<String>),
}

impl KeyColumns {
    /// Get all columns of the key
    pub fn columns(&self) -> Vec<String> {
        match self {
            KeyColumns::Single(col) => vec![col.clone()],
            KeyColumns::Composite(cols) => cols.clone(),
        }
    }
}

/// Configuration for feature mappings loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureMappingConfig {
    /// Optional configuration name
    #[serde(default)]
    pub name: Option<String>,
    /// Feature type definitions
    pub feature_types: Vec<FeatureTypeDefinition>,
}

/// Feature type definition in mapping config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTypeDefinition {
    /// Qualified feature type name, e.g. `app:Road`
    pub name: String,
    /// Root table
    pub table: String,
    /// Feature identifier column of the root table
    pub id_column: String,
    /// Primitive type of `id_column` (defaults to string)
    #[serde(default)]
    pub id_type: Option<PrimitiveType>,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
}

/// Property definition; leaf properties name a `column` or a `geometry`,
/// complex properties list nested `properties`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    #[serde(default)]
    pub column: Option<String>,
    /// Primitive type of `column` (defaults to string)
    #[serde(default, rename = "type")]
    pub primitive: Option<PrimitiveType>,
    #[serde(default)]
    pub geometry: Option<GeometryDefinition>,
    /// Joins from the owning table to the table holding the value
    #[serde(default)]
    pub joins: Vec<JoinDefinition>,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
}

/// Geometry storage: a plain `column` or a derived `expression`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryDefinition {
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub srid: Option<u32>,
    #[serde(default)]
    pub expression: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinDefinition {
    pub from_table: String,
    pub from_columns: KeyColumns,
    pub to_table: String,
    pub to_columns: KeyColumns,
}

impl From<&JoinDefinition> for JoinStep {
    fn from(def: &JoinDefinition) -> Self {
        JoinStep {
            from_table: def.from_table.clone(),
            from_columns: def.from_columns.columns(),
            to_table: def.to_table.clone(),
            to_columns: def.to_columns.columns(),
        }
    }
}

impl FeatureMappingConfig {
    /// Load feature mapping configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, SchemaConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|e| SchemaConfigError::ConfigReadError {
                error: e.to_string(),
            })?;

        Self::from_yaml_str(&contents)
    }

    /// Parse feature mapping configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SchemaConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| SchemaConfigError::ConfigParseError {
            error: e.to_string(),
        })
    }

    /// Structural validation of property definitions
    ///
    /// Join chain and naming rules are checked again when the model is built.
    pub fn validate(&self) -> Result<(), SchemaConfigError> {
        if self.feature_types.is_empty() {
            return Err(SchemaConfigError::InvalidConfig {
                message: "Mapping must contain at least one feature type".to_string(),
            });
        }
        for ft in &self.feature_types {
            for property in &ft.properties {
                validate_definition(&ft.name, property)?;
            }
        }
        Ok(())
    }

    /// Validate and convert into the immutable mapping model
    pub fn to_mapping_model(&self) -> Result<MappingModel, SchemaConfigError> {
        self.validate()?;
        let feature_types = self
            .feature_types
            .iter()
            .map(|ft| -> Result<FeatureTypeMapping, SchemaConfigError> {
                let properties = ft
                    .properties
                    .iter()
                    .map(to_property_mapping)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FeatureTypeMapping {
                    properties,
                    ..FeatureTypeMapping::new(&ft.name, &ft.table, &ft.id_column)?
                        .with_id_primitive(ft.id_type.unwrap_or_default())
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        MappingModel::new(feature_types)
    }
}

fn validate_definition(
    feature_type: &str,
    property: &PropertyDefinition,
) -> Result<(), SchemaConfigError> {
    let is_complex = !property.properties.is_empty();
    let storages = [property.column.is_some(), property.geometry.is_some()]
        .iter()
        .filter(|present| **present)
        .count();

    if is_complex && storages > 0 {
        return Err(SchemaConfigError::feature_type_error(
            feature_type,
            format!(
                "complex property `{}` cannot also declare a column or geometry",
                property.name
            ),
        ));
    }
    if !is_complex && storages != 1 {
        return Err(SchemaConfigError::feature_type_error(
            feature_type,
            format!(
                "property `{}` must declare exactly one of `column` or `geometry`",
                property.name
            ),
        ));
    }
    if let Some(geometry) = &property.geometry {
        if geometry.column.is_some() == geometry.expression.is_some() {
            return Err(SchemaConfigError::feature_type_error(
                feature_type,
                format!(
                    "geometry of `{}` must declare exactly one of `column` or `expression`",
                    property.name
                ),
            ));
        }
    }
    if property.primitive.is_some() && property.column.is_none() {
        return Err(SchemaConfigError::feature_type_error(
            feature_type,
            format!("property `{}` declares a type without a column", property.name),
        ));
    }
    for nested in &property.properties {
        validate_definition(feature_type, nested)?;
    }
    Ok(())
}

fn to_property_mapping(def: &PropertyDefinition) -> Result<PropertyMapping, SchemaConfigError> {
    let kind = if !def.properties.is_empty() {
        PropertyKind::Complex {
            properties: def
                .properties
                .iter()
                .map(to_property_mapping)
                .collect::<Result<Vec<_>, _>>()?,
        }
    } else if let Some(geometry) = &def.geometry {
        match (&geometry.column, &geometry.expression) {
            (Some(column), None) => PropertyKind::Geometry(GeometryStorage::Column {
                column: column.clone(),
                srid: geometry.srid,
            }),
            (None, Some(expression)) => PropertyKind::Geometry(GeometryStorage::Derived {
                expression: expression.clone(),
            }),
            _ => {
                return Err(SchemaConfigError::InvalidConfig {
                    message: format!("invalid geometry definition for `{}`", def.name),
                })
            }
        }
    } else if let Some(column) = &def.column {
        PropertyKind::Primitive {
            column: column.clone(),
            primitive: def.primitive.unwrap_or_default(),
        }
    } else {
        return Err(SchemaConfigError::InvalidConfig {
            message: format!("property `{}` has no storage", def.name),
        });
    };

    Ok(PropertyMapping {
        name: QName::parse(&def.name).map_err(|e| SchemaConfigError::InvalidConfig {
            message: e.to_string(),
        })?,
        joins: def.joins.iter().map(JoinStep::from).collect(),
        kind,
    })
}
