/// Literal value codecs
///
/// Converting a filter literal into a SQL literal depends on how the property
/// is stored. Each mapped property carries a [`CodecCapability`]: primitive
/// columns get a [`ValueCodec`], geometry and complex properties are tagged
/// `Unsupported` with a reason, and asking them to encode a value yields
/// [`MappingError::UnsupportedOperation`].
use serde::{Deserialize, Serialize};

use super::errors::MappingError;

/// Primitive storage types understood by the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    #[default]
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    Timestamp,
}

/// Encodes literals for one primitive column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueCodec {
    primitive: PrimitiveType,
}

impl ValueCodec {
    pub fn new(primitive: PrimitiveType) -> Self {
        ValueCodec { primitive }
    }

    pub fn primitive(&self) -> PrimitiveType {
        self.primitive
    }

    /// Render `literal` as a SQL literal of this codec's type
    pub fn encode(&self, literal: &str) -> Result<String, MappingError> {
        let value = literal.trim();
        match self.primitive {
            PrimitiveType::String => Ok(quote(literal)),
            PrimitiveType::Integer => value
                .parse::<i64>()
                .map(|v| v.to_string())
                .map_err(|_| invalid(literal, "integer")),
            PrimitiveType::Decimal => match value.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(value.to_string()),
                _ => Err(invalid(literal, "decimal")),
            },
            PrimitiveType::Boolean => match value.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok("TRUE".to_string()),
                "false" | "0" => Ok("FALSE".to_string()),
                _ => Err(invalid(literal, "boolean")),
            },
            PrimitiveType::Date => chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(|d| format!("DATE '{}'", d.format("%Y-%m-%d")))
                .map_err(|_| invalid(literal, "date")),
            PrimitiveType::Timestamp => chrono::DateTime::parse_from_rfc3339(value)
                .map(|ts| {
                    format!(
                        "TIMESTAMP '{}'",
                        ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.f")
                    )
                })
                .map_err(|_| invalid(literal, "timestamp")),
        }
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn invalid(literal: &str, expected: &str) -> MappingError {
    MappingError::UnsupportedOperation(format!(
        "literal `{}` is not a valid {} value",
        literal, expected
    ))
}

/// Whether values of a property can be converted to SQL literals
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecCapability {
    Supported(ValueCodec),
    Unsupported(String),
}

impl CodecCapability {
    pub fn is_supported(&self) -> bool {
        matches!(self, CodecCapability::Supported(_))
    }

    pub fn codec(&self) -> Option<&ValueCodec> {
        match self {
            CodecCapability::Supported(codec) => Some(codec),
            CodecCapability::Unsupported(_) => None,
        }
    }

    pub fn encode(&self, literal: &str) -> Result<String, MappingError> {
        match self {
            CodecCapability::Supported(codec) => codec.encode(literal),
            CodecCapability::Unsupported(reason) => {
                Err(MappingError::UnsupportedOperation(reason.clone()))
            }
        }
    }
}
