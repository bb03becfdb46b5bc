pub mod config;
pub mod errors;
pub mod mapping;
pub mod property_path;
pub mod value_codec;

// Re-export commonly used types
pub use config::FeatureMappingConfig;
pub use errors::{MappingError, SchemaConfigError};
pub use mapping::{
    FeatureTypeMapping, GeometryStorage, JoinPath, JoinSegment, JoinStep, MappingModel,
    PropertyKind, PropertyMapping, SegmentId, Terminal,
};
pub use property_path::{PathStep, PropertyPath, QName};
pub use value_codec::{CodecCapability, PrimitiveType, ValueCodec};
