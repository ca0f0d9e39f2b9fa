//! Host ORM model metadata and dynamic records

pub mod field;
pub mod index_config;
pub mod meta;
pub mod record;
pub mod registry;
pub mod value;

pub use field::{FieldCategory, FieldDef, FieldKind};
pub use index_config::{IndexConfig, IndexConfigBuilder, SerializerKind};
pub use meta::{ModelMeta, ModelMetaBuilder};
pub use record::{Record, RecordSource};
pub use registry::{ModelRegistry, RegisteredModel};
pub use value::{RecordRef, Value};
