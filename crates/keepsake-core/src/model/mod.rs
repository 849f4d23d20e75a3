pub mod id;
pub mod schema;
pub mod value;

pub use id::EntityId;
pub use schema::{CollectionOrder, EntitySchema, FieldDefault, FieldDescriptor, FieldKind};
pub use value::Value;
