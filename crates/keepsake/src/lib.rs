//! Persist plain records as JSON files and link them into an object graph.
//!
//! Entity types are declared as schemas and registered with a [`Store`].
//! Every entity gets a generated ID and is written to
//! `<data_dir>/<type>/<id>.json` whenever it changes. Relationship fields
//! store only the IDs of their targets and are resolved the first time they
//! are read.
//!
//! # Example
//! ```no_run
//! use keepsake::{EntityQuery, EntitySchema, FieldDescriptor, FieldKind, Store, StoreConfig};
//!
//! let store = Store::open(StoreConfig::new("data")).unwrap();
//! store
//!     .register(
//!         EntitySchema::new("Author")
//!             .with_field(FieldDescriptor::new("name", FieldKind::String)),
//!     )
//!     .unwrap();
//! store
//!     .register(
//!         EntitySchema::new("Book")
//!             .with_field(FieldDescriptor::new("title", FieldKind::String))
//!             .with_field(FieldDescriptor::new("authors", FieldKind::set_of("Author"))),
//!     )
//!     .unwrap();
//!
//! let ada = store.build("Author").with("name", "Ada").create().unwrap();
//! let book = store
//!     .build("Book")
//!     .with("title", "Notes")
//!     .with("authors", vec![ada.clone()])
//!     .create()
//!     .unwrap();
//!
//! let by_ada = store
//!     .filter("Book", &EntityQuery::new().test("authors", move |v| {
//!         v.as_entities().is_some_and(|a| a.contains(&ada))
//!     }))
//!     .unwrap();
//! assert_eq!(by_ada.first(), Some(&book));
//! ```

mod builder;
mod codec;
mod collection;
mod entity;
mod error;
mod registry;
mod store;
mod value;

pub use builder::EntityBuilder;
pub use collection::{Collection, Selection};
pub use entity::Entity;
pub use error::Error;
pub use store::Store;
pub use value::{FieldInput, FieldValue};

// Re-export core types users need to declare and query entities
pub use keepsake_core::error::CoreError;
pub use keepsake_core::model::{
    CollectionOrder, EntityId, EntitySchema, FieldDefault, FieldDescriptor, FieldKind, Value,
};
pub use keepsake_core::storage::{BlobStore, FileStore};
pub use keepsake_core::StoreConfig;
pub use keepsake_query::{Match, Query};

/// A query over entity fields.
pub type EntityQuery = Query<FieldValue>;
