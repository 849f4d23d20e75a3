#![allow(dead_code)]

use keepsake::{EntitySchema, FieldDescriptor, FieldKind, Store, StoreConfig};
use tempfile::TempDir;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn open_store(tmp: &TempDir) -> Store {
    init_tracing();
    Store::open(StoreConfig::new(tmp.path().join("data")).sync_writes(false)).unwrap()
}

/// `A { name }` and `B { owner: A, tags: set<B> }`.
pub fn register_scenario(store: &Store) {
    store
        .register(EntitySchema::new("A").with_field(FieldDescriptor::new("name", FieldKind::String)))
        .unwrap();
    store
        .register(
            EntitySchema::new("B")
                .with_field(FieldDescriptor::new("owner", FieldKind::reference("A")))
                .with_field(FieldDescriptor::new("tags", FieldKind::set_of("B")).empty_by_default()),
        )
        .unwrap();
}

/// `Playlist { title, songs: sequence<Song>, favourite: Song? }` and
/// `Song { title, plays, playlist: Playlist? }`.
pub fn register_music(store: &Store) {
    store
        .register(
            EntitySchema::new("Song")
                .with_field(FieldDescriptor::new("title", FieldKind::String))
                .with_field(FieldDescriptor::new("plays", FieldKind::Integer).with_default(0))
                .with_field(
                    FieldDescriptor::new("playlist", FieldKind::reference("Playlist"))
                        .empty_by_default(),
                ),
        )
        .unwrap();
    store
        .register(
            EntitySchema::new("Playlist")
                .with_field(FieldDescriptor::new("title", FieldKind::String))
                .with_field(
                    FieldDescriptor::new("songs", FieldKind::sequence_of("Song"))
                        .empty_by_default(),
                )
                .with_field(
                    FieldDescriptor::new("favourite", FieldKind::reference("Song"))
                        .empty_by_default(),
                ),
        )
        .unwrap();
}
