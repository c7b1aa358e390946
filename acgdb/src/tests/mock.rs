use crate::records::{
    AnimeEntry, Category, Character, Gender, Id, MangaEntry, Person, Presence, WorkKind,
};
use crate::store::{Store, StoreConfig};

use tempfile::TempDir;

pub fn category(name: impl AsRef<str>) -> Category {
    Category {
        id: 0,
        name: name.as_ref().to_string(),
    }
}

pub fn person(name: impl AsRef<str>, name_in_japanese: impl AsRef<str>) -> Person {
    Person {
        id: 0,
        name: name.as_ref().to_string(),
        name_in_japanese: name_in_japanese.as_ref().to_string(),
    }
}

pub fn anime(name: impl AsRef<str>, author: Vec<Id>, category: Vec<Id>) -> AnimeEntry {
    AnimeEntry {
        id: 0,
        name: name.as_ref().to_string(),
        name_in_japanese: format!("{} (jp)", name.as_ref()),
        year: 1998,
        description: "A series".to_string(),
        category: Some(category),
        author: Some(author),
        publisher: None,
    }
}

pub fn manga(name: impl AsRef<str>, author: Vec<Id>) -> MangaEntry {
    MangaEntry {
        id: 0,
        name: name.as_ref().to_string(),
        name_in_japanese: format!("{} (jp)", name.as_ref()),
        year: 1995,
        description: "A series".to_string(),
        is_finished: true,
        category: None,
        author: Some(author),
        publisher: None,
    }
}

pub fn character(name: impl AsRef<str>, present_on: Vec<(Id, WorkKind)>) -> Character {
    Character {
        id: 0,
        name: name.as_ref().to_string(),
        name_in_japanese: format!("{} (jp)", name.as_ref()),
        gender: Gender::Female,
        description: "A character".to_string(),
        present_on: present_on
            .into_iter()
            .map(|(id, kind)| Presence { id, kind })
            .collect(),
    }
}

/// An initialised store over an empty temporary directory that never writes on close.
pub async fn ephemeral_store() -> (Store, TempDir) {
    let directory = TempDir::new().unwrap();
    let store = Store::new(
        StoreConfig::default()
            .with_directory(directory.path())
            .with_save_on_close(false),
    );
    store.init().await.unwrap();

    (store, directory)
}

/// An initialised store over the given directory that writes dirty tables on close.
pub async fn persistent_store(directory: &TempDir) -> Store {
    let store = Store::new(StoreConfig::default().with_directory(directory.path()));
    store.init().await.unwrap();

    store
}

/// A store holding one author, one category, one anime and one manga by that author, and a
///   character appearing in both.
pub async fn catalog_store() -> (Store, TempDir) {
    let (store, directory) = ephemeral_store().await;

    let author = store.add_record(person("Hana", "ハナ")).await.unwrap();
    let fiction = store.add_record(category("Fiction")).await.unwrap();
    let author = author.id().unwrap();
    let fiction = fiction.id().unwrap();

    let anime_id = store
        .add_record(anime("Planetes", vec![author], vec![fiction]))
        .await
        .unwrap()
        .id()
        .unwrap();
    let manga_id = store
        .add_record(manga("Planetes", vec![author]))
        .await
        .unwrap()
        .id()
        .unwrap();

    store
        .add_record(character(
            "Ai",
            vec![(anime_id, WorkKind::Anime), (manga_id, WorkKind::Manga)],
        ))
        .await
        .unwrap();

    (store, directory)
}
