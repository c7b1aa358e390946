use crate::error::{AcgError, ErrorCode};
use crate::migration::CHARACTER_TABLE_VERSION;
use crate::ndjson;
use crate::query::{Condition, Operator, Query};
use crate::records::{AnimeEntry, Category, Character, MangaEntry, Person, TableKind, WorkKind};
use crate::store::{Store, StoreConfig};
use crate::tests::mock::{
    anime, catalog_store, category, character, ephemeral_store, persistent_store,
};

use serde_json::json;
use tempfile::TempDir;

use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn catalog_scenario() {
    let (store, _directory) = ephemeral_store().await;

    let hana = store
        .add_data::<Person>(json!({ "name": "Hana", "nameInJapanese": "ハナ" }))
        .await
        .unwrap();
    let fiction = store
        .add_data::<Category>(json!({ "name": "Fiction" }))
        .await
        .unwrap();
    let hana = hana.id().unwrap();
    let fiction = fiction.id().unwrap();

    let x = json!({
        "name": "X",
        "nameInJapanese": "エックス",
        "year": 2001,
        "description": "",
        "author": [hana],
        "category": [fiction]
    });

    let status = store.add_data::<AnimeEntry>(x.clone()).await.unwrap();
    assert!(status.success);
    assert_eq!(status.id(), Some(1));

    let status = store.add_data::<AnimeEntry>(x).await.unwrap();
    assert!(!status.success);
    assert_eq!(status.code, ErrorCode::DuplicateEntry);

    let status = store.remove_data::<Category>(fiction).await.unwrap();
    assert_eq!(status.code, ErrorCode::HavingRemoteDependencies);
    assert_eq!(
        status.text(),
        Some("Cannot delete the entry because it is referenced by entry in ANIME")
    );

    assert!(store.remove_data::<AnimeEntry>(1).await.unwrap().success);
    assert!(store.remove_data::<Category>(fiction).await.unwrap().success);
    assert!(store.get_data::<Category>(fiction).await.unwrap().is_none());
}

#[tokio::test]
async fn add_rejects_invalid_data_and_ignores_ids() {
    let (store, _directory) = ephemeral_store().await;

    let status = store
        .add_data::<Category>(json!({ "title": "Fiction" }))
        .await
        .unwrap();
    assert_eq!(status.code, ErrorCode::InvalidData);
    assert_eq!(status.text(), Some("Invalid data"));

    let status = store.add_data::<Category>(json!("Fiction")).await.unwrap();
    assert_eq!(status.code, ErrorCode::InvalidData);

    let status = store
        .add_data::<Category>(json!({ "id": 99, "name": "Fiction", "extra": true }))
        .await
        .unwrap();
    assert_eq!(status.id(), Some(1));

    let stored = store.get_data::<Category>(1).await.unwrap().unwrap();
    assert_eq!(stored, Category { id: 1, name: "Fiction".to_string() });
    assert!(store.get_data::<Category>(99).await.unwrap().is_none());
    assert_eq!(store.len::<Category>().await.unwrap(), 1);
}

#[tokio::test]
async fn duplicates_are_case_insensitive() {
    let (store, _directory) = ephemeral_store().await;

    assert!(store.add_record(category("Fiction")).await.unwrap().success);

    let status = store.add_record(category("FICTION")).await.unwrap();
    assert_eq!(status.code, ErrorCode::DuplicateEntry);

    assert!(store.add_record(category("Non-fiction")).await.unwrap().success);
    assert_eq!(store.len::<Category>().await.unwrap(), 2);
}

#[tokio::test]
async fn dangling_references_are_rejected() {
    let (store, _directory) = ephemeral_store().await;

    let status = store.add_record(anime("X", vec![7], Vec::new())).await.unwrap();
    assert_eq!(status.code, ErrorCode::IntegrityTestFailed);
    assert_eq!(
        status.text(),
        Some("Failed to resolve pointer PERSON{id=7} at ANIME{id=0}")
    );
    assert_eq!(store.len::<AnimeEntry>().await.unwrap(), 0);

    let status = store
        .add_record(character("Ai", vec![(1, WorkKind::Manga)]))
        .await
        .unwrap();
    assert_eq!(status.code, ErrorCode::IntegrityTestFailed);
}

#[tokio::test]
async fn update_patches_only_allowed_fields() {
    let (store, _directory) = catalog_store().await;

    let status = store
        .update_data::<AnimeEntry>(1, json!({ "id": 5, "year": 2003, "unknown": "x" }))
        .await
        .unwrap();
    assert!(status.success);

    let updated = store.get_data::<AnimeEntry>(1).await.unwrap().unwrap();
    assert_eq!(updated.id, 1);
    assert_eq!(updated.year, 2003);
    assert!(store.get_data::<AnimeEntry>(5).await.unwrap().is_none());

    let status = store.update_data::<AnimeEntry>(9, json!({ "year": 1 })).await.unwrap();
    assert_eq!(status.code, ErrorCode::EntryNotFound);
}

#[tokio::test]
async fn rejected_updates_leave_the_row_untouched() {
    let (store, _directory) = catalog_store().await;
    let before = store.get_data::<AnimeEntry>(1).await.unwrap().unwrap();
    let hash = store.get_hash::<AnimeEntry>(1).await.unwrap();

    let status = store
        .update_data::<AnimeEntry>(1, json!({ "year": "soon" }))
        .await
        .unwrap();
    assert_eq!(status.code, ErrorCode::PatchFailed);

    let status = store
        .update_data::<AnimeEntry>(1, json!({ "name": "Renamed", "author": [1, 42] }))
        .await
        .unwrap();
    assert_eq!(status.code, ErrorCode::IntegrityTestFailed);
    assert_eq!(
        status.text(),
        Some("Cannot patch the data as Failed to resolve pointer PERSON{id=42} at ANIME{id=1}")
    );

    store
        .add_record(anime("Other", vec![1], Vec::new()))
        .await
        .unwrap();
    let status = store
        .update_data::<AnimeEntry>(
            2,
            json!({ "name": "planetes", "nameInJapanese": "PLANETES (JP)" }),
        )
        .await
        .unwrap();
    assert_eq!(status.code, ErrorCode::DuplicateEntry);
    assert!(status.text().unwrap().starts_with("Cannot patch the data as "));

    assert_eq!(store.get_data::<AnimeEntry>(1).await.unwrap(), Some(before));
    assert_eq!(store.get_hash::<AnimeEntry>(1).await.unwrap(), hash);
}

#[tokio::test]
async fn updating_a_row_does_not_conflict_with_itself() {
    let (store, _directory) = catalog_store().await;

    let status = store
        .update_data::<Person>(1, json!({ "name": "HANA" }))
        .await
        .unwrap();
    assert!(status.success);
    assert_eq!(store.get_data::<Person>(1).await.unwrap().unwrap().name, "HANA");
}

#[tokio::test]
async fn hashes_change_with_content() {
    let (store, _directory) = catalog_store().await;

    let before = store.get_hash::<Category>(1).await.unwrap().unwrap();
    assert_eq!(before.len(), 64);

    store
        .update_data::<Category>(1, json!({ "name": "Fiction" }))
        .await
        .unwrap();
    assert_eq!(store.get_hash::<Category>(1).await.unwrap(), Some(before.clone()));

    store
        .update_data::<Category>(1, json!({ "name": "Science fiction" }))
        .await
        .unwrap();
    assert_ne!(store.get_hash::<Category>(1).await.unwrap(), Some(before));
    assert_eq!(store.get_hash::<Category>(9).await.unwrap(), None);
}

#[tokio::test]
async fn remove_checks_every_referrer() {
    let (store, _directory) = catalog_store().await;

    let status = store.remove_data::<Person>(1).await.unwrap();
    assert_eq!(status.code, ErrorCode::HavingRemoteDependencies);

    let status = store.remove_data::<AnimeEntry>(1).await.unwrap();
    assert_eq!(status.code, ErrorCode::HavingRemoteDependencies);
    assert_eq!(
        status.text(),
        Some("Cannot delete the entry because it is referenced by entry in CHARACTER")
    );

    let status = store.remove_data::<Character>(7).await.unwrap();
    assert_eq!(status.code, ErrorCode::EntryNotFound);

    assert!(store.remove_data::<Character>(1).await.unwrap().success);
    assert!(store.remove_data::<AnimeEntry>(1).await.unwrap().success);

    let status = store.remove_data::<Person>(1).await.unwrap();
    assert_eq!(
        status.text(),
        Some("Cannot delete the entry because it is referenced by entry in MANGA")
    );

    assert!(store.remove_data::<MangaEntry>(1).await.unwrap().success);
    assert!(store.remove_data::<Person>(1).await.unwrap().success);
}

#[tokio::test]
async fn iterate_keys_filters_and_stops() {
    let (store, _directory) = ephemeral_store().await;
    for name in ["Action", "Drama", "Comedy", "Adventure"] {
        store.add_record(category(name)).await.unwrap();
    }

    let all: Vec<u64> = store
        .iterate_keys::<Category>(None)
        .await
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(all, vec![1, 2, 3, 4]);

    let starts_with_a: Vec<u64> = store
        .iterate_keys::<Category>(Some(Box::new(|c: &Category| c.name.starts_with('A'))))
        .await
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(starts_with_a, vec![1, 4]);

    let mut keys = store.iterate_keys::<Category>(None).await.unwrap();
    assert_eq!(keys.next().unwrap().unwrap(), 1);
    assert!(keys.is_active());
    keys.stop();
    assert!(!keys.is_active());
    assert!(keys.next().is_none());

    // The scan released its guard, so a writer gets through.
    assert!(store.add_record(category("Horror")).await.unwrap().success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scans_allow_reads_while_a_writer_waits() {
    let (store, _directory) = ephemeral_store().await;
    for name in ["Action", "Drama", "Comedy"] {
        store.add_record(category(name)).await.unwrap();
    }
    let store = Arc::new(store);

    let keys = store.iterate_keys::<Category>(None).await.unwrap();

    let writer = {
        let store = store.clone();
        tokio::spawn(async move { store.add_record(category("Horror")).await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let names = tokio::time::timeout(Duration::from_secs(3), async {
        let mut names = Vec::new();
        for id in keys {
            let row = store.get_data::<Category>(id.unwrap()).await.unwrap().unwrap();
            names.push(row.name);
        }
        names
    })
    .await
    .unwrap();
    assert_eq!(names, vec!["Action", "Drama", "Comedy"]);

    assert!(writer.await.unwrap().success);
    assert_eq!(store.len::<Category>().await.unwrap(), 4);
}

#[tokio::test]
async fn scans_allow_reads_without_concurrent_reads() {
    let directory = TempDir::new().unwrap();
    let store = Store::new(
        StoreConfig::default()
            .with_directory(directory.path())
            .with_save_on_close(false)
            .with_concurrent_reads(false),
    );
    store.init().await.unwrap();
    store.add_record(category("Fiction")).await.unwrap();

    let mut keys = store.iterate_keys::<Category>(None).await.unwrap();
    let id = keys.next().unwrap().unwrap();

    let row = tokio::time::timeout(Duration::from_secs(2), store.get_data::<Category>(id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.unwrap().name, "Fiction");

    let status = tokio::time::timeout(Duration::from_secs(2), store.add_record(category("Drama")))
        .await
        .unwrap()
        .unwrap();
    assert!(status.success);
    assert!(keys.next().is_none());
}

#[tokio::test]
async fn iterate_keys_if_uses_the_partner() {
    let (store, _directory) = catalog_store().await;

    let query = Query::from(Condition::with_rhs("category", Operator::IncludesSet, json!([1])));
    let keys: Vec<u64> = store
        .iterate_keys_if::<AnimeEntry>(None, query)
        .await
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(keys, vec![1]);

    let partner = category("FICTION");
    let query = Query::from(Condition::new("name", Operator::EqualsInsensitive));
    let keys: Vec<u64> = store
        .iterate_keys_if(Some(&partner), query.clone())
        .await
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(keys, vec![1]);

    assert!(matches!(
        store.iterate_keys_if::<Category>(None, query).await,
        Err(AcgError::Query(_))
    ));

    let mismatch = query!(name > 3);
    let mut keys = store.iterate_keys_if::<Category>(None, mismatch).await.unwrap();
    assert!(matches!(keys.next(), Some(Err(AcgError::Query(_)))));
    assert!(!keys.is_active());
}

#[tokio::test]
async fn converters_may_look_up_more_rows() {
    let (store, _directory) = catalog_store().await;

    let authors = store
        .get_data_with(1, |entry: AnimeEntry, store| async move {
            let mut names = Vec::new();
            for id in entry.author.unwrap_or_default() {
                if let Some(person) = store.get_data::<Person>(id).await? {
                    names.push(person.name);
                }
            }
            // Writing the same table from inside the converter must not deadlock.
            store.update_data::<AnimeEntry>(1, json!({ "year": 2004 })).await?;
            Ok::<_, AcgError>(names)
        })
        .await
        .unwrap();

    assert_eq!(authors, Some(vec!["Hana".to_string()]));
    assert_eq!(store.get_data::<AnimeEntry>(1).await.unwrap().unwrap().year, 2004);

    let missing = store
        .get_data_with(9, |entry: AnimeEntry, _store| async move {
            Ok::<_, AcgError>(entry.name)
        })
        .await
        .unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
async fn unregistered_tables_are_fatal() {
    let directory = TempDir::new().unwrap();
    let store = Store::new(StoreConfig::default().with_directory(directory.path()));

    assert!(!store.is_registered(TableKind::Category));
    assert!(matches!(
        store.get_data::<Category>(1).await,
        Err(AcgError::Unregistered(TableKind::Category))
    ));
    assert!(matches!(
        store.add_record(category("Fiction")).await,
        Err(AcgError::Unregistered(TableKind::Category))
    ));
}

#[tokio::test]
async fn reinit_is_fatal_in_production() {
    let directory = TempDir::new().unwrap();

    let store = Store::new(
        StoreConfig::default()
            .with_directory(directory.path())
            .with_save_on_close(false),
    );
    store.init().await.unwrap();
    assert!(store.init().await.is_ok());

    let store = Store::new(
        StoreConfig::default()
            .with_directory(directory.path())
            .with_production(true),
    );
    store.init().await.unwrap();
    assert!(matches!(
        store.init().await,
        Err(AcgError::AlreadyRegistered(TableKind::Category))
    ));
    assert!(store.is_registered(TableKind::Category));
}

#[tokio::test]
async fn close_writes_dirty_tables_only() {
    let directory = TempDir::new().unwrap();

    let store = persistent_store(&directory).await;
    store.add_record(category("Fiction")).await.unwrap();
    store.close().await.unwrap();

    for kind in TableKind::ALL {
        assert!(directory.path().join(kind.file_name()).exists());
    }

    let path = directory.path().join(TableKind::Person.file_name());
    std::fs::write(&path, "1\n{\"id\":3,\"name\":\"Hana\",\"nameInJapanese\":\"ハナ\"}\n").unwrap();

    let store = persistent_store(&directory).await;
    assert_eq!(store.get_data::<Category>(1).await.unwrap().unwrap().name, "Fiction");
    store.add_record(category("Drama")).await.unwrap();
    std::fs::remove_file(&path).ok();
    std::fs::write(&path, "1\n").unwrap();
    store.close().await.unwrap();

    // The person table was loaded clean and never changed, so its file is left alone.
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\n");

    let info = ndjson::read(directory.path().join(TableKind::Category.file_name()))
        .await
        .unwrap();
    assert_eq!(info.payload.len(), 2);
}

#[tokio::test]
async fn ephemeral_stores_write_nothing() {
    let (store, directory) = ephemeral_store().await;

    store.add_record(category("Fiction")).await.unwrap();
    store.close().await.unwrap();

    assert_eq!(std::fs::read_dir(directory.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn outdated_tables_are_migrated_and_written_back() {
    let directory = TempDir::new().unwrap();

    std::fs::write(
        directory.path().join(TableKind::Anime.file_name()),
        "1\n{\"id\":2,\"name\":\"Cowboy Bebop\",\"nameInJapanese\":\"カウボーイビバップ\",\"year\":1998,\"description\":\"\"}\n",
    )
    .unwrap();
    std::fs::write(
        directory.path().join(TableKind::Character.file_name()),
        "1\n{\"id\":1,\"name\":\"Spike\",\"nameInJapanese\":\"スパイク\",\"gender\":\"male\",\"presentOn\":{\"id\":2,\"name\":\"Cowboy Bebop\",\"type\":\"anime\"}}\n",
    )
    .unwrap();

    let store = persistent_store(&directory).await;
    let spike = store.get_data::<Character>(1).await.unwrap().unwrap();
    assert_eq!(spike.description, "<unknown>");
    assert_eq!(spike.present_on.len(), 1);
    store.close().await.unwrap();

    let info = ndjson::read(directory.path().join(TableKind::Character.file_name()))
        .await
        .unwrap();
    assert_eq!(info.version, CHARACTER_TABLE_VERSION);
    assert_eq!(info.payload[0]["presentOn"], json!([{ "id": 2, "type": "anime" }]));
    assert_eq!(info.payload[0]["description"], json!("<unknown>"));
}

#[tokio::test]
async fn broken_tables_fail_init() {
    let directory = TempDir::new().unwrap();
    let path = directory.path().join(TableKind::Category.file_name());

    std::fs::write(&path, "1\n{\"id\":1,\"name\":\"A\"}\n{\"id\":1,\"name\":\"B\"}\n").unwrap();
    let store = persistent_store_result(&directory).await;
    assert!(matches!(store, Err(AcgError::NonUniqueIds(1))));

    std::fs::write(&path, "3\n").unwrap();
    let store = persistent_store_result(&directory).await;
    assert!(matches!(store, Err(AcgError::IncompatibleVersion { .. })));

    std::fs::write(&path, "1\nnot json\n").unwrap();
    let store = persistent_store_result(&directory).await;
    assert!(matches!(store, Err(AcgError::Format { line: 2, .. })));
}

async fn persistent_store_result(directory: &TempDir) -> Result<Store, AcgError> {
    let store = Store::new(StoreConfig::default().with_directory(directory.path()));
    store.init().await?;
    Ok(store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_never_duplicate() {
    let (store, _directory) = ephemeral_store().await;
    let store = Arc::new(store);

    let mut handles = Vec::new();
    for n in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let name = if n % 2 == 0 { "Fiction" } else { "Drama" };
            store.add_record(category(name)).await.unwrap()
        }));
    }

    let mut committed = 0;
    for handle in handles {
        if handle.await.unwrap().success {
            committed += 1;
        }
    }

    assert_eq!(committed, 2);
    assert_eq!(store.len::<Category>().await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cross_table_mutations_do_not_deadlock() {
    let (store, _directory) = catalog_store().await;
    let store = Arc::new(store);

    let mut handles = Vec::new();
    for n in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let name = format!("Series {}", n);
            let status = store.add_record(anime(&name, vec![1], vec![1])).await.unwrap();
            let id = status.id().unwrap();
            store
                .add_record(character(&name, vec![(id, WorkKind::Anime)]))
                .await
                .unwrap();
            store.remove_data::<Person>(1).await.unwrap();
            store.verify_integrity().await.unwrap()
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().is_empty());
    }

    assert_eq!(store.len::<AnimeEntry>().await.unwrap(), 9);
    assert_eq!(store.len::<Character>().await.unwrap(), 9);
}
