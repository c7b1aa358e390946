use crate::error::AcgError;
use crate::migration::{self, classify, Compatibility};
use crate::ndjson::NdJsonInfo;
use crate::records::{Category, Character, Presence, TableKind, WorkKind};

use serde_json::json;

#[test]
fn classify_versions() {
    assert_eq!(classify(1, TableKind::Anime), Compatibility::Ok);
    assert_eq!(classify(1, TableKind::Manga), Compatibility::Ok);
    assert_eq!(classify(2, TableKind::Category), Compatibility::Invalid);
    assert_eq!(classify(0, TableKind::Person), Compatibility::Invalid);

    assert_eq!(classify(2, TableKind::Character), Compatibility::Ok);
    assert_eq!(classify(1, TableKind::Character), Compatibility::NeedsMigration);
    assert_eq!(classify(0, TableKind::Character), Compatibility::Invalid);
    assert_eq!(classify(3, TableKind::Character), Compatibility::Invalid);
}

#[test]
fn upgrade_characters_from_v1() {
    let info = NdJsonInfo {
        version: 1,
        payload: vec![json!({
            "id": 4,
            "name": "Spike",
            "nameInJapanese": "スパイク",
            "gender": "male",
            "presentOn": { "id": 2, "name": "Cowboy Bebop", "type": "anime" }
        })],
    };

    let (characters, migrated) = migration::decode::<Character>(info).unwrap();

    assert!(migrated);
    assert_eq!(characters.len(), 1);
    assert_eq!(characters[0].id, 4);
    assert_eq!(characters[0].description, "<unknown>");
    assert_eq!(
        characters[0].present_on,
        vec![Presence {
            id: 2,
            kind: WorkKind::Anime
        }]
    );
}

#[test]
fn malformed_v1_characters_fail_the_migration() {
    let info = NdJsonInfo {
        version: 1,
        payload: vec![json!({
            "id": 4,
            "name": "Spike",
            "nameInJapanese": "スパイク",
            "gender": "robot",
            "presentOn": { "id": 2, "type": "anime" }
        })],
    };

    assert!(matches!(
        migration::decode::<Character>(info),
        Err(AcgError::MigrationFailed {
            kind: TableKind::Character,
            from: 1,
            ..
        })
    ));
}

#[test]
fn current_tables_are_checked_against_their_type() {
    let info = NdJsonInfo {
        version: 1,
        payload: vec![json!({ "id": 1, "name": "Fiction" })],
    };
    let (categories, migrated) = migration::decode::<Category>(info).unwrap();
    assert!(!migrated);
    assert_eq!(categories[0].name, "Fiction");

    let info = NdJsonInfo {
        version: 1,
        payload: vec![json!({ "id": 1 })],
    };
    assert!(matches!(
        migration::decode::<Category>(info),
        Err(AcgError::SchemaViolation { .. })
    ));

    let info = NdJsonInfo {
        version: 5,
        payload: Vec::new(),
    };
    assert!(matches!(
        migration::decode::<Category>(info),
        Err(AcgError::IncompatibleVersion {
            found: 5,
            supported: 1,
            ..
        })
    ));
}
