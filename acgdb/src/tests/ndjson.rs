use crate::error::AcgError;
use crate::ndjson::{self, NdJsonInfo};
use crate::tests::mock::category;

use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn parse_reads_version_and_records() {
    let data = b"2\n{\"id\":1,\"name\":\"Fiction\"}\n\n{\"id\":2,\"name\":\"Drama\"}";

    let info = ndjson::parse(&data[..]).await.unwrap();

    assert_eq!(
        info,
        NdJsonInfo {
            version: 2,
            payload: vec![
                json!({ "id": 1, "name": "Fiction" }),
                json!({ "id": 2, "name": "Drama" })
            ],
        }
    );
}

#[tokio::test]
async fn parse_reports_the_bad_line() {
    let data = b"1\n{\"id\":1}\n{\"id\":\n{\"id\":3}\n";
    assert!(matches!(
        ndjson::parse(&data[..]).await,
        Err(AcgError::Format { line: 3, .. })
    ));

    let truncated = b"1\n{\"id\":1}\n{\"id\":2";
    assert!(matches!(
        ndjson::parse(&truncated[..]).await,
        Err(AcgError::Format { line: 3, .. })
    ));

    assert!(matches!(
        ndjson::parse(&b"one\n{}\n"[..]).await,
        Err(AcgError::Format { line: 1, .. })
    ));
    assert!(matches!(
        ndjson::parse(&b""[..]).await,
        Err(AcgError::Format { line: 1, .. })
    ));
}

#[tokio::test]
async fn encode_writes_one_line_per_record() {
    let mut buffer = Vec::new();
    let records = vec![category("Fiction"), category("Drama")];

    ndjson::encode(&mut buffer, &records, 1).await.unwrap();

    assert_eq!(
        String::from_utf8(buffer).unwrap(),
        "1\n{\"id\":0,\"name\":\"Fiction\"}\n{\"id\":0,\"name\":\"Drama\"}\n"
    );
}

#[tokio::test]
async fn write_replaces_the_file() {
    let directory = TempDir::new().unwrap();
    let path = directory.path().join("nested").join("categories.ndjson");

    ndjson::write(&path, &[category("Fiction")], 1).await.unwrap();
    ndjson::write(&path, &[category("Drama")], 1).await.unwrap();

    let info = ndjson::read(&path).await.unwrap();
    assert_eq!(info.version, 1);
    assert_eq!(info.payload, vec![json!({ "id": 0, "name": "Drama" })]);

    assert!(!path.with_extension("ndjson.tmp").exists());
    assert!(matches!(
        ndjson::read(directory.path().join("missing.ndjson")).await,
        Err(AcgError::Io(_))
    ));
}
