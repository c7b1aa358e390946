//! The versioned newline-delimited JSON format of table files.
//!
//! The first line of a file is the decimal schema version, every following non-blank line is one
//!   record.

use crate::error::{AcgError, Result};

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

use std::path::Path;

/// The content of a table file before the records are checked against their type.
#[derive(Debug, Clone, PartialEq)]
pub struct NdJsonInfo {
    /// The schema version from the first line.
    pub version: u32,
    /// The records, in file order.
    pub payload: Vec<Value>,
}

fn line_error(line: usize, e: LinesCodecError) -> AcgError {
    match e {
        LinesCodecError::Io(e) => AcgError::Io(e),
        LinesCodecError::MaxLineLengthExceeded => AcgError::Format {
            line,
            message: "line too long".to_string(),
        },
    }
}

/// Parses a table file from any reader, line by line as the data arrives.
pub async fn parse<R>(reader: R) -> Result<NdJsonInfo>
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new());

    let version = match lines.next().await {
        Some(line) => {
            let line = line.map_err(|e| line_error(1, e))?;
            line.trim().parse::<u32>().map_err(|_| AcgError::Format {
                line: 1,
                message: format!("invalid version `{}`", line.trim()),
            })?
        }
        None => {
            return Err(AcgError::Format {
                line: 1,
                message: "missing version line".to_string(),
            })
        }
    };

    let mut payload = Vec::new();
    let mut number = 1;

    while let Some(line) = lines.next().await {
        number += 1;
        let line = line.map_err(|e| line_error(number, e))?;
        if line.trim().is_empty() {
            continue;
        }

        let record = serde_json::from_str(&line).map_err(|e| AcgError::Format {
            line: number,
            message: e.to_string(),
        })?;
        payload.push(record);
    }

    Ok(NdJsonInfo { version, payload })
}

/// Reads the table file at the given path.
pub async fn read(path: impl AsRef<Path>) -> Result<NdJsonInfo> {
    let file = File::open(path).await?;
    parse(file).await
}

/// Streams the version line and then one line per record into the writer.
pub async fn encode<W, T>(writer: W, records: &[T], version: u32) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut lines = FramedWrite::new(writer, LinesCodec::new());

    lines
        .feed(version.to_string())
        .await
        .map_err(|e| line_error(1, e))?;

    for (number, record) in records.iter().enumerate() {
        let json = serde_json::to_string(record)?;
        lines.feed(json).await.map_err(|e| line_error(number + 2, e))?;
    }

    SinkExt::<String>::close(&mut lines)
        .await
        .map_err(|e| line_error(records.len() + 1, e))?;

    Ok(())
}

/// Writes a whole table file.
///
/// The records go to a temporary file next to the target, which then replaces it, so a failed
///   write never leaves a truncated table behind.
pub async fn write<T>(path: impl AsRef<Path>, records: &[T], version: u32) -> Result<()>
where
    T: Serialize,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension("ndjson.tmp");
    if fs::metadata(&temp_path).await.is_ok() {
        fs::remove_file(&temp_path).await?;
    }

    let file = File::create(&temp_path).await?;
    encode(file, records, version).await?;
    fs::rename(&temp_path, path).await?;

    Ok(())
}
