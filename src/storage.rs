//! Newline-delimited JSON files and binary artifact persistence.
//!
//! The pipeline's intermediate files are JSONL: one UTF-8 JSON object per
//! line, non-ASCII preserved literally. Binary artifacts (embedding archive,
//! search index) are bincode blobs.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};

/// Incremental JSONL writer; records become visible as they are written.
pub struct JsonlWriter {
    writer: BufWriter<File>,
}

impl JsonlWriter {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn write_record<T: Serialize>(&mut self, record: &T) -> Result<()> {
        // serde_json leaves non-ASCII unescaped, as the file format requires.
        let line = serde_json::to_string(record)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Write a whole collection as JSONL in one pass.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut writer = JsonlWriter::create(path)?;
    for record in records {
        writer.write_record(record)?;
    }
    Ok(())
}

/// Read a JSONL file, failing fast on the first malformed line.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)
        .map_err(|e| Error::NotFound(format!("{}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: T = serde_json::from_str(&line).map_err(|e| {
            Error::Serialization(format!(
                "{} line {}: {}",
                path.display(),
                line_no + 1,
                e
            ))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Read a JSONL file, skipping malformed lines with a warning each.
pub fn read_jsonl_lenient<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)
        .map_err(|e| Error::NotFound(format!("{}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(
                    "Skipping malformed line {} in {}: {}",
                    line_no + 1,
                    path.display(),
                    e
                );
            }
        }
    }
    Ok(records)
}

/// Persist a value as a bincode blob, creating parent directories.
pub fn save_bincode<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    bincode::serialize_into(BufWriter::new(file), value)?;
    Ok(())
}

/// Load a bincode blob persisted by [`save_bincode`].
pub fn load_bincode<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)
        .map_err(|e| Error::NotFound(format!("{}: {}", path.display(), e)))?;
    let value = bincode::deserialize_from(BufReader::new(file))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        id: String,
        text: String,
    }

    #[test]
    fn test_jsonl_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");

        let records = vec![
            Record {
                id: "a".to_string(),
                text: "first".to_string(),
            },
            Record {
                id: "b".to_string(),
                text: "second".to_string(),
            },
        ];

        write_jsonl(&path, &records).unwrap();
        let loaded: Vec<Record> = read_jsonl(&path).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_non_ascii_is_written_literally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");

        let records = vec![Record {
            id: "es".to_string(),
            text: "Segunda Guerra Mundial — Göring, señal".to_string(),
        }];
        write_jsonl(&path, &records).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Göring"));
        assert!(raw.contains("señal"));
        assert!(!raw.contains("\\u"));
    }

    #[test]
    fn test_strict_reader_fails_on_malformed_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        std::fs::write(&path, "{\"id\":\"a\",\"text\":\"ok\"}\nnot json\n").unwrap();

        let result: Result<Vec<Record>> = read_jsonl(&path);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_lenient_reader_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        std::fs::write(
            &path,
            "{\"id\":\"a\",\"text\":\"ok\"}\nnot json\n{\"id\":\"b\",\"text\":\"also ok\"}\n",
        )
        .unwrap();

        let records: Vec<Record> = read_jsonl_lenient(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "a");
        assert_eq!(records[1].id, "b");
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<Vec<Record>> = read_jsonl(&dir.path().join("absent.jsonl"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_bincode_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/blob.bin");

        let value = vec![1.0f32, 2.0, 3.0];
        save_bincode(&path, &value).unwrap();
        let loaded: Vec<f32> = load_bincode(&path).unwrap();
        assert_eq!(loaded, value);
    }
}
