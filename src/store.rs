//! JSON record store: one pretty-printed `{specimen}.json` per specimen,
//! overwritten on re-ingest.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::model::ReportRecord;

pub fn record_path(dir: &Path, specimen: &str) -> PathBuf {
    dir.join(format!("{specimen}.json"))
}

/// Save a record, creating the store directory on first use.
pub fn save(dir: &Path, record: &ReportRecord) -> Result<PathBuf, Error> {
    fs::create_dir_all(dir)
        .map_err(|e| io::Error::new(e.kind(), format!("failed to create {}: {e}", dir.display())))?;
    let path = record_path(dir, &record.specimen);
    let json = serde_json::to_string_pretty(record)?;
    fs::write(&path, json)
        .map_err(|e| io::Error::new(e.kind(), format!("failed to write {}: {e}", path.display())))?;
    log::debug!("saved record {}", path.display());
    Ok(path)
}

pub fn load(dir: &Path, specimen: &str) -> Result<ReportRecord, Error> {
    let path = record_path(dir, specimen);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::RecordMissing(specimen.to_owned()));
        }
        Err(e) => {
            return Err(io::Error::new(e.kind(), format!("failed to open {}: {e}", path.display()))
                .into());
        }
    };
    Ok(serde_json::from_str(&content)?)
}

/// Specimen ids present in the store, sorted. A store directory that does
/// not exist yet simply has no records.
pub fn list(dir: &Path) -> Result<Vec<String>, Error> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut ids = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json")
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            ids.push(stem.to_owned());
        }
    }
    ids.sort();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Panel;

    fn scratch(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("oncodeck-store-{tag}-{}", std::process::id()))
    }

    #[test]
    fn save_load_round_trip() {
        let dir = scratch("roundtrip");
        let record = ReportRecord {
            specimen: "SS2430925".into(),
            panel: Panel::Sa,
            tmb: "4.7 /Megabase".into(),
            ..Default::default()
        };
        save(&dir, &record).unwrap();
        let loaded = load(&dir, "SS2430925").unwrap();
        assert_eq!(loaded.specimen, "SS2430925");
        assert_eq!(loaded.panel, Panel::Sa);
        assert_eq!(loaded.tmb, "4.7 /Megabase");
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_missing_record_is_typed() {
        let dir = scratch("missing");
        match load(&dir, "nope") {
            Err(Error::RecordMissing(id)) => assert_eq!(id, "nope"),
            other => panic!("expected RecordMissing, got {other:?}"),
        }
    }

    #[test]
    fn list_ignores_foreign_files() {
        let dir = scratch("list");
        fs::create_dir_all(&dir).unwrap();
        save(&dir, &ReportRecord { specimen: "B2".into(), ..Default::default() }).unwrap();
        save(&dir, &ReportRecord { specimen: "A1".into(), ..Default::default() }).unwrap();
        fs::write(dir.join("notes.txt"), "x").unwrap();
        assert_eq!(list(&dir).unwrap(), vec!["A1", "B2"]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn list_of_absent_dir_is_empty() {
        assert!(list(Path::new("/definitely/not/here")).unwrap().is_empty());
    }
}
