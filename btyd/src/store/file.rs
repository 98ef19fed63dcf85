use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use anyhow::{anyhow, Context, Result};
use shared::types::{HostRecord, MacAddress};
use super::Hosts;

/// The host store as a single JSON document on disk.
///
/// The document is a top-level object keyed by canonical hardware address,
/// pretty-printed with two-space indentation and sorted keys so it diffs
/// cleanly under version control.
#[derive(Debug, Clone)]
pub struct HostStore {
    path: PathBuf,
}

impl HostStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write an empty store if none exists yet. Returns true if one was created.
    pub fn init_if_missing(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        self.save(&Hosts::new())?;
        Ok(true)
    }

    /// Read every host record. Fails if the document is missing or malformed.
    pub fn load(&self) -> Result<Hosts> {
        if !self.path.exists() {
            return Err(anyhow!("Host store does not exist: {}", self.path.display()));
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read host store: {}", self.path.display()))?;

        let raw: BTreeMap<MacAddress, serde_json::Value> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse host store: {}", self.path.display()))?;

        let mut hosts = Hosts::new();
        for (hwa, mut body) in raw {
            // The key is the identity; a hand-edited body may omit or contradict it
            if let Some(fields) = body.as_object_mut() {
                if fields.get("hwa").map_or(true, |v| v.is_null()) {
                    fields.insert("hwa".to_string(), hwa.to_string().into());
                }
            }

            let mut record: HostRecord = serde_json::from_value(body)
                .with_context(|| format!("Failed to parse host {} in {}", hwa, self.path.display()))?;
            if record.hwa != hwa {
                tracing::warn!("Record under {} claims hwa {}, using {}", hwa, record.hwa, hwa);
                record.hwa = hwa;
            }
            hosts.insert(hwa, record);
        }

        Ok(hosts)
    }

    /// Replace the document on disk with `hosts`.
    pub fn save(&self, hosts: &Hosts) -> Result<()> {
        let mut json = serde_json::to_string_pretty(hosts).context("Failed to serialize hosts")?;
        json.push('\n');

        write_atomic(&self.path, json.as_bytes())
            .with_context(|| format!("Failed to write host store: {}", self.path.display()))
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `contents` to a hidden temporary file beside `path`, then rename it
/// over `path`. Readers see either the old file or the new one, never a
/// partially written one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("Not a file path: {}", path.display()))?
        .to_string_lossy();
    let temp_path = dir.join(format!(
        ".{}.{}.{}.tmp",
        name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let result = (|| {
        let mut file = File::create(&temp_path)
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        file.write_all(contents)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync {}", temp_path.display()))?;
        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename {} to {}", temp_path.display(), path.display()))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hwa(s: &str) -> MacAddress {
        s.parse().unwrap()
    }

    fn test_hosts() -> Hosts {
        let mut managed = HostRecord::new(hwa("AA:BB:CC:11:22:33"));
        managed.managed = true;
        managed.hostname = Some("node1".to_string());
        managed.image = Some("img1".to_string());
        managed.pxe_default = Some("install".to_string());

        let fresh = HostRecord::new(hwa("00:11:22:33:44:55"));

        [managed, fresh].into_iter().map(|r| (r.hwa, r)).collect()
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = HostStore::new(dir.path().join("bty.json"));
        let hosts = test_hosts();

        store.save(&hosts).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, hosts);
    }

    #[test]
    fn test_load_missing_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = HostStore::new(dir.path().join("bty.json"));

        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_load_malformed_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = HostStore::new(dir.path().join("bty.json"));
        fs::write(store.path(), "{ not json").unwrap();

        assert!(store.load().is_err());
    }

    #[test]
    fn test_saved_document_is_sorted_and_indented() {
        let dir = tempfile::tempdir().unwrap();
        let store = HostStore::new(dir.path().join("bty.json"));
        store.save(&test_hosts()).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        let first = text.find("\"00:11:22:33:44:55\"").unwrap();
        let second = text.find("\"AA:BB:CC:11:22:33\"").unwrap();
        assert!(first < second, "keys should be sorted");
        assert!(text.starts_with("{\n  \"00:11:22:33:44:55\": {\n    \"hostname\": null,"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_load_legacy_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = HostStore::new(dir.path().join("bty.json"));
        fs::write(
            store.path(),
            r#"{"aa:bb:cc:11:22:33": {"hwa": "AA:BB:CC:11:22:33", "img": "img1", "hostname": "node1", "managed": true, "pxe_default": null}}"#,
        )
        .unwrap();

        let hosts = store.load().unwrap();
        let record = &hosts[&hwa("AA:BB:CC:11:22:33")];
        assert_eq!(record.image.as_deref(), Some("img1"));

        store.save(&hosts).unwrap();
        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\"image\": \"img1\""));
        assert!(!text.contains("\"img\""));
    }

    #[test]
    fn test_load_trusts_key_over_record_hwa() {
        let dir = tempfile::tempdir().unwrap();
        let store = HostStore::new(dir.path().join("bty.json"));
        fs::write(
            store.path(),
            r#"{"AA:BB:CC:11:22:33": {"hwa": "00:00:00:00:00:01", "managed": false}}"#,
        )
        .unwrap();

        let hosts = store.load().unwrap();
        assert_eq!(hosts[&hwa("AA:BB:CC:11:22:33")].hwa, hwa("AA:BB:CC:11:22:33"));
    }

    #[test]
    fn test_load_fills_missing_hwa_from_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = HostStore::new(dir.path().join("bty.json"));
        fs::write(
            store.path(),
            r#"{"00:00:00:00:00:01": {"managed": false}, "00:00:00:00:00:02": {"hwa": null, "hostname": "n2"}}"#,
        )
        .unwrap();

        let hosts = store.load().unwrap();
        assert_eq!(hosts[&hwa("00:00:00:00:00:01")], HostRecord::new(hwa("00:00:00:00:00:01")));
        assert_eq!(hosts[&hwa("00:00:00:00:00:02")].hwa, hwa("00:00:00:00:00:02"));
        assert_eq!(hosts[&hwa("00:00:00:00:00:02")].hostname.as_deref(), Some("n2"));
    }

    #[test]
    fn test_init_if_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = HostStore::new(dir.path().join("state").join("bty.json"));

        assert!(store.init_if_missing().unwrap());
        assert!(store.load().unwrap().is_empty());

        store.save(&test_hosts()).unwrap();
        assert!(!store.init_if_missing().unwrap());
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("01-aa-bb-cc-11-22-33");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_atomic_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("file");

        assert!(write_atomic(&path, b"data").is_err());
    }
}
