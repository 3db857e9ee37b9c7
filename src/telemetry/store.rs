//! # Sample Store
//!
//! Append-only JSONL partitions, one file per table and operational day:
//!
//! ```text
//! <data_dir>/coverage_log_2024-03-02.jsonl
//! <data_dir>/rtk_status_2024-03-02.jsonl
//! ```
//!
//! The first line of every partition is a schema header. Each append is a
//! single `write` of one complete line straight to the file, so a row is
//! visible to readers as soon as [`SampleStore::append`] returns.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::records::{AggregateStatistic, Record, Sample};
use super::shift::PartitionKey;
use crate::error::{FieldLinkError, Result};

/// Partition file extension
const PARTITION_EXTENSION: &str = "jsonl";

/// Destination for rows produced by workers
pub trait RecordSink: Send + Sync {
    fn append_sample(&self, key: PartitionKey, sample: &Sample) -> Result<()>;

    fn append_statistic(&self, key: PartitionKey, statistic: &AggregateStatistic) -> Result<()>;
}

/// First line of every partition file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SchemaHeader {
    schema: String,
    version: u32,
    columns: Vec<String>,
}

impl SchemaHeader {
    fn of<R: Record>() -> Self {
        Self {
            schema: R::TABLE.to_string(),
            version: R::SCHEMA_VERSION,
            columns: R::COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Per-partition write state, guarded by its own lock
#[derive(Debug, Default)]
struct PartitionState {
    initialized: bool,
}

/// Shift-partitioned, append-only row store
#[derive(Debug)]
pub struct SampleStore {
    root: PathBuf,
    sync_writes: bool,
    partitions: Mutex<HashMap<PathBuf, Arc<Mutex<PartitionState>>>>,
}

impl SampleStore {
    /// Open (and create if needed) the store directory
    ///
    /// # Arguments
    ///
    /// * `root` - Directory holding partition files
    /// * `sync_writes` - Call `sync_data` after every append
    pub fn open<P: AsRef<Path>>(root: P, sync_writes: bool) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("Sample store at {}", root.display());

        Ok(Self {
            root,
            sync_writes,
            partitions: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `table` for `key`
    pub fn partition_path(&self, table: &str, key: PartitionKey) -> PathBuf {
        self.root
            .join(format!("{}_{}.{}", table, key, PARTITION_EXTENSION))
    }

    /// Append one row to the partition for `key`
    ///
    /// The partition is created with its schema header on first reference.
    /// Writers to the same partition are serialized.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or written, or if an
    /// existing partition carries a different schema
    pub fn append<R: Record>(&self, key: PartitionKey, row: &R) -> Result<()> {
        let path = self.partition_path(R::TABLE, key);
        let lock = self.partition_lock(&path)?;
        let mut state = lock.lock().map_err(|_| poisoned(&path))?;

        if !state.initialized {
            self.initialize::<R>(&path)?;
            state.initialized = true;
        }

        let mut line = serde_json::to_vec(row)?;
        line.push(b'\n');

        let mut file = OpenOptions::new().append(true).open(&path)?;
        file.write_all(&line)?;
        if self.sync_writes {
            file.sync_data()?;
        }

        Ok(())
    }

    /// Partition keys present on disk for `table`, oldest first
    pub fn partitions(&self, table: &str) -> Result<Vec<PartitionKey>> {
        let prefix = format!("{}_", table);
        let suffix = format!(".{}", PARTITION_EXTENSION);

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(date) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&suffix))
            else {
                continue;
            };
            if let Ok(key) = date.parse::<PartitionKey>() {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Read every row of one partition
    ///
    /// Lines that fail to parse (a torn write after a crash) are skipped
    /// with a warning. A missing partition reads as empty.
    pub fn read_partition<R: Record>(&self, key: PartitionKey) -> Result<Vec<R>> {
        let path = self.partition_path(R::TABLE, key);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut lines = BufReader::new(file).lines();
        match lines.next() {
            Some(header) => check_header::<R>(&path, &header?)?,
            None => return Ok(Vec::new()),
        }

        let mut rows = Vec::new();
        for (index, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<R>(&line) {
                Ok(row) => rows.push(row),
                Err(e) => warn!("Skipping malformed row {} in {}: {}", index + 2, path.display(), e),
            }
        }

        Ok(rows)
    }

    fn partition_lock(&self, path: &Path) -> Result<Arc<Mutex<PartitionState>>> {
        let mut partitions = self.partitions.lock().map_err(|_| poisoned(&self.root))?;
        Ok(partitions.entry(path.to_path_buf()).or_default().clone())
    }

    /// Create the partition with its header, or validate an existing one
    fn initialize<R: Record>(&self, path: &Path) -> Result<()> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                write_header::<R>(&mut file)?;
                if self.sync_writes {
                    file.sync_all()?;
                }
                info!("Created partition {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => self.reopen::<R>(path),
            Err(e) => Err(e.into()),
        }
    }

    /// Validate a partition written by an earlier run
    fn reopen<R: Record>(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new().read(true).append(true).open(path)?;

        let len = file.metadata()?.len();
        if len == 0 {
            debug!("Partition {} exists but is empty, writing header", path.display());
            return write_header::<R>(&mut file);
        }

        let mut header = String::new();
        BufReader::new(&mut file).read_line(&mut header)?;
        check_header::<R>(path, header.trim_end())?;

        // Terminate a row torn by a crash so the next append starts clean
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            warn!("Partition {} ends with a partial row, terminating it", path.display());
            file.write_all(b"\n")?;
        }

        debug!("Reopened partition {}", path.display());
        Ok(())
    }
}

impl RecordSink for SampleStore {
    fn append_sample(&self, key: PartitionKey, sample: &Sample) -> Result<()> {
        self.append(key, sample)
    }

    fn append_statistic(&self, key: PartitionKey, statistic: &AggregateStatistic) -> Result<()> {
        self.append(key, statistic)
    }
}

fn write_header<R: Record>(file: &mut File) -> Result<()> {
    let mut line = serde_json::to_vec(&SchemaHeader::of::<R>())?;
    line.push(b'\n');
    file.write_all(&line)?;
    Ok(())
}

fn check_header<R: Record>(path: &Path, line: &str) -> Result<()> {
    let mismatch = |reason: String| FieldLinkError::SchemaMismatch {
        path: path.display().to_string(),
        reason,
    };

    let found: SchemaHeader = serde_json::from_str(line)
        .map_err(|e| mismatch(format!("unreadable schema header: {}", e)))?;
    let expected = SchemaHeader::of::<R>();

    if found != expected {
        return Err(mismatch(format!(
            "expected {} v{} {:?}, found {} v{} {:?}",
            expected.schema, expected.version, expected.columns, found.schema, found.version, found.columns
        )));
    }
    Ok(())
}

fn poisoned(path: &Path) -> FieldLinkError {
    FieldLinkError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("partition lock poisoned for {}", path.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LinkMetrics;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::thread;
    use tempfile::TempDir;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn key(s: &str) -> PartitionKey {
        s.parse().unwrap()
    }

    fn sample(entity: &str, ts: NaiveDateTime, rssi: Option<i32>) -> Sample {
        let metrics = LinkMetrics {
            signal_strength: rssi,
            tx_rate: Some(54.0),
            rx_rate: Some(48.0),
        };
        Sample::new(ts, entity, "AA:BB:CC:DD:EE:F1", Some((67.51, 51.91)), &metrics)
    }

    #[test]
    fn test_first_append_creates_partition_with_header() {
        let dir = TempDir::new().unwrap();
        let store = SampleStore::open(dir.path(), false).unwrap();

        store.append(key("2024-03-02"), &sample("R1", at(1, 20, 0), Some(-68))).unwrap();

        let path = store.partition_path("coverage_log", key("2024-03-02"));
        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"schema\":\"coverage_log\""));
        assert!(lines[1].contains("\"signal_strength\":-68"));
    }

    #[test]
    fn test_appends_are_visible_immediately_and_in_order() {
        let dir = TempDir::new().unwrap();
        let store = SampleStore::open(dir.path(), true).unwrap();
        let k = key("2024-03-02");

        for minute in 0..3 {
            store.append(k, &sample("R1", at(2, 1, minute), None)).unwrap();
            let rows: Vec<Sample> = store.read_partition(k).unwrap();
            assert_eq!(rows.len(), minute as usize + 1);
        }

        let rows: Vec<Sample> = store.read_partition(k).unwrap();
        assert_eq!(rows[2].timestamp, at(2, 1, 2));
        assert!(rows.iter().all(|r| r.signal_strength.is_none()));
    }

    #[test]
    fn test_reopen_never_overwrites_existing_rows() {
        let dir = TempDir::new().unwrap();
        let k = key("2024-03-02");

        {
            let store = SampleStore::open(dir.path(), false).unwrap();
            store.append(k, &sample("R1", at(2, 1, 0), Some(-60))).unwrap();
        }

        let store = SampleStore::open(dir.path(), false).unwrap();
        store.append(k, &sample("R2", at(2, 1, 1), Some(-70))).unwrap();

        let rows: Vec<Sample> = store.read_partition(k).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].entity_id, "R1");
        assert_eq!(rows[1].entity_id, "R2");

        let contents = fs::read_to_string(store.partition_path("coverage_log", k)).unwrap();
        assert_eq!(contents.matches("\"schema\"").count(), 1, "Header written exactly once");
    }

    #[test]
    fn test_torn_row_is_terminated_and_skipped() {
        let dir = TempDir::new().unwrap();
        let k = key("2024-03-02");
        {
            let store = SampleStore::open(dir.path(), false).unwrap();
            store.append(k, &sample("R1", at(2, 1, 0), Some(-60))).unwrap();
            let path = store.partition_path("coverage_log", k);
            let mut file = OpenOptions::new().append(true).open(path).unwrap();
            file.write_all(b"{\"timestamp\":\"2024-03-").unwrap();
        }

        let store = SampleStore::open(dir.path(), false).unwrap();
        store.append(k, &sample("R1", at(2, 1, 2), Some(-61))).unwrap();

        let rows: Vec<Sample> = store.read_partition(k).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].signal_strength, Some(-61));
    }

    #[test]
    fn test_schema_mismatch_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = SampleStore::open(dir.path(), false).unwrap();
        let k = key("2024-03-02");
        let path = store.partition_path("coverage_log", k);
        fs::write(&path, "{\"schema\":\"coverage_log\",\"version\":0,\"columns\":[\"rssi\"]}\n").unwrap();

        let result = store.append(k, &sample("R1", at(2, 1, 0), None));
        assert!(matches!(result, Err(FieldLinkError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = SampleStore::open(dir.path(), false).unwrap();
        let k = key("2024-03-02");
        // A directory squatting on the partition path makes the write fail
        fs::create_dir(store.partition_path("coverage_log", k)).unwrap();

        assert!(store.append(k, &sample("R1", at(2, 1, 0), None)).is_err());
    }

    #[test]
    fn test_tables_are_separate() {
        let dir = TempDir::new().unwrap();
        let store = SampleStore::open(dir.path(), false).unwrap();
        let k = key("2024-03-02");

        store.append_sample(k, &sample("R1", at(2, 1, 0), None)).unwrap();
        store
            .append_statistic(k, &AggregateStatistic::error("rtk", at(2, 1, 0), at(2, 1, 0), "refused"))
            .unwrap();

        assert_eq!(store.read_partition::<Sample>(k).unwrap().len(), 1);
        let stats: Vec<AggregateStatistic> = store.read_partition(k).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].error.as_deref(), Some("refused"));
    }

    #[test]
    fn test_partitions_lists_sorted_keys() {
        let dir = TempDir::new().unwrap();
        let store = SampleStore::open(dir.path(), false).unwrap();

        for k in ["2024-03-03", "2024-03-01", "2024-03-02"] {
            store.append(key(k), &sample("R1", at(1, 1, 0), None)).unwrap();
        }
        fs::write(dir.path().join("coverage_log_notes.jsonl"), "").unwrap();
        fs::write(dir.path().join("worker_status.json"), "{}").unwrap();

        let keys: Vec<String> = store
            .partitions("coverage_log")
            .unwrap()
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(keys, vec!["2024-03-01", "2024-03-02", "2024-03-03"]);
        assert!(store.partitions("rtk_status").unwrap().is_empty());
    }

    #[test]
    fn test_missing_partition_reads_empty() {
        let dir = TempDir::new().unwrap();
        let store = SampleStore::open(dir.path(), false).unwrap();
        let rows: Vec<Sample> = store.read_partition(key("2024-01-01")).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_concurrent_writers_share_partition() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SampleStore::open(dir.path(), false).unwrap());
        let k = key("2024-03-02");

        let handles: Vec<_> = (0..4)
            .map(|n| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let entity = format!("R{}", n);
                        store.append(k, &sample(&entity, at(2, 1, i % 60), Some(-60))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let rows: Vec<Sample> = store.read_partition(k).unwrap();
        assert_eq!(rows.len(), 200, "Every row must survive intact");
        let contents = fs::read_to_string(store.partition_path("coverage_log", k)).unwrap();
        assert_eq!(contents.matches("\"schema\"").count(), 1);
    }
}
