//! In-memory results with periodic partial snapshots and a final write.
//!
//! The partial file is a full rewrite of everything collected so far, made
//! whenever the match count crosses a multiple of the checkpoint interval.
//! The final files are written once, when the store is consumed.

use std::path::{Path, PathBuf};

use threadwatch_common::{
    CsvTableWriter, HarvestConfig, HarvestError, MatchRecord, ParquetTableWriter, Table,
    TableWriter,
};
use tracing::{info, warn};

/// What happened at a checkpoint opportunity.
#[derive(Debug, PartialEq)]
pub enum CheckpointOutcome {
    NotDue,
    Written(PathBuf),
    Failed,
}

/// Result of the final write.
#[derive(Debug, Default)]
pub struct FinalReport {
    pub matches: usize,
    pub written: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

pub struct ResultsStore {
    results: Vec<MatchRecord>,
    output_dir: PathBuf,
    file_stem: String,
    every: usize,
    partial_writer: Box<dyn TableWriter>,
    final_writers: Vec<Box<dyn TableWriter>>,
}

impl ResultsStore {
    /// Parquet partial file, Parquet + CSV final files.
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(
            &config.output_dir,
            &config.file_stem,
            config.checkpoint_every,
            Box::new(ParquetTableWriter),
            vec![Box::new(ParquetTableWriter), Box::new(CsvTableWriter)],
        )
    }

    pub fn new(
        output_dir: &Path,
        file_stem: &str,
        every: usize,
        partial_writer: Box<dyn TableWriter>,
        final_writers: Vec<Box<dyn TableWriter>>,
    ) -> Self {
        Self {
            results: Vec::new(),
            output_dir: output_dir.to_path_buf(),
            file_stem: file_stem.to_string(),
            every: every.max(1),
            partial_writer,
            final_writers,
        }
    }

    pub fn results(&self) -> &[MatchRecord] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn partial_path(&self) -> PathBuf {
        self.output_dir.join(format!(
            "{}_partial.{}",
            self.file_stem,
            self.partial_writer.extension()
        ))
    }

    pub fn final_paths(&self, epoch: i64) -> Vec<PathBuf> {
        self.final_writers
            .iter()
            .map(|w| {
                self.output_dir
                    .join(format!("{}_{epoch}.{}", self.file_stem, w.extension()))
            })
            .collect()
    }

    /// Append matches in order. Returns how many were added.
    pub fn extend(&mut self, matches: Vec<MatchRecord>) -> usize {
        let added = matches.len();
        self.results.extend(matches);
        added
    }

    /// Write the partial file if the last `added` matches crossed a
    /// multiple of the checkpoint interval. Failures are logged, not raised.
    pub fn checkpoint_if_due(&self, added: usize) -> CheckpointOutcome {
        let now = self.results.len();
        let before = now.saturating_sub(added);
        if added == 0 || now / self.every == before / self.every {
            return CheckpointOutcome::NotDue;
        }
        match self.write_checkpoint() {
            Ok(path) => {
                info!(matches = now, path = %path.display(), "Checkpoint written");
                CheckpointOutcome::Written(path)
            }
            Err(e) => {
                warn!(matches = now, error = %e, "Checkpoint write failed");
                CheckpointOutcome::Failed
            }
        }
    }

    /// Overwrite the partial file with every result so far.
    pub fn write_checkpoint(&self) -> Result<PathBuf, HarvestError> {
        let path = self.partial_path();
        self.write_with(self.partial_writer.as_ref(), &path)?;
        Ok(path)
    }

    /// Write the final files named with `epoch`. Skipped when nothing matched.
    /// Consumes the store so it can only happen once.
    pub fn finalize(self, epoch: i64) -> FinalReport {
        let mut report = FinalReport {
            matches: self.results.len(),
            ..FinalReport::default()
        };
        if self.results.is_empty() {
            info!("No matches found; no final files written");
            return report;
        }

        for (writer, path) in self.final_writers.iter().zip(self.final_paths(epoch)) {
            match self.write_with(writer.as_ref(), &path) {
                Ok(()) => {
                    info!(matches = report.matches, path = %path.display(), "Final results written");
                    report.written.push(path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Final write failed");
                    report.failed.push(path);
                }
            }
        }
        report
    }

    fn write_with(&self, writer: &dyn TableWriter, path: &Path) -> Result<(), HarvestError> {
        let persistence = |reason: String| HarvestError::Persistence {
            path: path.to_path_buf(),
            reason,
        };
        std::fs::create_dir_all(&self.output_dir).map_err(|e| persistence(e.to_string()))?;
        writer
            .write(path, &Table::from_records(&self.results))
            .map_err(|e| persistence(format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use threadwatch_common::{ConversationRecord, PostRecord, Query, StatusLink};

    /// Records every table written, keyed by path.
    #[derive(Clone, Default)]
    struct RecordingWriter {
        writes: Arc<Mutex<Vec<(PathBuf, Table)>>>,
        fail: bool,
    }

    impl TableWriter for RecordingWriter {
        fn extension(&self) -> &'static str {
            "rec"
        }

        fn write(&self, path: &Path, table: &Table) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("disk full");
            }
            self.writes
                .lock()
                .unwrap()
                .push((path.to_path_buf(), table.clone()));
            Ok(())
        }
    }

    fn record(n: usize) -> MatchRecord {
        let link = StatusLink::canonicalize(&format!("/u/status/{n}"), "https://x.com").unwrap();
        let hit = PostRecord {
            id: Some(n.to_string()),
            href: None,
            author_handle: Some("grok".to_string()),
            display_name: None,
            body_text: "reply".to_string(),
            published_at: None,
        };
        let mut conv = ConversationRecord::new(link);
        conv.push_unique(hit.clone());
        MatchRecord::new(&Query::new("q", "pt"), &conv, &hit)
    }

    fn store(dir: &Path, partial: RecordingWriter) -> ResultsStore {
        ResultsStore::new(dir, "hits", 10, Box::new(partial), vec![])
    }

    #[test]
    fn checkpoint_fires_when_crossing_interval() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RecordingWriter::default();
        let mut s = store(dir.path(), writer.clone());

        let added = s.extend((0..9).map(record).collect());
        assert_eq!(s.checkpoint_if_due(added), CheckpointOutcome::NotDue);

        let added = s.extend((9..12).map(record).collect());
        assert!(matches!(s.checkpoint_if_due(added), CheckpointOutcome::Written(_)));
        assert_eq!(s.checkpoint_if_due(0), CheckpointOutcome::NotDue);

        let writes = writer.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, dir.path().join("hits_partial.rec"));
        assert_eq!(writes[0].1.len(), 12);
    }

    #[test]
    fn checkpoint_on_exact_multiple() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RecordingWriter::default();
        let mut s = store(dir.path(), writer.clone());
        let added = s.extend((0..10).map(record).collect());
        assert!(matches!(s.checkpoint_if_due(added), CheckpointOutcome::Written(_)));
    }

    #[test]
    fn checkpoint_failure_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RecordingWriter {
            fail: true,
            ..RecordingWriter::default()
        };
        let mut s = store(dir.path(), writer);
        let added = s.extend((0..10).map(record).collect());
        assert_eq!(s.checkpoint_if_due(added), CheckpointOutcome::Failed);
        assert_eq!(s.len(), 10);
    }

    #[test]
    fn repeated_checkpoint_is_an_idempotent_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let s = {
            let mut s = ResultsStore::new(
                dir.path(),
                "hits",
                10,
                Box::new(threadwatch_common::CsvTableWriter),
                vec![],
            );
            s.extend((0..3).map(record).collect());
            s
        };

        let path = s.write_checkpoint().unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        s.write_checkpoint().unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    fn parquet_batches(path: &Path) -> Vec<arrow_array::RecordBatch> {
        let file = std::fs::File::open(path).unwrap();
        parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap()
            .map(|batch| batch.unwrap())
            .collect()
    }

    #[test]
    fn repeated_parquet_checkpoint_rewrites_the_same_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = ResultsStore::from_config(&HarvestConfig {
            output_dir: dir.path().to_path_buf(),
            file_stem: "hits".to_string(),
            ..HarvestConfig::default()
        });
        s.extend((0..3).map(record).collect());

        let path = s.write_checkpoint().unwrap();
        assert_eq!(path, dir.path().join("hits_partial.parquet"));
        let first_bytes = std::fs::read(&path).unwrap();
        let first = parquet_batches(&path);
        s.write_checkpoint().unwrap();
        let second = parquet_batches(&path);

        assert_eq!(first, second);
        assert_eq!(first.iter().map(|b| b.num_rows()).sum::<usize>(), 3);
        assert_eq!(std::fs::read(&path).unwrap(), first_bytes);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn finalize_writes_every_format_with_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = ResultsStore::from_config(&HarvestConfig {
            output_dir: dir.path().join("out"),
            file_stem: "hits".to_string(),
            ..HarvestConfig::default()
        });
        s.extend(vec![record(1)]);

        let report = s.finalize(1_700_000_000);
        assert_eq!(report.matches, 1);
        assert!(report.failed.is_empty());
        assert_eq!(
            report.written,
            vec![
                dir.path().join("out/hits_1700000000.parquet"),
                dir.path().join("out/hits_1700000000.csv"),
            ]
        );
        assert!(report.written.iter().all(|p| p.exists()));
    }

    #[test]
    fn finalize_skips_empty_results() {
        let dir = tempfile::tempdir().unwrap();
        let s = ResultsStore::from_config(&HarvestConfig {
            output_dir: dir.path().to_path_buf(),
            ..HarvestConfig::default()
        });
        let report = s.finalize(1);
        assert!(report.written.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn final_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let failing = RecordingWriter {
            fail: true,
            ..RecordingWriter::default()
        };
        let mut s = ResultsStore::new(
            dir.path(),
            "hits",
            10,
            Box::new(RecordingWriter::default()),
            vec![Box::new(failing), Box::new(threadwatch_common::CsvTableWriter)],
        );
        s.extend(vec![record(1)]);
        let report = s.finalize(5);
        assert_eq!(report.failed, vec![dir.path().join("hits_5.rec")]);
        assert_eq!(report.written, vec![dir.path().join("hits_5.csv")]);
    }
}
