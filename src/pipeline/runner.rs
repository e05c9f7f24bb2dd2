//! Resumable batch distribution loop.
//!
//! Pipeline flow:
//! Snapshot → skip checkpointed prefix → batches → submitter → finalized → checkpoint
//!
//! Epistemic foundation:
//! - K_i: One batch in flight at a time, nonces strictly consecutive
//! - K_i: Checkpoint advances only after `Finalized`
//! - B_i: Any submission may fail → halt, restart retries the whole batch
//! - B_i: A failure may not prove exclusion → marker kept, restart refused
//! - I^B: Finality may never arrive → bounded wait, marker kept for review

use crate::chain::{BatchSubmitter, StatusKind, SubmissionStatus};
use crate::checkpoint::{Checkpoint, CheckpointStore, InflightBatch, InflightMarker};
use crate::models::{Batch, DistributorError, Record, Result, RunStats};
use crate::pipeline::{NumberedRecord, RecordSource, SubmissionJournal};
use futures::StreamExt;
use futures::stream::BoxStream;
use indicatif::ProgressBar;
use std::io::BufRead;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Knobs for a distribution run.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Records per batch
    pub batch_size: usize,
    /// Maximum wait for a terminal status, `None` waits forever
    pub finality_timeout: Option<Duration>,
    /// Drop a leftover in-flight marker instead of refusing to start
    pub discard_inflight: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            batch_size: 300,
            finality_timeout: Some(Duration::from_secs(600)),
            discard_inflight: false,
        }
    }
}

/// Submits the unprocessed suffix of a snapshot, batch by batch.
pub struct BatchRunner<S, C> {
    submitter: S,
    store: C,
    journal: SubmissionJournal,
    inflight: InflightMarker,
    options: RunnerOptions,
    progress: ProgressBar,
}

impl<S, C> BatchRunner<S, C>
where
    S: BatchSubmitter,
    C: CheckpointStore,
{
    pub fn new(
        submitter: S,
        store: C,
        journal: SubmissionJournal,
        inflight: InflightMarker,
        options: RunnerOptions,
    ) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(DistributorError::Internal(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            submitter,
            store,
            journal,
            inflight,
            options,
            progress: ProgressBar::hidden(),
        })
    }

    /// Report progress (in input lines) on the given bar.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    /// Distribute everything in `snapshot` past the persisted checkpoint.
    pub async fn run(&mut self, snapshot: &Path) -> Result<RunStats> {
        self.resolve_inflight()?;
        let checkpoint = self.store.load()?;
        let source = RecordSource::open(snapshot, checkpoint.last_processed_line)?;
        let (_, stats) = self.run_from(source, checkpoint).await?;
        Ok(stats)
    }

    /// Batch loop over an already opened source.
    ///
    /// `source` must skip exactly `checkpoint.last_processed_line` lines.
    /// Returns the checkpoint after the last finalized batch.
    pub async fn run_from<R: BufRead>(
        &mut self,
        mut source: RecordSource<R>,
        checkpoint: Checkpoint,
    ) -> Result<(Checkpoint, RunStats)> {
        let start = Instant::now();
        let initial = checkpoint;
        let mut checkpoint = checkpoint;
        let mut nonce: Option<u64> = None;
        let mut pending: Vec<Record> = Vec::with_capacity(self.options.batch_size);
        let mut first_line = checkpoint.last_processed_line + 1;
        let mut stats = RunStats::default();

        info!(
            last_processed_line = checkpoint.last_processed_line,
            current_batch_number = checkpoint.current_batch_number,
            batch_size = self.options.batch_size,
            "Starting distribution"
        );
        self.progress.set_position(checkpoint.last_processed_line);

        for item in source.by_ref() {
            let NumberedRecord { line, record } = item?;
            if pending.is_empty() {
                first_line = line;
            }
            pending.push(record);

            if pending.len() == self.options.batch_size {
                let records = std::mem::take(&mut pending);
                checkpoint = self
                    .process_batch(checkpoint, &mut nonce, first_line, records, &mut stats)
                    .await?;
            }
        }

        if !pending.is_empty() {
            checkpoint = self
                .process_batch(checkpoint, &mut nonce, first_line, pending, &mut stats)
                .await?;
        }

        stats.records_skipped = source.skipped();
        if source.lines_read() < initial.last_processed_line {
            warn!(
                lines = source.lines_read(),
                last_processed_line = initial.last_processed_line,
                "Checkpoint is past the end of the snapshot, nothing to submit"
            );
        }

        stats.last_processed_line = checkpoint.last_processed_line;
        stats.current_batch_number = checkpoint.current_batch_number;
        stats.runtime_secs = start.elapsed().as_secs_f64();
        stats.finalize();

        self.progress.finish_with_message(format!(
            "Done! {} batches, {} records",
            stats.batches_submitted, stats.records_submitted
        ));

        info!(
            batches = stats.batches_submitted,
            records = stats.records_submitted,
            skipped = stats.records_skipped,
            last_processed_line = stats.last_processed_line,
            current_batch_number = stats.current_batch_number,
            throughput = format!("{:.0} records/hr", stats.throughput_per_hour),
            "Distribution complete"
        );

        Ok((checkpoint, stats))
    }

    /// Refuse to start over an unresolved batch unless told to discard it.
    fn resolve_inflight(&mut self) -> Result<()> {
        let Some(inflight) = self.inflight.recover()? else {
            return Ok(());
        };

        if !self.options.discard_inflight {
            return Err(inflight.unresolved_error());
        }

        warn!(
            batch = inflight.batch_number,
            nonce = inflight.nonce,
            tx_hash = inflight.tx_hash.as_deref().unwrap_or("unknown"),
            "Discarding in-flight marker at operator request"
        );
        self.inflight.clear()
    }

    /// Submit one batch and persist the checkpoint once it is finalized.
    async fn process_batch(
        &mut self,
        checkpoint: Checkpoint,
        nonce: &mut Option<u64>,
        first_line: u64,
        records: Vec<Record>,
        stats: &mut RunStats,
    ) -> Result<Checkpoint> {
        let current_nonce = match *nonce {
            Some(n) => n,
            None => {
                let n = self.submitter.account_nonce().await?;
                info!(nonce = n, "Fetched starting nonce");
                n
            }
        };

        let batch = Batch {
            number: checkpoint.current_batch_number,
            nonce: current_nonce,
            first_line,
            records,
        };
        let next = checkpoint.advanced_past(&batch)?;

        self.submit_and_wait(&batch).await?;

        self.store.save(&next)?;
        self.inflight.clear()?;
        *nonce = Some(current_nonce + 1);

        stats.batches_submitted += 1;
        stats.records_submitted += batch.len() as u64;
        self.progress.set_position(next.last_processed_line);
        self.progress.set_message(format!(
            "batch: {}, nonce: {}",
            batch.number, batch.nonce
        ));

        Ok(next)
    }

    async fn submit_and_wait(&mut self, batch: &Batch) -> Result<()> {
        let mut inflight = InflightBatch::for_batch(batch);
        self.inflight.begin(&inflight)?;

        let submission = match self.submitter.submit(batch).await {
            Ok(submission) => submission,
            Err(e) => {
                error!(batch = batch.number, error = %e, "Batch submission failed");
                self.journal.submission_error(batch, &e.to_string())?;
                if e.is_resumable() {
                    self.inflight.clear()?;
                } else {
                    warn!(
                        batch = batch.number,
                        "Submission outcome unknown, leaving in-flight marker"
                    );
                }
                return Err(e);
            }
        };

        info!(
            batch = batch.number,
            nonce = batch.nonce,
            records = batch.len(),
            tx_hash = %submission.tx_hash,
            "Submitting batch"
        );
        self.journal.submitting(batch, &submission.tx_hash)?;
        self.inflight.record_hash(&mut inflight, &submission.tx_hash)?;

        self.await_finality(batch, submission.statuses).await
    }

    async fn await_finality(
        &mut self,
        batch: &Batch,
        mut statuses: BoxStream<'static, SubmissionStatus>,
    ) -> Result<()> {
        let deadline = self
            .options
            .finality_timeout
            .map(|timeout| (tokio::time::Instant::now() + timeout, timeout));

        loop {
            let next = match deadline {
                Some((deadline, timeout)) => {
                    match tokio::time::timeout_at(deadline, statuses.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            error!(
                                batch = batch.number,
                                timeout_secs = timeout.as_secs(),
                                "Batch not finalized in time, leaving in-flight marker"
                            );
                            self.journal.batch_error(
                                batch,
                                &format!("not finalized within {timeout:?}, outcome unknown"),
                            )?;
                            return Err(DistributorError::FinalityTimeout {
                                batch: batch.number,
                                timeout,
                            });
                        }
                    }
                }
                None => statuses.next().await,
            };

            let Some(status) = next else {
                error!(batch = batch.number, "Status stream ended before finalization");
                self.journal
                    .batch_error(batch, "status stream ended before finalization")?;
                return Err(DistributorError::StatusStreamClosed {
                    batch: batch.number,
                });
            };

            match status.kind {
                StatusKind::Included => {
                    info!(
                        batch = batch.number,
                        block = %status.detail,
                        nonce = batch.nonce,
                        "Batch included"
                    );
                    self.journal.included(batch, &status.detail)?;
                }
                StatusKind::Finalized => {
                    info!(batch = batch.number, block = %status.detail, "Batch finalized");
                    self.journal.finalized(batch, &status.detail)?;
                    return Ok(());
                }
                StatusKind::Error => {
                    error!(batch = batch.number, detail = %status.detail, "Batch failed");
                    self.journal.batch_error(batch, &status.detail)?;
                    self.inflight.clear()?;
                    return Err(DistributorError::Dispatch {
                        batch: batch.number,
                        detail: status.detail,
                    });
                }
                StatusKind::Unknown => {
                    error!(
                        batch = batch.number,
                        detail = %status.detail,
                        "Batch outcome unknown, leaving in-flight marker"
                    );
                    self.journal
                        .batch_error(batch, &format!("outcome unknown: {}", status.detail))?;
                    return Err(DistributorError::OutcomeUnknown {
                        batch: batch.number,
                        detail: status.detail,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{DryRunSubmitter, Submission};
    use crate::checkpoint::{FileCheckpointStore, MemoryCheckpointStore};
    use async_trait::async_trait;
    use futures::stream;
    use std::collections::HashMap;
    use std::fs;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// How the scripted submitter answers a given batch number.
    #[derive(Clone)]
    enum Script {
        Fail(&'static str),
        Hang,
        CloseEarly,
        Reject,
        /// Watch ends with an unknown outcome after inclusion
        Lost(&'static str),
        /// Submission call fails after the extrinsic may have been sent
        LostOnSubmit,
    }

    #[derive(Clone, Default)]
    struct ScriptedSubmitter {
        start_nonce: u64,
        scripts: HashMap<u64, Script>,
        submitted: Arc<Mutex<Vec<Batch>>>,
        nonce_queries: Arc<Mutex<u32>>,
    }

    impl ScriptedSubmitter {
        fn new(start_nonce: u64) -> Self {
            Self {
                start_nonce,
                ..Default::default()
            }
        }

        fn on(mut self, batch: u64, script: Script) -> Self {
            self.scripts.insert(batch, script);
            self
        }

        fn submitted(&self) -> Vec<Batch> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BatchSubmitter for ScriptedSubmitter {
        async fn account_nonce(&self) -> Result<u64> {
            *self.nonce_queries.lock().unwrap() += 1;
            Ok(self.start_nonce)
        }

        async fn submit(&self, batch: &Batch) -> Result<Submission> {
            let script = self.scripts.get(&batch.number).cloned();
            if let Some(Script::Reject) = script {
                return Err(DistributorError::Chain("Invalid Transaction: stale".to_string()));
            }
            if let Some(Script::LostOnSubmit) = script {
                self.submitted.lock().unwrap().push(batch.clone());
                return Err(DistributorError::OutcomeUnknown {
                    batch: batch.number,
                    detail: "connection reset".to_string(),
                });
            }
            self.submitted.lock().unwrap().push(batch.clone());

            let tx_hash = format!("0x{:04x}", batch.number);
            let included = SubmissionStatus::included(format!("0xb{}", batch.number));
            let statuses = match script {
                None => stream::iter(vec![
                    included,
                    SubmissionStatus::finalized(format!("0xf{}", batch.number)),
                ])
                .boxed(),
                Some(Script::Fail(detail)) => {
                    stream::iter(vec![included, SubmissionStatus::error(detail)]).boxed()
                }
                Some(Script::Hang) => stream::iter(vec![included]).chain(stream::pending()).boxed(),
                Some(Script::CloseEarly) => stream::iter(vec![included]).boxed(),
                Some(Script::Lost(detail)) => {
                    stream::iter(vec![included, SubmissionStatus::unknown(detail)]).boxed()
                }
                Some(Script::Reject | Script::LostOnSubmit) => unreachable!(),
            };
            Ok(Submission { tx_hash, statuses })
        }
    }

    fn snapshot(n: u64) -> String {
        (1..=n)
            .map(|i| format!(r#"{{"AccountId":"5Acc{i}","Total":{i},"Count":1}}"#) + "\n")
            .collect()
    }

    fn options(batch_size: usize) -> RunnerOptions {
        RunnerOptions {
            batch_size,
            finality_timeout: Some(Duration::from_secs(5)),
            discard_inflight: false,
        }
    }

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new(records: u64) -> Self {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("snapshot.jsonl"), snapshot(records)).unwrap();
            Self { dir }
        }

        fn snapshot_path(&self) -> std::path::PathBuf {
            self.dir.path().join("snapshot.jsonl")
        }

        fn store(&self) -> FileCheckpointStore {
            FileCheckpointStore::new(
                self.dir.path().join("lastKey.txt"),
                self.dir.path().join("currentBatch.txt"),
            )
        }

        fn marker(&self) -> InflightMarker {
            InflightMarker::new(self.dir.path().join("inflight.json"))
        }

        fn log(&self) -> String {
            fs::read_to_string(self.dir.path().join("logs/distribution.log")).unwrap_or_default()
        }

        fn runner(
            &self,
            submitter: ScriptedSubmitter,
            options: RunnerOptions,
        ) -> BatchRunner<ScriptedSubmitter, FileCheckpointStore> {
            let journal =
                SubmissionJournal::open(&self.dir.path().join("logs/distribution.log")).unwrap();
            BatchRunner::new(submitter, self.store(), journal, self.marker(), options).unwrap()
        }
    }

    #[tokio::test]
    async fn test_650_records_in_batches_of_300() {
        let fx = Fixture::new(650);
        let submitter = ScriptedSubmitter::new(40);
        let mut runner = fx.runner(submitter.clone(), options(300));

        let stats = runner.run(&fx.snapshot_path()).await.unwrap();

        let batches = submitter.submitted();
        let sizes: Vec<_> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![300, 300, 50]);
        assert_eq!(
            batches.iter().map(|b| b.nonce).collect::<Vec<_>>(),
            vec![40, 41, 42]
        );
        assert_eq!(
            batches.iter().map(|b| b.number).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(*submitter.nonce_queries.lock().unwrap(), 1);

        let cp = fx.store().load().unwrap();
        assert_eq!(cp.last_processed_line, 650);
        assert_eq!(cp.current_batch_number, 3);
        assert_eq!(stats.records_submitted, 650);
        assert_eq!(stats.batches_submitted, 3);
        assert!(fx.marker().recover().unwrap().is_none());

        let log = fx.log();
        assert!(log.contains("Submitting Asset Distribution Batch 2, Batch Hash: 0x0002, nonce: 42"));
        assert!(log.contains("Batch 2 finalized in block: 0xf2"));
    }

    #[tokio::test]
    async fn test_batches_cover_input_in_order() {
        let fx = Fixture::new(23);
        let submitter = ScriptedSubmitter::new(0);
        let mut runner = fx.runner(submitter.clone(), options(5));
        runner.run(&fx.snapshot_path()).await.unwrap();

        let accounts: Vec<_> = submitter
            .submitted()
            .into_iter()
            .flat_map(|b| b.records)
            .map(|r| r.account_id)
            .collect();
        let expected: Vec<_> = (1..=23).map(|i| format!("5Acc{i}")).collect();
        assert_eq!(accounts, expected);
    }

    #[tokio::test]
    async fn test_evenly_divisible_input_has_no_empty_batch() {
        let fx = Fixture::new(600);
        let submitter = ScriptedSubmitter::new(0);
        let mut runner = fx.runner(submitter.clone(), options(300));
        runner.run(&fx.snapshot_path()).await.unwrap();

        let sizes: Vec<_> = submitter.submitted().iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![300, 300]);
    }

    #[tokio::test]
    async fn test_resume_skips_checkpointed_records() {
        let fx = Fixture::new(650);
        let mut store = fx.store();
        store
            .save(&Checkpoint {
                last_processed_line: 300,
                current_batch_number: 7,
            })
            .unwrap();

        let submitter = ScriptedSubmitter::new(90);
        let mut runner = fx.runner(submitter.clone(), options(300));
        let stats = runner.run(&fx.snapshot_path()).await.unwrap();

        let batches = submitter.submitted();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].first_line, 301);
        assert_eq!(batches[0].records[0].account_id, "5Acc301");
        assert_eq!(batches[0].number, 7);
        assert_eq!(batches[1].number, 8);
        assert_eq!(batches[1].len(), 50);
        assert_eq!(stats.records_skipped, 300);

        let cp = fx.store().load().unwrap();
        assert_eq!(cp.last_processed_line, 650);
        assert_eq!(cp.current_batch_number, 9);
    }

    #[tokio::test]
    async fn test_completed_run_submits_nothing_on_rerun() {
        let fx = Fixture::new(10);
        let first = ScriptedSubmitter::new(0);
        fx.runner(first.clone(), options(4))
            .run(&fx.snapshot_path())
            .await
            .unwrap();
        assert_eq!(first.submitted().len(), 3);

        let second = ScriptedSubmitter::new(3);
        let stats = fx
            .runner(second.clone(), options(4))
            .run(&fx.snapshot_path())
            .await
            .unwrap();
        assert!(second.submitted().is_empty());
        assert_eq!(*second.nonce_queries.lock().unwrap(), 0);
        assert_eq!(stats.records_skipped, 10);
        assert_eq!(stats.current_batch_number, 3);
    }

    #[tokio::test]
    async fn test_dispatch_error_on_batch_two_then_restart() {
        let fx = Fixture::new(650);
        let failing = ScriptedSubmitter::new(10).on(1, Script::Fail("Module error: NoPermission"));
        let err = fx
            .runner(failing.clone(), options(300))
            .run(&fx.snapshot_path())
            .await
            .unwrap_err();

        assert!(matches!(err, DistributorError::Dispatch { batch: 1, .. }));
        assert!(err.is_resumable());
        assert_eq!(failing.submitted().len(), 2);

        let cp = fx.store().load().unwrap();
        assert_eq!(cp.last_processed_line, 300);
        assert_eq!(cp.current_batch_number, 1);
        assert!(fx.marker().recover().unwrap().is_none());

        let log = fx.log();
        assert!(log.contains("Error in batch 1: Module error: NoPermission"));
        assert!(log.contains("Account ID: 5Acc301, Total: 301, Count: 1"));
        assert!(log.contains("Account ID: 5Acc600, Total: 600, Count: 1"));

        let retry = ScriptedSubmitter::new(12);
        fx.runner(retry.clone(), options(300))
            .run(&fx.snapshot_path())
            .await
            .unwrap();
        let batches = retry.submitted();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].number, 1);
        assert_eq!(batches[0].first_line, 301);
        assert_eq!(batches[0].len(), 300);
        assert_eq!(batches[0].nonce, 12);

        let cp = fx.store().load().unwrap();
        assert_eq!(cp.last_processed_line, 650);
        assert_eq!(cp.current_batch_number, 3);
    }

    #[tokio::test]
    async fn test_rejected_submission_leaves_checkpoint() {
        let fx = Fixture::new(5);
        let submitter = ScriptedSubmitter::new(0).on(0, Script::Reject);
        let err = fx
            .runner(submitter.clone(), options(5))
            .run(&fx.snapshot_path())
            .await
            .unwrap_err();

        assert!(matches!(err, DistributorError::Chain(_)));
        assert_eq!(fx.store().load().unwrap(), Checkpoint::new());
        assert!(fx.marker().recover().unwrap().is_none());
        assert!(fx
            .log()
            .contains("Error in asset distribution batch transaction: Chain client error"));
    }

    #[tokio::test]
    async fn test_lost_watch_keeps_marker_and_blocks_restart() {
        let fx = Fixture::new(6);
        let submitter =
            ScriptedSubmitter::new(3).on(1, Script::Lost("watch failed: connection reset"));
        let err = fx
            .runner(submitter, options(3))
            .run(&fx.snapshot_path())
            .await
            .unwrap_err();

        assert!(matches!(err, DistributorError::OutcomeUnknown { batch: 1, .. }));
        assert!(!err.is_resumable());
        assert_eq!(fx.store().load().unwrap().last_processed_line, 3);

        let marker = fx.marker().recover().unwrap().unwrap();
        assert_eq!(marker.batch_number, 1);
        assert_eq!(marker.nonce, 4);
        assert!(fx
            .log()
            .contains("Error in batch 1: outcome unknown: watch failed: connection reset"));

        let blocked = ScriptedSubmitter::new(5);
        let err = fx
            .runner(blocked.clone(), options(3))
            .run(&fx.snapshot_path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DistributorError::InflightBatchUnresolved { batch: 1, .. }
        ));
        assert!(blocked.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_failed_submit_call_with_unknown_outcome_keeps_marker() {
        let fx = Fixture::new(4);
        let submitter = ScriptedSubmitter::new(0).on(0, Script::LostOnSubmit);
        let err = fx
            .runner(submitter, options(4))
            .run(&fx.snapshot_path())
            .await
            .unwrap_err();

        assert!(matches!(err, DistributorError::OutcomeUnknown { batch: 0, .. }));
        assert_eq!(fx.store().load().unwrap(), Checkpoint::new());

        let marker = fx.marker().recover().unwrap().unwrap();
        assert_eq!(marker.batch_number, 0);
        assert!(marker.tx_hash.is_none());
    }

    #[tokio::test]
    async fn test_finality_timeout_keeps_marker_and_blocks_restart() {
        let fx = Fixture::new(6);
        let submitter = ScriptedSubmitter::new(3).on(1, Script::Hang);
        let mut opts = options(3);
        opts.finality_timeout = Some(Duration::from_millis(50));

        let err = fx
            .runner(submitter, opts.clone())
            .run(&fx.snapshot_path())
            .await
            .unwrap_err();
        assert!(matches!(err, DistributorError::FinalityTimeout { batch: 1, .. }));
        assert!(!err.is_resumable());

        let cp = fx.store().load().unwrap();
        assert_eq!(cp.last_processed_line, 3);
        assert_eq!(cp.current_batch_number, 1);

        let marker = fx.marker().recover().unwrap().unwrap();
        assert_eq!(marker.batch_number, 1);
        assert_eq!(marker.nonce, 4);
        assert_eq!(marker.tx_hash.as_deref(), Some("0x0001"));

        // A plain restart refuses to run
        let blocked = ScriptedSubmitter::new(5);
        let err = fx
            .runner(blocked.clone(), opts.clone())
            .run(&fx.snapshot_path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DistributorError::InflightBatchUnresolved { batch: 1, .. }
        ));
        assert!(blocked.submitted().is_empty());

        // Discarding the marker resubmits the batch
        opts.discard_inflight = true;
        let resumed = ScriptedSubmitter::new(5);
        fx.runner(resumed.clone(), opts)
            .run(&fx.snapshot_path())
            .await
            .unwrap();
        assert_eq!(resumed.submitted().len(), 1);
        assert_eq!(fx.store().load().unwrap().last_processed_line, 6);
        assert!(fx.marker().recover().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_status_stream_is_error() {
        let fx = Fixture::new(2);
        let submitter = ScriptedSubmitter::new(0).on(0, Script::CloseEarly);
        let err = fx
            .runner(submitter, options(2))
            .run(&fx.snapshot_path())
            .await
            .unwrap_err();
        assert!(matches!(err, DistributorError::StatusStreamClosed { batch: 0 }));
        assert_eq!(fx.store().load().unwrap(), Checkpoint::new());
        assert!(fx.marker().recover().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_parse_error_halts_before_partial_batch() {
        let fx = Fixture::new(0);
        let mut data = snapshot(4);
        data.push_str("{\"AccountId\": \"5Bad\"}\n");
        fs::write(fx.snapshot_path(), data).unwrap();

        let submitter = ScriptedSubmitter::new(0);
        let err = fx
            .runner(submitter.clone(), options(2))
            .run(&fx.snapshot_path())
            .await
            .unwrap_err();
        assert!(matches!(err, DistributorError::Parse { line: 5, .. }));
        assert_eq!(submitter.submitted().len(), 2);
        assert_eq!(fx.store().load().unwrap().last_processed_line, 4);
    }

    #[tokio::test]
    async fn test_checkpoint_past_end_of_input() {
        let fx = Fixture::new(5);
        let mut store = fx.store();
        store
            .save(&Checkpoint {
                last_processed_line: 9,
                current_batch_number: 2,
            })
            .unwrap();

        let submitter = ScriptedSubmitter::new(0);
        let stats = fx
            .runner(submitter.clone(), options(3))
            .run(&fx.snapshot_path())
            .await
            .unwrap();
        assert!(submitter.submitted().is_empty());
        assert_eq!(stats.last_processed_line, 9);
        assert_eq!(fx.store().load().unwrap().last_processed_line, 9);
    }

    #[tokio::test]
    async fn test_dry_run_with_memory_store() {
        let start = Checkpoint {
            last_processed_line: 2,
            current_batch_number: 1,
        };
        let source = RecordSource::from_reader(Cursor::new(snapshot(9)), 2);
        let mut runner = BatchRunner::new(
            DryRunSubmitter::new(0),
            MemoryCheckpointStore::starting_at(start),
            SubmissionJournal::disabled(),
            InflightMarker::disabled(),
            options(3),
        )
        .unwrap();

        let (cp, stats) = runner.run_from(source, start).await.unwrap();
        assert_eq!(cp.last_processed_line, 9);
        assert_eq!(cp.current_batch_number, 4);
        assert_eq!(stats.records_skipped, 2);

        let lines: Vec<_> = runner
            .store()
            .history()
            .iter()
            .map(|c| c.last_processed_line)
            .collect();
        assert_eq!(lines, vec![5, 8, 9]);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = BatchRunner::new(
            DryRunSubmitter::default(),
            MemoryCheckpointStore::default(),
            SubmissionJournal::disabled(),
            InflightMarker::disabled(),
            options(0),
        );
        assert!(result.is_err());
    }
}
