// src/collect/mod.rs

//! Debounced change collection.
//!
//! Raw watcher events are buffered by arrival time and turned into one
//! [`ChangeRecord`] per path on every tick of a fixed clock.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::errors::{Result, SyncdsError};
use crate::types::{ChangeOp, ChangeRecord};
use crate::watch::{FsEvent, WatchEvent};

/// Accumulates events between ticks.
///
/// Entries are keyed by `(arrival, sequence)` so iteration order is arrival
/// order even when two events share an `Instant`.
#[derive(Debug, Default)]
pub struct ChangeCollector {
    pending: BTreeMap<(Instant, u64), FsEvent>,
    seq: u64,
}

impl ChangeCollector {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn push(&mut self, event: FsEvent, at: Instant) {
        self.seq += 1;
        self.pending.insert((at, self.seq), event);
    }

    /// Drain everything that arrived up to `now` into one record per path.
    ///
    /// The last event for a path decides its operation. Directory events are
    /// dropped. Drained events are gone for good; a later tick never sees
    /// them again. Records come out sorted by path.
    pub fn flush(&mut self, now: Instant) -> Vec<ChangeRecord> {
        // Events stamped after `now` wait for the next tick.
        let later = self.pending.split_off(&(now, u64::MAX));
        let ready = std::mem::replace(&mut self.pending, later);

        let mut last: HashMap<String, &FsEvent> = HashMap::new();
        for event in ready.values() {
            last.insert(event.rel_path.clone(), event);
        }

        let mut records: Vec<ChangeRecord> = last
            .into_iter()
            .filter(|(_, event)| !event.is_dir)
            .map(|(path, event)| {
                let op = if event.kind.is_removal() {
                    ChangeOp::Remove
                } else {
                    ChangeOp::Write
                };
                ChangeRecord::new(path, op)
            })
            .collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }
}

/// Run a collector over `events`, sending a batch to `out` on every tick
/// that produced at least one record.
///
/// Returns `Ok(())` when cancelled or when `out` is closed. A watcher error
/// or the end of the event stream is returned as an error, after the
/// pending events are dropped.
pub fn spawn_collector(
    mut events: mpsc::Receiver<WatchEvent>,
    window: Duration,
    out: mpsc::Sender<Vec<ChangeRecord>>,
    cancel: CancellationToken,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let mut collector = ChangeCollector::new();
        let mut ticker = interval_at(tokio::time::Instant::now() + window, window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(window_ms = window.as_millis() as u64, "change collector started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(pending = collector.len(), "change collector cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    let batch = collector.flush(Instant::now());
                    if batch.is_empty() {
                        continue;
                    }
                    debug!(records = batch.len(), "collected change batch");
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        res = out.send(batch) => {
                            if res.is_err() {
                                debug!("batch consumer gone; stopping collector");
                                return Ok(());
                            }
                        }
                    }
                }
                event = events.recv() => match event {
                    Some(WatchEvent::Fs(event)) => {
                        debug!(path = %event.rel_path, kind = ?event.kind, "queued fs event");
                        collector.push(event, Instant::now());
                    }
                    Some(WatchEvent::Error(msg)) => {
                        error!(error = %msg, "file watcher failed");
                        return Err(SyncdsError::Other(anyhow!("file watcher failed: {msg}")));
                    }
                    None => {
                        return Err(SyncdsError::Other(anyhow!("file watcher stream closed")));
                    }
                },
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::FsEventKind;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn ev(rel: &str, kind: FsEventKind) -> FsEvent {
        FsEvent {
            path: PathBuf::from("/base").join(rel),
            rel_path: rel.to_string(),
            kind,
            is_dir: false,
        }
    }

    #[test]
    fn coalesces_edit_storm_into_one_write() {
        let mut c = ChangeCollector::new();
        let t0 = Instant::now();
        c.push(ev("src/main.go", FsEventKind::Created), t0);
        c.push(ev("src/main.go", FsEventKind::Modified), t0);
        c.push(ev("src/main.go", FsEventKind::Modified), t0 + Duration::from_millis(5));

        let out = c.flush(t0 + Duration::from_millis(100));
        assert_eq!(out, vec![ChangeRecord::write("src/main.go")]);
        assert!(c.is_empty());
    }

    #[test]
    fn last_event_decides_operation() {
        let mut c = ChangeCollector::new();
        let t0 = Instant::now();
        c.push(ev("a.txt", FsEventKind::Modified), t0);
        c.push(ev("a.txt", FsEventKind::Removed), t0);
        c.push(ev("b.txt", FsEventKind::Removed), t0);
        c.push(ev("b.txt", FsEventKind::RenamedTo), t0);

        let out = c.flush(t0);
        assert_eq!(
            out,
            vec![ChangeRecord::remove("a.txt"), ChangeRecord::write("b.txt")]
        );
    }

    #[test]
    fn directories_never_reach_the_batch() {
        let mut c = ChangeCollector::new();
        let t0 = Instant::now();
        let mut dir = ev("src/pkg", FsEventKind::Created);
        dir.is_dir = true;
        c.push(dir, t0);
        c.push(ev("src/pkg/x.go", FsEventKind::Created), t0);

        let out = c.flush(t0);
        assert_eq!(out, vec![ChangeRecord::write("src/pkg/x.go")]);
    }

    #[test]
    fn flushed_events_are_not_reprocessed() {
        let mut c = ChangeCollector::new();
        let t0 = Instant::now();
        c.push(ev("a.txt", FsEventKind::Modified), t0);
        assert_eq!(c.flush(t0).len(), 1);
        assert!(c.flush(t0 + Duration::from_millis(100)).is_empty());
    }

    #[test]
    fn events_after_now_wait_for_next_tick() {
        let mut c = ChangeCollector::new();
        let t0 = Instant::now();
        c.push(ev("late.txt", FsEventKind::Modified), t0 + Duration::from_millis(1));
        assert!(c.flush(t0).is_empty());
        assert_eq!(c.len(), 1);
        assert_eq!(c.flush(t0 + Duration::from_millis(1)).len(), 1);
    }

    #[tokio::test]
    async fn collector_task_reports_watcher_failure() {
        let (tx, rx) = mpsc::channel(4);
        let (out_tx, _out_rx) = mpsc::channel(4);
        let handle = spawn_collector(
            rx,
            Duration::from_millis(20),
            out_tx,
            CancellationToken::new(),
        );
        tx.send(WatchEvent::Error("boom".into())).await.unwrap();
        let res = handle.await.unwrap();
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn collector_task_emits_batches_on_tick() {
        let (tx, rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = spawn_collector(rx, Duration::from_millis(20), out_tx, cancel.clone());

        tx.send(WatchEvent::Fs(ev("a.txt", FsEventKind::Modified)))
            .await
            .unwrap();
        tx.send(WatchEvent::Fs(ev("a.txt", FsEventKind::Modified)))
            .await
            .unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(2), out_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch, vec![ChangeRecord::write("a.txt")]);

        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    fn kind_strategy() -> impl Strategy<Value = FsEventKind> {
        prop_oneof![
            Just(FsEventKind::Created),
            Just(FsEventKind::Modified),
            Just(FsEventKind::Removed),
            Just(FsEventKind::RenamedFrom),
            Just(FsEventKind::RenamedTo),
        ]
    }

    proptest! {
        #[test]
        fn n_events_on_one_path_yield_one_record(
            kinds in proptest::collection::vec(kind_strategy(), 1..40)
        ) {
            let mut c = ChangeCollector::new();
            let t0 = Instant::now();
            for (i, kind) in kinds.iter().enumerate() {
                c.push(ev("f.txt", *kind), t0 + Duration::from_micros(i as u64));
            }
            let out = c.flush(t0 + Duration::from_millis(50));
            prop_assert_eq!(out.len(), 1);
            let expected = if kinds.last().unwrap().is_removal() {
                ChangeOp::Remove
            } else {
                ChangeOp::Write
            };
            prop_assert_eq!(out[0].op, expected);
        }
    }
}
