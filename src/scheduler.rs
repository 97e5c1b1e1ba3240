// 🔄 Scheduler - sequential consumer of the parse queue
//
// One item at a time, start to finish. Per item:
//   claim → process (under retry) → mark done/error → audit
// A failing item never stops the run; only an unusable queue does.

use rusqlite::Connection;
use serde::Serialize;

use crate::audit::{self, AuditEntry};
use crate::error::{IngestError, Result};
use crate::ingest::ItemProcessor;
use crate::queue::{self, QueueItem, QueueStatus};
use crate::retry::{retry_on_lock, RetryPolicy};

/// End-of-run accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Items reset from processing to pending at start-up
    pub recovered: usize,
    pub done: usize,
    pub failed: usize,
}

/// What happened to one claimed item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    pub item_id: i64,
    pub meet_id: i64,
    pub status: QueueStatus,
    pub error: Option<String>,
}

pub struct Scheduler<'c, P: ItemProcessor> {
    conn: &'c Connection,
    processor: P,
    policy: RetryPolicy,
}

impl<'c, P: ItemProcessor> Scheduler<'c, P> {
    pub fn new(conn: &'c Connection, processor: P, policy: RetryPolicy) -> Self {
        Scheduler {
            conn,
            processor,
            policy,
        }
    }

    /// Recover, then drain the queue.
    pub fn run(&self) -> Result<RunSummary> {
        let mut summary = RunSummary {
            recovered: self.recover()?,
            ..RunSummary::default()
        };

        while let Some(outcome) = self.step()? {
            match outcome.status {
                QueueStatus::Done => summary.done += 1,
                _ => summary.failed += 1,
            }
        }

        tracing::info!(
            recovered = summary.recovered,
            done = summary.done,
            failed = summary.failed,
            "Parse run finished"
        );
        Ok(summary)
    }

    /// Reset items a crashed run left in processing.
    pub fn recover(&self) -> Result<usize> {
        retry_on_lock("recover queue", &self.policy, |_| {
            queue::reset_stale_processing(self.conn)
        })
    }

    /// Claim and process the next pending item. `None` when the queue is drained.
    pub fn step(&self) -> Result<Option<ItemOutcome>> {
        let claimed = retry_on_lock("claim queue item", &self.policy, |_| {
            queue::claim_next(self.conn)
        })?;
        let Some(item) = claimed else {
            return Ok(None);
        };

        tracing::debug!(item_id = item.id, meet_id = item.meet_id, attempts = item.attempts, "Claimed item");

        let result = retry_on_lock("ingest meet", &self.policy, |attempt| {
            if attempt > 1 {
                tracing::debug!(item_id = item.id, attempt, "Retrying item");
            }
            self.processor.process(self.conn, &item)
        });

        let outcome = match result {
            Ok(report) => {
                self.finish(&item, QueueStatus::Done, None);
                let written = audit::record_all(self.conn, &report.findings);
                tracing::info!(
                    item_id = item.id,
                    meet_id = item.meet_id,
                    teams = report.stats.teams_seen,
                    participants = report.stats.participants_seen,
                    duplicates = report.duplicates.len(),
                    findings = written,
                    "Parsed meet"
                );
                ItemOutcome {
                    item_id: item.id,
                    meet_id: item.meet_id,
                    status: QueueStatus::Done,
                    error: None,
                }
            }
            Err(err) => {
                let message = err.to_string();
                tracing::error!(
                    item_id = item.id,
                    meet_id = item.meet_id,
                    kind = err.kind().as_str(),
                    error = %message,
                    "Failed to parse meet"
                );
                self.finish(&item, QueueStatus::Error, Some(&message));
                audit::record(self.conn, &failure_entry(&item, &err));
                ItemOutcome {
                    item_id: item.id,
                    meet_id: item.meet_id,
                    status: QueueStatus::Error,
                    error: Some(message),
                }
            }
        };

        Ok(Some(outcome))
    }

    /// Record the final status. A failure here leaves the item in processing,
    /// where the next run's recovery picks it up again.
    fn finish(&self, item: &QueueItem, status: QueueStatus, message: Option<&str>) {
        let result = retry_on_lock("finish queue item", &self.policy, |_| match status {
            QueueStatus::Done => queue::mark_done(self.conn, item.id),
            _ => queue::mark_error(self.conn, item.id, message.unwrap_or("")),
        });

        if let Err(err) = result {
            tracing::error!(
                item_id = item.id,
                status = status.as_str(),
                error = %err,
                "Failed to record item status"
            );
        }
    }
}

fn failure_entry(item: &QueueItem, err: &IngestError) -> AuditEntry {
    let entry = AuditEntry::new(err.kind(), err.to_string()).with_context(serde_json::json!({
        "item_id": item.id,
        "meet_id": item.meet_id,
        "attempts": item.attempts,
    }));

    // A meet that does not exist cannot be referenced
    match err {
        IngestError::MeetNotFound(_) => entry,
        _ => entry.for_meet(item.meet_id),
    }
}
