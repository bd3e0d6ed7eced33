//! Pushing queued local writes to the remote store.

use anyhow::Result;
use tracing::{debug, warn};

use crate::db::Database;
use crate::models::{FlushSummary, SyncOp};
use crate::remote::RemoteStore;

async fn push(remote: &dyn RemoteStore, user_id: &str, op: &SyncOp) -> Result<()> {
    match op {
        SyncOp::InsertActivity { record } => remote.insert_activity(user_id, record).await,
        SyncOp::UpsertWater { date, total_liters } => {
            remote.upsert_water(user_id, *date, *total_liters).await
        }
        SyncOp::UpsertWeight { entry } => remote.upsert_weight(user_id, entry).await,
        SyncOp::DeleteWeight { date } => remote.delete_weight(user_id, *date).await,
        SyncOp::UpsertProfile { profile } => remote.upsert_profile(profile).await,
    }
}

/// Push every pending operation for `user_id` in queue order.
///
/// Successful operations leave the queue. Failed ones stay with their attempt
/// counter bumped and are retried on the next flush.
pub async fn flush_sync_queue(
    db: &Database,
    remote: &dyn RemoteStore,
    user_id: &str,
) -> Result<FlushSummary> {
    let mut summary = FlushSummary::default();
    for queued in db.pending_sync(user_id)? {
        match push(remote, user_id, &queued.op).await {
            Ok(()) => {
                debug!(id = queued.id, op = %queued.op.label(), "pushed");
                db.complete_sync(queued.id)?;
                summary.pushed += 1;
            }
            Err(e) => {
                warn!(id = queued.id, op = %queued.op.label(), error = %format!("{e:#}"), "push failed, will retry");
                db.fail_sync(queued.id, &format!("{e:#}"))?;
                summary.failed += 1;
            }
        }
    }
    summary.remaining = db.pending_sync_count(user_id)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityDetail, ActivityKind, ActivityRecord};
    use crate::reconcile::tests::MockRemote;
    use chrono::{NaiveDate, Utc};

    #[tokio::test]
    async fn test_flush_pushes_in_order_and_keeps_failures() {
        let db = Database::open_in_memory().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let rec = ActivityRecord::new(ActivityDetail::Steps { steps: 5000 }, Utc::now());
        db.enqueue_sync("u1", &SyncOp::InsertActivity { record: rec.clone() })
            .unwrap();
        db.enqueue_sync(
            "u1",
            &SyncOp::UpsertWater {
                date: day,
                total_liters: 0.25,
            },
        )
        .unwrap();
        db.enqueue_sync(
            "u1",
            &SyncOp::UpsertWater {
                date: day,
                total_liters: 0.5,
            },
        )
        .unwrap();

        let remote = MockRemote::default();
        remote.fail("upsert_water");
        let summary = flush_sync_queue(&db, &remote, "u1").await.unwrap();
        assert_eq!(summary.pushed, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.remaining, 2);
        assert_eq!(
            remote.activity.lock().unwrap()[&ActivityKind::Steps],
            vec![rec]
        );

        remote.failing.lock().unwrap().clear();
        let summary = flush_sync_queue(&db, &remote, "u1").await.unwrap();
        assert_eq!(summary.pushed, 2);
        assert_eq!(summary.remaining, 0);
        assert_eq!(
            *remote.water_writes.lock().unwrap(),
            vec![(day, 0.25), (day, 0.5)]
        );
    }
}
