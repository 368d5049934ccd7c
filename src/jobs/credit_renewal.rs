use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::db::ReservationStore;
use crate::error::StoreError;
use crate::services::credit_ledger::{CreditLedger, ReconcileOutcome};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepStats {
    pub total_checked: usize,
    pub applied: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub missing: usize,
    pub failures: usize,
}

/// Reconciles members whose monthly renewal or expiration is still pending.
///
/// Request handlers reconcile lazily; this sweep catches members who do
/// not touch their reservations around the month boundary. Individual
/// failures are counted and logged, only the initial lookup is fatal.
pub async fn reconcile_due_members(
    store: &dyn ReservationStore,
    ledger: &CreditLedger,
    batch_size: i64,
    now: DateTime<Utc>,
) -> Result<SweepStats, StoreError> {
    let calendar = ledger.calendar();
    let month_start = calendar.month_start(now);
    let expiration_open = now >= calendar.expiration_start(now);

    let members = store
        .members_due_for_reconciliation(month_start, expiration_open, batch_size)
        .await?;

    let mut stats = SweepStats {
        total_checked: members.len(),
        ..SweepStats::default()
    };

    tracing::info!(
        total_members = stats.total_checked,
        "Starting credit reconciliation sweep"
    );

    for member_id in members {
        match ledger.try_reconcile(member_id, now).await {
            Ok(ReconcileOutcome::Applied(_)) => stats.applied += 1,
            Ok(ReconcileOutcome::Unchanged) => stats.unchanged += 1,
            Ok(ReconcileOutcome::Conflict) => stats.conflicts += 1,
            Ok(ReconcileOutcome::MemberMissing) => stats.missing += 1,
            Err(e) => {
                tracing::error!(
                    member_id = %member_id,
                    error = %e,
                    "Reconciliation failed during sweep"
                );
                stats.failures += 1;
            }
        }
    }

    tracing::info!(?stats, "Credit reconciliation sweep completed");

    Ok(stats)
}

/// Schedules the sweep on a cron expression (seconds field first)
pub async fn start_scheduler(
    store: Arc<dyn ReservationStore>,
    ledger: CreditLedger,
    schedule: &str,
    batch_size: i64,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_id, _scheduler| {
        let store = store.clone();
        let ledger = ledger.clone();
        Box::pin(async move {
            if let Err(e) = reconcile_due_members(store.as_ref(), &ledger, batch_size, Utc::now()).await {
                tracing::error!(error = %e, "Credit reconciliation sweep failed");
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!(schedule, batch_size, "Credit reconciliation sweep scheduled");

    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, StoreOp};
    use crate::models::CreditAccount;
    use crate::services::Calendar;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 4, 0, 0).unwrap()
    }

    fn account(last_renewal: DateTime<Utc>, last_expiration: DateTime<Utc>) -> CreditAccount {
        CreditAccount {
            last_renewal_date: Some(last_renewal),
            last_expiration_date: Some(last_expiration),
            ..CreditAccount::new(Uuid::new_v4(), 2, 4)
        }
    }

    async fn seeded() -> (Arc<MemoryStore>, CreditLedger, [CreditAccount; 3]) {
        let store = Arc::new(MemoryStore::new());
        let stale = account(at(2025, 2, 1), at(2025, 2, 6));
        let renewed_only = account(at(2025, 3, 1), at(2025, 2, 6));
        let current = account(at(2025, 3, 1), at(2025, 3, 6));

        for member in [&stale, &renewed_only, &current] {
            store.insert_account(member.clone()).await;
        }

        let ledger = CreditLedger::new(store.clone(), Calendar::utc());
        (store, ledger, [stale, renewed_only, current])
    }

    #[tokio::test]
    async fn test_sweep_before_expiration_day_only_renews() {
        let (store, ledger, [stale, renewed_only, current]) = seeded().await;

        let stats = reconcile_due_members(store.as_ref(), &ledger, 100, at(2025, 3, 3))
            .await
            .unwrap();

        assert_eq!(stats.total_checked, 1);
        assert_eq!(stats.applied, 1);

        assert_eq!(store.account(stale.id).await.unwrap().reservation_credits, 6);
        assert_eq!(store.account(renewed_only.id).await.unwrap(), renewed_only);
        assert_eq!(store.account(current.id).await.unwrap(), current);
    }

    #[tokio::test]
    async fn test_sweep_after_expiration_day() {
        let (store, ledger, [stale, renewed_only, current]) = seeded().await;

        let stats = reconcile_due_members(store.as_ref(), &ledger, 100, at(2025, 3, 9))
            .await
            .unwrap();

        assert_eq!(stats.total_checked, 2);
        assert_eq!(stats.applied, 2);

        // Renewed late: nothing forfeited
        let stale = store.account(stale.id).await.unwrap();
        assert_eq!((stale.reservation_credits, stale.expiring_credits), (6, 0));

        let renewed_only = store.account(renewed_only.id).await.unwrap();
        assert_eq!(renewed_only.last_expiration_date, Some(at(2025, 3, 9)));
        assert_eq!(store.account(current.id).await.unwrap(), current);
    }

    #[tokio::test]
    async fn test_sweep_respects_batch_size() {
        let (store, ledger, _) = seeded().await;

        let stats = reconcile_due_members(store.as_ref(), &ledger, 1, at(2025, 3, 9))
            .await
            .unwrap();
        assert_eq!(stats.total_checked, 1);
    }

    #[tokio::test]
    async fn test_sweep_counts_member_failures() {
        let (store, ledger, _) = seeded().await;
        store.fail_on(StoreOp::SwapAccount).await;

        let stats = reconcile_due_members(store.as_ref(), &ledger, 100, at(2025, 3, 9))
            .await
            .unwrap();
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.applied, 0);
    }

    #[tokio::test]
    async fn test_sweep_fails_when_lookup_fails() {
        let (store, ledger, _) = seeded().await;
        store.fail_on(StoreOp::DueMembers).await;

        assert!(reconcile_due_members(store.as_ref(), &ledger, 100, at(2025, 3, 9))
            .await
            .is_err());
    }
}
