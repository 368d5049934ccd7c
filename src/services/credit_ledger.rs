use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::db::ReservationStore;
use crate::error::StoreError;
use crate::models::CreditAccount;

/// Day of the month on which last month's unused credits are forfeited
pub const EXPIRATION_DAY: u32 = 6;

/// The business calendar month and day boundaries are computed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    offset: FixedOffset,
}

impl Calendar {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Returns `None` if the offset is not within +/- 24h
    pub fn with_offset_minutes(minutes: i32) -> Option<Self> {
        let offset = FixedOffset::east_opt(minutes.checked_mul(60)?)?;
        Some(Self { offset })
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    fn midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let local = date.and_time(NaiveTime::MIN);
        let utc = local - chrono::Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc)
    }

    fn first_of_month(&self, instant: DateTime<Utc>) -> NaiveDate {
        let date = self.local_date(instant);
        date - Days::new(u64::from(date.day0()))
    }

    /// First instant of the calendar month containing `instant`
    pub fn month_start(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.midnight(self.first_of_month(instant))
    }

    /// 00:00 on the expiration day of the month containing `instant`
    pub fn expiration_start(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let first = self.first_of_month(instant);
        self.midnight(first + Days::new(u64::from(EXPIRATION_DAY - 1)))
    }

    /// Bounds `[start, end)` of the calendar day containing `instant`
    pub fn day_bounds(&self, instant: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let date = self.local_date(instant);
        (self.midnight(date), self.midnight(date + Days::new(1)))
    }
}

impl Default for Calendar {
    fn default() -> Self {
        Self::utc()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerStep {
    /// Monthly grant applied; the pre-grant balance became expiring
    Renewed { granted: i32, now_expiring: i32 },
    /// Unused expiring credits forfeited
    Expired { forfeited: i32 },
    /// Month marked expired without forfeiting, because the grant ran in
    /// the same evaluation
    ExpirationWaived { spared: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub account: CreditAccount,
    pub steps: Vec<LedgerStep>,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Applies the monthly renewal and expiration policy to `account` as of `now`.
///
/// Each transition runs at most once per calendar month, guarded by the
/// `last_renewal_date`/`last_expiration_date` watermarks. When the renewal
/// runs on or after the expiration day, that month's expiration is marked
/// done without forfeiting anything.
pub fn reconcile(account: &CreditAccount, now: DateTime<Utc>, calendar: &Calendar) -> Reconciliation {
    let month_start = calendar.month_start(now);
    let before_month = |mark: Option<DateTime<Utc>>| mark.map_or(true, |at| at < month_start);

    let mut next = account.clone();
    let mut steps = Vec::new();

    let renewed = next.plan_credits > 0 && before_month(next.last_renewal_date);
    if renewed {
        next.expiring_credits = next.reservation_credits;
        next.reservation_credits = next.reservation_credits.saturating_add(next.plan_credits);
        next.last_renewal_date = Some(now);

        steps.push(LedgerStep::Renewed {
            granted: next.plan_credits,
            now_expiring: next.expiring_credits,
        });
    }

    if now >= calendar.expiration_start(now) && before_month(next.last_expiration_date) {
        if renewed {
            steps.push(LedgerStep::ExpirationWaived {
                spared: next.expiring_credits,
            });
        } else {
            let remaining = (next.reservation_credits - next.expiring_credits.max(0)).max(0);
            steps.push(LedgerStep::Expired {
                forfeited: next.reservation_credits - remaining,
            });
            next.reservation_credits = remaining;
        }

        next.expiring_credits = 0;
        next.last_expiration_date = Some(now);
    }

    Reconciliation {
        account: next,
        steps,
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Unchanged,
    Applied(Reconciliation),
    /// The account changed between read and write; nothing was written
    Conflict,
    MemberMissing,
}

/// Keeps member balances in line with the monthly policy
#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn ReservationStore>,
    calendar: Calendar,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn ReservationStore>, calendar: Calendar) -> Self {
        Self { store, calendar }
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    /// Reconciles a member's balance and reports what happened
    #[tracing::instrument(skip(self))]
    pub async fn try_reconcile(
        &self,
        member_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, LedgerError> {
        let Some(account) = self.store.get_account(member_id).await? else {
            return Ok(ReconcileOutcome::MemberMissing);
        };

        let reconciliation = reconcile(&account, now, &self.calendar);
        if reconciliation.is_noop() {
            tracing::debug!(member_id = %member_id, "Credits already current");
            return Ok(ReconcileOutcome::Unchanged);
        }

        if !self
            .store
            .swap_account(&account, &reconciliation.account)
            .await?
        {
            tracing::debug!(
                member_id = %member_id,
                "Account changed during reconciliation, skipping"
            );
            return Ok(ReconcileOutcome::Conflict);
        }

        tracing::info!(
            member_id = %member_id,
            steps = ?reconciliation.steps,
            reservation_credits = reconciliation.account.reservation_credits,
            expiring_credits = reconciliation.account.expiring_credits,
            "Credits reconciled"
        );

        Ok(ReconcileOutcome::Applied(reconciliation))
    }

    /// Reconciles a member's balance, logging and swallowing any failure
    pub async fn reconcile(&self, member_id: Uuid, now: DateTime<Utc>) {
        if let Err(e) = self.try_reconcile(member_id, now).await {
            tracing::warn!(
                member_id = %member_id,
                error = %e,
                "Credit reconciliation failed, continuing with stored balance"
            );
        }
    }
}
