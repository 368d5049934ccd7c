use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::ReservationStore;
use crate::error::{ReservationError, Result};
use crate::models::{Booking, BookingOutcome};
use crate::services::credit_ledger::{Calendar, CreditLedger};

/// Default number of classes a member may hold on one calendar day
pub const DEFAULT_DAILY_LIMIT: i64 = 2;

/// Validates and executes reserve/cancel requests.
///
/// Every entry point reconciles the member's credits first, then works
/// against the resulting balance.
#[derive(Clone)]
pub struct ReservationCoordinator {
    store: Arc<dyn ReservationStore>,
    ledger: CreditLedger,
    daily_limit: i64,
}

impl ReservationCoordinator {
    pub fn new(store: Arc<dyn ReservationStore>, calendar: Calendar) -> Self {
        Self {
            ledger: CreditLedger::new(store.clone(), calendar),
            store,
            daily_limit: DEFAULT_DAILY_LIMIT,
        }
    }

    pub fn with_daily_limit(mut self, daily_limit: i64) -> Self {
        self.daily_limit = daily_limit;
        self
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    pub async fn reserve(&self, member_id: Uuid, class_id: Uuid) -> Result<()> {
        self.reserve_at(member_id, class_id, Utc::now()).await
    }

    pub async fn cancel(&self, member_id: Uuid, class_id: Uuid) -> Result<()> {
        self.cancel_at(member_id, class_id, Utc::now()).await
    }

    pub async fn list_reservations(&self, member_id: Uuid) -> Result<Vec<Uuid>> {
        self.list_reservations_at(member_id, Utc::now()).await
    }

    /// Reserves a seat in `class_id` for `member_id`, spending one credit.
    ///
    /// Checks run in a fixed order and the first failure is returned:
    /// balance, class existence, start time, cancellation, duplicate,
    /// daily limit.
    #[tracing::instrument(skip(self))]
    pub async fn reserve_at(
        &self,
        member_id: Uuid,
        class_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ledger.reconcile(member_id, now).await;

        let account = self
            .store
            .get_account(member_id)
            .await?
            .ok_or(ReservationError::MemberNotFound)?;

        if !account.can_spend() {
            return Err(ReservationError::InsufficientCredits);
        }

        let class = self
            .store
            .get_class(class_id)
            .await?
            .ok_or(ReservationError::ClassNotFound)?;

        if class.has_started(now) {
            return Err(ReservationError::ClassInPast);
        }

        if class.is_cancelled {
            return Err(ReservationError::ClassCancelled);
        }

        if self.store.has_reservation(member_id, class_id).await? {
            return Err(ReservationError::AlreadyReserved);
        }

        let (day_start, day_end) = self.ledger.calendar().day_bounds(class.start_time);
        let same_day = self
            .store
            .count_reservations(member_id, day_start, day_end)
            .await?;

        if same_day >= self.daily_limit {
            return Err(ReservationError::DailyLimitExceeded {
                limit: self.daily_limit,
            });
        }

        let booking = Booking {
            member_id,
            class_id,
            day_start,
            day_end,
            daily_limit: self.daily_limit,
        };

        // The store re-checks balance, duplicate and limit under its lock
        match self.store.book(&booking).await {
            Ok(BookingOutcome::Booked(account)) => {
                tracing::info!(
                    member_id = %member_id,
                    class_id = %class_id,
                    reservation_credits = account.reservation_credits,
                    expiring_credits = account.expiring_credits,
                    "Class reserved"
                );
                Ok(())
            }
            Ok(BookingOutcome::MemberNotFound) => Err(ReservationError::MemberNotFound),
            Ok(BookingOutcome::InsufficientCredits) => Err(ReservationError::InsufficientCredits),
            Ok(BookingOutcome::AlreadyReserved) => Err(ReservationError::AlreadyReserved),
            Ok(BookingOutcome::DailyLimitReached) => Err(ReservationError::DailyLimitExceeded {
                limit: self.daily_limit,
            }),
            Err(e) => {
                tracing::error!(
                    member_id = %member_id,
                    class_id = %class_id,
                    error = %e,
                    "Failed to book class"
                );
                Err(e.into())
            }
        }
    }

    /// Cancels a reservation and refunds one fresh credit
    #[tracing::instrument(skip(self))]
    pub async fn cancel_at(
        &self,
        member_id: Uuid,
        class_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ledger.reconcile(member_id, now).await;

        if !self.store.has_reservation(member_id, class_id).await? {
            return Err(ReservationError::NoReservationToCancel);
        }

        match self.store.release(member_id, class_id).await {
            Ok(true) => {
                tracing::info!(
                    member_id = %member_id,
                    class_id = %class_id,
                    "Reservation cancelled, credit refunded"
                );
                Ok(())
            }
            // Cancelled concurrently between the check and the release
            Ok(false) => Err(ReservationError::NoReservationToCancel),
            Err(e) => {
                tracing::error!(
                    member_id = %member_id,
                    class_id = %class_id,
                    error = %e,
                    "Failed to cancel reservation"
                );
                Err(e.into())
            }
        }
    }

    /// Class IDs the member currently holds, after reconciling credits
    pub async fn list_reservations_at(
        &self,
        member_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        self.ledger.reconcile(member_id, now).await;

        Ok(self.store.list_reserved_class_ids(member_id).await?)
    }
}
