use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Booking, BookingOutcome, CreditAccount, GymClass, Reservation};

/// Data access used by the ledger and the reservation coordinator
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn get_account(&self, member_id: Uuid) -> Result<Option<CreditAccount>, StoreError>;

    /// Replaces the account with `next` if it still equals `expected`
    async fn swap_account(
        &self,
        expected: &CreditAccount,
        next: &CreditAccount,
    ) -> Result<bool, StoreError>;

    async fn get_class(&self, class_id: Uuid) -> Result<Option<GymClass>, StoreError>;

    async fn has_reservation(&self, member_id: Uuid, class_id: Uuid) -> Result<bool, StoreError>;

    /// Reservations held by the member for classes starting in `[from, to)`
    async fn count_reservations(
        &self,
        member_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    async fn list_reserved_class_ids(&self, member_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    /// Inserts the reservation and debits one credit atomically
    async fn book(&self, booking: &Booking) -> Result<BookingOutcome, StoreError>;

    /// Deletes the reservation and refunds one credit atomically
    async fn release(&self, member_id: Uuid, class_id: Uuid) -> Result<bool, StoreError>;

    async fn members_due_for_reconciliation(
        &self,
        month_start: DateTime<Utc>,
        expiration_open: bool,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError>;
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReservationStore for PgStore {
    async fn get_account(&self, member_id: Uuid) -> Result<Option<CreditAccount>, StoreError> {
        Ok(CreditAccount::find_by_id(&self.pool, member_id).await?)
    }

    async fn swap_account(
        &self,
        expected: &CreditAccount,
        next: &CreditAccount,
    ) -> Result<bool, StoreError> {
        Ok(CreditAccount::compare_and_swap(&self.pool, expected, next).await?)
    }

    async fn get_class(&self, class_id: Uuid) -> Result<Option<GymClass>, StoreError> {
        Ok(GymClass::find_by_id(&self.pool, class_id).await?)
    }

    async fn has_reservation(&self, member_id: Uuid, class_id: Uuid) -> Result<bool, StoreError> {
        Ok(Reservation::exists(&self.pool, member_id, class_id).await?)
    }

    async fn count_reservations(
        &self,
        member_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        Ok(Reservation::count_between(&self.pool, member_id, from, to).await?)
    }

    async fn list_reserved_class_ids(&self, member_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        Ok(Reservation::list_class_ids(&self.pool, member_id).await?)
    }

    async fn book(&self, booking: &Booking) -> Result<BookingOutcome, StoreError> {
        Ok(Reservation::book(&self.pool, booking).await?)
    }

    async fn release(&self, member_id: Uuid, class_id: Uuid) -> Result<bool, StoreError> {
        Ok(Reservation::release(&self.pool, member_id, class_id).await?)
    }

    async fn members_due_for_reconciliation(
        &self,
        month_start: DateTime<Utc>,
        expiration_open: bool,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        Ok(
            CreditAccount::find_due_for_reconciliation(&self.pool, month_start, expiration_open, limit)
                .await?,
        )
    }
}
