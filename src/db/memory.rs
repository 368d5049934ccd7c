use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::ReservationStore;
use crate::error::StoreError;
use crate::models::{Booking, BookingOutcome, CreditAccount, GymClass};

/// Store operations that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetAccount,
    SwapAccount,
    GetClass,
    HasReservation,
    CountReservations,
    ListReservations,
    Book,
    Release,
    DueMembers,
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<Uuid, CreditAccount>,
    classes: HashMap<Uuid, GymClass>,
    // (member_id, class_id)
    reservations: BTreeSet<(Uuid, Uuid)>,
    failing: HashSet<StoreOp>,
}

impl MemoryState {
    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        if self.failing.contains(&op) {
            return Err(StoreError::Unavailable(format!("{:?} failed", op)));
        }
        Ok(())
    }

    fn count_between(&self, member_id: Uuid, from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
        self.reservations
            .iter()
            .filter(|(member, _)| *member == member_id)
            .filter_map(|(_, class_id)| self.classes.get(class_id))
            .filter(|class| class.start_time >= from && class.start_time < to)
            .count() as i64
    }
}

/// In-process store with the same atomicity as the Postgres one.
///
/// Every operation runs under a single lock, which gives the per-member
/// serialisation that `FOR UPDATE` gives in Postgres.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_account(&self, account: CreditAccount) {
        self.state.lock().await.accounts.insert(account.id, account);
    }

    pub async fn insert_class(&self, class: GymClass) {
        self.state.lock().await.classes.insert(class.id, class);
    }

    /// Current snapshot of an account
    pub async fn account(&self, member_id: Uuid) -> Option<CreditAccount> {
        self.state.lock().await.accounts.get(&member_id).cloned()
    }

    pub async fn reservation_count(&self, member_id: Uuid) -> usize {
        self.state
            .lock()
            .await
            .reservations
            .iter()
            .filter(|(member, _)| *member == member_id)
            .count()
    }

    /// Makes every later call of `op` fail until `recover` is called
    pub async fn fail_on(&self, op: StoreOp) {
        self.state.lock().await.failing.insert(op);
    }

    pub async fn recover(&self, op: StoreOp) {
        self.state.lock().await.failing.remove(&op);
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn get_account(&self, member_id: Uuid) -> Result<Option<CreditAccount>, StoreError> {
        let state = self.state.lock().await;
        state.check(StoreOp::GetAccount)?;
        Ok(state.accounts.get(&member_id).cloned())
    }

    async fn swap_account(
        &self,
        expected: &CreditAccount,
        next: &CreditAccount,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::SwapAccount)?;

        match state.accounts.get_mut(&expected.id) {
            Some(current) if current == expected => {
                *current = next.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_class(&self, class_id: Uuid) -> Result<Option<GymClass>, StoreError> {
        let state = self.state.lock().await;
        state.check(StoreOp::GetClass)?;
        Ok(state.classes.get(&class_id).cloned())
    }

    async fn has_reservation(&self, member_id: Uuid, class_id: Uuid) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        state.check(StoreOp::HasReservation)?;
        Ok(state.reservations.contains(&(member_id, class_id)))
    }

    async fn count_reservations(
        &self,
        member_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let state = self.state.lock().await;
        state.check(StoreOp::CountReservations)?;
        Ok(state.count_between(member_id, from, to))
    }

    async fn list_reserved_class_ids(&self, member_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let state = self.state.lock().await;
        state.check(StoreOp::ListReservations)?;
        Ok(state
            .reservations
            .iter()
            .filter(|(member, _)| *member == member_id)
            .map(|(_, class_id)| *class_id)
            .collect())
    }

    async fn book(&self, booking: &Booking) -> Result<BookingOutcome, StoreError> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::Book)?;

        let Some(account) = state.accounts.get(&booking.member_id).cloned() else {
            return Ok(BookingOutcome::MemberNotFound);
        };

        if !account.can_spend() {
            return Ok(BookingOutcome::InsufficientCredits);
        }

        let key = (booking.member_id, booking.class_id);
        if state.reservations.contains(&key) {
            return Ok(BookingOutcome::AlreadyReserved);
        }

        if state.count_between(booking.member_id, booking.day_start, booking.day_end)
            >= booking.daily_limit
        {
            return Ok(BookingOutcome::DailyLimitReached);
        }

        let Some(debited) = account.debit() else {
            return Ok(BookingOutcome::InsufficientCredits);
        };

        state.reservations.insert(key);
        state.accounts.insert(debited.id, debited.clone());

        Ok(BookingOutcome::Booked(debited))
    }

    async fn release(&self, member_id: Uuid, class_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::Release)?;

        if !state.reservations.remove(&(member_id, class_id)) {
            return Ok(false);
        }

        let refunded = state.accounts.get(&member_id).map(CreditAccount::refund);
        if let Some(account) = refunded {
            state.accounts.insert(member_id, account);
        }

        Ok(true)
    }

    async fn members_due_for_reconciliation(
        &self,
        month_start: DateTime<Utc>,
        expiration_open: bool,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        let state = self.state.lock().await;
        state.check(StoreOp::DueMembers)?;

        let before_month = |mark: Option<DateTime<Utc>>| mark.map_or(true, |at| at < month_start);

        let mut due: Vec<Uuid> = state
            .accounts
            .values()
            .filter(|account| {
                (account.plan_credits > 0 && before_month(account.last_renewal_date))
                    || (expiration_open && before_month(account.last_expiration_date))
            })
            .map(|account| account.id)
            .collect();

        due.sort();
        due.truncate(usize::try_from(limit).unwrap_or(0));

        Ok(due)
    }
}
