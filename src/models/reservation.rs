use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::credit_account::CreditAccount;

/// Queries over the `reservations` table
pub struct Reservation;

/// A request to hold a seat and pay for it in one step
#[derive(Debug, Clone)]
pub struct Booking {
    pub member_id: Uuid,
    pub class_id: Uuid,
    /// Calendar day of the class, `[day_start, day_end)`
    pub day_start: DateTime<Utc>,
    pub day_end: DateTime<Utc>,
    pub daily_limit: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    /// Reservation inserted and one credit debited
    Booked(CreditAccount),
    MemberNotFound,
    InsufficientCredits,
    AlreadyReserved,
    DailyLimitReached,
}

impl Reservation {
    pub async fn exists(pool: &PgPool, member_id: Uuid, class_id: Uuid) -> Result<bool, sqlx::Error> {
        Self::exists_with(pool, member_id, class_id).await
    }

    async fn exists_with<'e, E: PgExecutor<'e>>(
        executor: E,
        member_id: Uuid,
        class_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM reservations
                WHERE user_id = $1 AND class_id = $2
            )
            "#,
        )
        .bind(member_id)
        .bind(class_id)
        .fetch_one(executor)
        .await?;

        Ok(exists)
    }

    /// Counts a member's reservations for classes starting in `[from, to)`
    pub async fn count_between<'e, E: PgExecutor<'e>>(
        executor: E,
        member_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM reservations r
            INNER JOIN gym_classes c ON c.id = r.class_id
            WHERE r.user_id = $1
              AND c.start_time >= $2
              AND c.start_time < $3
            "#,
        )
        .bind(member_id)
        .bind(from)
        .bind(to)
        .fetch_one(executor)
        .await?;

        Ok(count)
    }

    /// Lists the class IDs a member currently holds
    pub async fn list_class_ids(pool: &PgPool, member_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT class_id FROM reservations
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(member_id)
        .fetch_all(pool)
        .await?;

        Ok(ids)
    }

    /// Inserts the reservation and debits one credit in a single transaction.
    ///
    /// The member's profile row is locked for the duration, so balance,
    /// duplicate and daily-limit checks cannot race with another booking
    /// for the same member. Returning early drops the transaction, which
    /// rolls it back.
    pub async fn book(pool: &PgPool, booking: &Booking) -> Result<BookingOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let account = sqlx::query_as::<_, CreditAccount>(
            r#"
            SELECT id, reservation_credits, expiring_credits, plan_credits,
                   last_renewal_date, last_expiration_date
            FROM profiles
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(booking.member_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(account) = account else {
            return Ok(BookingOutcome::MemberNotFound);
        };

        if !account.can_spend() {
            return Ok(BookingOutcome::InsufficientCredits);
        }

        if Self::exists_with(&mut *tx, booking.member_id, booking.class_id).await? {
            return Ok(BookingOutcome::AlreadyReserved);
        }

        let same_day = Self::count_between(
            &mut *tx,
            booking.member_id,
            booking.day_start,
            booking.day_end,
        )
        .await?;

        if same_day >= booking.daily_limit {
            return Ok(BookingOutcome::DailyLimitReached);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO reservations (user_id, class_id)
            VALUES ($1, $2)
            "#,
        )
        .bind(booking.member_id)
        .bind(booking.class_id)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                return Ok(BookingOutcome::AlreadyReserved);
            }
            return Err(e);
        }

        let debited = sqlx::query_as::<_, CreditAccount>(
            r#"
            UPDATE profiles
            SET
                reservation_credits = reservation_credits - 1,
                expiring_credits = GREATEST(expiring_credits - 1, 0)
            WHERE id = $1 AND reservation_credits >= 1
            RETURNING id, reservation_credits, expiring_credits, plan_credits,
                      last_renewal_date, last_expiration_date
            "#,
        )
        .bind(booking.member_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(debited) = debited else {
            return Ok(BookingOutcome::InsufficientCredits);
        };

        tx.commit().await?;

        Ok(BookingOutcome::Booked(debited))
    }

    /// Deletes the reservation and refunds one credit in a single transaction.
    ///
    /// Returns `false` (and changes nothing) when there was no reservation.
    pub async fn release(pool: &PgPool, member_id: Uuid, class_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT id FROM profiles WHERE id = $1 FOR UPDATE")
            .bind(member_id)
            .fetch_optional(&mut *tx)
            .await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM reservations
            WHERE user_id = $1 AND class_id = $2
            "#,
        )
        .bind(member_id)
        .bind(class_id)
        .execute(&mut *tx)
        .await?;

        if deleted.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE profiles
            SET reservation_credits = reservation_credits + 1
            WHERE id = $1
            "#,
        )
        .bind(member_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(true)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
