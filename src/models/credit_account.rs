use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// The reservation-credit columns of a member's `profiles` row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CreditAccount {
    pub id: Uuid,
    pub reservation_credits: i32,
    pub expiring_credits: i32,
    pub plan_credits: i32,
    pub last_renewal_date: Option<DateTime<Utc>>,
    pub last_expiration_date: Option<DateTime<Utc>>,
}

impl CreditAccount {
    /// A member with a plan who has never been renewed or expired
    pub fn new(id: Uuid, reservation_credits: i32, plan_credits: i32) -> Self {
        Self {
            id,
            reservation_credits,
            expiring_credits: 0,
            plan_credits,
            last_renewal_date: None,
            last_expiration_date: None,
        }
    }

    pub fn can_spend(&self) -> bool {
        self.reservation_credits >= 1
    }

    /// Spends one credit, drawing from the expiring pool first.
    ///
    /// Returns `None` when the balance is empty.
    pub fn debit(&self) -> Option<Self> {
        if !self.can_spend() {
            return None;
        }

        Some(Self {
            reservation_credits: self.reservation_credits - 1,
            expiring_credits: (self.expiring_credits - 1).max(0),
            ..self.clone()
        })
    }

    /// Returns one credit to the balance. Refunds are always fresh credits.
    pub fn refund(&self) -> Self {
        Self {
            reservation_credits: self.reservation_credits + 1,
            ..self.clone()
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.reservation_credits >= 0
            && self.expiring_credits >= 0
            && self.expiring_credits <= self.reservation_credits
            && self.plan_credits >= 0
    }

    /// Loads the credit columns of a profile
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let account = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, reservation_credits, expiring_credits, plan_credits,
                   last_renewal_date, last_expiration_date
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(account)
    }

    /// Writes `next` only if the stored row still equals `expected`.
    ///
    /// Returns `false` when another writer got there first.
    pub async fn compare_and_swap(
        pool: &PgPool,
        expected: &CreditAccount,
        next: &CreditAccount,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET
                reservation_credits = $2,
                expiring_credits = $3,
                last_renewal_date = $4,
                last_expiration_date = $5
            WHERE id = $1
              AND reservation_credits = $6
              AND expiring_credits = $7
              AND plan_credits = $8
              AND last_renewal_date IS NOT DISTINCT FROM $9
              AND last_expiration_date IS NOT DISTINCT FROM $10
            "#,
        )
        .bind(expected.id)
        .bind(next.reservation_credits)
        .bind(next.expiring_credits)
        .bind(next.last_renewal_date)
        .bind(next.last_expiration_date)
        .bind(expected.reservation_credits)
        .bind(expected.expiring_credits)
        .bind(expected.plan_credits)
        .bind(expected.last_renewal_date)
        .bind(expected.last_expiration_date)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Members whose watermarks show a renewal (or, once the expiration
    /// window has opened, an expiration) still pending for this month
    pub async fn find_due_for_reconciliation(
        pool: &PgPool,
        month_start: DateTime<Utc>,
        expiration_open: bool,
        limit: i64,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM profiles
            WHERE (plan_credits > 0
                   AND (last_renewal_date IS NULL OR last_renewal_date < $1))
               OR ($2
                   AND (last_expiration_date IS NULL OR last_expiration_date < $1))
            ORDER BY id
            LIMIT $3
            "#,
        )
        .bind(month_start)
        .bind(expiration_open)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(credits: i32, expiring: i32) -> CreditAccount {
        CreditAccount {
            expiring_credits: expiring,
            ..CreditAccount::new(Uuid::new_v4(), credits, 4)
        }
    }

    #[test]
    fn test_debit_spends_expiring_first() {
        let spent = account(8, 4).debit().unwrap();
        assert_eq!(spent.reservation_credits, 7);
        assert_eq!(spent.expiring_credits, 3);
    }

    #[test]
    fn test_debit_fresh_when_nothing_expiring() {
        let spent = account(3, 0).debit().unwrap();
        assert_eq!(spent.reservation_credits, 2);
        assert_eq!(spent.expiring_credits, 0);
    }

    #[test]
    fn test_debit_empty_balance() {
        assert!(account(0, 0).debit().is_none());
    }

    #[test]
    fn test_refund_is_fresh() {
        let refunded = account(3, 2).refund();
        assert_eq!(refunded.reservation_credits, 4);
        assert_eq!(refunded.expiring_credits, 2);
        assert!(refunded.is_consistent());
    }
}
