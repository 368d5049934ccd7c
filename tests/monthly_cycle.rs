use chrono::{DateTime, Duration, TimeZone, Utc};
use gym_reservations::db::MemoryStore;
use gym_reservations::error::ReservationError;
use gym_reservations::models::{CreditAccount, GymClass};
use gym_reservations::services::{Calendar, ReservationCoordinator};
use std::sync::Arc;
use uuid::Uuid;

fn at(month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, month, day, hour, 0, 0).unwrap()
}

struct Gym {
    store: Arc<MemoryStore>,
    coordinator: ReservationCoordinator,
    member_id: Uuid,
}

impl Gym {
    /// Member with 4 credits on a 4-credit plan, last renewed in February
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let account = CreditAccount {
            last_renewal_date: Some(at(2, 1, 9)),
            last_expiration_date: Some(at(2, 6, 9)),
            ..CreditAccount::new(Uuid::new_v4(), 4, 4)
        };
        let member_id = account.id;
        store.insert_account(account).await;

        let coordinator = ReservationCoordinator::new(store.clone(), Calendar::utc());
        Self {
            store,
            coordinator,
            member_id,
        }
    }

    async fn class(&self, start_time: DateTime<Utc>) -> Uuid {
        let class = GymClass {
            id: Uuid::new_v4(),
            title: "Yoga".to_string(),
            instructor_id: None,
            start_time,
            end_time: start_time + Duration::hours(1),
            is_cancelled: false,
        };
        let id = class.id;
        self.store.insert_class(class).await;
        id
    }

    async fn balance(&self) -> (i32, i32) {
        let account = self.store.account(self.member_id).await.unwrap();
        (account.reservation_credits, account.expiring_credits)
    }
}

#[tokio::test]
async fn renewal_on_first_then_expiration_on_seventh() {
    let gym = Gym::new().await;

    gym.coordinator
        .list_reservations_at(gym.member_id, at(3, 1, 8))
        .await
        .unwrap();
    assert_eq!(gym.balance().await, (8, 4));

    gym.coordinator
        .list_reservations_at(gym.member_id, at(3, 7, 8))
        .await
        .unwrap();
    assert_eq!(gym.balance().await, (4, 0));
}

#[tokio::test]
async fn first_visit_after_expiration_day_keeps_everything() {
    let gym = Gym::new().await;

    gym.coordinator
        .list_reservations_at(gym.member_id, at(3, 7, 8))
        .await
        .unwrap();
    assert_eq!(gym.balance().await, (8, 0));

    let account = gym.store.account(gym.member_id).await.unwrap();
    assert_eq!(account.last_expiration_date, Some(at(3, 7, 8)));

    // Touching again later in the month changes nothing
    gym.coordinator
        .list_reservations_at(gym.member_id, at(3, 25, 8))
        .await
        .unwrap();
    assert_eq!(gym.balance().await, (8, 0));
}

#[tokio::test]
async fn reservations_before_expiration_use_expiring_credits() {
    let gym = Gym::new().await;
    let tuesday = gym.class(at(3, 4, 18)).await;
    let wednesday = gym.class(at(3, 5, 18)).await;

    gym.coordinator
        .reserve_at(gym.member_id, tuesday, at(3, 2, 10))
        .await
        .unwrap();
    gym.coordinator
        .reserve_at(gym.member_id, wednesday, at(3, 2, 10))
        .await
        .unwrap();
    assert_eq!(gym.balance().await, (6, 2));

    // Two unused expiring credits are forfeited, the grant survives
    let held = gym
        .coordinator
        .list_reservations_at(gym.member_id, at(3, 6, 0))
        .await
        .unwrap();
    assert_eq!(held.len(), 2);
    assert_eq!(gym.balance().await, (4, 0));
}

#[tokio::test]
async fn cancelled_credit_survives_expiration() {
    let gym = Gym::new().await;
    let class_id = gym.class(at(3, 10, 18)).await;

    gym.coordinator
        .reserve_at(gym.member_id, class_id, at(3, 2, 10))
        .await
        .unwrap();
    assert_eq!(gym.balance().await, (7, 3));

    gym.coordinator
        .cancel_at(gym.member_id, class_id, at(3, 3, 10))
        .await
        .unwrap();
    assert_eq!(gym.balance().await, (8, 3));

    gym.coordinator
        .list_reservations_at(gym.member_id, at(3, 6, 10))
        .await
        .unwrap();
    assert_eq!(gym.balance().await, (5, 0));
}

#[tokio::test]
async fn daily_cap_and_next_day() {
    let gym = Gym::new().await;
    let now = at(2, 20, 9);
    let first = gym.class(at(2, 21, 8)).await;
    let second = gym.class(at(2, 21, 12)).await;
    let third = gym.class(at(2, 21, 19)).await;
    let other_day = gym.class(at(2, 22, 8)).await;

    gym.coordinator.reserve_at(gym.member_id, first, now).await.unwrap();
    gym.coordinator.reserve_at(gym.member_id, second, now).await.unwrap();

    let err = gym
        .coordinator
        .reserve_at(gym.member_id, third, now)
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::DailyLimitExceeded { .. }));

    gym.coordinator
        .reserve_at(gym.member_id, other_day, now)
        .await
        .unwrap();
    assert_eq!(gym.balance().await, (1, 0));
}

#[tokio::test]
async fn running_out_of_credits() {
    let gym = Gym::new().await;
    let now = at(2, 20, 9);
    let mut classes = Vec::new();
    for day in 21..=25 {
        classes.push(gym.class(at(2, day, 8)).await);
    }

    for class_id in &classes[..4] {
        gym.coordinator
            .reserve_at(gym.member_id, *class_id, now)
            .await
            .unwrap();
    }

    let err = gym
        .coordinator
        .reserve_at(gym.member_id, classes[4], now)
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::InsufficientCredits));
    assert_eq!(gym.balance().await, (0, 0));
}
