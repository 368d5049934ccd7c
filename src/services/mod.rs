// Services module - Business logic

pub mod credit_ledger;
pub mod reservation_coordinator;

pub use credit_ledger::{Calendar, CreditLedger};
pub use reservation_coordinator::ReservationCoordinator;
