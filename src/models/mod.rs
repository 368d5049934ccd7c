// Models module - Database entity representations

pub mod credit_account;
pub mod gym_class;
pub mod reservation;

pub use credit_account::CreditAccount;
pub use gym_class::GymClass;
pub use reservation::{Booking, BookingOutcome, Reservation};
