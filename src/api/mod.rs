// API module - HTTP endpoints

pub mod health;
pub mod middleware;
pub mod reservations;
