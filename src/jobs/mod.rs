// Background jobs

pub mod credit_renewal;
