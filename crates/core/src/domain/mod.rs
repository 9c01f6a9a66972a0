pub mod booking;
pub mod flight;
pub mod iata;
pub mod search;
