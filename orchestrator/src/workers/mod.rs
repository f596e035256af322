//! Background workers

pub mod driver;
