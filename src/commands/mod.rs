pub mod coerce;
pub mod config;
pub mod run;
pub mod validate;
