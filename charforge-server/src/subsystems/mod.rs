pub mod engine;
pub mod profiles;
pub mod registry;
pub mod watchdog;
