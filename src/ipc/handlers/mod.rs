pub mod attendance;
pub mod backup_exchange;
pub mod classes;
pub mod core;
pub mod demo;
pub mod reports;
pub mod settings;
pub mod students;
