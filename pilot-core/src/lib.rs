pub mod config;
pub mod engine;
pub mod error;
pub mod reducer;

// Unit model and listing
pub mod filter;
pub mod parser;
pub mod unit;

// Manager invocations and execution
pub mod command;
pub mod manager;
pub mod runner;

// Focus carry-forward and settle timers
pub mod focus;
pub mod reconcile;

// Interactive terminal capability
pub mod launcher;
