pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod discovery;
pub mod model;
pub mod output;
pub mod prober;
pub mod progress;
pub mod runner;
pub mod store;
pub mod utils;

#[cfg(test)]
mod tests;
