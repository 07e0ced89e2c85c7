pub mod build_info;
pub mod cli;
pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod remote;
pub mod reporting;
pub mod server;
pub mod state;
pub mod store;
pub mod sync_service;
