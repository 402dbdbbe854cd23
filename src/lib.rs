pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod global;
pub mod recording;
pub mod storage;
