//! Auction metrics refresher: pulls dashboard KPIs from the analytics
//! warehouse on a schedule and serves the latest snapshot from a two-tier cache.

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod logging;
pub mod refresh;
pub mod services;
pub mod snapshot;
pub mod source;
pub mod state;
pub mod utils;
pub mod web;
