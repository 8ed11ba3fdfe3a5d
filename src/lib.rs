//! Referral tracking service.
//!
//! Records who referred whom, moves referrals through verification and
//! public announcement, and serves a leaderboard of top referrers over an
//! HTTP JSON API. Storage is pluggable: MongoDB, SQLite or in-memory.

pub mod announcer;
pub mod api;
pub mod config;
pub mod model;
pub mod service;
pub mod storage;
pub mod utils;
