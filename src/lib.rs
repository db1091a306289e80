//! RT5 Sync Server Library
//!
//! Per-tick entity synchronisation for an rt5 game server: bit-packed
//! player info, appearance blocks, map rebuilds and the login lifecycle,
//! served over TCP from a fixed-rate tick loop.

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod metrics;
