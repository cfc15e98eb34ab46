//! Authoritative synchronization core for a multiplayer zone racing/combat game
//!
//! The server side lives in [`game`]: position histories, lag-compensated
//! shooting, the replicated game-state machine and the closing zone, all
//! driven by [`game::GameMatch`]. [`client::ClientSession`] is the matching
//! peer-side half. [`ws`] and [`http`] expose the session over WebSocket.

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod net;
pub mod util;
pub mod ws;
