//! Deribit market-data and order-routing gateway.
//!
//! A feed session streams differential order-book updates from the exchange
//! into a bounded lock-free queue; a worker pool reconstructs per-instrument
//! books under per-symbol locks; applied updates fan out to local WebSocket
//! subscribers and are observable through a synchronous query API. Order
//! placement runs over the exchange's HTTPS RPC surface with the same bounded
//! queue pattern for fire-and-forget submission.

pub mod auth;
pub mod config;
pub mod feed;
pub mod market;
pub mod orders;
pub mod server;
