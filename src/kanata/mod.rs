//! kanata-specific implementations.
//!
//! kanata exposes layer changes over a plain TCP socket when started with
//! `--port`.  This module owns that connection: opening and cancelling it
//! ([`connection`]), turning chunks into layer events ([`decoder`]), and the
//! read loop that feeds the coordinator ([`watcher`]).
//!
//! Nothing outside this module should touch the daemon socket directly.

pub mod connection;
pub mod decoder;
pub mod watcher;
