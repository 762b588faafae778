//! **kanata-indicator** shows the active kanata layer on screen.
//!
//! kanata, started with `--port`, reports every layer change over a TCP
//! socket as a JSON document.  This crate keeps one connection to that
//! socket, shows the current layer in a small indicator, hides it the moment
//! the connection drops, and reconnects when systemd reports that the kanata
//! service started again.
//!
//! # Architecture
//!
//! The crate is organised around a few traits in [`traits`]:
//!
//! * [`traits::Indicator`]: the visible output, so the connection logic is
//!   not coupled to any UI toolkit.
//! * [`traits::ChunkSource`]: a byte stream read in bounded chunks, so the
//!   read loop can be driven by a socket or a test script.
//! * [`traits::ServiceBus`]: job notifications and unit state queries, so
//!   restart detection is not coupled to D-Bus.
//!
//! Concrete implementations live in [`kanata`] (the daemon socket),
//! [`systemd`] (the system bus), and [`indicator`] (GTK overlay and text
//! output).  [`coordinator::ReconnectCoordinator`] ties them together.

pub mod config;
pub mod coordinator;
pub mod event;
pub mod indicator;
pub mod kanata;
pub mod systemd;
pub mod traits;

#[cfg(test)]
mod testing;
