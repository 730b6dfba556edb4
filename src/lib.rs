//! Device-side CoAP (RFC 7252) client for the Exosite One Platform.
//!
//! A device identifies itself with a `(vendor, model, serial)` triple,
//! trades that for a 40-byte Client Interface Key (CIK) via a one-time
//! activation exchange, and thereafter performs writes, one-shot reads, and
//! long-lived RFC 7641 observations against named "aliases".
//!
//! The crate is split the way the original C library's translation units
//! were: a zero-allocation PDU codec ([`pdu`]), the six message shapes this
//! client ever builds ([`msg`]), the operation data model ([`op`]), and the
//! non-blocking engine that drives operations forward ([`engine`]). Callers
//! own a fixed array of [`op::Op`] and an [`engine::Engine`], and provide a
//! [`pal::Pal`] that does whatever the caller's platform needs for a UDP
//! socket, persistent CIK storage, and a clock.
//!
//! ```ignore
//! let mut engine = Engine::init(pal, "acme", "widget", "SN-001")?;
//! let mut ops = [empty_op(), empty_op()];
//! let mut value = [0u8; 32];
//! ops[1].read("temperature", &mut value);
//! loop {
//!   match engine.operate(&mut ops) {
//!     OperateStatus::Idle if ops[1].is_finished() => break,
//!     _ => {},
//!   }
//! }
//! ```
#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod msg;
pub mod op;
pub mod pal;
pub mod pdu;

#[cfg(feature = "std")]
pub mod std_pal;

#[cfg(test)]
mod testutil;

pub use engine::{DeviceState, Engine, OperateStatus};
pub use error::Error;
pub use op::{Op, OpState, OpType};
pub use pal::{CikLookup, Pal};
