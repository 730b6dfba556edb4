//! Thin, crate-internal wrappers around the `log` facade.
//!
//! Mirrors `toad::logging`'s role: the engine doesn't format its own
//! strings inline everywhere, it calls a small set of named helpers so the
//! log wording stays consistent across call sites.

use crate::op::{Op, OpState};

pub(crate) fn op_transition(op: &Op<'_>, from: OpState) {
  log::debug!("op (type {:?}) {:?} -> {:?}", op.ty, from, op.state);
}

pub(crate) fn dropped_datagram(reason: &str) {
  log::trace!("dropped inbound datagram: {}", reason);
}

pub(crate) fn stray_con_reset(mid: u16) {
  log::warn!("stray CON mid={} answered with RST", mid);
}

pub(crate) fn bad_cik() {
  log::warn!("device transitioned to BadCik");
}

pub(crate) fn fatal_pal_error() {
  log::error!("fatal PAL error during init");
}
