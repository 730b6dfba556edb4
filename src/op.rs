//! The operation slot: the unit of work the engine drives to completion.
//!
//! A caller owns a fixed-size array of [`Op`] and hands it to
//! [`crate::engine::Engine::operate`] every tick; nothing here allocates or
//! outlives the caller's array. Grounded directly in `exo_op`/
//! `exo_request_type`/`exo_request_state` in the original engine.

/// What an operation slot is doing.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OpType {
  /// Slot is unused.
  Null,
  /// Writing a value to a dataport.
  Write,
  /// Reading a value from a dataport.
  Read,
  /// Subscribed (or subscribing) to a dataport's value changes.
  Subscribe,
  /// Internal: activating the device against the platform.
  Activate,
}

/// Where an operation slot is in its lifecycle.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OpState {
  /// Slot is unused.
  Null,
  /// Queued by the caller; not yet sent.
  New,
  /// Request sent; awaiting a response before `timeout`.
  Pending,
  /// An active, healthy subscription awaiting the next notification.
  Subscribed,
  /// A notification arrived with the same sequence number already
  /// observed; an ACK still needs to go out to keep the subscription
  /// alive, but the op has nothing new to report.
  SubAck,
  /// A notification arrived with a new sequence number; an ACK needs to go
  /// out, after which the op reports success with the new value.
  SubAckNew,
  /// The operation completed successfully; `value`/`obs_seq` hold the
  /// result.
  Success,
  /// The operation failed.
  Error,
}

/// A single queued or in-flight operation.
///
/// Field order matches the original `exo_op` struct; nothing here depends
/// on that order, it's kept for ease of cross-referencing against the
/// original source.
pub struct Op<'a> {
  /// What kind of operation this slot represents.
  pub ty: OpType,
  /// Current lifecycle state.
  pub state: OpState,
  /// Absolute microsecond deadline (per [`crate::pal::Pal::get_time_us`])
  /// at which a `Pending`/`Subscribed` op is considered timed out or due
  /// for a refresh.
  pub timeout: u64,
  /// CoAP token correlating a sent request with its response. Only the
  /// low `tkl` bytes are meaningful.
  pub token: [u8; 8],
  /// Number of token bytes in use (always [`crate::config::TOKEN_LEN`] for
  /// requests this crate builds).
  pub tkl: u8,
  /// Message ID of the request currently in flight, or of the last
  /// notification ACKed (for `Subscribe`).
  pub mid: u16,
  /// Observe sequence number of the last notification accepted.
  pub obs_seq: u32,
  /// Dataport alias this operation targets. `None` for `Activate`.
  pub alias: Option<&'a str>,
  /// For `Write`: the value to send. For `Read`/`Subscribe`: the buffer a
  /// successful result is copied into. A payload must leave at least one
  /// spare byte (`payload.len() < value.len()`) or the op errors instead of
  /// copying; the reserved byte is where the original engine always wrote a
  /// terminating NUL.
  pub value: Option<&'a mut [u8]>,
  /// Length of the value actually written into `value` on success.
  pub value_len: usize,
  /// Reserved for a future retry policy; the original engine carries this
  /// field but never reads it.
  pub retries: u8,
}

impl<'a> Default for Op<'a> {
  /// An unused slot, equivalent to calling [`Op::init`] on a freshly zeroed
  /// struct. Lets callers build an array of slots with
  /// `core::array::from_fn(|_| Op::default())` without hand-writing every
  /// field.
  fn default() -> Self {
    Op { ty: OpType::Null,
         state: OpState::Null,
         timeout: 0,
         token: [0; 8],
         tkl: 0,
         mid: 0,
         obs_seq: 0,
         alias: None,
         value: None,
         value_len: 0,
         retries: 0 }
  }
}

impl<'a> Op<'a> {
  /// Reset a slot to its unused state.
  pub fn init(&mut self) {
    self.ty = OpType::Null;
    self.state = OpState::Null;
    self.alias = None;
    self.value = None;
    self.value_len = 0;
    self.mid = 0;
    self.obs_seq = 0;
    self.timeout = 0;
  }

  /// Finalize a finished, non-subscribe op back to `Null`; a finished
  /// subscribe op instead becomes the steady-state `Subscribed`, since a
  /// subscription has no "done" outside of the caller tearing it down.
  pub fn done(&mut self) {
    if self.is_subscribe() {
      self.state = OpState::Subscribed;
    } else {
      self.init();
    }
  }

  /// Queue a write of `value` to `alias`.
  pub fn write(&mut self, alias: &'a str, value: &'a mut [u8], value_len: usize) {
    self.ty = OpType::Write;
    self.state = OpState::New;
    self.alias = Some(alias);
    self.value = Some(value);
    self.value_len = value_len;
    self.mid = 0;
  }

  /// Queue a read of `alias` into `value`.
  pub fn read(&mut self, alias: &'a str, value: &'a mut [u8]) {
    self.ty = OpType::Read;
    self.state = OpState::New;
    self.alias = Some(alias);
    self.value = Some(value);
    self.value_len = 0;
    self.mid = 0;
  }

  /// Queue a subscription to `alias`, notifications copied into `value`.
  pub fn subscribe(&mut self, alias: &'a str, value: &'a mut [u8]) {
    self.ty = OpType::Subscribe;
    self.state = OpState::New;
    self.alias = Some(alias);
    self.value = Some(value);
    self.value_len = 0;
    self.mid = 0;
  }

  pub(crate) fn activate(&mut self) {
    self.ty = OpType::Activate;
    self.state = OpState::New;
    self.alias = None;
    self.value = None;
    self.value_len = 0;
    self.mid = 0;
  }

  /// Whether this slot holds any operation (is not [`OpType::Null`]).
  pub fn is_valid(&self) -> bool {
    self.ty != OpType::Null
  }

  /// Whether this operation completed successfully.
  pub fn is_success(&self) -> bool {
    self.state == OpState::Success
  }

  /// Whether this operation reached a terminal state (success or error).
  pub fn is_finished(&self) -> bool {
    matches!(self.state, OpState::Success | OpState::Error)
  }

  /// Whether this slot is a read.
  pub fn is_read(&self) -> bool {
    self.ty == OpType::Read
  }

  /// Whether this slot is a write.
  pub fn is_write(&self) -> bool {
    self.ty == OpType::Write
  }

  /// Whether this slot is a subscription.
  pub fn is_subscribe(&self) -> bool {
    self.ty == OpType::Subscribe
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn empty_op() -> Op<'static> {
    Op { ty: OpType::Null,
         state: OpState::Null,
         timeout: 0,
         token: [0; 8],
         tkl: 0,
         mid: 0,
         obs_seq: 0,
         alias: None,
         value: None,
         value_len: 0,
         retries: 0 }
  }

  #[test]
  fn done_resets_non_subscribe_ops() {
    let mut op = empty_op();
    op.ty = OpType::Read;
    op.state = OpState::Success;
    op.done();
    assert_eq!(op.ty, OpType::Null);
    assert_eq!(op.state, OpState::Null);
  }

  #[test]
  fn done_leaves_subscribe_ops_subscribed() {
    let mut op = empty_op();
    op.ty = OpType::Subscribe;
    op.state = OpState::SubAckNew;
    op.done();
    assert_eq!(op.ty, OpType::Subscribe);
    assert_eq!(op.state, OpState::Subscribed);
  }

  #[test]
  fn predicates() {
    let mut op = empty_op();
    assert!(!op.is_valid());
    op.ty = OpType::Write;
    assert!(op.is_valid());
    assert!(op.is_write());
    assert!(!op.is_read());
    op.state = OpState::Error;
    assert!(op.is_finished());
    assert!(!op.is_success());
  }
}
