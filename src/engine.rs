//! The non-blocking operation engine: drains inbound datagrams, advances
//! queued operations, and reports whether there's more work to do.
//!
//! Grounded in `exo_operate`/`exo_process_waiting_datagrams`/
//! `exo_process_active_ops`. No threads, no async runtime, no callbacks:
//! [`Engine::operate`] is called from whatever loop the caller already has
//! (a `loop {}`, a scheduler tick, an RTOS task), and does a bounded amount
//! of work before returning.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::{CIK_LENGTH, DATAGRAM_MAX, REQUEST_TIMEOUT_US, SUBSCRIBE_JITTER_STEPS,
                     SUBSCRIBE_JITTER_STEP_US, SUBSCRIBE_REFRESH_US, TOKEN_LEN};
use crate::error::Error;
use crate::logging;
use crate::msg;
use crate::op::{Op, OpState, OpType};
use crate::pal::{CikLookup, Pal};
use crate::pdu::option::OptNumber;
use crate::pdu::{Code, PduBuf, Type};

/// Where the device is in its relationship with the Exosite One Platform.
///
/// There's no `Uninitialized` variant: an [`Engine`] only exists once
/// [`Engine::init`] has succeeded, so the only states reachable at runtime
/// are the ones below. This differs from the original C state machine
/// (which represents "uninitialized" explicitly, since `exo_operate` could
/// be called at any time) but is otherwise identical, see DESIGN.md.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum DeviceState {
  /// PAL is ready but the device has not yet (re)activated this boot.
  Initialized,
  /// Device has a CIK the platform has accepted.
  Good,
  /// A request came back `4.01 Unauthorized`; the CIK is no longer good
  /// and the device must re-activate.
  BadCik,
}

/// Result of a single [`Engine::operate`] call.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OperateStatus {
  /// At least one op is queued (`New`) and hasn't been sent yet.
  Busy,
  /// At least one op is in flight (`Pending`) awaiting a response.
  Waiting,
  /// Nothing left to do this tick.
  Idle,
}

/// Owns the platform adaptation layer and the process-wide state the
/// original library kept in static variables: the CIK, device identity,
/// the message-ID counter, and device activation state.
pub struct Engine<'e, P: Pal> {
  pal: P,
  cik: [u8; CIK_LENGTH],
  vendor: &'e str,
  model: &'e str,
  serial: &'e str,
  message_id_counter: u16,
  device_state: DeviceState,
  rng: ChaCha8Rng,
}

impl<'e, P: Pal> Engine<'e, P> {
  /// Initialize the library: bring up the platform layer, seed the
  /// message-ID counter and token RNG, and load any previously stored CIK.
  ///
  /// `vendor`/`model`/`serial` identify this device to the platform during
  /// activation; the pointers (here, borrows) must remain valid for the
  /// engine's lifetime, same contract as the original `exo_init`.
  pub fn init(mut pal: P, vendor: &'e str, model: &'e str, serial: &'e str) -> Result<Self, Error<P::Error>> {
    pal.init().map_err(Error::FatalPalError)?;

    let seed = pal.get_time_us();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let message_id_counter = rng.next_u32() as u16;

    let mut cik = [0u8; CIK_LENGTH];
    match pal.retrieve_cik(&mut cik) {
      | CikLookup::Found | CikLookup::Absent => {},
      | CikLookup::Fatal => {
        logging::fatal_pal_error();
        return Err(Error::FatalCikStorage);
      },
    }

    pal.udp_sock().map_err(Error::FatalPalError)?;

    Ok(Self { pal,
              cik,
              vendor,
              model,
              serial,
              message_id_counter,
              device_state: DeviceState::Initialized,
              rng })
  }

  fn next_mid(&mut self) -> u16 {
    let mid = self.message_id_counter;
    self.message_id_counter = self.message_id_counter.wrapping_add(1);
    mid
  }

  fn next_token(&mut self) -> [u8; TOKEN_LEN as usize] {
    let mut token = [0u8; TOKEN_LEN as usize];
    self.rng.fill_bytes(&mut token);
    token
  }

  fn subscribe_refresh_timeout(&mut self, now: u64) -> u64 {
    let steps = self.rng.gen_range(0..SUBSCRIBE_JITTER_STEPS) as u64;
    now + SUBSCRIBE_REFRESH_US + steps * SUBSCRIBE_JITTER_STEP_US
  }

  /// Drive every op in `ops` forward by one tick: drain and dispatch any
  /// waiting inbound datagrams, then send/timeout/ack as needed for each
  /// op. `ops[0]` is forced into an `Activate` op whenever the device
  /// isn't known-good and is otherwise idle, exactly as the original
  /// engine reserves the first slot for activation.
  pub fn operate(&mut self, ops: &mut [Op<'_>]) -> OperateStatus {
    if matches!(self.device_state, DeviceState::Initialized | DeviceState::BadCik) {
      if let Some(first) = ops.first_mut() {
        if first.state == OpState::Null && first.timeout == 0 {
          first.activate();
        }
      }
    }

    self.process_waiting_datagrams(ops);
    self.process_active_ops(ops);

    if ops.iter().any(|op| op.state == OpState::New) {
      OperateStatus::Busy
    } else if ops.iter().any(|op| op.state == OpState::Pending) {
      OperateStatus::Waiting
    } else {
      OperateStatus::Idle
    }
  }

  fn process_waiting_datagrams(&mut self, ops: &mut [Op<'_>]) {
    let mut buf = [0u8; DATAGRAM_MAX];

    loop {
      let len = match self.pal.udp_recv(&mut buf) {
        | Ok(len) => len,
        | Err(_) => return,
      };

      let pdu = PduBuf::from_datagram(&mut buf, len);
      if pdu.validate().is_err() {
        logging::dropped_datagram("failed validate()");
        continue;
      }

      let mid = pdu.mid();
      let ty = pdu.ty().unwrap_or(Type::Con);
      let code = pdu.code();
      let tkl = pdu.token().len();
      let mut token = [0u8; 8];
      token[..tkl].copy_from_slice(pdu.token());
      let obs_seq = pdu.option_by_number(OptNumber::Observe).map(|o| decode_obs_seq(o.value));

      let mut matched = false;
      for op in ops.iter_mut() {
        match op.ty {
          | OpType::Write if op.state == OpState::Pending && op.mid == mid => {
            matched = true;
            let from = op.state;
            if code.class == 2 {
              op.state = OpState::Success;
            } else {
              op.state = OpState::Error;
              if code == Code::UNAUTHORIZED {
                self.device_state = DeviceState::BadCik;
                logging::bad_cik();
              }
            }
            logging::op_transition(op, from);
            break;
          },
          | OpType::Read if op.state == OpState::Pending && op.mid == mid => {
            matched = true;
            let from = op.state;
            if code.class == 2 {
              accept_payload(op, pdu.payload().unwrap_or(&[]));
            } else {
              op.state = OpState::Error;
              if code == Code::UNAUTHORIZED {
                self.device_state = DeviceState::BadCik;
                logging::bad_cik();
              }
            }
            logging::op_transition(op, from);
            break;
          },
          | OpType::Subscribe if op.state == OpState::Pending && op.mid == mid => {
            matched = true;
            let from = op.state;
            if code.class == 2 {
              accept_payload(op, pdu.payload().unwrap_or(&[]));
              if op.state == OpState::Success {
                op.state = OpState::Subscribed;
                let now = self.pal.get_time_us();
                op.timeout = self.subscribe_refresh_timeout(now);
              }
            } else {
              op.state = OpState::Error;
              if code == Code::UNAUTHORIZED {
                self.device_state = DeviceState::BadCik;
                logging::bad_cik();
              }
            }
            logging::op_transition(op, from);
            break;
          },
          | OpType::Subscribe if op.state == OpState::Subscribed && op.token[..op.tkl as usize] == token[..tkl] => {
            matched = true;
            let from = op.state;
            let seq = obs_seq.unwrap_or(op.obs_seq);
            let payload = pdu.payload().unwrap_or(&[]);
            if payload.is_empty() {
              op.value_len = 0;
            } else if op.value.as_ref().map(|v| payload.len() >= v.len()).unwrap_or(true) {
              op.state = OpState::Error;
            } else {
              if let Some(val) = op.value.as_deref_mut() {
                val[..payload.len()].copy_from_slice(payload);
              }
              op.value_len = payload.len();
              op.mid = mid;
              if op.obs_seq != seq {
                op.obs_seq = seq;
                op.state = OpState::SubAckNew;
              } else {
                op.state = OpState::SubAck;
              }
            }
            logging::op_transition(op, from);
            break;
          },
          | OpType::Activate if op.state == OpState::Pending && op.mid == mid => {
            matched = true;
            let from = op.state;
            if code.class == 2 {
              let payload = pdu.payload().unwrap_or(&[]);
              if payload.len() == CIK_LENGTH {
                self.cik.copy_from_slice(payload);
                op.state = OpState::Success;
                let _ = self.pal.store_cik(&self.cik);
                self.device_state = DeviceState::Good;
              } else {
                op.state = OpState::Error;
              }
            } else {
              // May or may not be an error; might already be activated.
              op.state = OpState::Error;
              self.device_state = DeviceState::Good;
            }
            logging::op_transition(op, from);
            op.init();
            break;
          },
          | _ => {},
        }
      }

      if !matched {
        if ty == Type::Con {
          logging::stray_con_reset(mid);
          let mut rst_buf = [0u8; 16];
          if let Ok(mut rst) = PduBuf::init(&mut rst_buf, Type::Reset, Code::EMPTY, mid) {
            if msg::build_rst(&mut rst, mid, &token[..tkl]).is_ok() {
              let _ = self.pal.udp_send(&rst_buf[..rst.len()]);
            }
          }
        }
        return;
      }
    }
  }

  fn process_active_ops(&mut self, ops: &mut [Op<'_>]) {
    let now = self.pal.get_time_us();

    for op in ops.iter_mut() {
      match op.state {
        | OpState::New => self.send_new(op, now),
        | OpState::Subscribed | OpState::Pending if op.timeout <= now => {
          let from = op.state;
          match op.ty {
            | OpType::Read | OpType::Write => op.state = OpState::Error,
            | OpType::Subscribe => op.state = OpState::New,
            | OpType::Activate | OpType::Null => {},
          }
          if op.state != from {
            logging::op_transition(op, from);
          }
        },
        | OpState::SubAck | OpState::SubAckNew => self.send_ack(op, now),
        | _ => {},
      }
    }
  }

  fn send_new(&mut self, op: &mut Op<'_>, now: u64) {
    let mid = self.next_mid();
    let token = self.next_token();
    let mut buf = [0u8; DATAGRAM_MAX];
    let alias = op.alias.unwrap_or("");

    let Ok(mut pdu) = PduBuf::init(&mut buf, Type::Con, Code::EMPTY, mid) else {
      op.state = OpState::Error;
      return;
    };

    let built = match op.ty {
      | OpType::Read => msg::build_read(&mut pdu, mid, &token, alias, &self.cik),
      | OpType::Subscribe => msg::build_observe(&mut pdu, mid, &token, alias, &self.cik),
      | OpType::Write => {
        let value = op.value.as_deref().map(|v| &v[..op.value_len]).unwrap_or(&[]);
        msg::build_write(&mut pdu, mid, &token, alias, value, &self.cik)
      },
      | OpType::Activate => msg::build_activate(&mut pdu, mid, &token, self.vendor, self.model, self.serial),
      | OpType::Null => Ok(()),
    };

    if built.is_err() {
      op.state = OpState::Error;
      return;
    }
    let len = pdu.len();

    if self.pal.udp_send(&buf[..len]).is_ok() {
      let from = op.state;
      op.state = OpState::Pending;
      op.timeout = now + REQUEST_TIMEOUT_US;
      op.mid = mid;
      op.token[..token.len()].copy_from_slice(&token);
      op.tkl = token.len() as u8;
      logging::op_transition(op, from);
    }
  }

  fn send_ack(&mut self, op: &mut Op<'_>, now: u64) {
    let mut buf = [0u8; 16];
    let Ok(mut pdu) = PduBuf::init(&mut buf, Type::Ack, Code::EMPTY, op.mid) else {
      return;
    };
    if msg::build_ack(&mut pdu, op.mid).is_err() {
      return;
    }
    if self.pal.udp_send(&buf[..pdu.len()]).is_ok() {
      let from = op.state;
      op.state = if op.state == OpState::SubAck {
        OpState::Subscribed
      } else {
        OpState::Success
      };
      op.timeout = self.subscribe_refresh_timeout(now);
      logging::op_transition(op, from);
    }
  }
}

fn accept_payload(op: &mut Op<'_>, payload: &[u8]) {
  if payload.is_empty() {
    op.value_len = 0;
    op.state = OpState::Success;
  } else if op.value.as_ref().map(|v| payload.len() >= v.len()).unwrap_or(true) {
    op.state = OpState::Error;
  } else {
    if let Some(val) = op.value.as_deref_mut() {
      val[..payload.len()].copy_from_slice(payload);
    }
    op.value_len = payload.len();
    op.state = OpState::Success;
  }
}

/// Accumulate an RFC 7641 Observe sequence number from its big-endian option
/// bytes (1-3 bytes). The original C implementation's accumulation loop
/// shifts by `8 * j` instead of a constant `8` per byte, which produces a
/// sequence number with a gap in its bit pattern for 3-byte values; we
/// instead do the straightforward big-endian accumulation so freshness
/// comparisons behave as RFC 7641 intends.
fn decode_obs_seq(bytes: &[u8]) -> u32 {
  bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn decode_obs_seq_accumulates_big_endian() {
    assert_eq!(decode_obs_seq(&[]), 0);
    assert_eq!(decode_obs_seq(&[0x01]), 1);
    assert_eq!(decode_obs_seq(&[0x01, 0x02]), 0x0102);
    assert_eq!(decode_obs_seq(&[0x01, 0x02, 0x03]), 0x0102_03);
  }

  #[test]
  fn accept_payload_errors_when_value_buffer_too_small() {
    let mut small = [0u8; 2];
    let mut op = Op { ty: OpType::Read,
                      state: OpState::Pending,
                      timeout: 0,
                      token: [0; 8],
                      tkl: 2,
                      mid: 1,
                      obs_seq: 0,
                      alias: Some("a"),
                      value: Some(&mut small[..]),
                      value_len: 0,
                      retries: 0 };
    accept_payload(&mut op, b"too big");
    assert_eq!(op.state, OpState::Error);
  }

  #[test]
  fn accept_payload_copies_into_value_buffer() {
    let mut buf = [0u8; 8];
    let mut op = Op { ty: OpType::Read,
                      state: OpState::Pending,
                      timeout: 0,
                      token: [0; 8],
                      tkl: 2,
                      mid: 1,
                      obs_seq: 0,
                      alias: Some("a"),
                      value: Some(&mut buf[..]),
                      value_len: 0,
                      retries: 0 };
    accept_payload(&mut op, b"42");
    assert_eq!(op.state, OpState::Success);
    assert_eq!(op.value_len, 2);
    assert_eq!(&op.value.as_ref().unwrap()[..2], b"42");
  }

  #[test]
  fn accept_payload_errors_when_payload_exactly_fills_buffer() {
    // A payload equal to value_max leaves no room for the trailing NUL the
    // original engine always reserves; this must be an error, not a
    // same-size copy.
    let mut buf = [0u8; 4];
    let mut op = Op { ty: OpType::Read,
                      state: OpState::Pending,
                      timeout: 0,
                      token: [0; 8],
                      tkl: 2,
                      mid: 1,
                      obs_seq: 0,
                      alias: Some("a"),
                      value: Some(&mut buf[..]),
                      value_len: 0,
                      retries: 0 };
    accept_payload(&mut op, b"1234");
    assert_eq!(op.state, OpState::Error);
  }
}
