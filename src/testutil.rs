//! Deterministic fake [`crate::pal::Pal`] shared by `#[cfg(test)]` modules
//! across the crate: a controllable clock and in-memory inbound/outbound
//! datagram queues instead of a real socket. Same role as
//! `toad::retry::test::FakeClock`, extended to cover the whole PAL surface
//! the engine needs to drive a full scenario.

use std::collections::VecDeque;

use crate::config::CIK_LENGTH;
use crate::pal::{CikLookup, Pal};
use crate::pdu::option::OptNumber;
use crate::pdu::{Code, PduBuf, Type};

#[derive(Debug)]
pub enum FakeError {
  SocketNotOpen,
}

pub struct FakePal {
  pub now_us: u64,
  pub cik: Option<[u8; CIK_LENGTH]>,
  pub inbound: VecDeque<Vec<u8>>,
  pub outbound: Vec<Vec<u8>>,
  sock_open: bool,
}

impl FakePal {
  pub fn new() -> Self {
    Self { now_us: 0,
           cik: None,
           inbound: VecDeque::new(),
           outbound: Vec::new(),
           sock_open: false }
  }

  pub fn deliver(&mut self, datagram: Vec<u8>) {
    self.inbound.push_back(datagram);
  }

  pub fn advance(&mut self, us: u64) {
    self.now_us += us;
  }

  pub fn last_sent(&self) -> Option<&[u8]> {
    self.outbound.last().map(Vec::as_slice)
  }
}

impl Pal for FakePal {
  type Error = FakeError;

  fn init(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }

  fn udp_sock(&mut self) -> Result<(), Self::Error> {
    self.sock_open = true;
    Ok(())
  }

  fn udp_send(&mut self, datagram: &[u8]) -> nb::Result<(), Self::Error> {
    if !self.sock_open {
      return Err(nb::Error::Other(FakeError::SocketNotOpen));
    }
    self.outbound.push(datagram.to_vec());
    Ok(())
  }

  fn udp_recv(&mut self, buf: &mut [u8]) -> nb::Result<usize, Self::Error> {
    match self.inbound.pop_front() {
      | Some(dgram) => {
        buf[..dgram.len()].copy_from_slice(&dgram);
        Ok(dgram.len())
      },
      | None => Err(nb::Error::WouldBlock),
    }
  }

  fn store_cik(&mut self, cik: &[u8; CIK_LENGTH]) -> Result<(), Self::Error> {
    self.cik = Some(*cik);
    Ok(())
  }

  fn retrieve_cik(&mut self, cik: &mut [u8; CIK_LENGTH]) -> CikLookup {
    match self.cik {
      | Some(stored) => {
        *cik = stored;
        CikLookup::Found
      },
      | None => CikLookup::Absent,
    }
  }

  fn get_time_us(&mut self) -> u64 {
    self.now_us
  }

  fn set_time_us(&mut self, timestamp_us: u64) {
    self.now_us = timestamp_us;
  }
}

/// Build a raw response datagram: `ty`/`code`/`mid`/`token`, an optional
/// Observe value, and a payload. Used to hand-construct server replies the
/// way a real datagram off the wire would look, without going through the
/// (request-only) message builders.
pub fn build_response(ty: Type, code: Code, mid: u16, token: &[u8], observe: Option<u32>, payload: &[u8]) -> Vec<u8> {
  let mut buf = vec![0u8; 256];
  let mut pdu = PduBuf::init(&mut buf, ty, code, mid).unwrap();
  pdu.set_token(token).unwrap();
  if let Some(seq) = observe {
    let bytes = seq.to_be_bytes();
    let trimmed = if seq > 0xFF_FFFF {
      &bytes[..]
    } else if seq > 0xFFFF {
      &bytes[1..]
    } else if seq > 0xFF {
      &bytes[2..]
    } else {
      &bytes[3..]
    };
    pdu.add_option(OptNumber::Observe, trimmed).unwrap();
  }
  if !payload.is_empty() {
    pdu.set_payload(payload).unwrap();
  }
  let len = pdu.len();
  buf.truncate(len);
  buf
}
