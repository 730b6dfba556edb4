//! The six message shapes this client ever sends: build each directly into
//! a caller-owned [`PduBuf`].
//!
//! Grounded in `exo_build_msg_*` in the original engine. That C code
//! OR-accumulates every `coap_error` from the individual `coap_set_*`/
//! `coap_add_option` calls and collapses any nonzero result to a single
//! `EXO_GENERAL_ERROR`; we get the same effect idiomatically with `?`; since
//! a half-built PDU is never observed by the caller on error (the PduBuf is
//! scratch, reused by the engine every tick), there's nothing to roll back.

use crate::pdu::option::OptNumber;
use crate::pdu::{Code, PduBuf, Type};

/// Either a message built cleanly, or something about the request (an
/// oversized alias, a value that didn't fit the datagram) meant it could
/// not be encoded at all.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum BuilderError {
  /// Building the message failed; see the original `CoapError` taxonomy
  /// for what's collapsed into this (buffer overflow, oversized token,
  /// ...). The original library does not distinguish these for callers
  /// either.
  GeneralError,
}

impl From<crate::pdu::CoapError> for BuilderError {
  fn from(_: crate::pdu::CoapError) -> Self {
    BuilderError::GeneralError
  }
}

fn uri_path(pdu: &mut PduBuf<'_>, segment: &[u8]) -> Result<(), crate::pdu::CoapError> {
  pdu.add_option(OptNumber::UriPath, segment)
}

/// Build an activation request: `POST /provision/activate/<vendor>/<model>/<serial>`.
pub fn build_activate(pdu: &mut PduBuf<'_>,
                       mid: u16,
                       token: &[u8],
                       vendor: &str,
                       model: &str,
                       serial: &str)
                       -> Result<(), BuilderError> {
  pdu.set_type(Type::Con);
  pdu.set_code(Code::POST);
  pdu.set_mid(mid);
  pdu.set_token(token)?;
  uri_path(pdu, b"provision")?;
  uri_path(pdu, b"activate")?;
  uri_path(pdu, vendor.as_bytes())?;
  uri_path(pdu, model.as_bytes())?;
  uri_path(pdu, serial.as_bytes())?;
  Ok(())
}

/// Build a dataport read request: `GET /1a/<alias>?<cik>`.
pub fn build_read(pdu: &mut PduBuf<'_>,
                   mid: u16,
                   token: &[u8],
                   alias: &str,
                   cik: &[u8])
                   -> Result<(), BuilderError> {
  pdu.set_type(Type::Con);
  pdu.set_code(Code::GET);
  pdu.set_mid(mid);
  pdu.set_token(token)?;
  uri_path(pdu, b"1a")?;
  uri_path(pdu, alias.as_bytes())?;
  pdu.add_option(OptNumber::UriQuery, cik)?;
  Ok(())
}

/// Build an observe-registration request: `GET /1a/<alias>?<cik>` with the
/// Observe option set to 0 (register).
pub fn build_observe(pdu: &mut PduBuf<'_>,
                      mid: u16,
                      token: &[u8],
                      alias: &str,
                      cik: &[u8])
                      -> Result<(), BuilderError> {
  pdu.set_type(Type::Con);
  pdu.set_code(Code::GET);
  pdu.set_mid(mid);
  pdu.set_token(token)?;
  pdu.add_option(OptNumber::Observe, &[0])?;
  uri_path(pdu, b"1a")?;
  uri_path(pdu, alias.as_bytes())?;
  pdu.add_option(OptNumber::UriQuery, cik)?;
  Ok(())
}

/// Build a dataport write request: `POST /1a/<alias>?<cik>` with `value` as
/// the payload.
pub fn build_write(pdu: &mut PduBuf<'_>,
                    mid: u16,
                    token: &[u8],
                    alias: &str,
                    value: &[u8],
                    cik: &[u8])
                    -> Result<(), BuilderError> {
  pdu.set_type(Type::Con);
  pdu.set_code(Code::POST);
  pdu.set_mid(mid);
  pdu.set_token(token)?;
  uri_path(pdu, b"1a")?;
  uri_path(pdu, alias.as_bytes())?;
  pdu.add_option(OptNumber::UriQuery, cik)?;
  pdu.set_payload(value)?;
  Ok(())
}

/// Build an empty Reset, echoing the mid and token of whatever message we
/// didn't recognize.
pub fn build_rst(pdu: &mut PduBuf<'_>, mid: u16, token: &[u8]) -> Result<(), BuilderError> {
  pdu.set_type(Type::Reset);
  pdu.set_code(Code::EMPTY);
  pdu.set_mid(mid);
  pdu.set_token(token)?;
  Ok(())
}

/// Build an empty Acknowledgement for `mid`.
pub fn build_ack(pdu: &mut PduBuf<'_>, mid: u16) -> Result<(), BuilderError> {
  pdu.set_type(Type::Ack);
  pdu.set_code(Code::EMPTY);
  pdu.set_mid(mid);
  Ok(())
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn activate_has_five_uri_path_segments() {
    let mut buf = [0u8; 128];
    let mut pdu = PduBuf::init(&mut buf, Type::Con, Code::EMPTY, 0).unwrap();
    build_activate(&mut pdu, 1, &[0xAA, 0xBB], "acme", "widget", "SN-1").unwrap();
    let segments = pdu.options().filter(|o| o.number == OptNumber::UriPath).count();
    assert_eq!(segments, 5);
    assert_eq!(pdu.code(), Code::POST);
  }

  #[test]
  fn read_includes_cik_as_uri_query() {
    let mut buf = [0u8; 128];
    let mut pdu = PduBuf::init(&mut buf, Type::Con, Code::EMPTY, 0).unwrap();
    let cik = [b'a'; 40];
    build_read(&mut pdu, 2, &[0x01, 0x02], "myalias", &cik).unwrap();
    let query = pdu.option_by_number(OptNumber::UriQuery).unwrap();
    assert_eq!(query.value, &cik);
  }

  #[test]
  fn observe_sets_zero_length_observe_option() {
    let mut buf = [0u8; 128];
    let mut pdu = PduBuf::init(&mut buf, Type::Con, Code::EMPTY, 0).unwrap();
    let cik = [b'a'; 40];
    build_observe(&mut pdu, 3, &[0x01, 0x02], "myalias", &cik).unwrap();
    let obs = pdu.option_by_number(OptNumber::Observe).unwrap();
    assert_eq!(obs.value, &[0]);
  }

  #[test]
  fn write_sets_payload() {
    let mut buf = [0u8; 128];
    let mut pdu = PduBuf::init(&mut buf, Type::Con, Code::EMPTY, 0).unwrap();
    let cik = [b'a'; 40];
    build_write(&mut pdu, 4, &[0x01, 0x02], "myalias", b"42", &cik).unwrap();
    assert_eq!(pdu.payload(), Some(&b"42"[..]));
  }

  #[test]
  fn rst_is_empty_with_echoed_mid_and_token() {
    let mut buf = [0u8; 32];
    let mut pdu = PduBuf::init(&mut buf, Type::Con, Code::EMPTY, 0).unwrap();
    build_rst(&mut pdu, 0xBEEF, &[0x01, 0x02]).unwrap();
    assert_eq!(pdu.ty().unwrap(), Type::Reset);
    assert_eq!(pdu.code(), Code::EMPTY);
    assert_eq!(pdu.mid(), 0xBEEF);
    assert_eq!(pdu.token(), &[0x01, 0x02]);
  }

  #[test]
  fn ack_is_empty_with_no_token() {
    let mut buf = [0u8; 32];
    let mut pdu = PduBuf::init(&mut buf, Type::Con, Code::EMPTY, 0).unwrap();
    build_ack(&mut pdu, 0x1234).unwrap();
    assert_eq!(pdu.ty().unwrap(), Type::Ack);
    assert_eq!(pdu.token(), &[] as &[u8]);
  }

  #[test]
  fn oversized_value_collapses_to_general_error() {
    let mut buf = [0u8; 16];
    let mut pdu = PduBuf::init(&mut buf, Type::Con, Code::EMPTY, 0).unwrap();
    let cik = [b'a'; 40];
    let err = build_write(&mut pdu, 5, &[0x01, 0x02], "alias-too-long-for-buffer", b"value", &cik);
    assert_eq!(err, Err(BuilderError::GeneralError));
  }
}
