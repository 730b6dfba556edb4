//! The CoAP PDU codec: an in-place, allocation-free view over a caller-owned
//! buffer, plus the validate/build operations that read and write it.
//!
//! Grounded in RFC 7252 §3 (message format) and §3.1 (option format); the
//! insertion algorithm is this crate's own, since the reference C library
//! this crate's data model is grounded on expects options to be added in
//! increasing-number order and panics otherwise. A `no_std`, no-panic codec
//! can't assume that, so [`PduBuf::add_option`] shifts bytes to keep the
//! buffer valid regardless of insertion order.

mod error;
pub mod option;

pub use error::CoapError;
use option::{header_len_for, parse_header, write_header, CoapOption, Options, PAYLOAD_MARKER};

/// Message type (RFC 7252 §3).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Type {
  /// Confirmable.
  Con,
  /// Non-confirmable.
  Non,
  /// Acknowledgement.
  Ack,
  /// Reset.
  Reset,
}

impl From<Type> for u8 {
  fn from(t: Type) -> u8 {
    match t {
      | Type::Con => 0,
      | Type::Non => 1,
      | Type::Ack => 2,
      | Type::Reset => 3,
    }
  }
}

impl TryFrom<u8> for Type {
  type Error = CoapError;

  fn try_from(b: u8) -> Result<Self, Self::Error> {
    match b {
      | 0 => Ok(Type::Con),
      | 1 => Ok(Type::Non),
      | 2 => Ok(Type::Ack),
      | 3 => Ok(Type::Reset),
      | _ => Err(CoapError::InvalidPacket),
    }
  }
}

/// A message code, split into class (request/response family) and detail.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Code {
  /// 0 = request/empty, 2-5 = response.
  pub class: u8,
  /// Detail digits.
  pub detail: u8,
}

impl Code {
  /// Construct a code from class/detail digits.
  pub const fn new(class: u8, detail: u8) -> Self {
    Self { class, detail }
  }

  /// Empty message (0.00).
  pub const EMPTY: Self = Self::new(0, 0);
  /// GET (0.01).
  pub const GET: Self = Self::new(0, 1);
  /// POST (0.02).
  pub const POST: Self = Self::new(0, 2);
  /// PUT (0.03).
  pub const PUT: Self = Self::new(0, 3);
  /// DELETE (0.04).
  pub const DELETE: Self = Self::new(0, 4);
  /// Created (2.01).
  pub const CREATED: Self = Self::new(2, 1);
  /// Deleted (2.02).
  pub const DELETED: Self = Self::new(2, 2);
  /// Valid (2.03).
  pub const VALID: Self = Self::new(2, 3);
  /// Changed (2.04).
  pub const CHANGED: Self = Self::new(2, 4);
  /// Content (2.05).
  pub const CONTENT: Self = Self::new(2, 5);
  /// Continue (2.31).
  pub const CONTINUE: Self = Self::new(2, 31);
  /// Bad Request (4.00).
  pub const BAD_REQUEST: Self = Self::new(4, 0);
  /// Unauthorized (4.01).
  pub const UNAUTHORIZED: Self = Self::new(4, 1);
  /// Bad Option (4.02).
  pub const BAD_OPTION: Self = Self::new(4, 2);
  /// Forbidden (4.03).
  pub const FORBIDDEN: Self = Self::new(4, 3);
  /// Not Found (4.04).
  pub const NOT_FOUND: Self = Self::new(4, 4);
  /// Method Not Allowed (4.05).
  pub const METHOD_NOT_ALLOWED: Self = Self::new(4, 5);
  /// Not Acceptable (4.06).
  pub const NOT_ACCEPTABLE: Self = Self::new(4, 6);
  /// Request Entity Incomplete (4.08).
  pub const REQUEST_ENTITY_INCOMPLETE: Self = Self::new(4, 8);
  /// Precondition Failed (4.12).
  pub const PRECONDITION_FAILED: Self = Self::new(4, 12);
  /// Request Entity Too Large (4.13).
  pub const REQUEST_ENTITY_TOO_LARGE: Self = Self::new(4, 13);
  /// Unsupported Content-Format (4.15).
  pub const UNSUPPORTED_CONTENT_FORMAT: Self = Self::new(4, 15);
  /// Internal Server Error (5.00).
  pub const INTERNAL_SERVER_ERROR: Self = Self::new(5, 0);
  /// Not Implemented (5.01).
  pub const NOT_IMPLEMENTED: Self = Self::new(5, 1);
  /// Bad Gateway (5.02).
  pub const BAD_GATEWAY: Self = Self::new(5, 2);
  /// Service Unavailable (5.03).
  pub const SERVICE_UNAVAILABLE: Self = Self::new(5, 3);
  /// Gateway Timeout (5.04).
  pub const GATEWAY_TIMEOUT: Self = Self::new(5, 4);
  /// Proxying Not Supported (5.05).
  pub const PROXYING_NOT_SUPPORTED: Self = Self::new(5, 5);

  const KNOWN: &'static [Code] = &[Self::EMPTY,
                                    Self::GET,
                                    Self::POST,
                                    Self::PUT,
                                    Self::DELETE,
                                    Self::CREATED,
                                    Self::DELETED,
                                    Self::VALID,
                                    Self::CHANGED,
                                    Self::CONTENT,
                                    Self::CONTINUE,
                                    Self::BAD_REQUEST,
                                    Self::UNAUTHORIZED,
                                    Self::BAD_OPTION,
                                    Self::FORBIDDEN,
                                    Self::NOT_FOUND,
                                    Self::METHOD_NOT_ALLOWED,
                                    Self::NOT_ACCEPTABLE,
                                    Self::REQUEST_ENTITY_INCOMPLETE,
                                    Self::PRECONDITION_FAILED,
                                    Self::REQUEST_ENTITY_TOO_LARGE,
                                    Self::UNSUPPORTED_CONTENT_FORMAT,
                                    Self::INTERNAL_SERVER_ERROR,
                                    Self::NOT_IMPLEMENTED,
                                    Self::BAD_GATEWAY,
                                    Self::SERVICE_UNAVAILABLE,
                                    Self::GATEWAY_TIMEOUT,
                                    Self::PROXYING_NOT_SUPPORTED];

  fn is_known(&self) -> bool {
    Self::KNOWN.contains(self)
  }
}

impl From<Code> for u8 {
  fn from(c: Code) -> u8 {
    (c.class << 5) | (c.detail & 0b0001_1111)
  }
}

impl From<u8> for Code {
  fn from(b: u8) -> Self {
    Code { class: b >> 5,
           detail: b & 0b0001_1111 }
  }
}

/// Upper bound on options iterated/scanned per message; guards against
/// unbounded work on a malformed or adversarial datagram.
pub const MAX_OPTIONS: usize = 16;

const VERSION: u8 = 1;
const HEADER_LEN: usize = 4;

/// An in-place CoAP message view over a caller-owned buffer.
///
/// Holds no allocation of its own. `len` tracks how much of `buf` is
/// currently meaningful message; `buf.len()` is the buffer's capacity
/// (`max` in the original C naming).
pub struct PduBuf<'b> {
  buf: &'b mut [u8],
  len: usize,
}

impl<'b> PduBuf<'b> {
  /// Capacity of the underlying buffer.
  pub fn max(&self) -> usize {
    self.buf.len()
  }

  /// Length of the message currently written into the buffer.
  pub fn len(&self) -> usize {
    self.len
  }

  /// Whether any message has been written yet.
  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Initialize a new, empty message (version 1, the given type and code,
  /// zero-length token) at the start of `buf`.
  ///
  /// Returns `InsufficientBuffer` if `buf` cannot hold the fixed header.
  pub fn init(buf: &'b mut [u8], ty: Type, code: Code, mid: u16) -> Result<Self, CoapError> {
    if buf.len() < HEADER_LEN {
      return Err(CoapError::InsufficientBuffer);
    }
    buf[0] = (VERSION << 6) | (u8::from(ty) << 4);
    buf[1] = code.into();
    buf[2..4].copy_from_slice(&mid.to_be_bytes());
    Ok(Self { buf, len: HEADER_LEN })
  }

  /// Wrap an existing datagram (received off the wire) for reading, without
  /// validating it. Call [`PduBuf::validate`] before trusting its contents.
  pub fn from_datagram(buf: &'b mut [u8], len: usize) -> Self {
    Self { buf, len }
  }

  /// Check that the message currently in the buffer is structurally valid
  /// CoAP: known version, in-range token length, a recognized code, and a
  /// well-formed, ascending options list terminated correctly.
  pub fn validate(&self) -> Result<(), CoapError> {
    if self.len < HEADER_LEN {
      return Err(CoapError::InvalidPacket);
    }
    if self.buf[0] >> 6 != VERSION {
      return Err(CoapError::BadVersion);
    }
    let tkl = self.buf[0] & 0x0F;
    if tkl > 8 || HEADER_LEN + tkl as usize > self.len {
      return Err(CoapError::TokenLengthOutOfRange);
    }
    if !Code::from(self.buf[1]).is_known() {
      return Err(CoapError::UnknownCode);
    }

    let opts_start = HEADER_LEN + tkl as usize;
    let mut cursor = opts_start;
    let mut prev_number: u32 = 0;
    let mut count = 0usize;

    while cursor < self.len {
      if self.buf[cursor] == PAYLOAD_MARKER {
        if cursor + 1 >= self.len {
          return Err(CoapError::FoundPayloadMarker);
        }
        return Ok(());
      }

      count += 1;
      if count > MAX_OPTIONS {
        return Err(CoapError::TooManyOptions);
      }

      let (delta, header_len, val_len) = parse_header(self.buf, cursor)?;
      if cursor + header_len + val_len > self.len {
        return Err(CoapError::EndOfPacket);
      }
      let number = prev_number + delta as u32;
      if number > u16::MAX as u32 {
        return Err(CoapError::OutOfOrderOptionsList);
      }
      prev_number = number;
      cursor += header_len + val_len;
    }

    Ok(())
  }

  fn tkl(&self) -> usize {
    (self.buf[0] & 0x0F) as usize
  }

  fn opts_start(&self) -> usize {
    HEADER_LEN + self.tkl()
  }

  /// Protocol version (always 1 once validated).
  pub fn version(&self) -> u8 {
    self.buf[0] >> 6
  }

  /// Message type.
  pub fn ty(&self) -> Result<Type, CoapError> {
    Type::try_from((self.buf[0] >> 4) & 0x03)
  }

  /// Message code.
  pub fn code(&self) -> Code {
    Code::from(self.buf[1])
  }

  /// Message ID.
  pub fn mid(&self) -> u16 {
    u16::from_be_bytes([self.buf[2], self.buf[3]])
  }

  /// Token bytes (0-8 bytes).
  pub fn token(&self) -> &[u8] {
    &self.buf[HEADER_LEN..self.opts_start()]
  }

  /// Set the message type in-place.
  pub fn set_type(&mut self, ty: Type) {
    self.buf[0] = (self.buf[0] & !0x30) | (u8::from(ty) << 4);
  }

  /// Set the message code in-place.
  pub fn set_code(&mut self, code: Code) {
    self.buf[1] = code.into();
  }

  /// Set the message ID in-place.
  pub fn set_mid(&mut self, mid: u16) {
    self.buf[2..4].copy_from_slice(&mid.to_be_bytes());
  }

  /// Set the token, resizing (shifting every following byte) as needed.
  ///
  /// Must be called before any options are added, same as the original
  /// library's contract, since token length changes the Options start
  /// offset; callers that already added options will have their options
  /// shifted along with everything else.
  pub fn set_token(&mut self, token: &[u8]) -> Result<(), CoapError> {
    if token.len() > 8 {
      return Err(CoapError::TokenLengthOutOfRange);
    }
    let old_start = self.opts_start();
    let new_start = HEADER_LEN + token.len();
    let shift = new_start as isize - old_start as isize;
    let new_len = (self.len as isize + shift) as usize;
    if new_len > self.max() {
      return Err(CoapError::InsufficientBuffer);
    }

    if shift != 0 {
      self.buf.copy_within(old_start..self.len, new_start);
    }
    self.buf[new_start - token.len()..new_start].copy_from_slice(token);
    self.buf[0] = (self.buf[0] & 0xF0) | (token.len() as u8 & 0x0F);
    self.len = new_len;
    Ok(())
  }

  fn payload_marker_at(&self) -> Option<usize> {
    let opts_start = self.opts_start();
    (opts_start..self.len).find(|&i| self.buf[i] == PAYLOAD_MARKER)
  }

  /// Iterate the options currently in the message, in wire order.
  pub fn options(&self) -> Options<'_> {
    let opts_start = self.opts_start();
    let end = self.payload_marker_at().unwrap_or(self.len);
    Options { buf: self.buf, cursor: opts_start, end, number: 0 }
  }

  /// Find the first option with the given number.
  pub fn option_by_number(&self, number: impl Into<u16>) -> Option<CoapOption<'_>> {
    let number = number.into();
    self.options().find(|o| u16::from(o.number) == number)
  }

  /// The message payload, if a payload marker is present.
  pub fn payload(&self) -> Option<&[u8]> {
    self.payload_marker_at().map(|m| &self.buf[m + 1..self.len])
  }

  /// Set (or replace) the payload. Overwrites any existing payload; must be
  /// called after every option has been added.
  pub fn set_payload(&mut self, payload: &[u8]) -> Result<(), CoapError> {
    let body_start = self.payload_marker_at().unwrap_or(self.len);
    let new_len = body_start + 1 + payload.len();
    if new_len > self.max() {
      return Err(CoapError::InsufficientBuffer);
    }
    self.buf[body_start] = PAYLOAD_MARKER;
    self.buf[body_start + 1..new_len].copy_from_slice(payload);
    self.len = new_len;
    Ok(())
  }

  /// Insert an option, maintaining ascending option-number order in the
  /// buffer regardless of call order.
  ///
  /// Finds the insertion point `at` by scanning existing options. If
  /// insertion is not at the tail, the option immediately after `at` has
  /// its delta (and therefore possibly its header length) recomputed
  /// relative to the newly inserted number, and the whole tail of the
  /// buffer from that header onward is shifted to make room in one pass.
  pub fn add_option(&mut self, number: impl Into<u16>, value: &[u8]) -> Result<(), CoapError> {
    let number: u16 = number.into();
    let opts_start = self.opts_start();
    let region_end = self.payload_marker_at().unwrap_or(self.len);

    let mut cursor = opts_start;
    let mut prev_number: u32 = 0;
    let mut count = 0usize;
    let mut next: Option<(usize, u32, usize, usize)> = None; // (pos, abs_number, header_len, val_len)

    while cursor < region_end {
      count += 1;
      if count > MAX_OPTIONS {
        return Err(CoapError::TooManyOptions);
      }
      let (delta, header_len, val_len) = parse_header(self.buf, cursor)?;
      let abs_number = prev_number + delta as u32;
      if abs_number as u64 > number as u64 {
        next = Some((cursor, abs_number, header_len, val_len));
        break;
      }
      prev_number = abs_number;
      cursor += header_len + val_len;
    }

    let at = cursor;
    let new_delta = number as u32 - prev_number;
    if new_delta > u16::MAX as u32 {
      return Err(CoapError::OutOfOrderOptionsList);
    }
    let new_header_len = header_len_for(new_delta as u16, value.len() as u16);
    let new_total_len = new_header_len + value.len();

    let (old_next_header_len, new_next_header_len) = match next {
      | Some((_, abs_number, header_len, val_len)) => {
        let next_new_delta = abs_number - number as u32;
        (header_len, header_len_for(next_new_delta as u16, val_len as u16))
      },
      | None => (0, 0),
    };

    let shift = new_total_len as isize + (new_next_header_len as isize - old_next_header_len as isize);
    let new_len = (self.len as isize + shift) as usize;
    if new_len > self.max() {
      return Err(CoapError::InsufficientBuffer);
    }

    let old_next_header_start = at;
    let new_next_header_start = (at as isize + shift) as usize;
    self.buf.copy_within(old_next_header_start..self.len, new_next_header_start);

    write_header(self.buf, at, new_delta as u16, value.len() as u16);
    self.buf[at + new_header_len..at + new_total_len].copy_from_slice(value);

    if let Some((_, abs_number, _, val_len)) = next {
      let next_new_delta = abs_number - number as u32;
      let rewrite_at = at + new_total_len;
      write_header(self.buf, rewrite_at, next_new_delta as u16, val_len as u16);
    }

    self.len = new_len;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn init_writes_fixed_header() {
    let mut buf = [0u8; 64];
    let pdu = PduBuf::init(&mut buf, Type::Con, Code::GET, 0x1234).unwrap();
    assert_eq!(pdu.version(), 1);
    assert_eq!(pdu.ty().unwrap(), Type::Con);
    assert_eq!(pdu.code(), Code::GET);
    assert_eq!(pdu.mid(), 0x1234);
    assert_eq!(pdu.token(), &[] as &[u8]);
  }

  #[test]
  fn set_token_shifts_and_updates_tkl() {
    let mut buf = [0u8; 64];
    let mut pdu = PduBuf::init(&mut buf, Type::Con, Code::GET, 1).unwrap();
    pdu.set_token(&[0xAB, 0xCD]).unwrap();
    assert_eq!(pdu.token(), &[0xAB, 0xCD]);
    assert_eq!(pdu.len(), 6);
  }

  #[test]
  fn add_option_single() {
    let mut buf = [0u8; 64];
    let mut pdu = PduBuf::init(&mut buf, Type::Con, Code::GET, 1).unwrap();
    pdu.add_option(11u16, b"sensor").unwrap();
    let opt = pdu.option_by_number(11u16).unwrap();
    assert_eq!(opt.value, b"sensor");
  }

  #[test]
  fn add_option_out_of_order_still_sorts_on_wire() {
    let mut buf = [0u8; 64];
    let mut pdu = PduBuf::init(&mut buf, Type::Con, Code::GET, 1).unwrap();
    pdu.add_option(11u16, b"path").unwrap();
    pdu.add_option(6u16, &[0, 0, 1]).unwrap(); // Observe, inserted before Uri-Path
    let mut numbers = pdu.options().map(|o| u16::from(o.number));
    assert_eq!(numbers.next(), Some(6));
    assert_eq!(numbers.next(), Some(11));
    assert_eq!(numbers.next(), None);
  }

  #[test]
  fn add_option_rewrites_following_delta() {
    let mut buf = [0u8; 128];
    let mut pdu = PduBuf::init(&mut buf, Type::Con, Code::GET, 1).unwrap();
    pdu.add_option(11u16, b"a").unwrap();
    pdu.add_option(300u16, b"b").unwrap(); // forces a 2-byte delta extension
    pdu.add_option(12u16, &[0]).unwrap(); // inserted between 11 and 300
    let mut numbers = pdu.options().map(|o| u16::from(o.number));
    assert_eq!(numbers.next(), Some(11));
    assert_eq!(numbers.next(), Some(12));
    assert_eq!(numbers.next(), Some(300));
    assert_eq!(numbers.next(), None);
  }

  #[test]
  fn set_payload_after_options() {
    let mut buf = [0u8; 64];
    let mut pdu = PduBuf::init(&mut buf, Type::Con, Code::CONTENT, 1).unwrap();
    pdu.add_option(12u16, &[0]).unwrap();
    pdu.set_payload(b"hello").unwrap();
    assert_eq!(pdu.payload(), Some(&b"hello"[..]));
  }

  #[test]
  fn validate_rejects_bad_version() {
    let mut buf = [0u8; 64];
    let pdu = PduBuf::init(&mut buf, Type::Con, Code::GET, 1).unwrap();
    let mut raw = [0u8; 64];
    raw[..pdu.len()].copy_from_slice(&buf[..pdu.len()]);
    raw[0] = (2 << 6) | (raw[0] & 0x0F);
    let len = pdu.len();
    let bad = PduBuf::from_datagram(&mut raw, len);
    assert_eq!(bad.validate(), Err(CoapError::BadVersion));
  }

  #[test]
  fn validate_rejects_unknown_code() {
    let mut buf = [0u8; 64];
    {
      let mut pdu = PduBuf::init(&mut buf, Type::Con, Code::GET, 1).unwrap();
      pdu.set_code(Code::new(7, 19));
    }
    let pdu = PduBuf::from_datagram(&mut buf, 4);
    assert_eq!(pdu.validate(), Err(CoapError::UnknownCode));
  }

  #[test]
  fn validate_rejects_tkl_out_of_range() {
    let mut buf = [0u8; 64];
    buf[0] = (1 << 6) | 9; // tkl=9, invalid (max 8)
    buf[1] = Code::GET.into();
    let pdu = PduBuf::from_datagram(&mut buf, 4);
    assert_eq!(pdu.validate(), Err(CoapError::TokenLengthOutOfRange));
  }

  #[test]
  fn insufficient_buffer_on_add_option_overflow() {
    let mut buf = [0u8; 6];
    let mut pdu = PduBuf::init(&mut buf, Type::Con, Code::GET, 1).unwrap();
    assert_eq!(pdu.add_option(11u16, b"too long for this buffer"),
               Err(CoapError::InsufficientBuffer));
  }

  #[test]
  fn validate_rejects_truncated_payload_marker() {
    let mut buf = [0u8; 64];
    {
      PduBuf::init(&mut buf, Type::Con, Code::GET, 1).unwrap();
    }
    buf[4] = PAYLOAD_MARKER;
    let pdu = PduBuf::from_datagram(&mut buf, 5);
    assert_eq!(pdu.validate(), Err(CoapError::FoundPayloadMarker));
  }

  #[test]
  fn validate_rejects_option_running_past_declared_length() {
    let mut buf = [0u8; 64];
    let declared_len;
    {
      let mut pdu = PduBuf::init(&mut buf, Type::Con, Code::GET, 1).unwrap();
      pdu.add_option(11u16, b"sensor").unwrap();
      // Truncate the declared message length so the option's value would
      // read past the end of the message, without touching the physical
      // buffer (which still holds the full, legitimately-written option).
      declared_len = pdu.len() - 1;
    }
    let pdu = PduBuf::from_datagram(&mut buf, declared_len);
    assert_eq!(pdu.validate(), Err(CoapError::EndOfPacket));
  }
}
