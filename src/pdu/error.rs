/// Errors produced by the [`super::PduBuf`] codec.
///
/// Mirrors the `coap_error` taxonomy of the original C implementation this
/// crate's wire format is grounded on; every fallible codec operation
/// returns one of these (or `Ok`) rather than panicking.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CoapError {
  /// The datagram is too short, truncated mid-option, or otherwise
  /// structurally malformed in a way not covered by a more specific variant.
  InvalidPacket,
  /// The header's Version field was not 1.
  BadVersion,
  /// Token Length was greater than 8, or greater than the bytes actually
  /// available after the fixed header.
  TokenLengthOutOfRange,
  /// The Code byte did not match any code this crate recognizes.
  UnknownCode,
  /// More options were present than this codec will iterate.
  TooManyOptions,
  /// Option numbers did not monotonically increase (including the case
  /// where accumulated deltas overflow the 16-bit option number space).
  OutOfOrderOptionsList,
  /// The operation would write past the end of the caller's buffer.
  InsufficientBuffer,
  /// A `0xFF` payload marker was the last byte of the message, with no
  /// payload bytes following it.
  FoundPayloadMarker,
  /// An option's header and value length would read past the end of the
  /// message.
  EndOfPacket,
}
