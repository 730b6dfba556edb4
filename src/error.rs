//! The public error surface.
//!
//! `operate` never raises an error: every failure it can hit (a malformed
//! inbound datagram, a codec overflow while building a request) is handled
//! internally by dropping the datagram or failing the op, matching the
//! original engine's behavior. The only fallible public entry point is
//! [`crate::engine::Engine::init`], whose only failure modes are the
//! platform layer itself being unusable.
#[derive(Debug)]
pub enum Error<E> {
  /// `Pal::init` or `Pal::udp_sock` reported a failure.
  FatalPalError(E),
  /// `Pal::retrieve_cik` reported a fatal storage failure (not merely "no
  /// CIK stored yet"). The original PAL contract gives no further detail
  /// for this case.
  FatalCikStorage,
}
