//! The Platform Adaptation Layer: every external collaborator this crate
//! needs (a UDP socket, persistent CIK storage, a clock) but cannot itself
//! implement portably.
//!
//! Modeled on `toad::net::Socket`'s non-blocking contract (`nb::Result`
//! rather than async or callbacks) and on the original C library's
//! `exopal_*` function table, which this trait's methods mirror one-to-one.

use crate::config::CIK_LENGTH;

/// Outcome of looking up a previously stored CIK.
///
/// Mirrors `exopal_retrieve_cik`'s three-way return contract: `0` (here,
/// [`CikLookup::Found`]) means a CIK was read into the caller's buffer,
/// `1` ([`CikLookup::Absent`]) means none has been stored yet and is not
/// itself an error, and anything else ([`CikLookup::Fatal`]) means storage
/// itself is broken.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CikLookup {
  /// A CIK was found and written into the caller's buffer.
  Found,
  /// No CIK has been stored yet; this is expected on first boot.
  Absent,
  /// Reading the CIK from storage failed in a way that isn't "not found".
  Fatal,
}

/// Everything the engine needs from the host platform.
///
/// Implementors provide a connected, non-blocking UDP socket and a flat
/// CIK store; this crate never constructs a socket address or a filesystem
/// path itself.
pub trait Pal {
  /// Whatever an implementation needs to report about an underlying
  /// failure (a libc errno, an `io::Error`, ...).
  type Error: core::fmt::Debug;

  /// One-time setup. Called once, before any other method.
  fn init(&mut self) -> Result<(), Self::Error>;

  /// Open (or re-open) a non-blocking, connected UDP socket to the
  /// Exosite endpoint. Idempotent: may be called again after a
  /// connectivity loss.
  fn udp_sock(&mut self) -> Result<(), Self::Error>;

  /// Send a complete datagram. Non-blocking: returns
  /// [`nb::Error::WouldBlock`] if the socket cannot accept it right now.
  fn udp_send(&mut self, datagram: &[u8]) -> nb::Result<(), Self::Error>;

  /// Receive a complete datagram into `buf`, returning the number of bytes
  /// written. Non-blocking: returns [`nb::Error::WouldBlock`] if nothing is
  /// waiting.
  fn udp_recv(&mut self, buf: &mut [u8]) -> nb::Result<usize, Self::Error>;

  /// Persist a 40-byte CIK to non-volatile storage.
  fn store_cik(&mut self, cik: &[u8; CIK_LENGTH]) -> Result<(), Self::Error>;

  /// Look up a previously stored CIK. See [`CikLookup`].
  fn retrieve_cik(&mut self, cik: &mut [u8; CIK_LENGTH]) -> CikLookup;

  /// Current time, as microseconds since an arbitrary but monotonic epoch.
  fn get_time_us(&mut self) -> u64;

  /// Set the platform clock, if the platform supports it. A no-op on
  /// platforms with no settable clock (matches `exopal_set_time`'s POSIX
  /// implementation, which does nothing).
  fn set_time_us(&mut self, timestamp_us: u64);
}
