//! A [`Pal`] implementation for hosted (`std`) platforms: a connected
//! non-blocking UDP socket and a flat CIK file, grounded directly in
//! `exopal_udp_sock`/`exopal_udp_send`/`exopal_udp_recv`/`exopal_store_cik`/
//! `exopal_retrieve_cik` from the POSIX reference PAL, plus the
//! `std::time::Instant`-based microsecond clock `toad::std::Clock` uses.

use std::fs;
use std::io::{self, Read as _, Write as _};
use std::net::{ToSocketAddrs, UdpSocket};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{CIK_LENGTH, DEFAULT_HOST, DEFAULT_PORT};
use crate::pal::{CikLookup, Pal};

fn io_to_nb(err: io::Error) -> nb::Error<io::Error> {
  match err.kind() {
    | io::ErrorKind::WouldBlock => nb::Error::WouldBlock,
    | _ => nb::Error::Other(err),
  }
}

/// Hosted PAL: a UDP socket connected to the Exosite CoAP endpoint, a CIK
/// persisted as a flat file, and a monotonic clock anchored at construction.
pub struct StdPal {
  host: String,
  port: u16,
  sock: Option<UdpSocket>,
  cik_path: PathBuf,
  clock: Instant,
}

impl StdPal {
  /// Build a PAL that will connect to `host:port` and persist the CIK at
  /// `cik_path`. Neither the socket nor the file are touched until
  /// [`Pal::init`]/[`Pal::udp_sock`] run.
  pub fn new(host: impl Into<String>, port: u16, cik_path: impl AsRef<Path>) -> Self {
    Self { host: host.into(),
           port,
           sock: None,
           cik_path: cik_path.as_ref().to_path_buf(),
           clock: Instant::now() }
  }
}

impl Default for StdPal {
  /// Points at the production Exosite CoAP endpoint and a `cik` file in the
  /// current directory, same defaults the original PAL hardcodes.
  fn default() -> Self {
    Self::new(DEFAULT_HOST, DEFAULT_PORT, "cik")
  }
}

impl Pal for StdPal {
  type Error = io::Error;

  fn init(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }

  fn udp_sock(&mut self) -> Result<(), Self::Error> {
    let addrs = (self.host.as_str(), self.port).to_socket_addrs()?.collect::<Vec<_>>();
    let addr = addrs.first().ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses resolved"))?;

    let sock = UdpSocket::bind(("0.0.0.0", 0))?;
    sock.set_nonblocking(true)?;
    sock.connect(addr)?;
    self.sock = Some(sock);
    Ok(())
  }

  fn udp_send(&mut self, datagram: &[u8]) -> nb::Result<(), Self::Error> {
    let sock = self.sock.as_ref().ok_or(nb::Error::WouldBlock)?;
    sock.send(datagram).map(|_| ()).map_err(io_to_nb)
  }

  fn udp_recv(&mut self, buf: &mut [u8]) -> nb::Result<usize, Self::Error> {
    let sock = self.sock.as_ref().ok_or(nb::Error::WouldBlock)?;
    sock.recv(buf).map_err(io_to_nb)
  }

  fn store_cik(&mut self, cik: &[u8; CIK_LENGTH]) -> Result<(), Self::Error> {
    let mut file = fs::File::create(&self.cik_path)?;
    file.write_all(cik)
  }

  fn retrieve_cik(&mut self, cik: &mut [u8; CIK_LENGTH]) -> CikLookup {
    let mut file = match fs::File::open(&self.cik_path) {
      | Ok(file) => file,
      | Err(_) => return CikLookup::Absent,
    };

    match file.read_exact(cik) {
      | Ok(()) => CikLookup::Found,
      | Err(_) => CikLookup::Fatal,
    }
  }

  fn get_time_us(&mut self) -> u64 {
    self.clock.elapsed().as_micros() as u64
  }

  fn set_time_us(&mut self, _timestamp_us: u64) {
    // The reference PAL's `exopal_set_time` is also a no-op on POSIX: a
    // monotonic `Instant` isn't settable.
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn retrieve_cik_is_absent_when_file_missing() {
    let mut pal = StdPal::new(DEFAULT_HOST, DEFAULT_PORT, "/nonexistent/path/to/a/cik/file");
    let mut cik = [0u8; CIK_LENGTH];
    assert_eq!(pal.retrieve_cik(&mut cik), CikLookup::Absent);
  }

  #[test]
  fn store_then_retrieve_round_trips() {
    let dir = std::env::temp_dir().join(format!("exosite-coap-test-cik-{:?}", std::thread::current().id()));
    let mut pal = StdPal::new(DEFAULT_HOST, DEFAULT_PORT, &dir);

    let cik = [b'a'; CIK_LENGTH];
    pal.store_cik(&cik).unwrap();

    let mut roundtripped = [0u8; CIK_LENGTH];
    assert_eq!(pal.retrieve_cik(&mut roundtripped), CikLookup::Found);
    assert_eq!(roundtripped, cik);

    let _ = fs::remove_file(&dir);
  }

  #[test]
  fn get_time_us_is_monotonic() {
    let mut pal = StdPal::default();
    let t0 = pal.get_time_us();
    let t1 = pal.get_time_us();
    assert!(t1 >= t0);
  }
}
