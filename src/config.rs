//! Ambient configuration: the one timing/sizing profile this crate runs.
//!
//! Unlike `toad::config::Config`, which exposes a pluggable family of CON/NON
//! retry strategies, this crate implements exactly the timing scheme the
//! Exosite One Platform client uses, so these are plain constants rather
//! than a runtime-configurable struct.

/// Default Exosite CoAP endpoint hostname.
pub const DEFAULT_HOST: &str = "coap.exosite.com";

/// Default Exosite CoAP endpoint port.
pub const DEFAULT_PORT: u16 = 5683;

/// Maximum datagram size this crate will send or receive.
pub const DATAGRAM_MAX: usize = 576;

/// Length, in ASCII hex characters, of a Client Interface Key.
pub const CIK_LENGTH: usize = 40;

/// How long a pending request (read/write/activate/observe-register) waits
/// for a response before the slot is considered timed out.
pub const REQUEST_TIMEOUT_US: u64 = 4_000_000;

/// Base refresh window for an established subscription: how long the device
/// waits for a new notification (or sends a fresh observe) before assuming
/// the subscription is stale.
pub const SUBSCRIBE_REFRESH_US: u64 = 120_000_000;

/// Number of discrete jitter steps added atop [`SUBSCRIBE_REFRESH_US`], each
/// [`SUBSCRIBE_JITTER_STEP_US`] wide, to avoid every device on a subscription
/// refreshing in lockstep.
pub const SUBSCRIBE_JITTER_STEPS: u32 = 15;

/// Width of one jitter step.
pub const SUBSCRIBE_JITTER_STEP_US: u64 = 100_000;

/// Fixed token length used for every outbound request.
pub const TOKEN_LEN: u8 = 2;
