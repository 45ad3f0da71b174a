//! # mdp_p906_lib
//!
//! Driver for the Miniware MDP-P906 battery/power module, reached over an
//! nRF24-style radio link bridged through a serial AT-command adapter.
//!
//! The library covers the device-specific binary protocol: frame encoding
//! with XOR checksums, the per-type message catalog, ADC calibration
//! correction, a synchronous session with receive-side retry, and the
//! broadcast auto-match handshake that assigns a freshly powered device a
//! dedicated radio address and channel.
//!
//! ## Features
//!
//! - `serialport`: blocking transport over the `serialport` crate.
//! - `serde`: `Serialize`/`Deserialize` on decoded responses and the status
//!   cache.
//! - `default` / `bin-dependencies`: everything the `mdp-p906` command-line
//!   tool needs.

/// Contains error types for the library.
mod error;
/// ADC correction arithmetic.
pub mod calibration;
/// Frame codec and per-type message encoders/decoders.
pub mod protocol;
/// Transport contract and the device session, including discovery.
pub mod session;

pub use error::Error;

/// Blocking serial transport for the radio adapter.
#[cfg(feature = "serialport")]
pub mod serialport;
