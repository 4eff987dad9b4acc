//! Higher-level instrument operations, built on [`Session::transact`].
//!
//! Each submodule adds methods to [`Session`]:
//!
//! - [`control`]: laser and traffic toggles, test and session control
//! - [`applications`]: selecting, launching and closing test applications
//! - [`diagnostics`]: telemetry and transceiver readings
//! - [`register`]: I2C register peeks, page dumps and pre-FEC BER
//!
//! All of them borrow the session mutably, so operations on one channel never
//! overlap.
//!
//! [`Session`]: crate::session::Session
//! [`Session::transact`]: crate::session::Session::transact

pub mod applications;
pub mod control;
pub mod diagnostics;
pub mod register;

pub use applications::RunningApplications;
pub use control::{ToggleOutcome, ToggleTarget};
pub use diagnostics::{EventLog, SfpPort, TransceiverKind, Verdict};
pub use register::{PageDump, PreFecVendor, RegisterPage};
