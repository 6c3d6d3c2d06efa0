//! Core types shared by the officecal crates.
//!
//! - [`GraphError`] - the normalized error every Graph failure is converted into
//! - [`DeviceCodeHandle`] - a started device-code sign-in
//! - [`paths`] - per-user file locations
//! - [`tracing`] - log initialisation

pub mod device;
pub mod error;
pub mod paths;
pub mod tracing;

pub use device::DeviceCodeHandle;
pub use error::{AuthErrorReason, Classification, ErrorKind, GraphError, GraphResult};
pub use tracing::{LogFormat, TracingConfig, TracingError, init_tracing};
