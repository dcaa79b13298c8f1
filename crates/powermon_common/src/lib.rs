//! Shared library for the power monitor provisioning suite.
//!
//! Holds everything both the setup orchestrator and the operator tools
//! (`powermon-status`, `powermon-reset`) need: well-known filesystem paths,
//! the configuration store, the setup-complete marker, the provisioning
//! lock, timezone helpers, and the service lifecycle abstraction with its
//! systemd backend.

pub mod config;
pub mod error;
pub mod lock;
pub mod marker;
pub mod paths;
pub mod phase;
pub mod service;
pub mod timezone;

pub use config::{ConfigStore, DeviceConfiguration};
pub use error::SetupError;
pub use lock::ProvisionLock;
pub use marker::{MarkerStore, SetupMarker};
pub use paths::{Paths, SERVICE_NAME};
pub use phase::LifecyclePhase;
pub use service::{ServiceLifecycle, ServiceState, SystemdLifecycle};
