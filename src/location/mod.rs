//! Location lookup subsystem.
//!
//! Provides the remote country/state/city lookups the cascade is built on,
//! plus the shared vocabulary (levels, scopes, errors).

pub mod providers;
pub mod types;

pub use providers::{HttpLocationService, LocationService, DEFAULT_BASE_URL};
pub use types::{Level, LocationError, Scope};
