//! Core data types for Hayat
//!
//! Values sampled from the environment. Snapshots are immutable once captured;
//! every probe cycle produces a fresh one.

pub mod port;
pub mod snapshot;

pub use port::{format_ports, parse_port, Port, PortSet};
pub use snapshot::{AdvertisedRoute, ConfigChange, ConfigSnapshot, SessionToken};
