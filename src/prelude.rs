//! Prelude module for netline
//!
//! This module provides the commonly used types for easy importing. Users
//! can import everything with `use netline::prelude::*;`

pub use crate::config::LineConfig;
pub use crate::ip::{is_broadcast, is_ipv6_valid_address, is_link_local, ip_from_storage, normalize_address};
pub use crate::line::{Family, Kind, Line, OnConnected, OnDisconnected, State};
pub use crate::readiness::{readable, readable_any, Handle};
pub use crate::{init, shutdown, LineError, Result, VERSION};
