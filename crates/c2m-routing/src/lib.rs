//! c2m-routing - route set management for the CAN <-> MQTT bridge
//!
//! A [`Route`] binds one CAN ID to one MQTT topic with a direction and a
//! codec name. The [`RoutingTable`] holds the active set, indexed by content
//! hash, CAN ID and topic. The [`ConfigUpdater`] replaces the set as a whole
//! and hands the resulting [`RouteDelta`] to every [`RouteObserver`].
//!
//! # Example
//!
//! ```rust
//! use c2m_routing::{Direction, Route, RoutingTable};
//!
//! let table = RoutingTable::new();
//! table.add_route(Route::new("0x100", "car/speed").with_codec("uint162ascii")).unwrap();
//!
//! let route = table.get_by_can_id(0x100).unwrap();
//! assert_eq!(route.topic, "car/speed");
//! assert_eq!(route.direction, Direction::Bidirectional);
//!
//! // same CAN ID, different topic: rejected
//! assert!(table.add_route(Route::new("256", "car/other")).is_err());
//! ```
//!
//! # Route-update payload
//!
//! ```json
//! [
//!   {"canid": "100", "topic": "home/light", "direction": 0, "converter": "bytecolor2colorcode"},
//!   {"canid": "0x101", "topic": "home/switches", "direction": 2, "converter": "16bool2ascii"}
//! ]
//! ```
//!
//! `direction`: `0` bidirectional, `1` MQTT -> CAN only, `2` CAN -> MQTT only.

pub mod error;
pub mod loader;
pub mod route;
pub mod table;
pub mod updater;

pub use error::{RoutingError, RoutingResult};
pub use loader::{load_csv, load_json, load_routes_file};
pub use route::{Direction, Route, RouteHash};
pub use table::{RouteDelta, RoutingTable};
pub use updater::{ConfigUpdater, RouteObserver};
