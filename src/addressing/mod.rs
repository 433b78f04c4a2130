//! KNX addressing system.
//!
//! KNX uses two types of addresses:
//! - Individual addresses for physical devices (Area.Line.Device)
//! - Group addresses for logical grouping (Main/Middle/Sub)
//!
//! Point-to-point management connections are always keyed by the
//! individual address of the target device.

pub mod group;
pub mod individual;

pub use group::GroupAddress;
pub use individual::IndividualAddress;
