//! Modbus read planner.
//!
//! Takes the registers configured for a device and works out the read
//! transactions that fetch them with as few requests as possible.
//!
//! # Modules
//!
//! - [`range`] - Address ranges and the range merger
//! - [`config`] - Device configuration (JSON5)
//! - [`plan`] - Per-device read plans and protocol requests
//! - [`session`] - Collecting read results and decoding register values
//!
//! # Example
//!
//! ```ignore
//! use regplan_modbus::{AddressRange, merge_address_ranges};
//!
//! let requested = [AddressRange::new(0, 1)?, AddressRange::new(10, 1)?];
//! let reads = merge_address_ranges(&requested, true, 125)?;
//! assert_eq!(reads, vec![AddressRange::new(0, 11)?]);
//! ```

pub mod config;
pub mod plan;
pub mod range;
pub mod session;

pub use config::{ConfigError, DeviceConfig, PlannerConfig, PlanningConfig, RegisterConfig, RegisterType};
pub use plan::{PlannedRead, ReadPlan};
pub use range::{AddressRange, MAX_READ_BITS, MAX_READ_REGISTERS, PlanError, merge_address_ranges};
pub use session::{RawValue, ReadSession, SessionError};
