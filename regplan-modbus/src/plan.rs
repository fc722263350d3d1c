//! Per-device read planning.
//!
//! A [`ReadPlan`] buckets a device's configured registers by register type
//! and merges each bucket into read transactions with
//! [`merge_address_ranges`]. Word registers follow the device's planning
//! policy; coils and discrete inputs are never read through holes and are
//! bounded by the protocol bit limit instead.

use serde::Serialize;
use tokio_modbus::{Request, Slave};
use tracing::debug;

use crate::config::{DeviceConfig, ModbusConfig, PlanningConfig, RegisterConfig, RegisterType};
use crate::range::{AddressRange, MAX_READ_BITS, PlanError, merge_address_ranges};

/// One read transaction in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlannedRead {
    pub register_type: RegisterType,
    pub range: AddressRange,
}

impl PlannedRead {
    /// The protocol request that performs this read.
    pub fn request(&self) -> Request<'static> {
        let address = self.range.address();
        let count = self.range.count();
        match self.register_type {
            RegisterType::Coil => Request::ReadCoils(address, count),
            RegisterType::Discrete => Request::ReadDiscreteInputs(address, count),
            RegisterType::Input => Request::ReadInputRegisters(address, count),
            RegisterType::Holding => Request::ReadHoldingRegisters(address, count),
        }
    }
}

/// The read transactions needed to fetch every configured register of a device.
#[derive(Debug, Clone, Serialize)]
pub struct ReadPlan {
    device: String,
    unit_id: u8,
    policy: PlanningConfig,
    reads: Vec<PlannedRead>,
    requested_registers: u32,
}

impl ReadPlan {
    /// Plan reads for `device`, resolving register groups and planning
    /// defaults from `config`.
    pub fn for_device(device: &DeviceConfig, config: &ModbusConfig) -> Result<Self, PlanError> {
        let registers = device.all_registers(&config.register_groups);
        let policy = device.planning(&config.planning);
        Self::from_registers(&device.name, device.unit_id, device.zero_mode, &registers, policy)
    }

    /// Plan reads for an explicit register list.
    pub fn from_registers(
        device: &str,
        unit_id: u8,
        zero_mode: bool,
        registers: &[RegisterConfig],
        policy: PlanningConfig,
    ) -> Result<Self, PlanError> {
        let mut reads = Vec::new();
        let mut requested_registers = 0;

        for register_type in RegisterType::ALL {
            let requested = registers
                .iter()
                .filter(|r| r.register_type == register_type)
                .map(|r| requested_range(r, zero_mode))
                .collect::<Result<Vec<_>, _>>()?;
            if requested.is_empty() {
                continue;
            }

            let (allow_holes, max_read_size) = type_policy(register_type, &policy);
            let merged = merge_address_ranges(&requested, allow_holes, max_read_size)?;

            requested_registers += covered_registers(&requested)?;

            debug!(
                "Device '{}': {} {} range(s) -> {} read(s)",
                device,
                requested.len(),
                register_type.as_str(),
                merged.len()
            );

            reads.extend(merged.into_iter().map(|range| PlannedRead {
                register_type,
                range,
            }));
        }

        Ok(Self {
            device: device.to_string(),
            unit_id,
            policy,
            reads,
            requested_registers,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn slave(&self) -> Slave {
        Slave(self.unit_id)
    }

    pub fn policy(&self) -> PlanningConfig {
        self.policy
    }

    pub fn reads(&self) -> &[PlannedRead] {
        &self.reads
    }

    /// Reads of a single register type, in ascending address order.
    pub fn reads_for(&self, register_type: RegisterType) -> impl Iterator<Item = &PlannedRead> {
        self.reads
            .iter()
            .filter(move |r| r.register_type == register_type)
    }

    pub fn transaction_count(&self) -> usize {
        self.reads.len()
    }

    /// Distinct registers (and bits) that were asked for.
    pub fn requested_registers(&self) -> u32 {
        self.requested_registers
    }

    /// Registers (and bits) the plan actually reads, holes included.
    pub fn planned_registers(&self) -> u32 {
        self.reads.iter().map(|r| r.range.count() as u32).sum()
    }

    /// Unrequested registers read to save transactions.
    pub fn hole_registers(&self) -> u32 {
        self.planned_registers() - self.requested_registers
    }

    /// Protocol requests for every read, in plan order.
    pub fn requests(&self) -> Vec<Request<'static>> {
        self.reads.iter().map(PlannedRead::request).collect()
    }
}

fn type_policy(register_type: RegisterType, policy: &PlanningConfig) -> (bool, u16) {
    if register_type.is_bit() {
        (false, MAX_READ_BITS)
    } else {
        (policy.allow_holes, policy.max_read_size)
    }
}

fn requested_range(register: &RegisterConfig, zero_mode: bool) -> Result<AddressRange, PlanError> {
    let count = register.wire_count();
    let invalid = || PlanError::InvalidRange {
        address: register.address as u32,
        count,
    };
    let address = register.wire_address(zero_mode).ok_or_else(invalid)?;
    let count = u16::try_from(count).map_err(|_| invalid())?;
    AddressRange::new(address, count)
}

/// Size of the union of `ranges`.
fn covered_registers(ranges: &[AddressRange]) -> Result<u32, PlanError> {
    let union = merge_address_ranges(ranges, false, u16::MAX)?;
    Ok(union.iter().map(|r| r.count() as u32).sum())
}
