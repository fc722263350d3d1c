//! Configuration for the Modbus read planner.

use regplan_common::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::range::MAX_READ_REGISTERS;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] regplan_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete planner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Modbus-specific settings
    pub modbus: ModbusConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Modbus protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Devices to plan reads for
    pub devices: Vec<DeviceConfig>,

    /// Named register groups (reusable across devices)
    #[serde(default)]
    pub register_groups: HashMap<String, RegisterGroup>,

    /// Default read planning policy
    #[serde(default)]
    pub planning: PlanningConfig,
}

/// How requested registers are grouped into reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningConfig {
    /// Read unrequested registers between requested ones to save transactions
    #[serde(default = "default_allow_holes")]
    pub allow_holes: bool,

    /// Maximum registers per read (1-125)
    #[serde(default = "default_max_read_size")]
    pub max_read_size: u16,
}

fn default_allow_holes() -> bool {
    true
}

fn default_max_read_size() -> u16 {
    100
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            allow_holes: default_allow_holes(),
            max_read_size: default_max_read_size(),
        }
    }
}

/// Configuration for a single Modbus device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name
    pub name: String,

    /// Connection type and address
    pub connection: ConnectionConfig,

    /// Modbus unit/slave ID (1-247)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Addresses are 0-based wire offsets (default). When false they are
    /// 1-based as printed in most device manuals.
    #[serde(default = "default_zero_mode")]
    pub zero_mode: bool,

    /// Registers to read (inline definition)
    #[serde(default)]
    pub registers: Vec<RegisterConfig>,

    /// Reference to a named register group
    #[serde(default)]
    pub register_group: Option<String>,

    /// Override of `planning.allow_holes`
    #[serde(default)]
    pub allow_holes: Option<bool>,

    /// Override of `planning.max_read_size`
    #[serde(default)]
    pub max_read_size: Option<u16>,
}

fn default_unit_id() -> u8 {
    1
}

fn default_zero_mode() -> bool {
    true
}

/// Connection configuration (TCP or RTU).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// Modbus TCP connection
    Tcp {
        /// Host address (IP or hostname)
        host: String,
        /// TCP port (default: 502)
        #[serde(default = "default_modbus_port")]
        port: u16,
    },
    /// Modbus RTU (serial) connection
    Rtu {
        /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
        port: String,
        /// Baud rate (default: 9600)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Data bits (default: 8)
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        /// Parity: "none", "even", or "odd" (default: "none")
        #[serde(default = "default_parity")]
        parity: String,
        /// Stop bits: 1 or 2 (default: 1)
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
    },
}

fn default_modbus_port() -> u16 {
    502
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionConfig::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            ConnectionConfig::Rtu {
                port, baud_rate, ..
            } => write!(f, "rtu://{}@{}", port, baud_rate),
        }
    }
}

/// A group of registers shared between devices of the same model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterGroup {
    /// Registers in this group
    pub registers: Vec<RegisterConfig>,
}

/// Configuration for a register or run of registers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterConfig {
    /// Register type
    #[serde(rename = "type")]
    pub register_type: RegisterType,

    /// Starting address
    pub address: u16,

    /// Number of values to read (default: 1)
    #[serde(default = "default_count")]
    pub count: u16,

    /// Optional name for this register
    pub name: Option<String>,

    /// Data type interpretation for holding/input registers
    #[serde(default)]
    pub data_type: DataType,

    /// Scaling factor (value * scale)
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Offset (value * scale + offset)
    #[serde(default)]
    pub offset: f64,

    /// Unit of measurement (for metadata)
    pub unit: Option<String>,
}

fn default_count() -> u16 {
    1
}

fn default_scale() -> f64 {
    1.0
}

impl RegisterConfig {
    /// Number of wire registers (or bits) occupied by this entry.
    ///
    /// Widened to `u32` because multi-word data types can exceed `u16`.
    pub fn wire_count(&self) -> u32 {
        if self.register_type.is_bit() {
            self.count as u32
        } else {
            self.count as u32 * self.data_type.words_per_value() as u32
        }
    }

    /// Wire address of the first register, or `None` for address 0 on a
    /// 1-based device.
    pub fn wire_address(&self, zero_mode: bool) -> Option<u16> {
        if zero_mode {
            Some(self.address)
        } else {
            self.address.checked_sub(1)
        }
    }

    /// Display label: configured name or `<type>:<address>`.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}:{}", self.register_type.as_str(), self.address),
        }
    }
}

/// Modbus register types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterType {
    /// Discrete output coils (read/write, 1-bit)
    Coil,
    /// Discrete input contacts (read-only, 1-bit)
    Discrete,
    /// Input registers (read-only, 16-bit)
    Input,
    /// Holding registers (read/write, 16-bit)
    Holding,
}

impl RegisterType {
    /// All register types, in planning order.
    pub const ALL: [RegisterType; 4] = [
        RegisterType::Coil,
        RegisterType::Discrete,
        RegisterType::Input,
        RegisterType::Holding,
    ];

    /// Return the string name for this register type.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterType::Coil => "coil",
            RegisterType::Discrete => "discrete",
            RegisterType::Input => "input",
            RegisterType::Holding => "holding",
        }
    }

    /// Whether values of this type are single bits.
    pub fn is_bit(&self) -> bool {
        matches!(self, RegisterType::Coil | RegisterType::Discrete)
    }

    /// Function code used to read this register type.
    pub fn read_function_code(&self) -> u8 {
        match self {
            RegisterType::Coil => 0x01,
            RegisterType::Discrete => 0x02,
            RegisterType::Holding => 0x03,
            RegisterType::Input => 0x04,
        }
    }
}

/// Data type interpretation for 16-bit registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Unsigned 16-bit integer (default)
    #[default]
    U16,
    /// Signed 16-bit integer
    I16,
    /// Unsigned 32-bit integer (2 registers, big-endian)
    U32,
    /// Signed 32-bit integer (2 registers, big-endian)
    I32,
    /// 32-bit float (2 registers, big-endian)
    F32,
    /// Unsigned 32-bit integer (2 registers, little-endian word order)
    U32Le,
    /// Signed 32-bit integer (2 registers, little-endian word order)
    I32Le,
    /// 32-bit float (2 registers, little-endian word order)
    F32Le,
}

impl DataType {
    /// Number of 16-bit registers holding one value.
    pub fn words_per_value(&self) -> u16 {
        match self {
            DataType::U16 | DataType::I16 => 1,
            DataType::U32 | DataType::I32 | DataType::F32 => 2,
            DataType::U32Le | DataType::I32Le | DataType::F32Le => 2,
        }
    }
}

impl PlannerConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: PlannerConfig = regplan_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn from_json5(content: &str) -> Result<Self, ConfigError> {
        let config: PlannerConfig = regplan_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.modbus.devices.is_empty() {
            return Err(ConfigError::Validation(
                "At least one device must be configured".to_string(),
            ));
        }

        validate_max_read_size("planning", self.modbus.planning.max_read_size)?;

        for (name, group) in &self.modbus.register_groups {
            for register in &group.registers {
                validate_register(&format!("Register group '{}'", name), register)?;
            }
        }

        let mut names = HashSet::new();
        for device in &self.modbus.devices {
            if device.name.is_empty() {
                return Err(ConfigError::Validation(
                    "Device name cannot be empty".to_string(),
                ));
            }

            if !names.insert(device.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Device '{}' is defined more than once",
                    device.name
                )));
            }

            if device.unit_id == 0 || device.unit_id > 247 {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': unit_id must be 1-247",
                    device.name
                )));
            }

            // Check that device has either inline registers or a register group
            let has_registers = !device.registers.is_empty();
            let has_group = device.register_group.is_some();

            if !has_registers && !has_group {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': must specify either registers or register_group",
                    device.name
                )));
            }

            // Validate register group reference
            if let Some(group_name) = &device.register_group {
                if !self.modbus.register_groups.contains_key(group_name) {
                    return Err(ConfigError::Validation(format!(
                        "Device '{}': unknown register_group '{}'",
                        device.name, group_name
                    )));
                }
            }

            if let Some(max_read_size) = device.max_read_size {
                validate_max_read_size(&format!("Device '{}'", device.name), max_read_size)?;
            }

            let context = format!("Device '{}'", device.name);
            for register in device.all_registers(&self.modbus.register_groups) {
                validate_register(&context, &register)?;
                if register.wire_address(device.zero_mode).is_none() {
                    return Err(ConfigError::Validation(format!(
                        "{}: register '{}' has address 0 but zero_mode is off",
                        context,
                        register.label()
                    )));
                }
            }

            // Validate RTU parity
            if let ConnectionConfig::Rtu { parity, .. } = &device.connection {
                match parity.to_lowercase().as_str() {
                    "none" | "even" | "odd" => {}
                    _ => {
                        return Err(ConfigError::Validation(format!(
                            "Device '{}': invalid parity '{}' (use none, even, or odd)",
                            device.name, parity
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Find a device by name.
    pub fn device(&self, name: &str) -> Option<&DeviceConfig> {
        self.modbus.devices.iter().find(|d| d.name == name)
    }
}

fn validate_max_read_size(context: &str, max_read_size: u16) -> Result<(), ConfigError> {
    if max_read_size == 0 || max_read_size > MAX_READ_REGISTERS {
        return Err(ConfigError::Validation(format!(
            "{}: max_read_size must be 1-{}",
            context, MAX_READ_REGISTERS
        )));
    }
    Ok(())
}

fn validate_register(context: &str, register: &RegisterConfig) -> Result<(), ConfigError> {
    if register.count == 0 {
        return Err(ConfigError::Validation(format!(
            "{}: register '{}' has count 0",
            context,
            register.label()
        )));
    }
    Ok(())
}

impl DeviceConfig {
    /// Get all registers for this device, including those from register groups.
    pub fn all_registers(&self, groups: &HashMap<String, RegisterGroup>) -> Vec<RegisterConfig> {
        let mut registers = self.registers.clone();

        if let Some(group_name) = &self.register_group {
            if let Some(group) = groups.get(group_name) {
                registers.extend(group.registers.clone());
            }
        }

        registers
    }

    /// Planning policy for this device, with per-device overrides applied.
    pub fn planning(&self, defaults: &PlanningConfig) -> PlanningConfig {
        PlanningConfig {
            allow_holes: self.allow_holes.unwrap_or(defaults.allow_holes),
            max_read_size: self.max_read_size.unwrap_or(defaults.max_read_size),
        }
    }
}
