//! Values returned by executing a read plan.
//!
//! A transport executes each [`PlannedRead`] and hands the response to a
//! [`ReadSession`], which files every value under its register address.
//! Configured registers are then decoded from the session regardless of
//! which read (or how many) carried their words.

use std::collections::HashMap;
use tokio_modbus::Response;
use tracing::trace;

use crate::config::{DataType, RegisterConfig, RegisterType};
use crate::plan::PlannedRead;

/// Error type for session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Short response for {register_type} read at {address}: expected {expected} values, got {actual}")]
    ShortResponse {
        register_type: &'static str,
        address: u16,
        expected: usize,
        actual: usize,
    },
    #[error("{register_type} read at {address} cannot carry {found} values")]
    WrongValueKind {
        register_type: &'static str,
        address: u16,
        found: &'static str,
    },
    #[error("Response does not match {register_type} read at {address}")]
    UnexpectedResponse {
        register_type: &'static str,
        address: u16,
    },
    #[error("No value read for {register_type} register {address}")]
    Missing {
        register_type: &'static str,
        address: u32,
    },
}

/// A single value read from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawValue {
    Word(u16),
    Bit(bool),
}

/// Register values collected over one poll of a device.
#[derive(Debug, Clone, Default)]
pub struct ReadSession {
    values: HashMap<(RegisterType, u16), RawValue>,
}

impl ReadSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the words returned for a register read.
    pub fn record_words(&mut self, read: &PlannedRead, words: &[u16]) -> Result<(), SessionError> {
        if read.register_type.is_bit() {
            return Err(wrong_kind(read, "word"));
        }
        self.record(read, words.iter().map(|&w| RawValue::Word(w)), words.len())
    }

    /// Store the bits returned for a coil or discrete input read.
    ///
    /// Bit responses are padded to whole bytes, so trailing extras are ignored.
    pub fn record_bits(&mut self, read: &PlannedRead, bits: &[bool]) -> Result<(), SessionError> {
        if !read.register_type.is_bit() {
            return Err(wrong_kind(read, "bit"));
        }
        self.record(read, bits.iter().map(|&b| RawValue::Bit(b)), bits.len())
    }

    /// Store a protocol response for `read`.
    pub fn record_response(
        &mut self,
        read: &PlannedRead,
        response: &Response,
    ) -> Result<(), SessionError> {
        match (read.register_type, response) {
            (RegisterType::Coil, Response::ReadCoils(bits))
            | (RegisterType::Discrete, Response::ReadDiscreteInputs(bits)) => {
                self.record_bits(read, bits)
            }
            (RegisterType::Input, Response::ReadInputRegisters(words))
            | (RegisterType::Holding, Response::ReadHoldingRegisters(words)) => {
                self.record_words(read, words)
            }
            _ => Err(SessionError::UnexpectedResponse {
                register_type: read.register_type.as_str(),
                address: read.range.address(),
            }),
        }
    }

    fn record(
        &mut self,
        read: &PlannedRead,
        values: impl Iterator<Item = RawValue>,
        actual: usize,
    ) -> Result<(), SessionError> {
        let expected = read.range.count() as usize;
        if actual < expected {
            return Err(SessionError::ShortResponse {
                register_type: read.register_type.as_str(),
                address: read.range.address(),
                expected,
                actual,
            });
        }

        for (address, value) in read.range.addresses().zip(values) {
            self.values.insert((read.register_type, address), value);
        }

        trace!(
            "Recorded {} {} value(s) at {}",
            expected,
            read.register_type.as_str(),
            read.range
        );
        Ok(())
    }

    pub fn get(&self, register_type: RegisterType, address: u16) -> Option<RawValue> {
        self.values.get(&(register_type, address)).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Decode the values of a configured register.
    ///
    /// Word registers are decoded per data type with scale and offset
    /// applied; bits decode to `0.0` or `1.0`.
    pub fn decode(
        &self,
        register: &RegisterConfig,
        zero_mode: bool,
    ) -> Result<Vec<f64>, SessionError> {
        let register_type = register.register_type;
        let missing = |address: u32| SessionError::Missing {
            register_type: register_type.as_str(),
            address,
        };
        let start = register
            .wire_address(zero_mode)
            .ok_or_else(|| missing(register.address as u32))?;

        let mut raw = Vec::with_capacity(register.wire_count() as usize);
        for offset in 0..register.wire_count() {
            let address = start as u32 + offset;
            let value = u16::try_from(address)
                .ok()
                .and_then(|a| self.get(register_type, a))
                .ok_or_else(|| missing(address))?;
            raw.push(value);
        }

        if register_type.is_bit() {
            return Ok(raw
                .into_iter()
                .map(|v| match v {
                    RawValue::Bit(true) => 1.0,
                    RawValue::Bit(false) => 0.0,
                    RawValue::Word(w) => (w != 0) as u8 as f64,
                })
                .collect());
        }

        let words: Vec<u16> = raw
            .into_iter()
            .map(|v| match v {
                RawValue::Word(w) => w,
                RawValue::Bit(b) => b as u16,
            })
            .collect();
        Ok(decode_words(&words, register))
    }
}

fn wrong_kind(read: &PlannedRead, found: &'static str) -> SessionError {
    SessionError::WrongValueKind {
        register_type: read.register_type.as_str(),
        address: read.range.address(),
        found,
    }
}

/// Decode raw register values based on data type configuration.
fn decode_words(data: &[u16], register: &RegisterConfig) -> Vec<f64> {
    let regs_per_value = register.data_type.words_per_value() as usize;

    data.chunks_exact(regs_per_value)
        .map(|chunk| {
            let raw_value = match register.data_type {
                DataType::U16 => chunk[0] as f64,
                DataType::I16 => chunk[0] as i16 as f64,
                DataType::U32 => be_u32(chunk) as f64,
                DataType::I32 => be_u32(chunk) as i32 as f64,
                DataType::F32 => f32::from_bits(be_u32(chunk)) as f64,
                DataType::U32Le => le_u32(chunk) as f64,
                DataType::I32Le => le_u32(chunk) as i32 as f64,
                DataType::F32Le => f32::from_bits(le_u32(chunk)) as f64,
            };

            // Apply scale and offset
            raw_value * register.scale + register.offset
        })
        .collect()
}

fn be_u32(chunk: &[u16]) -> u32 {
    ((chunk[0] as u32) << 16) | (chunk[1] as u32)
}

fn le_u32(chunk: &[u16]) -> u32 {
    ((chunk[1] as u32) << 16) | (chunk[0] as u32)
}
