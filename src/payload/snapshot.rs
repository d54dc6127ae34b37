//! # Power Snapshot
//!
//! Maps the 64-register snapshot block onto named measurements. Each field
//! is a float decoded from a fixed register pair.

use serde::Serialize;

use crate::constants::SNAPSHOT_BLOCK_LEN;
use crate::error::PqError;
use crate::payload::data_encoding::f32_from;

/// One cycle's power-quality measurements.
///
/// `reactive_power` and `total_reactive_power` are read from the same
/// registers (22/23). Consumers rely on both names, so the alias stays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerSnapshot {
    pub phase_current_a: f32,
    pub phase_current_b: f32,
    pub phase_current_c: f32,
    pub phase_voltage_a: f32,
    pub phase_voltage_b: f32,
    pub phase_voltage_c: f32,
    pub line_voltage_ab: f32,
    pub line_voltage_bc: f32,
    pub line_voltage_ca: f32,
    pub power_factor: f32,
    pub total_power: f32,
    pub total_reactive_power: f32,
    pub total_apparent_power: f32,
    pub frequency: f32,
    pub active_power: f32,
    pub reactive_power: f32,
    pub active_power_energy_a: f32,
    pub active_power_energy_b: f32,
    pub active_power_energy_c: f32,
    pub reactive_power_energy_a: f32,
    pub reactive_power_energy_b: f32,
    pub reactive_power_energy_c: f32,
    #[serde(rename = "current_THD_a")]
    pub current_thd_a: f32,
    #[serde(rename = "current_THD_b")]
    pub current_thd_b: f32,
    #[serde(rename = "current_THD_c")]
    pub current_thd_c: f32,
    #[serde(rename = "voltage_THD_ab")]
    pub voltage_thd_ab: f32,
    #[serde(rename = "voltage_THD_bc")]
    pub voltage_thd_bc: f32,
    #[serde(rename = "voltage_THD_ca")]
    pub voltage_thd_ca: f32,
}

impl PowerSnapshot {
    /// Builds a snapshot from the concatenated snapshot block.
    ///
    /// Fails with `DataShape` unless the block holds exactly 64 registers.
    pub fn from_registers(block: &[u16]) -> Result<Self, PqError> {
        if block.len() != SNAPSHOT_BLOCK_LEN {
            return Err(PqError::DataShape {
                expected: SNAPSHOT_BLOCK_LEN,
                actual: block.len(),
            });
        }
        let at = |index: usize| f32_from(block[index], block[index + 1]);

        Ok(PowerSnapshot {
            phase_current_a: at(0),
            phase_current_b: at(2),
            phase_current_c: at(4),
            phase_voltage_a: at(6),
            phase_voltage_b: at(8),
            phase_voltage_c: at(10),
            line_voltage_ab: at(12),
            line_voltage_bc: at(14),
            line_voltage_ca: at(16),
            power_factor: at(18),
            total_power: at(20),
            total_reactive_power: at(22),
            total_apparent_power: at(24),
            frequency: at(26),
            active_power: at(28),
            reactive_power: at(22),
            active_power_energy_a: at(34),
            active_power_energy_b: at(36),
            active_power_energy_c: at(38),
            reactive_power_energy_a: at(40),
            reactive_power_energy_b: at(42),
            reactive_power_energy_c: at(44),
            current_thd_a: at(52),
            current_thd_b: at(54),
            current_thd_c: at(56),
            voltage_thd_ab: at(58),
            voltage_thd_bc: at(60),
            voltage_thd_ca: at(62),
        })
    }

    /// Field name / value pairs as written to the time-series store.
    pub fn fields(&self) -> [(&'static str, f32); 28] {
        [
            ("phase_current_a", self.phase_current_a),
            ("phase_current_b", self.phase_current_b),
            ("phase_current_c", self.phase_current_c),
            ("phase_voltage_a", self.phase_voltage_a),
            ("phase_voltage_b", self.phase_voltage_b),
            ("phase_voltage_c", self.phase_voltage_c),
            ("line_voltage_ab", self.line_voltage_ab),
            ("line_voltage_bc", self.line_voltage_bc),
            ("line_voltage_ca", self.line_voltage_ca),
            ("power_factor", self.power_factor),
            ("total_power", self.total_power),
            ("total_reactive_power", self.total_reactive_power),
            ("total_apparent_power", self.total_apparent_power),
            ("frequency", self.frequency),
            ("active_power", self.active_power),
            ("reactive_power", self.reactive_power),
            ("active_power_energy_a", self.active_power_energy_a),
            ("active_power_energy_b", self.active_power_energy_b),
            ("active_power_energy_c", self.active_power_energy_c),
            ("reactive_power_energy_a", self.reactive_power_energy_a),
            ("reactive_power_energy_b", self.reactive_power_energy_b),
            ("reactive_power_energy_c", self.reactive_power_energy_c),
            ("current_THD_a", self.current_thd_a),
            ("current_THD_b", self.current_thd_b),
            ("current_THD_c", self.current_thd_c),
            ("voltage_THD_ab", self.voltage_thd_ab),
            ("voltage_THD_bc", self.voltage_thd_bc),
            ("voltage_THD_ca", self.voltage_thd_ca),
        ]
    }
}
