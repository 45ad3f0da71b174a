//! Correction arithmetic turning raw 12-bit ADC codes into physical units.
//!
//! The gain/zero constants are per-device and come out of a type-9 exchange,
//! see [`crate::protocol::Calibration`]. Division truncates toward zero,
//! matching the device vendor's reference arithmetic.

/// Corrects a raw voltage ADC code to millivolts.
pub fn correct_voltage(raw: u16, gain: u16, zero: u16) -> i32 {
    ((i64::from(raw) * 16 - i64::from(zero)) * i64::from(gain) / 100_000) as i32
}

/// Corrects a raw current ADC code to milliamps.
pub fn correct_current(raw: u16, gain: u16, zero: u16) -> i32 {
    ((i64::from(raw) * 4 - i64::from(zero)) * i64::from(gain) * 2 / 100_000) as i32
}
