//! Holding-register decoding.
//!
//! The temperature bank exposes one holding register per channel. Each
//! register carries a two's-complement signed 16-bit integer in tenths of a
//! degree, so `0x0150` (336) decodes to `33.6` and `0xFFFB` decodes to `-0.5`.

use crate::error::CoreError;

/// Default divisor turning raw tenths into engineering units.
pub const DEFAULT_SCALE_DIVISOR: f64 = 10.0;

/// A contiguous block of holding registers to read each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterBlock {
    /// Address of the first register.
    pub start: u16,
    /// Number of registers (one per channel).
    pub count: u16,
}

impl RegisterBlock {
    /// Build a block, rejecting empty blocks and blocks that run past the
    /// 16-bit address space.
    pub fn new(start: u16, count: u16) -> Result<Self, CoreError> {
        if count == 0 {
            return Err(CoreError::Validation(
                "register count must be at least 1".to_string(),
            ));
        }
        if u32::from(start) + u32::from(count) > u32::from(u16::MAX) + 1 {
            return Err(CoreError::Validation(format!(
                "register block {start}+{count} exceeds the address space"
            )));
        }
        Ok(Self { start, count })
    }
}

/// Decode a raw register as a signed 16-bit integer divided by `divisor`.
pub fn decode_register(raw: u16, divisor: f64) -> f64 {
    f64::from(raw as i16) / divisor
}

/// Decode every register of a block, preserving order.
pub fn decode_registers(raw: &[u16], divisor: f64) -> Vec<f64> {
    raw.iter().map(|&r| decode_register(r, divisor)).collect()
}

/// Channel labels `"{prefix}1" ..= "{prefix}{count}"`.
pub fn channel_labels(prefix: &str, count: u16) -> Vec<String> {
    (1..=count).map(|i| format!("{prefix}{i}")).collect()
}
