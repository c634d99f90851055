//! OpenThings records: one parameter, its datatype and up to 15 bytes of
//! big-endian data.
//!
//! Numeric datatypes are fixed point. `UDEC_n` is unsigned with `n`
//! fractional bits; `DEC_n` is sign-magnitude (sign in bit 7 of the first
//! byte) with `n` fractional bits.

use super::parameters::OtParameter;
use crate::error::MiHomeError;
use serde::Serialize;

/// Largest data size the 4-bit length field can express
pub const MAX_RECORD_DATA: usize = 15;

/// Record datatype (high nibble of the type byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OtDataType {
    Udec0,
    Udec4,
    Udec8,
    Udec12,
    Udec16,
    Udec20,
    Udec24,
    String,
    Dec0,
    Dec8,
    Dec16,
    Dec24,
    /// Recognised, not supported
    Enum,
    /// Recognised, not supported
    Float,
}

impl OtDataType {
    pub fn nibble(self) -> u8 {
        match self {
            OtDataType::Udec0 => 0x0,
            OtDataType::Udec4 => 0x1,
            OtDataType::Udec8 => 0x2,
            OtDataType::Udec12 => 0x3,
            OtDataType::Udec16 => 0x4,
            OtDataType::Udec20 => 0x5,
            OtDataType::Udec24 => 0x6,
            OtDataType::String => 0x7,
            OtDataType::Dec0 => 0x8,
            OtDataType::Dec8 => 0x9,
            OtDataType::Dec16 => 0xA,
            OtDataType::Dec24 => 0xB,
            OtDataType::Enum => 0xC,
            OtDataType::Float => 0xF,
        }
    }

    pub fn from_nibble(nibble: u8) -> Option<Self> {
        Some(match nibble {
            0x0 => OtDataType::Udec0,
            0x1 => OtDataType::Udec4,
            0x2 => OtDataType::Udec8,
            0x3 => OtDataType::Udec12,
            0x4 => OtDataType::Udec16,
            0x5 => OtDataType::Udec20,
            0x6 => OtDataType::Udec24,
            0x7 => OtDataType::String,
            0x8 => OtDataType::Dec0,
            0x9 => OtDataType::Dec8,
            0xA => OtDataType::Dec16,
            0xB => OtDataType::Dec24,
            0xC => OtDataType::Enum,
            0xF => OtDataType::Float,
            _ => return None,
        })
    }

    /// Fractional bits of a fixed-point type, `None` for non-numeric types
    pub fn fraction_bits(self) -> Option<u32> {
        match self {
            OtDataType::Udec0 | OtDataType::Dec0 => Some(0),
            OtDataType::Udec4 => Some(4),
            OtDataType::Udec8 | OtDataType::Dec8 => Some(8),
            OtDataType::Udec12 => Some(12),
            OtDataType::Udec16 | OtDataType::Dec16 => Some(16),
            OtDataType::Udec20 => Some(20),
            OtDataType::Udec24 | OtDataType::Dec24 => Some(24),
            OtDataType::String | OtDataType::Enum | OtDataType::Float => None,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            OtDataType::Dec0 | OtDataType::Dec8 | OtDataType::Dec16 | OtDataType::Dec24
        )
    }
}

/// Minimal big-endian representation; zero is one byte.
fn be_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    bytes[first..].to_vec()
}

/// Sign-magnitude bytes with bit 7 of the first byte free for the sign.
fn sign_magnitude_bytes(negative: bool, magnitude: u64) -> Result<Vec<u8>, MiHomeError> {
    let mut data = be_bytes(magnitude);
    if data[0] & 0x80 != 0 {
        data.insert(0, 0);
    }
    if data.len() > 8 {
        return Err(MiHomeError::BadParameter(format!(
            "magnitude {} too large for a signed record",
            magnitude
        )));
    }
    if negative && magnitude != 0 {
        data[0] |= 0x80;
    }
    Ok(data)
}

/// One parameter/value pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtRecord {
    pub parameter: OtParameter,
    /// Set on reports and on commands to a device
    pub is_report: bool,
    pub datatype: OtDataType,
    pub data: Vec<u8>,
}

impl OtRecord {
    /// Build a record from raw parts. Data longer than 15 bytes is rejected.
    pub fn new(
        parameter: OtParameter,
        is_report: bool,
        datatype: OtDataType,
        data: Vec<u8>,
    ) -> Result<Self, MiHomeError> {
        if data.len() > MAX_RECORD_DATA {
            return Err(MiHomeError::BadParameter(format!(
                "record data of {} bytes exceeds {}",
                data.len(),
                MAX_RECORD_DATA
            )));
        }
        Ok(Self {
            parameter,
            is_report,
            datatype,
            data,
        })
    }

    /// Zero-length record, used to request a value
    pub fn null(parameter: OtParameter, is_report: bool) -> Self {
        Self {
            parameter,
            is_report,
            datatype: OtDataType::Udec0,
            data: Vec::new(),
        }
    }

    pub fn bool(parameter: OtParameter, is_report: bool, value: bool) -> Self {
        Self {
            parameter,
            is_report,
            datatype: OtDataType::Udec0,
            data: vec![u8::from(value)],
        }
    }

    /// `UDEC_0` with the fewest bytes that hold `value`
    pub fn uint(parameter: OtParameter, is_report: bool, value: u64) -> Self {
        Self {
            parameter,
            is_report,
            datatype: OtDataType::Udec0,
            data: be_bytes(value),
        }
    }

    /// `DEC_0` with the fewest bytes that hold `value`
    pub fn int(parameter: OtParameter, is_report: bool, value: i64) -> Self {
        // |i64::MIN| needs 9 bytes with the sign bit; clamp to the nearest representable
        let magnitude = value.unsigned_abs().min(i64::MAX as u64);
        let data = sign_magnitude_bytes(value < 0, magnitude).unwrap_or_else(|_| vec![0]);
        Self {
            parameter,
            is_report,
            datatype: OtDataType::Dec0,
            data,
        }
    }

    /// Fixed-point encoding of `value` in a numeric `datatype`.
    pub fn float(
        parameter: OtParameter,
        is_report: bool,
        value: f64,
        datatype: OtDataType,
    ) -> Result<Self, MiHomeError> {
        let bits = datatype.fraction_bits().ok_or_else(|| {
            MiHomeError::BadParameter(format!("{:?} is not a numeric datatype", datatype))
        })?;
        if !value.is_finite() {
            return Err(MiHomeError::BadParameter(format!("{} is not finite", value)));
        }
        let scaled = (value.abs() * f64::from(1u32 << bits)).round();
        if scaled >= u64::MAX as f64 {
            return Err(MiHomeError::BadParameter(format!(
                "{} out of range for {:?}",
                value, datatype
            )));
        }
        let magnitude = scaled as u64;

        let data = if datatype.is_signed() {
            sign_magnitude_bytes(value < 0.0, magnitude)?
        } else {
            if value < 0.0 && magnitude != 0 {
                return Err(MiHomeError::BadParameter(format!(
                    "{} is negative for unsigned {:?}",
                    value, datatype
                )));
            }
            be_bytes(magnitude)
        };
        Self::new(parameter, is_report, datatype, data)
    }

    pub fn string(parameter: OtParameter, is_report: bool, value: &str) -> Result<Self, MiHomeError> {
        Self::new(parameter, is_report, OtDataType::String, value.as_bytes().to_vec())
    }

    /// Sign and magnitude of the raw fixed-point value, plus fractional bits.
    fn fixed_point(&self) -> Result<(bool, u64, u32), MiHomeError> {
        let bits = match self.datatype {
            OtDataType::Enum | OtDataType::Float => {
                return Err(MiHomeError::NotImplemented(format!(
                    "{:?} records",
                    self.datatype
                )))
            }
            OtDataType::String => {
                return Err(MiHomeError::BadParameter(format!(
                    "{} holds a string",
                    self.parameter
                )))
            }
            other => other.fraction_bits().unwrap_or(0),
        };
        if self.data.len() > 8 {
            return Err(MiHomeError::BadParameter(format!(
                "{}-byte numeric value is too wide",
                self.data.len()
            )));
        }
        if self.data.is_empty() {
            return Ok((false, 0, bits));
        }

        let mut data = self.data.clone();
        let negative = self.datatype.is_signed() && data[0] & 0x80 != 0;
        if self.datatype.is_signed() {
            data[0] &= 0x7F;
        }
        let magnitude = data.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
        Ok((negative, magnitude, bits))
    }

    /// Numeric value; a zero-length record is 0.
    pub fn float_value(&self) -> Result<f64, MiHomeError> {
        let (negative, magnitude, bits) = self.fixed_point()?;
        let value = magnitude as f64 / f64::from(1u32 << bits);
        Ok(if negative { -value } else { value })
    }

    /// Integer part of an unsigned value
    pub fn uint_value(&self) -> Result<u64, MiHomeError> {
        let (negative, magnitude, bits) = self.fixed_point()?;
        if negative && magnitude != 0 {
            return Err(MiHomeError::BadParameter(format!(
                "{} is negative",
                self.parameter
            )));
        }
        Ok(magnitude >> bits)
    }

    /// Integer part, truncated toward zero
    pub fn int_value(&self) -> Result<i64, MiHomeError> {
        let (negative, magnitude, bits) = self.fixed_point()?;
        let whole = i64::try_from(magnitude >> bits).map_err(|_| {
            MiHomeError::BadParameter(format!("{} overflows i64", self.parameter))
        })?;
        Ok(if negative { -whole } else { whole })
    }

    pub fn bool_value(&self) -> Result<bool, MiHomeError> {
        Ok(self.fixed_point()?.1 != 0)
    }

    /// UTF-8 content of a `STRING` record
    pub fn string_value(&self) -> Result<String, MiHomeError> {
        if self.datatype != OtDataType::String {
            return Err(MiHomeError::BadParameter(format!(
                "{} is {:?}, not a string",
                self.parameter, self.datatype
            )));
        }
        String::from_utf8(self.data.clone())
            .map_err(|e| MiHomeError::MessageCorruption(format!("invalid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datatype_nibbles() {
        for nibble in 0..16u8 {
            match OtDataType::from_nibble(nibble) {
                Some(t) => assert_eq!(t.nibble(), nibble),
                None => assert!(nibble == 0xD || nibble == 0xE),
            }
        }
    }

    #[test]
    fn test_udec_scaling() {
        // 0x0F10 / 2^8 = 15.0625
        let r = OtRecord::new(OtParameter::TEMPERATURE, true, OtDataType::Udec8, vec![0x0F, 0x10])
            .unwrap();
        assert_eq!(r.float_value().unwrap(), 15.0625);
        assert_eq!(r.uint_value().unwrap(), 15);
    }

    #[test]
    fn test_dec_sign_magnitude() {
        let r = OtRecord::new(OtParameter::TEMPERATURE, true, OtDataType::Dec8, vec![0x81, 0x80])
            .unwrap();
        assert_eq!(r.float_value().unwrap(), -1.5);
        assert_eq!(r.int_value().unwrap(), -1);

        let r = OtRecord::int(OtParameter::REAL_POWER, true, -300);
        assert_eq!(r.data, vec![0x81, 0x2C]);
        assert_eq!(r.int_value().unwrap(), -300);

        // 200 needs a leading byte so bit 7 stays free for the sign
        let r = OtRecord::int(OtParameter::REAL_POWER, true, 200);
        assert_eq!(r.data, vec![0x00, 0xC8]);
    }

    #[test]
    fn test_zero_size_is_zero() {
        let r = OtRecord::null(OtParameter::DIAGNOSTICS, false);
        assert_eq!(r.float_value().unwrap(), 0.0);
        assert_eq!(r.uint_value().unwrap(), 0);
        assert!(!r.bool_value().unwrap());
    }

    #[test]
    fn test_wide_numeric_rejected() {
        let r = OtRecord::new(OtParameter::ENERGY, true, OtDataType::Udec0, vec![1; 9]).unwrap();
        assert!(matches!(r.float_value(), Err(MiHomeError::BadParameter(_))));
    }

    #[test]
    fn test_unsupported_types() {
        let r = OtRecord::new(OtParameter::LEVEL, true, OtDataType::Float, vec![0; 4]).unwrap();
        assert!(matches!(r.float_value(), Err(MiHomeError::NotImplemented(_))));
        let r = OtRecord::new(OtParameter::LEVEL, true, OtDataType::Enum, vec![1]).unwrap();
        assert!(matches!(r.uint_value(), Err(MiHomeError::NotImplemented(_))));
    }

    #[test]
    fn test_float_factory() {
        let r = OtRecord::float(OtParameter::TEMPERATURE, true, 21.5, OtDataType::Dec8).unwrap();
        assert_eq!(r.data, vec![0x15, 0x80]);
        assert_eq!(r.float_value().unwrap(), 21.5);

        assert!(OtRecord::float(OtParameter::VOLTAGE, true, -1.0, OtDataType::Udec8).is_err());
        assert!(OtRecord::float(OtParameter::VOLTAGE, true, 1.0, OtDataType::String).is_err());
    }

    #[test]
    fn test_string_records() {
        let r = OtRecord::string(OtParameter::DEBUG_OUTPUT, true, "hello").unwrap();
        assert_eq!(r.string_value().unwrap(), "hello");
        assert!(OtRecord::string(OtParameter::DEBUG_OUTPUT, true, "sixteen chars!!!").is_err());
        assert!(matches!(r.float_value(), Err(MiHomeError::BadParameter(_))));
    }

    #[test]
    fn test_uint_minimal_bytes() {
        assert_eq!(OtRecord::uint(OtParameter::REPORT_PERIOD, true, 0).data, vec![0]);
        assert_eq!(OtRecord::uint(OtParameter::REPORT_PERIOD, true, 300).data, vec![0x01, 0x2C]);
    }
}
