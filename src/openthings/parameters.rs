//! OpenThings parameter identifiers.

use serde::{Serialize, Serializer};
use std::fmt;

/// 7-bit parameter identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OtParameter(u8);

macro_rules! parameters {
    ($($name:ident = $id:literal, $label:literal, $unit:literal;)*) => {
        impl OtParameter {
            $(pub const $name: OtParameter = OtParameter($id);)*

            /// Catalogue name, if the identifier is known
            pub fn name(self) -> Option<&'static str> {
                match self.0 {
                    $($id => Some($label),)*
                    _ => None,
                }
            }

            /// Unit of the reported value, empty when dimensionless
            pub fn unit(self) -> &'static str {
                match self.0 {
                    $($id => $unit,)*
                    _ => "",
                }
            }
        }
    };
}

parameters! {
    ALARM = 0x21, "ALARM", "";
    EXERCISE = 0x23, "EXERCISE", "";
    LOW_POWER = 0x24, "LOW_POWER", "";
    VALVE_STATE = 0x25, "VALVE_STATE", "";
    DIAGNOSTICS = 0x26, "DIAGNOSTICS", "";
    DEBUG_OUTPUT = 0x2D, "DEBUG_OUTPUT", "";
    IDENTIFY = 0x3F, "IDENTIFY", "";
    SOURCE_SELECTOR = 0x40, "SOURCE_SELECTOR", "";
    WATER_DETECTOR = 0x41, "WATER_DETECTOR", "";
    GLASS_BREAKAGE = 0x42, "GLASS_BREAKAGE", "";
    CLOSURES = 0x43, "CLOSURES", "";
    DOOR_BELL = 0x44, "DOOR_BELL", "";
    ENERGY = 0x45, "ENERGY", "kWh";
    FALL_SENSOR = 0x46, "FALL_SENSOR", "";
    GAS_VOLUME = 0x47, "GAS_VOLUME", "m3";
    AIR_PRESSURE = 0x48, "AIR_PRESSURE", "mbar";
    ILLUMINANCE = 0x49, "ILLUMINANCE", "Lux";
    LEVEL = 0x4C, "LEVEL", "";
    RAINFALL = 0x4D, "RAINFALL", "mm";
    APPARENT_POWER = 0x50, "APPARENT_POWER", "VA";
    POWER_FACTOR = 0x51, "POWER_FACTOR", "";
    REPORT_PERIOD = 0x52, "REPORT_PERIOD", "s";
    SMOKE_DETECTOR = 0x53, "SMOKE_DETECTOR", "";
    TIME_AND_DATE = 0x54, "TIME_AND_DATE", "s";
    VIBRATION = 0x56, "VIBRATION", "";
    WATER_VOLUME = 0x57, "WATER_VOLUME", "l";
    WIND_SPEED = 0x58, "WIND_SPEED", "m/s";
    GAS_PRESSURE = 0x61, "GAS_PRESSURE", "Pa";
    BATTERY_LEVEL = 0x62, "BATTERY_LEVEL", "V";
    CO_DETECTOR = 0x63, "CO_DETECTOR", "";
    DOOR_SENSOR = 0x64, "DOOR_SENSOR", "";
    EMERGENCY = 0x65, "EMERGENCY", "";
    FREQUENCY = 0x66, "FREQUENCY", "Hz";
    GAS_FLOW_RATE = 0x67, "GAS_FLOW_RATE", "m3/hr";
    RELATIVE_HUMIDITY = 0x68, "RELATIVE_HUMIDITY", "%";
    CURRENT = 0x69, "CURRENT", "A";
    JOIN = 0x6A, "JOIN", "";
    LIGHT_LEVEL = 0x6C, "LIGHT_LEVEL", "";
    MOTION_DETECTOR = 0x6D, "MOTION_DETECTOR", "";
    OCCUPANCY = 0x6F, "OCCUPANCY", "";
    REAL_POWER = 0x70, "REAL_POWER", "W";
    REACTIVE_POWER = 0x71, "REACTIVE_POWER", "VAR";
    ROTATION_SPEED = 0x72, "ROTATION_SPEED", "RPM";
    SWITCH_STATE = 0x73, "SWITCH_STATE", "";
    TEMPERATURE = 0x74, "TEMPERATURE", "C";
    VOLTAGE = 0x76, "VOLTAGE", "V";
    WATER_FLOW_RATE = 0x77, "WATER_FLOW_RATE", "l/hr";
    WATER_PRESSURE = 0x78, "WATER_PRESSURE", "Pa";
}

impl OtParameter {
    /// Identifier from the low 7 bits of `id`
    pub const fn new(id: u8) -> Self {
        OtParameter(id & 0x7F)
    }

    pub const fn id(self) -> u8 {
        self.0
    }
}

impl fmt::Display for OtParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "0x{:02X}", self.0),
        }
    }
}

impl Serialize for OtParameter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_lookup() {
        assert_eq!(OtParameter::TEMPERATURE.id(), 0x74);
        assert_eq!(OtParameter::new(0x74), OtParameter::TEMPERATURE);
        assert_eq!(OtParameter::new(0xF4), OtParameter::TEMPERATURE);
        assert_eq!(OtParameter::SWITCH_STATE.name(), Some("SWITCH_STATE"));
        assert_eq!(OtParameter::REAL_POWER.unit(), "W");
        assert_eq!(OtParameter::new(0x01).name(), None);
        assert_eq!(OtParameter::new(0x01).to_string(), "0x01");
    }
}
