use super::parameters::OtParameter;
use super::record::OtRecord;
use super::Manufacturer;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Largest 24-bit sensor id
pub const MAX_SENSOR_ID: u32 = 0xFF_FFFF;

/// One OpenThings message: a device header plus an ordered record list
#[derive(Debug, Clone, Serialize)]
pub struct OtMessage {
    manufacturer: Manufacturer,
    product: u8,
    sensor: u32,
    records: Vec<OtRecord>,
    timestamp: DateTime<Utc>,
}

impl OtMessage {
    /// `sensor` is truncated to 24 bits.
    pub fn new(manufacturer: Manufacturer, product: u8, sensor: u32) -> Self {
        Self::with_timestamp(manufacturer, product, sensor, Utc::now())
    }

    pub fn with_timestamp(
        manufacturer: Manufacturer,
        product: u8,
        sensor: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            manufacturer,
            product,
            sensor: sensor & MAX_SENSOR_ID,
            records: Vec::new(),
            timestamp,
        }
    }

    pub fn manufacturer(&self) -> Manufacturer {
        self.manufacturer
    }

    pub fn product(&self) -> u8 {
        self.product
    }

    pub fn sensor(&self) -> u32 {
        self.sensor
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn records(&self) -> &[OtRecord] {
        &self.records
    }

    /// First record for `parameter`
    pub fn record(&self, parameter: OtParameter) -> Option<&OtRecord> {
        self.records.iter().find(|r| r.parameter == parameter)
    }

    pub fn append(&mut self, record: OtRecord) {
        self.records.push(record);
    }

    /// Builder form of [`append`](Self::append)
    pub fn with_record(mut self, record: OtRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Same device and the same records in the same order; timestamps and
    /// PIP values are not compared.
    pub fn is_duplicate(&self, other: &OtMessage) -> bool {
        self.manufacturer == other.manufacturer
            && self.product == other.product
            && self.sensor == other.sensor
            && self.records == other.records
    }
}

impl PartialEq for OtMessage {
    fn eq(&self, other: &Self) -> bool {
        self.is_duplicate(other)
    }
}
