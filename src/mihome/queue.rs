//! Outgoing request queue.
//!
//! Battery powered devices only listen briefly after they report, so
//! requests wait here until the next inbound message from the same
//! (product, sensor) and are then sent as the reply.

use super::product::Product;
use crate::error::MiHomeError;
use crate::openthings::{OtDataType, OtMessage, OtParameter, OtRecord};
use log::debug;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

/// eTRV valve override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValveState {
    Open = 0,
    Closed = 1,
    /// Valve follows the setpoint
    Auto = 2,
}

/// Value carried by a queued request
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum QueuePayload {
    /// Value-less request (diagnostics, identify, exercise, battery level)
    None,
    /// Setpoint in °C
    Temperature(f64),
    /// Report interval in seconds
    Interval(u16),
    ValveState(ValveState),
    LowPower(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntry {
    pub product: Product,
    pub sensor: u32,
    pub parameter: OtParameter,
    pub payload: QueuePayload,
}

impl QueueEntry {
    /// The record this request puts on the air
    pub fn record(&self) -> Result<OtRecord, MiHomeError> {
        let p = self.parameter;
        match self.payload {
            QueuePayload::None => Ok(OtRecord::null(p, true)),
            QueuePayload::Temperature(celsius) => OtRecord::float(p, true, celsius, OtDataType::Dec8),
            QueuePayload::Interval(seconds) => {
                OtRecord::new(p, true, OtDataType::Udec0, seconds.to_be_bytes().to_vec())
            }
            QueuePayload::ValveState(state) => {
                OtRecord::new(p, true, OtDataType::Udec0, vec![state as u8])
            }
            QueuePayload::LowPower(on) => Ok(OtRecord::bool(p, true, on)),
        }
    }

    /// Single-record OpenThings message addressed to the device
    pub fn to_message(&self) -> Result<OtMessage, MiHomeError> {
        let (Some(manufacturer), Some(product_id)) =
            (self.product.manufacturer(), self.product.product_id())
        else {
            return Err(MiHomeError::BadParameter(format!(
                "{} does not speak OpenThings",
                self.product
            )));
        };
        Ok(OtMessage::new(manufacturer, product_id, self.sensor).with_record(self.record()?))
    }
}

/// At most one entry per (product, sensor, parameter)
#[derive(Debug, Default)]
pub struct OutgoingQueue {
    entries: Mutex<Vec<QueueEntry>>,
}

impl OutgoingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<QueueEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a request, or update the pending one for the same key.
    ///
    /// Returns [`MiHomeError::NotModified`] when the pending entry already
    /// carries `entry`'s value.
    pub fn push(&self, entry: QueueEntry) -> Result<(), MiHomeError> {
        let mut entries = self.lock();
        let existing = entries.iter_mut().find(|e| {
            e.product == entry.product && e.sensor == entry.sensor && e.parameter == entry.parameter
        });
        match existing {
            Some(e) if e.payload == entry.payload => Err(MiHomeError::NotModified),
            Some(e) => {
                debug!(
                    "Updating queued {} for {} 0x{:06X}",
                    entry.parameter, entry.product, entry.sensor
                );
                e.payload = entry.payload;
                Ok(())
            }
            None => {
                debug!(
                    "Queued {} for {} 0x{:06X}",
                    entry.parameter, entry.product, entry.sensor
                );
                entries.push(entry);
                Ok(())
            }
        }
    }

    /// Remove and return every entry for the device, in queue order.
    pub fn take_for(&self, product: Product, sensor: u32) -> Vec<QueueEntry> {
        let mut entries = self.lock();
        let (taken, kept): (Vec<_>, Vec<_>) = entries
            .drain(..)
            .partition(|e| e.product == product && e.sensor == sensor);
        *entries = kept;
        taken
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.lock().clone()
    }
}
