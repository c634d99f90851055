//! Energenie MiHome product catalogue.

use crate::codec::RadioMode;
use crate::error::MiHomeError;
use crate::openthings::Manufacturer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Devices the gateway can address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    /// OOK socket group: every socket at the address
    ControlAll,
    ControlOne,
    ControlTwo,
    ControlThree,
    ControlFour,
    /// MIHO004 energy monitor
    Monitor,
    /// MIHO005 adaptor plus, switchable with metering
    Energy,
    /// MIHO013 radiator valve
    Etrv,
    /// MIHO006 whole-house monitor
    House,
    /// MIHO032 motion sensor
    Motion,
    /// MIHO033 open sensor
    Open,
}

impl Product {
    pub const ALL: [Product; 11] = [
        Product::ControlAll,
        Product::ControlOne,
        Product::ControlTwo,
        Product::ControlThree,
        Product::ControlFour,
        Product::Monitor,
        Product::Energy,
        Product::Etrv,
        Product::House,
        Product::Motion,
        Product::Open,
    ];

    /// OOK socket number for control products
    pub fn socket(self) -> Option<u8> {
        match self {
            Product::ControlAll => Some(0),
            Product::ControlOne => Some(1),
            Product::ControlTwo => Some(2),
            Product::ControlThree => Some(3),
            Product::ControlFour => Some(4),
            _ => None,
        }
    }

    /// OpenThings product id for telemetry products
    pub fn product_id(self) -> Option<u8> {
        match self {
            Product::Monitor => Some(0x01),
            Product::Energy => Some(0x02),
            Product::Etrv => Some(0x03),
            Product::House => Some(0x05),
            Product::Motion => Some(0x0C),
            Product::Open => Some(0x0D),
            _ => None,
        }
    }

    pub fn from_product_id(id: u8) -> Option<Self> {
        Product::ALL
            .iter()
            .copied()
            .find(|p| p.product_id() == Some(id))
    }

    pub fn manufacturer(self) -> Option<Manufacturer> {
        self.product_id().map(|_| Manufacturer::Energenie)
    }

    /// Radio personality the device speaks
    pub fn mode(self) -> RadioMode {
        if self.socket().is_some() {
            RadioMode::Control
        } else {
            RadioMode::Monitor
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Product::ControlAll => "control-all",
            Product::ControlOne => "control-one",
            Product::ControlTwo => "control-two",
            Product::ControlThree => "control-three",
            Product::ControlFour => "control-four",
            Product::Monitor => "monitor",
            Product::Energy => "energy",
            Product::Etrv => "etrv",
            Product::House => "house",
            Product::Motion => "motion",
            Product::Open => "open",
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Product {
    type Err = MiHomeError;

    /// Case-insensitive; `_` and `-` are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Product::ALL
            .iter()
            .copied()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| MiHomeError::BadParameter(format!("unknown product '{}'", s)))
    }
}
