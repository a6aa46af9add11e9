use serde::{Deserialize, Serialize};

// UD-CO2S identifiers (Microchip CDC)
pub const UD_CO2S_VENDOR_ID: &str = "04d8";
pub const UD_CO2S_PRODUCT_ID: &str = "e95a";
pub const BAUD_RATE: u32 = 115200;
pub const DATA_BITS: u8 = 8;
pub const STOP_BITS: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Serial port parameters used when opening the sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    pub path: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
}

impl PortConfig {
    /// Fixed sensor parameters for a discovered port path
    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            path: "COM3".to_string(),
            baud_rate: BAUD_RATE,
            data_bits: DATA_BITS,
            stop_bits: STOP_BITS,
            parity: Parity::None,
        }
    }
}

/// USB vendor/product pair used to pick the sensor out of the port list.
/// Stored as hex text because hosts disagree on the casing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorIdentity {
    pub vendor_id: String,
    pub product_id: String,
}

impl SensorIdentity {
    pub fn new(vendor_id: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            vendor_id: vendor_id.into(),
            product_id: product_id.into(),
        }
    }

    pub fn matches(&self, vendor_id: &str, product_id: &str) -> bool {
        self.vendor_id.eq_ignore_ascii_case(vendor_id)
            && self.product_id.eq_ignore_ascii_case(product_id)
    }
}

impl Default for SensorIdentity {
    fn default() -> Self {
        Self::new(UD_CO2S_VENDOR_ID, UD_CO2S_PRODUCT_ID)
    }
}
