//! Fixed-layout values persisted through [`KvStore`](crate::store::KvStore).
//!
//! Each record encodes to exactly `SIZE` little-endian bytes so a read can
//! pass the true size of the destination type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASSWORD_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("{field} length {len} exceeds {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("{0} is not valid utf-8")]
    Utf8(&'static str),
}

pub trait Record: Sized {
    const SIZE: usize;

    /// Writes the record into `out`, which is exactly `SIZE` bytes.
    fn encode(&self, out: &mut [u8]);

    fn decode(bytes: &[u8]) -> Result<Self, RecordError>;
}

fn check_len(bytes: &[u8], expected: usize) -> Result<(), RecordError> {
    if bytes.len() != expected {
        return Err(RecordError::Length {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn f32_at(bytes: &[u8], offset: usize) -> f32 {
    let mut raw = [0_u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    f32::from_le_bytes(raw)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootRecord {
    pub count: u32,
}

impl Record for BootRecord {
    const SIZE: usize = 4;

    fn encode(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.count.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        check_len(bytes, Self::SIZE)?;
        let mut raw = [0_u8; 4];
        raw.copy_from_slice(bytes);
        Ok(Self {
            count: u32::from_le_bytes(raw),
        })
    }
}

/// WiFi station credentials.
///
/// Layout: `[ssid_len:1][ssid:32][pass_len:1][pass:64]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    ssid: String,
    password: String,
}

impl Credentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, RecordError> {
        if ssid.len() > MAX_SSID_LEN {
            return Err(RecordError::FieldTooLong {
                field: "ssid",
                len: ssid.len(),
                max: MAX_SSID_LEN,
            });
        }
        if password.len() > MAX_PASSWORD_LEN {
            return Err(RecordError::FieldTooLong {
                field: "password",
                len: password.len(),
                max: MAX_PASSWORD_LEN,
            });
        }
        Ok(Self {
            ssid: ssid.to_string(),
            password: password.to_string(),
        })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }
}

const PASS_OFFSET: usize = 1 + MAX_SSID_LEN;

fn decode_field(
    bytes: &[u8],
    offset: usize,
    max: usize,
    field: &'static str,
) -> Result<String, RecordError> {
    let len = usize::from(bytes[offset]);
    if len > max {
        return Err(RecordError::FieldTooLong { field, len, max });
    }
    let raw = &bytes[offset + 1..offset + 1 + len];
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|_| RecordError::Utf8(field))
}

impl Record for Credentials {
    const SIZE: usize = 1 + MAX_SSID_LEN + 1 + MAX_PASSWORD_LEN;

    fn encode(&self, out: &mut [u8]) {
        out.fill(0);
        // Lengths are bounded by `new`, so they fit in one byte.
        out[0] = self.ssid.len() as u8;
        out[1..1 + self.ssid.len()].copy_from_slice(self.ssid.as_bytes());
        out[PASS_OFFSET] = self.password.len() as u8;
        out[PASS_OFFSET + 1..PASS_OFFSET + 1 + self.password.len()]
            .copy_from_slice(self.password.as_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        check_len(bytes, Self::SIZE)?;
        Ok(Self {
            ssid: decode_field(bytes, 0, MAX_SSID_LEN, "ssid")?,
            password: decode_field(bytes, PASS_OFFSET, MAX_PASSWORD_LEN, "password")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GreenhouseSettings {
    #[serde(rename = "targetTempC")]
    pub target_temp_c: f32,
    #[serde(rename = "targetHumidityPct")]
    pub target_humidity_pct: f32,
    #[serde(rename = "ventOpenTempC")]
    pub vent_open_temp_c: f32,
    #[serde(rename = "wateringIntervalMin")]
    pub watering_interval_min: u16,
}

impl Default for GreenhouseSettings {
    fn default() -> Self {
        Self {
            target_temp_c: 22.0,
            target_humidity_pct: 65.0,
            vent_open_temp_c: 28.0,
            watering_interval_min: 240,
        }
    }
}

impl GreenhouseSettings {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if !self.target_temp_c.is_finite() {
            self.target_temp_c = defaults.target_temp_c;
        }
        if !self.target_humidity_pct.is_finite() {
            self.target_humidity_pct = defaults.target_humidity_pct;
        }
        if !self.vent_open_temp_c.is_finite() {
            self.vent_open_temp_c = defaults.vent_open_temp_c;
        }

        self.target_temp_c = self.target_temp_c.clamp(5.0, 35.0);
        self.target_humidity_pct = self.target_humidity_pct.clamp(20.0, 95.0);
        // Venting below the heating target would fight the heater.
        self.vent_open_temp_c = self.vent_open_temp_c.clamp(self.target_temp_c + 1.0, 45.0);
        self.watering_interval_min = self.watering_interval_min.clamp(15, 1_440);
    }
}

impl Record for GreenhouseSettings {
    const SIZE: usize = 14;

    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.target_temp_c.to_le_bytes());
        out[4..8].copy_from_slice(&self.target_humidity_pct.to_le_bytes());
        out[8..12].copy_from_slice(&self.vent_open_temp_c.to_le_bytes());
        out[12..14].copy_from_slice(&self.watering_interval_min.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        check_len(bytes, Self::SIZE)?;
        Ok(Self {
            target_temp_c: f32_at(bytes, 0),
            target_humidity_pct: f32_at(bytes, 4),
            vent_open_temp_c: f32_at(bytes, 8),
            watering_interval_min: u16::from_le_bytes([bytes[12], bytes[13]]),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(rename = "temperatureC")]
    pub temperature_c: f32,
    #[serde(rename = "humidityPct")]
    pub humidity_pct: f32,
}

impl SensorReading {
    /// Rounds to the sensor's useful resolution so jitter does not force a
    /// flash write.
    pub fn quantized(self) -> Self {
        Self {
            temperature_c: (self.temperature_c * 2.0).round() / 2.0,
            humidity_pct: self.humidity_pct.round(),
        }
    }
}

impl Record for SensorReading {
    const SIZE: usize = 8;

    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.temperature_c.to_le_bytes());
        out[4..8].copy_from_slice(&self.humidity_pct.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        check_len(bytes, Self::SIZE)?;
        Ok(Self {
            temperature_c: f32_at(bytes, 0),
            humidity_pct: f32_at(bytes, 4),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn encoded<R: Record>(record: &R) -> Vec<u8> {
        let mut buf = vec![0_u8; R::SIZE];
        record.encode(&mut buf);
        buf
    }

    #[test]
    fn credentials_layout_is_length_prefixed() {
        let creds = Credentials::new("glasshouse", "tomato42").unwrap();
        let buf = encoded(&creds);

        assert_eq!(buf.len(), 98);
        assert_eq!(buf[0], 10);
        assert_eq!(&buf[1..11], b"glasshouse");
        assert_eq!(buf[33], 8);
        assert_eq!(&buf[34..42], b"tomato42");
        assert_eq!(Credentials::decode(&buf).unwrap(), creds);
    }

    #[test]
    fn credentials_reject_oversized_fields() {
        let long_ssid = "s".repeat(MAX_SSID_LEN + 1);
        assert_eq!(
            Credentials::new(&long_ssid, ""),
            Err(RecordError::FieldTooLong {
                field: "ssid",
                len: 33,
                max: MAX_SSID_LEN,
            })
        );
    }

    #[test]
    fn credentials_decode_rejects_corrupt_length_byte() {
        let mut buf = encoded(&Credentials::new("net", "pw").unwrap());
        buf[0] = 200;
        assert!(matches!(
            Credentials::decode(&buf),
            Err(RecordError::FieldTooLong { field: "ssid", .. })
        ));
    }

    #[test]
    fn open_network_has_empty_password() {
        let creds = Credentials::new("open-net", "").unwrap();
        let decoded = Credentials::decode(&encoded(&creds)).unwrap();
        assert!(decoded.is_configured());
        assert_eq!(decoded.password(), "");
    }

    #[test]
    fn settings_decode_checks_length() {
        assert_eq!(
            GreenhouseSettings::decode(&[0_u8; 10]),
            Err(RecordError::Length {
                expected: 14,
                actual: 10,
            })
        );
    }

    #[test]
    fn settings_sanitize_clamps_and_orders_thresholds() {
        let mut settings = GreenhouseSettings {
            target_temp_c: 40.0,
            target_humidity_pct: f32::NAN,
            vent_open_temp_c: 10.0,
            watering_interval_min: 1,
        };
        settings.sanitize();

        assert_eq!(settings.target_temp_c, 35.0);
        assert_eq!(settings.target_humidity_pct, 65.0);
        assert_eq!(settings.vent_open_temp_c, 36.0);
        assert_eq!(settings.watering_interval_min, 15);
    }

    #[test]
    fn reading_quantizes_to_half_degrees() {
        let reading = SensorReading {
            temperature_c: 21.74,
            humidity_pct: 55.4,
        }
        .quantized();
        assert_eq!(reading.temperature_c, 21.5);
        assert_eq!(reading.humidity_pct, 55.0);
    }
}
