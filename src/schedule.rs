// Copyright 2026 Smart Blinds Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Blinds schedule settings sent with the update-settings request.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Highest lux threshold the controller accepts.
pub const MAX_LUX: u64 = 100_000;

/// What triggers an automatic open or close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode {
    #[serde(rename = "TIME")]
    Time,
    #[serde(rename = "LIGHT")]
    Light,
}

impl TriggerMode {
    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "TIME" => Some(Self::Time),
            "LIGHT" => Some(Self::Light),
            _ => None,
        }
    }

    /// Convert to wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "TIME",
            Self::Light => "LIGHT",
        }
    }
}

/// Schedule for automatic opening and closing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schedule {
    pub open_time: String,
    pub close_time: String,
    pub open_lux: String,
    pub close_lux: String,
    pub open_mode: TriggerMode,
    pub close_mode: TriggerMode,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            open_time: "07:00".to_string(),
            close_time: "20:00".to_string(),
            open_lux: "50000".to_string(),
            close_lux: "10000".to_string(),
            open_mode: TriggerMode::Time,
            close_mode: TriggerMode::Time,
        }
    }
}

impl Schedule {
    /// Key/value pairs in the order the controller expects them.
    pub fn to_settings(&self) -> Vec<(&'static str, String)> {
        vec![
            ("openTime", self.open_time.clone()),
            ("closeTime", self.close_time.clone()),
            ("openLux", self.open_lux.clone()),
            ("closeLux", self.close_lux.clone()),
            ("openMode", self.open_mode.as_str().to_string()),
            ("closeMode", self.close_mode.as_str().to_string()),
        ]
    }

    /// Normalize times and lux values in place.
    pub fn normalize(&mut self) -> Result<()> {
        self.open_time = parse_time_of_day(&self.open_time)?;
        self.close_time = parse_time_of_day(&self.close_time)?;
        self.open_lux = validate_lux(&self.open_lux);
        self.close_lux = validate_lux(&self.close_lux);
        Ok(())
    }
}

/// Keep only digits and clamp to [`MAX_LUX`]. Empty input becomes `"0"`.
pub fn validate_lux(input: &str) -> String {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return "0".to_string();
    }
    // Anything too long for u64 is certainly above the limit
    match digits.parse::<u64>() {
        Ok(value) if value <= MAX_LUX => digits,
        _ => MAX_LUX.to_string(),
    }
}

/// Parse a 24-hour `HH:MM` time and return it zero-padded.
pub fn parse_time_of_day(input: &str) -> Result<String> {
    let (hours, minutes) = input
        .trim()
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid time '{}': expected HH:MM", input))?;

    let hours: u8 = hours
        .parse()
        .map_err(|_| anyhow!("Invalid hour in '{}'", input))?;
    let minutes: u8 = minutes
        .parse()
        .map_err(|_| anyhow!("Invalid minute in '{}'", input))?;

    if hours > 23 || minutes > 59 {
        return Err(anyhow!("Time '{}' out of range", input));
    }

    Ok(format!("{:02}:{:02}", hours, minutes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_order() {
        let settings = Schedule::default().to_settings();
        let keys: Vec<_> = settings.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            ["openTime", "closeTime", "openLux", "closeLux", "openMode", "closeMode"]
        );
        assert_eq!(settings[0].1, "07:00");
        assert_eq!(settings[3].1, "10000");
        assert_eq!(settings[5].1, "TIME");
    }

    #[test]
    fn test_validate_lux() {
        assert_eq!(validate_lux("50000"), "50000");
        assert_eq!(validate_lux("12a3"), "123");
        assert_eq!(validate_lux(""), "0");
        assert_eq!(validate_lux("lux"), "0");
        assert_eq!(validate_lux("100001"), "100000");
        assert_eq!(validate_lux("99999999999999999999999"), "100000");
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(parse_time_of_day("7:05").unwrap(), "07:05");
        assert_eq!(parse_time_of_day("23:59").unwrap(), "23:59");
        assert!(parse_time_of_day("24:00").is_err());
        assert!(parse_time_of_day("12:60").is_err());
        assert!(parse_time_of_day("noon").is_err());
    }

    #[test]
    fn test_trigger_mode() {
        assert_eq!(TriggerMode::parse("light"), Some(TriggerMode::Light));
        assert_eq!(TriggerMode::parse("TIME"), Some(TriggerMode::Time));
        assert_eq!(TriggerMode::parse("dusk"), None);
    }

    #[test]
    fn test_normalize() {
        let mut schedule = Schedule {
            open_time: "6:30".to_string(),
            open_lux: "200000".to_string(),
            ..Default::default()
        };
        schedule.normalize().unwrap();
        assert_eq!(schedule.open_time, "06:30");
        assert_eq!(schedule.open_lux, "100000");
    }
}
