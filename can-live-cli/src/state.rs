//! Dashboard state
//!
//! Keeps the latest reading per gauge, the way the instrument panel shows
//! it. Implausible speed and RPM readings are ignored rather than displayed.

use can_live_decoder::{DecodedResponse, FrameId, Indicators, Timestamp};
use serde::Serialize;

/// Readings at or above this are not shown on the speedometer
pub const MAX_PLAUSIBLE_SPEED: i64 = 150;
/// Readings at or above this are not shown on the tachometer
pub const MAX_PLAUSIBLE_RPM: i64 = 6000;

/// What an update did to the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    Applied,
    Rejected,
    Error,
}

/// Latest values shown to the user
#[derive(Debug, Clone, Default, Serialize)]
pub struct Dashboard {
    pub speed: Option<i64>,
    pub rpm: Option<i64>,
    pub fuel_level: Option<i64>,
    pub engine_temperature: Option<i64>,
    pub secondary_speed: Option<i64>,
    pub indicators: Indicators,
    pub last_update: Option<Timestamp>,
    pub last_error: Option<String>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delivered response into the dashboard
    pub fn apply(&mut self, response: &DecodedResponse) -> Update {
        if let Some(error) = response.error() {
            self.last_error = Some(error.to_string());
            return Update::Error;
        }

        let (Some(frame_id), Some(value)) = (response.frame_id(), response.value()) else {
            return Update::Rejected;
        };

        match frame_id {
            FrameId::CarSpeed => {
                if value >= MAX_PLAUSIBLE_SPEED {
                    log::debug!("Ignoring implausible speed {}", value);
                    return Update::Rejected;
                }
                self.speed = Some(value);
            }
            FrameId::EngineSpeed => {
                if value >= MAX_PLAUSIBLE_RPM {
                    log::debug!("Ignoring implausible RPM {}", value);
                    return Update::Rejected;
                }
                self.rpm = Some(value);
            }
            FrameId::FuelLevel => self.fuel_level = Some(value),
            FrameId::EngineTemperature => self.engine_temperature = Some(value),
            FrameId::Other => {
                self.secondary_speed = Some(value);
                if let Some(indicators) = response.indicators() {
                    self.indicators = indicators.clone();
                }
            }
        }

        self.last_update = Some(response.timestamp());
        Update::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_live_decoder::{FrameDecoder, IndicatorId, RawFrame};

    fn response(id: u32, data: &[u8]) -> DecodedResponse {
        FrameDecoder::new()
            .decode(&RawFrame::new(id, data.to_vec()))
            .unwrap()
            .into_response()
            .unwrap()
    }

    #[test]
    fn test_gauges_update() {
        let mut dashboard = Dashboard::new();
        assert_eq!(dashboard.apply(&response(0x101, &[80, 0])), Update::Applied);
        assert_eq!(dashboard.apply(&response(0x102, &[0xB8, 0x0B])), Update::Applied);
        assert_eq!(dashboard.apply(&response(0x103, &[40, 0])), Update::Applied);
        assert_eq!(dashboard.apply(&response(0x104, &[90, 0])), Update::Applied);

        assert_eq!(dashboard.speed, Some(80));
        assert_eq!(dashboard.rpm, Some(3000));
        assert_eq!(dashboard.fuel_level, Some(40));
        assert_eq!(dashboard.engine_temperature, Some(90));
        assert!(dashboard.last_update.is_some());
    }

    #[test]
    fn test_implausible_readings_rejected() {
        let mut dashboard = Dashboard::new();
        dashboard.apply(&response(0x101, &[100, 0]));
        assert_eq!(dashboard.apply(&response(0x101, &[150, 0])), Update::Rejected);
        assert_eq!(dashboard.speed, Some(100));

        // 6000 = 0x1770
        assert_eq!(dashboard.apply(&response(0x102, &[0x70, 0x17])), Update::Rejected);
        assert_eq!(dashboard.rpm, None);
    }

    #[test]
    fn test_other_frame_updates_indicators() {
        let mut dashboard = Dashboard::new();
        let raw: u64 = (0x0120 << 24) | 0b101;
        dashboard.apply(&response(0x105, &raw.to_le_bytes()));
        assert_eq!(dashboard.secondary_speed, Some(0x0120));
        assert_eq!(dashboard.indicators.get(&IndicatorId::Gate), Some(&true));
        assert_eq!(dashboard.indicators.get(&IndicatorId::ParkingBrake), Some(&true));
        assert_eq!(dashboard.indicators.get(&IndicatorId::Plates), Some(&false));
    }

    #[test]
    fn test_error_is_recorded() {
        let mut dashboard = Dashboard::new();
        let update = dashboard.apply(&DecodedResponse::failure(None, "Network is down"));
        assert_eq!(update, Update::Error);
        assert_eq!(dashboard.last_error.as_deref(), Some("Network is down"));
        assert!(dashboard.last_update.is_none());
    }
}
