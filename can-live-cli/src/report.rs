//! Output formatting
//!
//! Renders delivered results as text lines or JSON lines, plus the
//! end-of-run summary.

use crate::config::{OutputConfig, OutputFormat};
use crate::state::Dashboard;
use anyhow::Result;
use can_live_decoder::{Delivery, ListenerStats, ResultCode};
use serde::Serialize;

#[derive(Serialize)]
struct JsonLine<'a> {
    code: ResultCode,
    #[serde(flatten)]
    response: &'a can_live_decoder::DecodedResponse,
}

/// Render one delivery according to the output configuration
pub fn format_delivery(delivery: &Delivery, output: &OutputConfig) -> Result<String> {
    match output.format {
        OutputFormat::Json => Ok(serde_json::to_string(&JsonLine {
            code: delivery.code,
            response: &delivery.response,
        })?),
        OutputFormat::Text => Ok(format_text(delivery, output.show_indicators)),
    }
}

fn format_text(delivery: &Delivery, show_indicators: bool) -> String {
    let response = &delivery.response;
    let time = response.timestamp().format("%H:%M:%S%.3f");
    let frame = response
        .frame_id()
        .map(|id| format!("{} (0x{})", id, id.to_hex()))
        .unwrap_or_else(|| "-".to_string());

    if delivery.code == ResultCode::Error {
        return format!(
            "{} {:<5} {:<28} {}",
            time,
            delivery.code,
            frame,
            response.error().unwrap_or("unknown error")
        );
    }

    let mut line = format!(
        "{} {:<5} {:<28} {:>6}",
        time,
        delivery.code,
        frame,
        response.value().unwrap_or_default()
    );

    if show_indicators {
        if let Some(indicators) = response.indicators() {
            let active: Vec<String> = indicators
                .iter()
                .filter(|(_, on)| **on)
                .map(|(id, _)| id.to_string())
                .collect();
            line.push_str(&format!("  [{}]", active.join(", ")));
        }
    }
    line
}

/// Summary printed when the listener has stopped
pub fn format_summary(stats: &ListenerStats, dashboard: &Dashboard) -> String {
    let mut out = String::new();
    out.push_str("═══════════════════════════════════════════════\n");
    out.push_str("  Session Summary\n");
    out.push_str("═══════════════════════════════════════════════\n");
    out.push_str(&format!("  Frames received:    {}\n", stats.frames_received));
    out.push_str(&format!("  Frames decoded:     {}\n", stats.frames_decoded));
    out.push_str(&format!("  Unsupported frames: {}\n", stats.frames_unsupported));
    out.push_str(&format!("  Malformed frames:   {}\n", stats.frames_malformed));
    out.push_str(&format!("  Transport errors:   {}\n", stats.transport_errors));
    out.push_str(&format!("  Results dropped:    {}\n", stats.results_dropped));
    out.push_str("\n  Last readings:\n");
    out.push_str(&format!("    Speed:            {}\n", show(dashboard.speed)));
    out.push_str(&format!("    RPM:              {}\n", show(dashboard.rpm)));
    out.push_str(&format!("    Fuel level:       {}\n", show(dashboard.fuel_level)));
    out.push_str(&format!("    Engine temp:      {}\n", show(dashboard.engine_temperature)));
    out.push_str(&format!("    Secondary speed:  {}\n", show(dashboard.secondary_speed)));
    if let Some(error) = &dashboard.last_error {
        out.push_str(&format!("    Last error:       {}\n", error));
    }
    out
}

fn show(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_live_decoder::{DecodedResponse, FrameDecoder, RawFrame};

    fn delivery(id: u32, data: &[u8]) -> Delivery {
        let response = FrameDecoder::new()
            .decode(&RawFrame::new(id, data.to_vec()))
            .unwrap()
            .into_response()
            .unwrap();
        Delivery {
            code: ResultCode::Success,
            response,
        }
    }

    #[test]
    fn test_text_line() {
        let line = format_delivery(&delivery(0x101, &[0x64, 0x00]), &OutputConfig::default()).unwrap();
        assert!(line.contains("OK"));
        assert!(line.contains("CAR_SPEED (0x101)"));
        assert!(line.trim_end().ends_with("100"));
    }

    #[test]
    fn test_text_line_with_indicators() {
        let raw: u64 = 0b11;
        let line = format_delivery(&delivery(0x105, &raw.to_le_bytes()), &OutputConfig::default()).unwrap();
        assert!(line.ends_with("[gate, plates]"));

        let hidden = OutputConfig {
            show_indicators: false,
            ..OutputConfig::default()
        };
        let line = format_delivery(&delivery(0x105, &raw.to_le_bytes()), &hidden).unwrap();
        assert!(!line.contains('['));
    }

    #[test]
    fn test_error_line() {
        let error = Delivery {
            code: ResultCode::Error,
            response: DecodedResponse::failure(None, "IO error: Network is down"),
        };
        let line = format_delivery(&error, &OutputConfig::default()).unwrap();
        assert!(line.contains("ERROR"));
        assert!(line.ends_with("IO error: Network is down"));
    }

    #[test]
    fn test_json_line() {
        let output = OutputConfig {
            format: OutputFormat::Json,
            ..OutputConfig::default()
        };
        let line = format_delivery(&delivery(0x102, &[0xB8, 0x0B]), &output).unwrap();
        let json: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(json["code"], "success");
        assert_eq!(json["frame_id"], "ENGINE_SPEED");
        assert_eq!(json["value"], 3000);
    }

    #[test]
    fn test_summary() {
        let stats = ListenerStats {
            frames_received: 10,
            frames_decoded: 8,
            ..ListenerStats::default()
        };
        let mut dashboard = Dashboard::new();
        dashboard.speed = Some(42);
        let summary = format_summary(&stats, &dashboard);
        assert!(summary.contains("Frames received:    10"));
        assert!(summary.contains("Speed:            42"));
        assert!(summary.contains("RPM:              -"));
    }
}
