//! Output rendering for the CLI

use crate::core::bus::TransactionOutcome;
use crate::core::packet::{Packet, PacketKind};
use crate::core::protocol::{describe_function_code, ExceptionCode, FunctionCode};

/// CLI output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format for scripting
    Json,
}

/// One packet as a trace line.
///
/// e.g. `#1 REQ  01 03 00 00 00 04 ab cd  Read Holding Registers`
pub fn format_packet(packet: &Packet) -> String {
    let direction = match packet.kind {
        PacketKind::Request => "REQ ",
        PacketKind::Response => "RESP",
    };
    let exception = if packet.is_exception() {
        exception_name(&packet.data)
            .map(|name| format!(": {name}"))
            .unwrap_or_default()
    } else {
        String::new()
    };
    let flag = if packet.is_valid { "" } else { " [invalid]" };
    format!(
        "#{} {} {}  {}{}{}",
        packet.id,
        direction,
        packet.spaced_raw(),
        describe_function_code(packet.function_code),
        exception,
        flag
    )
}

/// Exception code carried in the first data byte of an exception response
fn exception_name(data: &str) -> Option<&'static str> {
    let code = u8::from_str_radix(data.get(..2)?, 16).ok()?;
    ExceptionCode::from_u8(code).map(ExceptionCode::name)
}

/// Packets in the requested format
pub fn format_packets(packets: &[Packet], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => packets.iter().map(format_packet).collect::<Vec<_>>().join("\n"),
        OutputFormat::Json => serde_json::to_string_pretty(packets).unwrap_or_default(),
    }
}

/// Result of one transaction
pub fn format_outcome(outcome: &TransactionOutcome, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let values = outcome
                .values
                .iter()
                .map(|v| v.as_word().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            match &outcome.error {
                Some(error) => format!("[{values}] (fallback: {error})"),
                None => format!("[{values}]"),
            }
        }
        OutputFormat::Json => serde_json::to_string(outcome).unwrap_or_default(),
    }
}

/// Table of known function codes
pub fn format_function_table(format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => FunctionCode::all()
            .iter()
            .map(|f| {
                let simulated = if f.is_simulated() { "" } else { "  (not simulated)" };
                format!("{:>3}  {}{}", f.code(), f.name(), simulated)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Json => {
            let rows: Vec<_> = FunctionCode::all()
                .iter()
                .map(|f| {
                    serde_json::json!({
                        "code": f.code(),
                        "name": f.name(),
                        "simulated": f.is_simulated(),
                    })
                })
                .collect();
            serde_json::to_string_pretty(&rows).unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::{PacketFramer, RegisterValue};
    use crate::core::protocol::{CrcMode, ExceptionCode};
    use crate::core::simulator::SimRng;

    #[test]
    fn test_format_packet() {
        let framer = PacketFramer::new(CrcMode::Modbus, SimRng::seeded(1));
        let line = format_packet(&framer.request(1, 3, "0000000a"));
        assert_eq!(line, "#1 REQ  01 03 00 00 00 0a c5 cd  Read Holding Registers");

        let error = format_packet(&framer.exception(1, 3, ExceptionCode::ServerDeviceFailure));
        assert!(error.contains("Error(3): Server Device Failure"));
        assert!(error.ends_with("[invalid]"));
    }

    #[test]
    fn test_format_outcome() {
        let outcome = TransactionOutcome {
            values: vec![RegisterValue::Word(10), RegisterValue::Bit(true)],
            error: None,
        };
        assert_eq!(format_outcome(&outcome, OutputFormat::Text), "[10, 1]");
        assert!(format_outcome(&outcome, OutputFormat::Json).contains("\"values\":[10,true]"));
    }

    #[test]
    fn test_function_table() {
        let table = format_function_table(OutputFormat::Text);
        assert!(table.contains("Read Coil Status"));
        assert!(table.contains("16  Write Multiple Registers  (not simulated)"));
    }
}
