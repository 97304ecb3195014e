//! candump log replay transport
//!
//! Replays frames recorded by Linux `candump`. Two line layouts are accepted:
//!
//! - log format (`candump -L`): `(1697040000.123456) can0 105#0100FF6400000000`
//! - default format: `can0  105   [8]  01 00 FF 64 00 00 00 00`
//!
//! The leading timestamp and interface name are optional. Blank lines and
//! lines starting with `#` are skipped. End of input is reported as
//! [`TransportError::Closed`]; a line that cannot be parsed is reported as an
//! I/O error of kind `InvalidData` and the replay continues with the next line.

use super::{validate_outgoing, Transport};
use crate::types::{RawFrame, TransportError};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

type Opener<R> = Box<dyn FnOnce() -> io::Result<R> + Send>;

/// Transport replaying a candump text log
pub struct CandumpReplay<R> {
    opener: Option<Opener<R>>,
    reader: Option<R>,
    opened: bool,
    line_no: usize,
    realtime: bool,
    last_timestamp_ns: Option<u64>,
    sent: Vec<RawFrame>,
}

impl<R: BufRead + Send> CandumpReplay<R> {
    /// Replay from an already open reader
    pub fn new(reader: R) -> Self {
        Self {
            opener: None,
            reader: Some(reader),
            opened: false,
            line_no: 0,
            realtime: false,
            last_timestamp_ns: None,
            sent: Vec::new(),
        }
    }

    /// Builder method: sleep between frames according to their recorded timestamps
    pub fn with_realtime(mut self, enabled: bool) -> Self {
        self.realtime = enabled;
        self
    }

    /// Frames handed to `send_frame`, in order
    pub fn sent_frames(&self) -> &[RawFrame] {
        &self.sent
    }

    fn pace(&mut self, frame: &RawFrame) {
        if !self.realtime {
            return;
        }
        if let Some(previous) = self.last_timestamp_ns {
            let delta = frame.timestamp_ns.saturating_sub(previous);
            if delta > 0 {
                thread::sleep(Duration::from_nanos(delta));
            }
        }
        self.last_timestamp_ns = Some(frame.timestamp_ns);
    }
}

impl CandumpReplay<BufReader<File>> {
    /// Replay a log file; the file is opened by [`Transport::open`]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut replay = Self::new_unopened();
        replay.opener = Some(Box::new(move || {
            log::info!("Opening candump log: {:?}", path);
            File::open(&path).map(BufReader::new)
        }));
        replay
    }

    fn new_unopened() -> Self {
        Self {
            opener: None,
            reader: None,
            opened: false,
            line_no: 0,
            realtime: false,
            last_timestamp_ns: None,
            sent: Vec::new(),
        }
    }
}

impl<R: BufRead + Send> Transport for CandumpReplay<R> {
    fn open(&mut self) -> Result<(), TransportError> {
        if let Some(opener) = self.opener.take() {
            self.reader = Some(opener()?);
        }
        if self.reader.is_none() {
            return Err(TransportError::NotOpen);
        }
        self.opened = true;
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<RawFrame, TransportError> {
        if !self.opened {
            return Err(TransportError::NotOpen);
        }
        let reader = self.reader.as_mut().ok_or(TransportError::NotOpen)?;

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Err(TransportError::Closed);
            }
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let frame = parse_line(trimmed).map_err(|msg| {
                TransportError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line {}: {}", self.line_no, msg),
                ))
            })?;
            self.pace(&frame);
            return Ok(frame);
        }
    }

    fn send_frame(&mut self, can_id: u32, data: &[u8]) -> Result<(), TransportError> {
        if !self.opened {
            return Err(TransportError::NotOpen);
        }
        validate_outgoing(can_id, data)?;
        self.sent.push(RawFrame::new(can_id, data.to_vec()));
        Ok(())
    }
}

/// Parse one candump line into a frame
pub fn parse_line(line: &str) -> Result<RawFrame, String> {
    let mut tokens: Vec<&str> = line.split_whitespace().collect();

    let mut timestamp_ns = None;
    if let Some(first) = tokens.first() {
        if first.starts_with('(') {
            timestamp_ns = Some(parse_timestamp(first)?);
            tokens.remove(0);
        }
    }

    let mut frame = match tokens.as_slice() {
        [compact] if compact.contains('#') => parse_compact(compact)?,
        [_iface, compact] if compact.contains('#') => parse_compact(compact)?,
        [_iface, id, dlc, bytes @ ..] if dlc.starts_with('[') => parse_spaced(id, dlc, bytes)?,
        _ => return Err(format!("unrecognised frame layout: {:?}", line)),
    };

    if let Some(ns) = timestamp_ns {
        frame = frame.with_timestamp_ns(ns);
    }
    Ok(frame)
}

/// `(seconds.fraction)` → nanoseconds since epoch
fn parse_timestamp(token: &str) -> Result<u64, String> {
    let inner = token
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| format!("bad timestamp {:?}", token))?;
    let (secs, frac) = inner.split_once('.').unwrap_or((inner, "0"));
    let secs: u64 = secs
        .parse()
        .map_err(|_| format!("bad timestamp seconds {:?}", token))?;
    if frac.len() > 9 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("bad timestamp fraction {:?}", token));
    }
    let nanos: u64 = format!("{:0<9}", frac)
        .parse()
        .map_err(|_| format!("bad timestamp fraction {:?}", token))?;
    secs.checked_mul(1_000_000_000)
        .and_then(|ns| ns.checked_add(nanos))
        .ok_or_else(|| format!("timestamp out of range {:?}", token))
}

/// `ID#DATA` with DATA as contiguous hex, `ID#R` for remote frames
fn parse_compact(token: &str) -> Result<RawFrame, String> {
    let (id, data) = token
        .split_once('#')
        .ok_or_else(|| format!("missing '#' in {:?}", token))?;
    if data.starts_with('#') {
        return Err("CAN FD frames are not supported".to_string());
    }
    let can_id = parse_id(id)?;
    let payload = if data.starts_with('R') {
        Vec::new()
    } else {
        parse_hex_bytes(data)?
    };
    Ok(frame_from(can_id, id.len() > 3, payload))
}

/// `ID [N] B0 B1 ...` as printed by plain candump
fn parse_spaced(id: &str, dlc: &str, bytes: &[&str]) -> Result<RawFrame, String> {
    let can_id = parse_id(id)?;
    let len: usize = dlc
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .map_err(|_| format!("bad length {:?}", dlc))?;
    if bytes.len() < len {
        return Err(format!("length {} but {} data bytes", len, bytes.len()));
    }
    if len > super::CAN_MAX_DLEN {
        return Err(format!("payload longer than {} bytes", super::CAN_MAX_DLEN));
    }
    let payload = bytes[..len]
        .iter()
        .map(|b| hex_byte(b).ok_or_else(|| format!("bad data byte {:?}", b)))
        .collect::<Result<Vec<u8>, String>>()?;
    Ok(frame_from(can_id, id.len() > 3, payload))
}

fn frame_from(can_id: u32, is_extended: bool, payload: Vec<u8>) -> RawFrame {
    let mut frame = RawFrame::new(can_id, payload);
    frame.is_extended = is_extended;
    frame
}

fn parse_id(id: &str) -> Result<u32, String> {
    u32::from_str_radix(id, 16).map_err(|_| format!("bad identifier {:?}", id))
}

fn parse_hex_bytes(hex: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<u8> = hex.bytes().filter(|b| *b != b'.').collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in {:?}", hex));
    }
    if digits.len() > 2 * super::CAN_MAX_DLEN {
        return Err(format!("payload longer than {} bytes", super::CAN_MAX_DLEN));
    }
    digits
        .chunks(2)
        .map(|pair| hex_pair(pair[0], pair[1]).ok_or_else(|| format!("bad hex data {:?}", hex)))
        .collect()
}

/// One or two ASCII hex digits, as printed by plain candump
fn hex_byte(token: &str) -> Option<u8> {
    match token.as_bytes() {
        [hi, lo] => hex_pair(*hi, *lo),
        [lo] => hex_pair(b'0', *lo),
        _ => None,
    }
}

/// Two ASCII hex digits to a byte
fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let digit = |b: u8| (b as char).to_digit(16);
    Some(((digit(hi)? << 4) | digit(lo)?) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn replay(text: &str) -> CandumpReplay<Cursor<Vec<u8>>> {
        let mut replay = CandumpReplay::new(Cursor::new(text.as_bytes().to_vec()));
        replay.open().unwrap();
        replay
    }

    #[test]
    fn test_parse_log_format() {
        let frame = parse_line("(1697040000.250000) can0 105#0100FF6400000000").unwrap();
        assert_eq!(frame.can_id, 0x105);
        assert_eq!(frame.data, vec![0x01, 0x00, 0xFF, 0x64, 0, 0, 0, 0]);
        assert_eq!(frame.timestamp_ns, 1_697_040_000_250_000_000);
        assert!(!frame.is_extended);
    }

    #[test]
    fn test_parse_default_format() {
        let frame = parse_line("can0  101   [2]  64 00").unwrap();
        assert_eq!(frame.can_id, 0x101);
        assert_eq!(frame.data, vec![0x64, 0x00]);
    }

    #[test]
    fn test_parse_bare_and_extended() {
        let frame = parse_line("18FEF100#FF").unwrap();
        assert_eq!(frame.can_id, 0x18FE_F100);
        assert!(frame.is_extended);
        assert_eq!(frame.data, vec![0xFF]);

        let remote = parse_line("can0 101#R").unwrap();
        assert!(remote.data.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_line("can0 10G#00").is_err());
        assert!(parse_line("can0 101#0").is_err());
        assert!(parse_line("can0 101##100").is_err());
        assert!(parse_line("can0 101#000102030405060708").is_err());
        assert!(parse_line("(abc) can0 101#00").is_err());
        assert!(parse_line("garbage").is_err());
    }

    #[test]
    fn test_non_ascii_payload_is_rejected() {
        assert!(parse_line("can0 101#0\u{e9}0").is_err());
        assert!(parse_line("can0 101#\u{e9}").is_err());
        assert!(parse_line("can0  101   [2]  \u{e9} 00").is_err());
        assert!(parse_line("can0  101   [2]  +1 00").is_err());

        let mut transport = replay("can0 101#0\u{e9}0\ncan0 101#6400\n");
        assert!(matches!(transport.receive_frame(), Err(TransportError::Io(_))));
        assert_eq!(transport.receive_frame().unwrap().data, vec![0x64, 0x00]);
    }

    #[test]
    fn test_timestamp_out_of_range() {
        let err = parse_line("(99999999999999.0) can0 101#6400").unwrap_err();
        assert!(err.contains("out of range"));
        assert!(parse_line("(18446744073.709551615) can0 101#6400").is_ok());
        assert!(parse_line("(18446744073.709551616) can0 101#6400").is_err());
    }

    #[test]
    fn test_replay_sequence_and_close() {
        let mut transport = replay("# header\n\ncan0 101#6400\nbroken line\ncan0 102#FFFF\n");

        assert_eq!(transport.receive_frame().unwrap().can_id, 0x101);
        match transport.receive_frame() {
            Err(TransportError::Io(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::InvalidData);
                assert!(e.to_string().contains("line 4"));
            }
            other => panic!("expected invalid data, got {:?}", other),
        }
        assert_eq!(transport.receive_frame().unwrap().can_id, 0x102);
        assert!(matches!(transport.receive_frame(), Err(TransportError::Closed)));
    }

    #[test]
    fn test_receive_before_open() {
        let mut transport = CandumpReplay::new(Cursor::new(b"101#00".to_vec()));
        assert!(matches!(transport.receive_frame(), Err(TransportError::NotOpen)));
    }

    #[test]
    fn test_missing_file_fails_open() {
        let mut transport = CandumpReplay::from_path("/nonexistent/trace.log");
        assert!(matches!(transport.open(), Err(TransportError::Io(_))));
    }

    #[test]
    fn test_send_frame_is_recorded() {
        let mut transport = replay("");
        transport.send_frame(0x201, &[0x64, 0x00, 0x03]).unwrap();
        assert_eq!(transport.sent_frames().len(), 1);
        assert_eq!(transport.sent_frames()[0].can_id, 0x201);
        assert!(matches!(
            transport.send_frame(0x201, &[0; 9]),
            Err(TransportError::InvalidFrame(_))
        ));
    }
}
