use crate::models::{qos_level, InboundMessage};
use std::io::Write;
use thiserror::Error;

pub const ROW_WIDTH: usize = 16;
const TEXT_RATIO_THRESHOLD: f64 = 0.85;
const STATUS_SUFFIX: &str = "/status";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("console write failed: {0}")]
    Io(#[from] std::io::Error),
}

fn is_printable(byte: u8) -> bool {
    (32..=126).contains(&byte)
}

/// True for empty payloads or when more than 85% of the bytes are
/// printable ASCII, tab, LF or CR.
pub fn is_mostly_text(payload: &[u8]) -> bool {
    if payload.is_empty() {
        return true;
    }
    let printable = payload
        .iter()
        .filter(|&&b| is_printable(b) || matches!(b, b'\t' | b'\n' | b'\r'))
        .count();
    printable as f64 / payload.len() as f64 > TEXT_RATIO_THRESHOLD
}

/// Offset, hex column and ASCII column, 16 bytes per row. Rows are joined
/// with `\n` and there is no trailing newline.
pub fn hexdump(bytes: &[u8]) -> String {
    let mut rows = Vec::with_capacity(bytes.len().div_ceil(ROW_WIDTH));
    for (index, chunk) in bytes.chunks(ROW_WIDTH).enumerate() {
        let hex = chunk
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<Vec<_>>()
            .join(" ");
        let ascii: String = chunk
            .iter()
            .map(|&b| if is_printable(b) { b as char } else { '.' })
            .collect();
        rows.push(format!(
            "{:04x}  {:<width$}  {}",
            index * ROW_WIDTH,
            hex,
            ascii,
            width = ROW_WIDTH * 3
        ));
    }
    rows.join("\n")
}

pub fn header_line(timestamp: &str, message: &InboundMessage) -> String {
    format!(
        "[{}] {} (QoS {}, {} bytes)",
        timestamp,
        message.topic,
        qos_level(message.qos),
        message.payload.len()
    )
}

/// Status topics carrying text are printed inline after the header; anything
/// else gets the header followed by a hex dump.
pub fn render_message<W: Write>(
    out: &mut W,
    timestamp: &str,
    message: &InboundMessage,
) -> Result<(), RenderError> {
    let header = header_line(timestamp, message);

    if message.topic.ends_with(STATUS_SUFFIX) && is_mostly_text(&message.payload) {
        let text = String::from_utf8_lossy(&message.payload);
        writeln!(out, "{header}: {text}")?;
    } else {
        writeln!(out, "{header}")?;
        writeln!(out, "{}", hexdump(&message.payload))?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::QoS;

    const TS: &str = "2024-05-01 12:00:00";

    fn message(topic: &str, payload: &[u8]) -> InboundMessage {
        InboundMessage {
            topic: topic.to_string(),
            qos: QoS::AtLeastOnce,
            payload: payload.to_vec(),
        }
    }

    fn render(message: &InboundMessage) -> String {
        let mut out = Vec::new();
        render_message(&mut out, TS, message).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn empty_payload_is_text() {
        assert!(is_mostly_text(b""));
    }

    #[test]
    fn ninety_percent_printable_is_text() {
        let mut payload = vec![b'a'; 90];
        payload.extend(std::iter::repeat(0u8).take(10));
        assert!(is_mostly_text(&payload));
    }

    #[test]
    fn eighty_percent_printable_is_binary() {
        let mut payload = vec![b'a'; 80];
        payload.extend(std::iter::repeat(0xffu8).take(20));
        assert!(!is_mostly_text(&payload));
    }

    #[test]
    fn exactly_at_threshold_is_binary() {
        let mut payload = vec![b'a'; 85];
        payload.extend(std::iter::repeat(0u8).take(15));
        assert!(!is_mostly_text(&payload));
    }

    #[test]
    fn whitespace_controls_count_as_text() {
        assert!(is_mostly_text(b"line one\r\n\tline two\n"));
    }

    #[test]
    fn hexdump_splits_rows_of_sixteen() {
        let bytes: Vec<u8> = (0x00..=0x10).collect();
        let dump = hexdump(&bytes);
        let rows: Vec<&str> = dump.lines().collect();
        assert_eq!(rows.len(), 2);

        assert!(rows[0].starts_with("0000  00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f"));
        assert!(rows[0].ends_with("  ................"));
        assert_eq!(rows[1], format!("0010  {:<48}  .", "10"));
    }

    #[test]
    fn hexdump_shows_printable_ascii() {
        let dump = hexdump(b"AB\x00~");
        assert_eq!(dump, format!("0000  {:<48}  AB.~", "41 42 00 7e"));
    }

    #[test]
    fn hexdump_of_nothing_is_empty() {
        assert_eq!(hexdump(b""), "");
    }

    #[test]
    fn row_offsets_parse_back_to_byte_index() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        for (index, row) in hexdump(&bytes).lines().enumerate() {
            let offset = usize::from_str_radix(&row[..4], 16).unwrap();
            assert_eq!(offset, index * ROW_WIDTH);
        }
    }

    #[test]
    fn ascii_column_aligns_for_short_rows() {
        let dump = hexdump(&[0u8; 20]);
        let rows: Vec<&str> = dump.lines().collect();
        let column = 4 + 2 + ROW_WIDTH * 3 + 2;
        assert_eq!(&rows[0][column..], "................");
        assert_eq!(&rows[1][column..], "....");
    }

    #[test]
    fn status_text_prints_on_one_line() {
        let out = render(&message("boats/x/status", b"OK"));
        assert_eq!(out, format!("[{TS}] boats/x/status (QoS 1, 2 bytes): OK\n"));
    }

    #[test]
    fn status_text_replaces_invalid_utf8() {
        let payload = b"battery \xff\xfe low ok ok ok ok ok";
        let out = render(&message("boats/x/status", payload));
        assert!(out.contains('\u{fffd}'));
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn binary_status_falls_back_to_hexdump() {
        let out = render(&message("boats/x/status", &[0xfe, 0x09, 0x00, 0x00]));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], format!("[{TS}] boats/x/status (QoS 1, 4 bytes)"));
        assert!(lines[1].starts_with("0000  fe 09 00 00"));
    }

    #[test]
    fn vehicle_traffic_is_always_dumped() {
        let out = render(&message("boats/x/from_vehicle", &[0, 1, 2, 3]));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], format!("[{TS}] boats/x/from_vehicle (QoS 1, 4 bytes)"));
        assert_eq!(lines[1], format!("0000  {:<48}  ....", "00 01 02 03"));
    }

    #[test]
    fn text_on_other_topics_is_still_dumped() {
        let out = render(&message("boats/x/to_vehicle", b"hi"));
        assert_eq!(out.lines().nth(1), Some(format!("0000  {:<48}  hi", "68 69").as_str()));
    }

    #[test]
    fn empty_status_message_prints_empty_text() {
        let out = render(&message("boats/x/status", b""));
        assert_eq!(out, format!("[{TS}] boats/x/status (QoS 1, 0 bytes): \n"));
    }

    struct BrokenConsole;

    impl Write for BrokenConsole {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn console_failure_surfaces_as_render_error() {
        let err = render_message(&mut BrokenConsole, TS, &message("boats/x/status", b"OK"))
            .unwrap_err();
        assert!(matches!(err, RenderError::Io(_)));
    }
}
