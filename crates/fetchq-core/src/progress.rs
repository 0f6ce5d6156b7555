//! Parser for yt-dlp `--progress-template "%(progress)j"` output lines.
//!
//! The downloader prints one JSON object per progress tick. Everything else on
//! stdout (merge messages, destination lines) is noise; the parser reports it
//! as `Unrecognized` so callers can count or log it instead of silently
//! dropping bytes they don't understand.

/// Result of feeding one stdout line to the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// A structured progress record.
    Progress {
        /// 0–100, if the record carried enough to compute it.
        percent: Option<f64>,
        /// Download rate in bytes per second.
        speed: Option<f64>,
        /// Estimated seconds remaining.
        eta: Option<u64>,
    },
    /// Not a progress record (wrong prefix, invalid JSON, or no usable fields).
    Unrecognized,
}

/// Parse one stdout line. Only lines starting with `{` are candidates.
pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim();
    if !line.starts_with('{') {
        return ParsedLine::Unrecognized;
    }
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => return ParsedLine::Unrecognized,
    };

    let percent = extract_percent(&value);
    let speed = value.get("speed").and_then(|v| v.as_f64());
    let eta = value.get("eta").and_then(|v| v.as_u64());

    if percent.is_none() && speed.is_none() && eta.is_none() {
        return ParsedLine::Unrecognized;
    }
    ParsedLine::Progress { percent, speed, eta }
}

/// Percent complete, from the most reliable field available: a numeric
/// `percent`, the byte counters, or the rendered `_percent_str`.
fn extract_percent(value: &serde_json::Value) -> Option<f64> {
    if let Some(p) = value.get("percent").and_then(|v| v.as_f64()) {
        return Some(p.clamp(0.0, 100.0));
    }
    let downloaded = value.get("downloaded_bytes").and_then(|v| v.as_f64());
    let total = value
        .get("total_bytes")
        .and_then(|v| v.as_f64())
        .or_else(|| value.get("total_bytes_estimate").and_then(|v| v.as_f64()));
    if let (Some(d), Some(t)) = (downloaded, total) {
        if t > 0.0 {
            return Some((d / t * 100.0).clamp(0.0, 100.0));
        }
    }
    value
        .get("_percent_str")
        .and_then(|v| v.as_str())
        .and_then(|s| s.trim().trim_end_matches('%').trim().parse::<f64>().ok())
        .map(|p| p.clamp(0.0, 100.0))
}

/// Bytes per second to a display string: "" below 1 B/s, KB/s below 1 MB/s.
pub fn human_speed(bps: Option<f64>) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    match bps {
        Some(bps) if bps >= MB => format!("{:.2} MB/s", bps / MB),
        Some(bps) if bps > 0.0 => format!("{:.1} KB/s", bps / 1024.0),
        _ => String::new(),
    }
}

/// Seconds to a display string: "1h 2m", "3m 4s", or "5s".
pub fn human_eta(sec: Option<u64>) -> String {
    match sec {
        None => String::new(),
        Some(sec) => {
            let (h, rem) = (sec / 3600, sec % 3600);
            let (m, s) = (rem / 60, rem % 60);
            if h > 0 {
                format!("{}h {}m", h, m)
            } else if m > 0 {
                format!("{}m {}s", m, s)
            } else {
                format!("{}s", s)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_full_record() {
        let line = r#"{"downloaded_bytes": 512, "total_bytes": 1024, "speed": 2097152.0, "eta": 75}"#;
        match parse_line(line) {
            ParsedLine::Progress { percent, speed, eta } => {
                assert_eq!(percent, Some(50.0));
                assert_eq!(speed, Some(2097152.0));
                assert_eq!(eta, Some(75));
            }
            other => panic!("expected Progress, got {:?}", other),
        }
    }

    #[test]
    fn parse_line_prefers_numeric_percent() {
        let line = r#"{"percent": 42.5, "downloaded_bytes": 1, "total_bytes": 100}"#;
        match parse_line(line) {
            ParsedLine::Progress { percent, .. } => assert_eq!(percent, Some(42.5)),
            other => panic!("expected Progress, got {:?}", other),
        }
    }

    #[test]
    fn parse_line_percent_str_fallback() {
        let line = r#"{"_percent_str": " 12.3% ", "eta": 5}"#;
        match parse_line(line) {
            ParsedLine::Progress { percent, eta, .. } => {
                assert_eq!(percent, Some(12.3));
                assert_eq!(eta, Some(5));
            }
            other => panic!("expected Progress, got {:?}", other),
        }
    }

    #[test]
    fn parse_line_non_json_prefix() {
        assert_eq!(parse_line("[download] Destination: x.mp4"), ParsedLine::Unrecognized);
        assert_eq!(parse_line(""), ParsedLine::Unrecognized);
    }

    #[test]
    fn parse_line_broken_json() {
        assert_eq!(parse_line("{not json"), ParsedLine::Unrecognized);
    }

    #[test]
    fn parse_line_json_without_progress_fields() {
        // Valid JSON but nothing we can use; caller keeps the prior percent.
        assert_eq!(parse_line(r#"{"status": "finished"}"#), ParsedLine::Unrecognized);
    }

    #[test]
    fn human_speed_formats() {
        assert_eq!(human_speed(Some(2.0 * 1024.0 * 1024.0)), "2.00 MB/s");
        assert_eq!(human_speed(Some(512.0 * 1024.0)), "512.0 KB/s");
        assert_eq!(human_speed(Some(0.0)), "");
        assert_eq!(human_speed(None), "");
    }

    #[test]
    fn human_eta_formats() {
        assert_eq!(human_eta(Some(3725)), "1h 2m");
        assert_eq!(human_eta(Some(184)), "3m 4s");
        assert_eq!(human_eta(Some(5)), "5s");
        assert_eq!(human_eta(Some(0)), "0s");
        assert_eq!(human_eta(None), "");
    }
}
