// Subtitle track index
//
// Parses a WebVTT-style document into an ordered list of cues and answers
// "what line is on screen at this timestamp" queries. The cue order is the
// document order; no sorting or overlap constraints are assumed, lookup just
// scans.

pub mod source;

pub use source::SubtitleLoader;

use tracing::debug;

/// One subtitle entry. Start/end keep the document's own time text; the
/// parsed second values are computed once at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    pub start: String,
    pub end: String,
    pub text: String,
}

impl SubtitleCue {
    fn start_seconds(&self) -> f64 {
        time_to_seconds(&self.start).unwrap_or(0.0)
    }

    fn end_seconds(&self) -> f64 {
        time_to_seconds(&self.end).unwrap_or(0.0)
    }
}

/// Maximum distance (seconds) at which the nearest-cue fallback still
/// produces a match.
const NEAREST_CUE_MAX_DISTANCE: f64 = 5.0;

/// An ordered sequence of cues from one loaded document. Replaced wholesale
/// on reload; an empty track answers every lookup with None.
#[derive(Debug, Clone, Default)]
pub struct SubtitleTrack {
    cues: Vec<SubtitleCue>,
}

impl SubtitleTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a subtitle document. Tolerates a byte-order marker, an optional
    /// `WEBVTT` header line, and blank-line separators between cue blocks.
    /// Lines that do not carry two `HH:MM:SS.mmm` time values are skipped.
    pub fn parse(content: &str) -> Self {
        let content = content.trim().trim_start_matches('\u{feff}');
        let lines: Vec<&str> = content.lines().collect();
        let mut cues = Vec::new();

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i].trim();

            if line == "WEBVTT" || line.is_empty() {
                i += 1;
                continue;
            }

            if let Some((start, after_start)) = find_strict_time(line, 0) {
                if let Some((end, _)) = find_strict_time(line, after_start) {
                    let mut text_lines = Vec::new();
                    i += 1;
                    while i < lines.len() && !lines[i].trim().is_empty() {
                        text_lines.push(lines[i].trim());
                        i += 1;
                    }

                    cues.push(SubtitleCue {
                        start,
                        end,
                        text: text_lines.join("\n"),
                    });
                }
            }

            i += 1;
        }

        debug!("Parsed {} subtitle cues", cues.len());
        Self { cues }
    }

    pub fn cues(&self) -> &[SubtitleCue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Two-phase lookup. Phase one returns the first cue whose interval
    /// contains the timing, inclusive on both ends, in document order.
    /// Phase two picks the cue whose start or end is closest, if within
    /// 5 seconds. The matched time text echoed back is the query itself.
    pub fn lookup(&self, timing: &str) -> Option<(String, String)> {
        let target = time_to_seconds(timing)?;

        if let Some(cue) = self.find_cue_at(target) {
            return Some((timing.to_string(), cue.text.clone()));
        }

        self.find_closest_cue(target)
            .map(|cue| (timing.to_string(), cue.text.clone()))
    }

    /// The first cue in document order starting strictly after the timing.
    /// Used by the "advance to the next line" command.
    pub fn cue_after(&self, timing: &str) -> Option<&SubtitleCue> {
        let target = time_to_seconds(timing)?;
        self.cues
            .iter()
            .filter(|cue| cue.start_seconds() > target)
            .min_by(|a, b| {
                a.start_seconds()
                    .partial_cmp(&b.start_seconds())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// The cue in document order following the cue with the given text.
    pub fn cue_following_text(&self, text: &str) -> Option<&SubtitleCue> {
        let idx = self.cues.iter().position(|cue| cue.text == text)?;
        self.cues.get(idx + 1)
    }

    fn find_cue_at(&self, target: f64) -> Option<&SubtitleCue> {
        self.cues
            .iter()
            .find(|cue| cue.start_seconds() <= target && target <= cue.end_seconds())
    }

    fn find_closest_cue(&self, target: f64) -> Option<&SubtitleCue> {
        let mut closest: Option<&SubtitleCue> = None;
        let mut min_distance = f64::INFINITY;

        for cue in &self.cues {
            let to_start = (target - cue.start_seconds()).abs();
            let to_end = (target - cue.end_seconds()).abs();
            let distance = to_start.min(to_end);

            if distance < min_distance {
                min_distance = distance;
                closest = Some(cue);
            }
        }

        if min_distance <= NEAREST_CUE_MAX_DISTANCE {
            closest
        } else {
            None
        }
    }
}

/// Convert a subtitle time value to seconds. Accepts the strict
/// `HH:MM:SS.mmm` form and the looser `H:MM:SS` form without fractional
/// seconds.
pub fn time_to_seconds(text: &str) -> Option<f64> {
    if text.contains('.') {
        let (time, _) = parse_strict_time(text)?;
        Some(time)
    } else {
        let mut parts = text.split(':');
        let hours = parse_digit_group(parts.next()?, 1, 2)?;
        let minutes = parse_digit_group(parts.next()?, 2, 2)?;
        let seconds = parse_digit_group(parts.next()?, 2, 2)?;
        if parts.next().is_some() {
            return None;
        }
        Some((hours * 3600 + minutes * 60 + seconds) as f64)
    }
}

/// Format seconds back to the canonical `HH:MM:SS.mmm` text form.
pub fn seconds_to_time(seconds: f64) -> String {
    let total_milliseconds = (seconds * 1000.0).round() as u64;
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}

fn parse_digit_group(text: &str, min_len: usize, max_len: usize) -> Option<u64> {
    if text.len() < min_len || text.len() > max_len || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Parse `HH:MM:SS.mmm` anchored at the start of the text. Returns the
/// value in seconds and the byte length consumed.
fn parse_strict_time(text: &str) -> Option<(f64, usize)> {
    let bytes = text.as_bytes();
    if bytes.len() < 12 {
        return None;
    }
    let shape_ok = bytes[..12].iter().enumerate().all(|(i, b)| match i {
        2 | 5 => *b == b':',
        8 => *b == b'.',
        _ => b.is_ascii_digit(),
    });
    if !shape_ok {
        return None;
    }

    let hours: u64 = text[0..2].parse().ok()?;
    let minutes: u64 = text[3..5].parse().ok()?;
    let seconds: u64 = text[6..8].parse().ok()?;
    let milliseconds: u64 = text[9..12].parse().ok()?;

    Some((
        (hours * 3600 + minutes * 60 + seconds) as f64 + milliseconds as f64 / 1000.0,
        12,
    ))
}

/// Scan for the first `HH:MM:SS.mmm` occurrence at or after `from`.
/// Returns the matched text and the index just past it.
fn find_strict_time(line: &str, from: usize) -> Option<(String, usize)> {
    let bytes = line.as_bytes();
    for start in from..bytes.len() {
        if !line.is_char_boundary(start) {
            continue;
        }
        if let Some((_, len)) = parse_strict_time(&line[start..]) {
            return Some((line[start..start + len].to_string(), start + len));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "WEBVTT\n\n00:00:01.000 --> 00:00:05.000\nA\n\n00:00:10.000 --> 00:00:12.500\nB line one\nB line two\n";

    #[test]
    fn test_parse_blocks() {
        let track = SubtitleTrack::parse(SAMPLE);
        assert_eq!(track.len(), 2);
        assert_eq!(track.cues()[0].start, "00:00:01.000");
        assert_eq!(track.cues()[0].end, "00:00:05.000");
        assert_eq!(track.cues()[0].text, "A");
        assert_eq!(track.cues()[1].text, "B line one\nB line two");
    }

    #[test]
    fn test_parse_tolerates_bom_and_missing_header() {
        let with_bom = format!("\u{feff}{}", SAMPLE);
        assert_eq!(SubtitleTrack::parse(&with_bom).len(), 2);

        let headerless = "00:00:01.000 --> 00:00:02.000\nX\n";
        assert_eq!(SubtitleTrack::parse(headerless).len(), 1);
    }

    #[test]
    fn test_parse_skips_incomplete_time_lines() {
        let track = SubtitleTrack::parse("WEBVTT\n\n00:00:01.000\norphan\n");
        assert!(track.is_empty());
    }

    #[test]
    fn test_time_to_seconds_both_forms() {
        let strict = time_to_seconds("00:01:05.123").unwrap();
        assert!((strict - 65.123).abs() < 1e-9);
        assert_eq!(time_to_seconds("0:01:05"), Some(65.0));
        assert_eq!(time_to_seconds("10:00:00"), Some(36000.0));
        assert_eq!(time_to_seconds("not a time"), None);
        assert_eq!(time_to_seconds("1:2:3"), None);
    }

    #[test]
    fn test_seconds_round_trip() {
        for t in ["00:00:00.000", "00:01:05.123", "01:01:01.500", "12:34:56.789"] {
            assert_eq!(seconds_to_time(time_to_seconds(t).unwrap()), t);
        }
    }

    #[test]
    fn test_lookup_containment() {
        let track = SubtitleTrack::parse("00:00:01.000 --> 00:00:05.000\nA\n");
        assert_eq!(
            track.lookup("00:00:03"),
            Some(("00:00:03".to_string(), "A".to_string()))
        );
        // Inclusive on both ends
        assert!(track.lookup("0:00:01").is_some());
        assert!(track.lookup("0:00:05").is_some());
    }

    #[test]
    fn test_lookup_nearest_within_window() {
        let track = SubtitleTrack::parse("00:00:01.000 --> 00:00:05.000\nA\n");
        // 3 seconds past the end: matched through the nearest phase
        assert_eq!(
            track.lookup("00:00:08"),
            Some(("00:00:08".to_string(), "A".to_string()))
        );
        // 15 seconds past the end: out of the 5 second window
        assert_eq!(track.lookup("00:00:20"), None);
    }

    #[test]
    fn test_lookup_document_order_wins_on_overlap() {
        let overlapping = "00:00:10.000 --> 00:00:20.000\nsecond\n\n00:00:01.000 --> 00:00:15.000\nfirst\n";
        let track = SubtitleTrack::parse(overlapping);
        // 12s is inside both intervals; the first cue in document order wins
        assert_eq!(track.lookup("0:00:12").unwrap().1, "second");
    }

    #[test]
    fn test_lookup_empty_track() {
        assert_eq!(SubtitleTrack::new().lookup("0:00:01"), None);
    }

    #[test]
    fn test_cue_after() {
        let track = SubtitleTrack::parse(SAMPLE);
        assert_eq!(track.cue_after("0:00:03").unwrap().text, "B line one\nB line two");
        assert!(track.cue_after("0:00:15").is_none());
    }

    #[test]
    fn test_cue_following_text() {
        let track = SubtitleTrack::parse(SAMPLE);
        assert_eq!(
            track.cue_following_text("A").unwrap().text,
            "B line one\nB line two"
        );
        assert!(track.cue_following_text("B line one\nB line two").is_none());
        assert!(track.cue_following_text("missing").is_none());
    }
}
