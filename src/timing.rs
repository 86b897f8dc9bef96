use std::fmt;

/// An elapsed-time label read off the screen, in `H:MM:SS` form.
///
/// Instances are only produced by parsing; once created the value is
/// immutable. Comparison happens through [`Timestamp::total_seconds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    hours: u8,
    minutes: u8,
    seconds: u8,
}

impl Timestamp {
    /// Parse a whole string as `H:MM:SS` or `HH:MM:SS`.
    ///
    /// The digit grouping is strict: one or two hour digits, exactly two
    /// minute and second digits. Values outside 0-23 hours / 0-59
    /// minutes / 0-59 seconds are rejected. Anything that does not parse
    /// means "no timestamp", not an error.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split(':');
        let hours = parts.next()?;
        let minutes = parts.next()?;
        let seconds = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 || seconds.len() != 2 {
            return None;
        }
        if ![hours, minutes, seconds]
            .iter()
            .all(|group| group.bytes().all(|b| b.is_ascii_digit()))
        {
            return None;
        }

        let hours: u8 = hours.parse().ok()?;
        let minutes: u8 = minutes.parse().ok()?;
        let seconds: u8 = seconds.parse().ok()?;

        if hours > 23 || minutes > 59 || seconds > 59 {
            return None;
        }

        Some(Self {
            hours,
            minutes,
            seconds,
        })
    }

    /// Find the first `H:MM:SS` digit group embedded anywhere in raw
    /// recognizer output. Range validation still applies.
    pub fn find_in(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        for start in 0..bytes.len() {
            // Prefer the longer hour group, as a leftmost-greedy scan would.
            for hour_len in [2usize, 1] {
                let len = hour_len + 6;
                if start + len > bytes.len()
                    || !text.is_char_boundary(start)
                    || !text.is_char_boundary(start + len)
                {
                    continue;
                }
                let candidate = &text[start..start + len];
                if let Some(ts) = Self::parse(candidate) {
                    return Some(ts);
                }
            }
        }
        None
    }

    pub fn hours(&self) -> u8 {
        self.hours
    }

    pub fn minutes(&self) -> u8 {
        self.minutes
    }

    pub fn seconds(&self) -> u8 {
        self.seconds
    }

    /// Total seconds since 0:00:00, the comparison form used by subtitle
    /// lookup.
    pub fn total_seconds(&self) -> u32 {
        self.hours as u32 * 3600 + self.minutes as u32 * 60 + self.seconds as u32
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// Validation used by the recognizer before a reading is trusted.
pub fn is_valid_timing(text: &str) -> bool {
    Timestamp::parse(text).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_range() {
        assert!(is_valid_timing("23:59:59"));
        assert!(is_valid_timing("0:00:00"));
        assert!(is_valid_timing("00:00:00"));
        assert!(is_valid_timing("1:02:30"));
    }

    #[test]
    fn test_parse_out_of_range() {
        assert!(!is_valid_timing("24:00:00"));
        assert!(!is_valid_timing("12:60:00"));
        assert!(!is_valid_timing("12:00:60"));
    }

    #[test]
    fn test_parse_wrong_grouping() {
        assert!(!is_valid_timing("1:2:3"));
        assert!(!is_valid_timing("123:00:00"));
        assert!(!is_valid_timing("1:022:30"));
        assert!(!is_valid_timing("1:02"));
        assert!(!is_valid_timing(""));
        assert!(!is_valid_timing("ab:cd:ef"));
        assert!(!is_valid_timing("1:02:30:00"));
    }

    #[test]
    fn test_total_seconds() {
        let ts = Timestamp::parse("1:02:30").unwrap();
        assert_eq!(ts.total_seconds(), 3750);
        assert_eq!(Timestamp::parse("0:00:00").unwrap().total_seconds(), 0);
    }

    #[test]
    fn test_display_canonical_form() {
        let ts = Timestamp::parse("01:02:03").unwrap();
        assert_eq!(ts.to_string(), "1:02:03");
        let ts = Timestamp::parse("12:00:59").unwrap();
        assert_eq!(ts.to_string(), "12:00:59");
    }

    #[test]
    fn test_find_in_noisy_text() {
        let ts = Timestamp::find_in("a0:02:30b").unwrap();
        assert_eq!(ts.to_string(), "0:02:30");
        assert!(Timestamp::find_in("no digits here").is_none());
        // Embedded in a longer digit run the scan still lands on a valid
        // grouping, as a leftmost regex search would.
        let ts = Timestamp::find_in("123:45:59").unwrap();
        assert_eq!(ts.to_string(), "23:45:59");
    }
}
