//! Sensor subscription plan.
//!
//! Patterns are dot-separated with one to three segments:
//!
//! ```text
//! device-status          top-level array sensor
//! f.spead-rx             device on every f-host
//! x.xeng.vacc            device on every engine of every x-host
//! ```
//!
//! The team is the first character of the first segment.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::{CmcError, CmcResult};

/// Engines per host unless configured otherwise.
pub const DEFAULT_ENGINES_PER_HOST: usize = 4;

/// One desired subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pattern {
    Array {
        sensor: String,
    },
    Device {
        team: char,
        device: String,
    },
    EngineDevice {
        team: char,
        engine_base: String,
        device: String,
    },
}

impl FromStr for Pattern {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, String> {
        let segments: Vec<&str> = text.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(format!("empty segment in {text:?}"));
        }
        let team_of = |segment: &str| match segment.chars().next() {
            Some(c) if c.is_ascii_alphabetic() => Ok(c),
            _ => Err(format!("bad team in {text:?}")),
        };

        match *segments.as_slice() {
            [sensor] => Ok(Self::Array {
                sensor: sensor.to_string(),
            }),
            [team, device] => Ok(Self::Device {
                team: team_of(team)?,
                device: device.to_string(),
            }),
            [team, engine_base, device] => Ok(Self::EngineDevice {
                team: team_of(team)?,
                engine_base: engine_base.to_string(),
                device: device.to_string(),
            }),
            _ => Err(format!(
                "{text:?} has {} segments, expected 1 to 3",
                segments.len()
            )),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array { sensor } => write!(f, "{sensor}"),
            Self::Device { team, device } => write!(f, "{team}.{device}"),
            Self::EngineDevice {
                team,
                engine_base,
                device,
            } => write!(f, "{team}.{engine_base}.{device}"),
        }
    }
}

/// Patterns to subscribe on every array once its instrument is up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionPlan {
    patterns: Vec<Pattern>,
    engines_per_host: usize,
}

impl Default for SubscriptionPlan {
    fn default() -> Self {
        Self::new(Vec::new(), DEFAULT_ENGINES_PER_HOST)
    }
}

impl SubscriptionPlan {
    pub fn new(patterns: Vec<Pattern>, engines_per_host: usize) -> Self {
        Self {
            patterns,
            engines_per_host,
        }
    }

    /// Parse a pattern file: one pattern per line, `#` comments, blank
    /// lines ignored. Errors carry the 1-based line number.
    pub fn parse(text: &str, engines_per_host: usize) -> CmcResult<Self> {
        let mut patterns = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let line = match line.find('#') {
                Some(comment) => &line[..comment],
                None => line,
            }
            .trim();
            if line.is_empty() {
                continue;
            }
            let pattern = line.parse().map_err(|reason| CmcError::InvalidPattern {
                line: number + 1,
                reason,
            })?;
            patterns.push(pattern);
        }
        Ok(Self::new(patterns, engines_per_host))
    }

    /// Append inline patterns after the ones already loaded.
    ///
    /// Inline patterns have no line; errors report their 1-based position.
    pub fn extend_from_strs<S: AsRef<str>>(&mut self, patterns: &[S]) -> CmcResult<()> {
        for (i, text) in patterns.iter().enumerate() {
            let pattern = text
                .as_ref()
                .trim()
                .parse()
                .map_err(|reason| CmcError::InvalidPattern { line: i + 1, reason })?;
            self.patterns.push(pattern);
        }
        Ok(())
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn engines_per_host(&self) -> usize {
        self.engines_per_host
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pattern_shapes() {
        assert_eq!(
            "device-status".parse::<Pattern>().unwrap(),
            Pattern::Array {
                sensor: "device-status".to_string()
            }
        );
        assert_eq!(
            "f.spead-rx".parse::<Pattern>().unwrap(),
            Pattern::Device {
                team: 'f',
                device: "spead-rx".to_string()
            }
        );
        assert_eq!(
            "x.xeng.vacc".parse::<Pattern>().unwrap(),
            Pattern::EngineDevice {
                team: 'x',
                engine_base: "xeng".to_string(),
                device: "vacc".to_string()
            }
        );
    }

    #[test]
    fn test_reject_bad_patterns() {
        assert!("a.b.c.d".parse::<Pattern>().is_err());
        assert!("f..spead-rx".parse::<Pattern>().is_err());
        assert!("1.spead-rx".parse::<Pattern>().is_err());
    }

    #[test]
    fn test_parse_file_skips_comments_and_blanks() {
        let text = "# array sensors\n\ndevice-status\nf.spead-rx   # per host\n  x.xeng.vacc\n";
        let plan = SubscriptionPlan::parse(text, 4).unwrap();
        let rendered: Vec<String> = plan.patterns().iter().map(Pattern::to_string).collect();
        assert_eq!(rendered, ["device-status", "f.spead-rx", "x.xeng.vacc"]);
        assert_eq!(plan.engines_per_host(), 4);
    }

    #[test]
    fn test_parse_file_reports_line_number() {
        let err = SubscriptionPlan::parse("device-status\n\nf.a.b.c\n", 4).unwrap_err();
        assert!(matches!(err, CmcError::InvalidPattern { line: 3, .. }));
    }

    #[test]
    fn test_extend_appends_inline_patterns() {
        let mut plan = SubscriptionPlan::parse("device-status\n", 4).unwrap();
        plan.extend_from_strs(&["f.network"]).unwrap();
        assert_eq!(plan.patterns().len(), 2);
        assert!(plan.extend_from_strs(&["a.b.c.d"]).is_err());
    }
}
