//! Pipeline progress reporting.
//!
//! Each stage reports how many areas of the current education level it has
//! finished, so long runs show where they are. Progress is emitted on
//! **stderr** so stdout stays parseable for scripts.

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A stage started working on a level with `total` areas.
    LevelStarted {
        stage: &'static str,
        level: String,
        total: u64,
    },
    /// `n` of `total` areas done for this stage and level.
    AreaDone {
        stage: &'static str,
        level: String,
        area: String,
        n: u64,
        total: u64,
    },
}

/// Reports pipeline progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "quiz high school  3 / 12 areas".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::LevelStarted {
                stage,
                level,
                total,
            } => format!("{} {}  starting  {} areas\n", stage, level, format_number(*total)),
            ProgressEvent::AreaDone {
                stage,
                level,
                area,
                n,
                total,
            } => format!(
                "{} {}  {} / {} areas  ({})\n",
                stage,
                level,
                format_number(*n),
                format_number(*total),
                area
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::LevelStarted {
                stage,
                level,
                total,
            } => serde_json::json!({
                "event": "progress",
                "stage": stage,
                "level": level,
                "phase": "started",
                "total": total
            }),
            ProgressEvent::AreaDone {
                stage,
                level,
                area,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "stage": stage,
                "level": level,
                "area": area,
                "phase": "area_done",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!(
                "invalid progress mode '{}': expected off, human or json",
                other
            )),
        }
    }
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Arc<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn progress_mode_parse() {
        assert_eq!("off".parse::<ProgressMode>(), Ok(ProgressMode::Off));
        assert_eq!("human".parse::<ProgressMode>(), Ok(ProgressMode::Human));
        assert_eq!("json".parse::<ProgressMode>(), Ok(ProgressMode::Json));
        assert!("loud".parse::<ProgressMode>().is_err());
    }
}
