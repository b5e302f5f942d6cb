//! Simulated device behaviour
//!
//! Each logic produces the telemetry string the device reports and, for
//! actuators, applies state-change payloads sent by the gateway.

use std::path::Path;

use fieldgw_core::DeviceKind;
use rand::Rng;
use thiserror::Error;

/// Errors raised by device logic
#[derive(Debug, Error)]
pub enum LogicError {
    #[error("Invalid value '{value}': {expected}")]
    InvalidValue {
        value: String,
        expected: &'static str,
    },

    #[error("Sensors cannot change state")]
    ReadOnly,

    #[error("Failed to load track {path}: {reason}")]
    Track { path: String, reason: String },
}

/// Behaviour of one simulated device
pub trait DeviceLogic: Send {
    fn kind(&self) -> DeviceKind;

    /// Current reading, as pushed in telemetry
    fn read(&mut self) -> String;

    /// Apply a state-change payload
    fn apply(&mut self, payload: &str) -> Result<(), LogicError>;
}

// =============================================================================
// Headlight
// =============================================================================

/// Headlight actuator: `on` or `off`
#[derive(Debug, Clone)]
pub struct Headlight {
    on: bool,
}

impl Headlight {
    pub fn new(on: bool) -> Self {
        Self { on }
    }

    /// Headlight in a random initial state
    pub fn random() -> Self {
        Self::new(rand::thread_rng().gen_bool(0.5))
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

impl DeviceLogic for Headlight {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Actuator
    }

    fn read(&mut self) -> String {
        format!("Headlight|{}", if self.on { "on" } else { "off" })
    }

    fn apply(&mut self, payload: &str) -> Result<(), LogicError> {
        match payload.trim().to_ascii_lowercase().as_str() {
            "on" => self.on = true,
            "off" => self.on = false,
            _ => {
                return Err(LogicError::InvalidValue {
                    value: payload.to_string(),
                    expected: "'on' or 'off'",
                })
            }
        }
        Ok(())
    }
}

// =============================================================================
// Air conditioner
// =============================================================================

/// Air conditioner actuator with cooling levels 1..=3
///
/// Reports `AC|<level>|<temperature>`; each level cools 5 degrees more than
/// the previous one, starting from 30 at level 1, with up to one degree of
/// noise.
#[derive(Debug, Clone)]
pub struct AirConditioner {
    level: u8,
}

impl AirConditioner {
    pub const LEVELS: std::ops::RangeInclusive<u8> = 1..=3;
    const BASE_TEMP: f64 = 30.0;
    const STEP_PER_LEVEL: f64 = 5.0;

    /// Create at `level`, clamped into the valid range
    pub fn new(level: u8) -> Self {
        Self {
            level: level.clamp(*Self::LEVELS.start(), *Self::LEVELS.end()),
        }
    }

    pub fn random() -> Self {
        Self::new(rand::thread_rng().gen_range(Self::LEVELS))
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// Temperature the current level settles at, without noise
    pub fn target_temperature(&self) -> f64 {
        Self::BASE_TEMP - f64::from(self.level - 1) * Self::STEP_PER_LEVEL
    }
}

impl DeviceLogic for AirConditioner {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Actuator
    }

    fn read(&mut self) -> String {
        let noise: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
        format!("AC|{}|{:.1}", self.level, self.target_temperature() + noise)
    }

    fn apply(&mut self, payload: &str) -> Result<(), LogicError> {
        let invalid = || LogicError::InvalidValue {
            value: payload.to_string(),
            expected: "a level of 1, 2 or 3",
        };
        let level: u8 = payload.trim().parse().map_err(|_| invalid())?;
        if !Self::LEVELS.contains(&level) {
            return Err(invalid());
        }
        self.level = level;
        Ok(())
    }
}

// =============================================================================
// Location sensor
// =============================================================================

/// Location sensor replaying a coordinate track forth and back
#[derive(Debug, Clone)]
pub struct LocationTrack {
    points: Vec<(f64, f64)>,
    index: usize,
    step: usize,
}

impl LocationTrack {
    /// Track from points; the return leg is appended so the replay loops
    /// smoothly
    pub fn new(mut points: Vec<(f64, f64)>, step: usize) -> Self {
        let back: Vec<_> = points.iter().rev().copied().collect();
        points.extend(back);
        Self {
            points,
            index: 0,
            step: step.max(1),
        }
    }

    /// A short built-in track
    pub fn builtin() -> Self {
        Self::new(
            vec![
                (-3.7319, -38.5267),
                (-3.7321, -38.5262),
                (-3.7324, -38.5256),
                (-3.7328, -38.5251),
                (-3.7333, -38.5247),
                (-3.7339, -38.5244),
            ],
            1,
        )
    }

    /// Load `x,y` rows from a CSV file with a header line
    pub fn from_csv(path: impl AsRef<Path>, step: usize) -> Result<Self, LogicError> {
        let path = path.as_ref();
        let track_error = |reason: String| LogicError::Track {
            path: path.display().to_string(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|e| track_error(e.to_string()))?;
        let mut points = Vec::new();
        for (line_no, line) in content.lines().enumerate().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (x, y) = line
                .split_once(',')
                .ok_or_else(|| track_error(format!("line {}: expected x,y", line_no + 1)))?;
            let parse = |v: &str| {
                v.trim()
                    .parse::<f64>()
                    .map_err(|e| track_error(format!("line {}: {}", line_no + 1, e)))
            };
            points.push((parse(x)?, parse(y)?));
        }

        if points.is_empty() {
            return Err(track_error("no coordinates".into()));
        }
        Ok(Self::new(points, step))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl DeviceLogic for LocationTrack {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Sensor
    }

    fn read(&mut self) -> String {
        if self.points.is_empty() {
            return String::new();
        }
        self.index = self.index.wrapping_add(self.step);
        let (x, y) = self.points[self.index % self.points.len()];
        format!("{}|{}", x, y)
    }

    fn apply(&mut self, _payload: &str) -> Result<(), LogicError> {
        Err(LogicError::ReadOnly)
    }
}
