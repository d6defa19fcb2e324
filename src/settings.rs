use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_TARGET_WPM: u32 = 10;
pub const MAX_TARGET_WPM: u32 = 200;
pub const MIN_CHAR_DELAY_MS: u64 = 10;

const AVG_WORD_LENGTH: f64 = 5.0;
const SYSTEM_OVERHEAD_MS: f64 = 15.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("target WPM {wpm} is outside {min}..={max}")]
    WpmOutOfRange { wpm: u32, min: u32, max: u32 },

    #[error("speed adjustment must be a positive number, got {0}")]
    InvalidSpeedAdjustment(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delays {
    pub char_delay_ms: u64,
    pub word_delay_ms: u64,
}

/// Multiplier from the per-character delay to the pause after a word.
pub fn word_multiplier(target_wpm: u32) -> f64 {
    if target_wpm >= 120 {
        1.5
    } else if target_wpm >= 80 {
        2.0
    } else {
        2.5
    }
}

/// Convert a target WPM into per-character and per-word delays.
///
/// A fixed 15 ms is subtracted for event-dispatch overhead. Non-positive
/// speed adjustments fall back to 1.0.
pub fn calculate_delays(target_wpm: u32, speed_adjustment: f64) -> Delays {
    let speed_adjustment = if speed_adjustment.is_finite() && speed_adjustment > 0.0 {
        speed_adjustment
    } else {
        1.0
    };

    let target_chars_per_second = f64::from(target_wpm.max(1)) * AVG_WORD_LENGTH / 60.0;
    let theoretical_char_delay = 1000.0 / target_chars_per_second;
    let adjusted_char_delay = (theoretical_char_delay - SYSTEM_OVERHEAD_MS).max(10.0);

    let char_delay_ms = ((adjusted_char_delay / speed_adjustment).round() as u64)
        .max(MIN_CHAR_DELAY_MS);
    let word_delay_ms = (char_delay_ms as f64 * word_multiplier(target_wpm)).round() as u64;

    Delays {
        char_delay_ms,
        word_delay_ms,
    }
}

/// Typing configuration supplied by the caller.
///
/// `char_delay_ms` and `word_delay_ms` are derived from `target_wpm` and
/// `speed_adjustment` and recomputed by every setter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SettingsFile", rename_all = "camelCase")]
pub struct TypingSettings {
    target_wpm: u32,
    #[serde(rename = "startDelay")]
    start_delay_seconds: u32,
    add_randomness: bool,
    speed_adjustment: f64,
    #[serde(rename = "charDelay")]
    char_delay_ms: u64,
    #[serde(rename = "wordDelay")]
    word_delay_ms: u64,
}

impl Default for TypingSettings {
    fn default() -> Self {
        Self::new(60)
    }
}

impl TypingSettings {
    pub fn new(target_wpm: u32) -> Self {
        let mut settings = Self {
            target_wpm,
            start_delay_seconds: 3,
            add_randomness: true,
            speed_adjustment: 1.0,
            char_delay_ms: 0,
            word_delay_ms: 0,
        };
        settings.recalculate();
        settings
    }

    pub fn with_start_delay(mut self, seconds: u32) -> Self {
        self.start_delay_seconds = seconds;
        self
    }

    pub fn with_randomness(mut self, enabled: bool) -> Self {
        self.add_randomness = enabled;
        self
    }

    pub fn with_speed_adjustment(mut self, speed_adjustment: f64) -> Self {
        self.set_speed_adjustment(speed_adjustment);
        self
    }

    pub fn set_target_wpm(&mut self, target_wpm: u32) {
        self.target_wpm = target_wpm;
        self.recalculate();
    }

    pub fn set_speed_adjustment(&mut self, speed_adjustment: f64) {
        self.speed_adjustment = speed_adjustment;
        self.recalculate();
    }

    fn recalculate(&mut self) {
        let delays = calculate_delays(self.target_wpm, self.speed_adjustment);
        self.char_delay_ms = delays.char_delay_ms;
        self.word_delay_ms = delays.word_delay_ms;
    }

    pub fn target_wpm(&self) -> u32 {
        self.target_wpm
    }

    pub fn start_delay_seconds(&self) -> u32 {
        self.start_delay_seconds
    }

    pub fn add_randomness(&self) -> bool {
        self.add_randomness
    }

    pub fn speed_adjustment(&self) -> f64 {
        self.speed_adjustment
    }

    pub fn char_delay_ms(&self) -> u64 {
        self.char_delay_ms
    }

    pub fn word_delay_ms(&self) -> u64 {
        self.word_delay_ms
    }

    pub fn delays(&self) -> Delays {
        Delays {
            char_delay_ms: self.char_delay_ms,
            word_delay_ms: self.word_delay_ms,
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        validate_wpm(self.target_wpm)?;
        if !(self.speed_adjustment.is_finite() && self.speed_adjustment > 0.0) {
            return Err(SettingsError::InvalidSpeedAdjustment(self.speed_adjustment));
        }
        Ok(())
    }
}

pub fn validate_wpm(wpm: u32) -> Result<(), SettingsError> {
    if (MIN_TARGET_WPM..=MAX_TARGET_WPM).contains(&wpm) {
        Ok(())
    } else {
        Err(SettingsError::WpmOutOfRange {
            wpm,
            min: MIN_TARGET_WPM,
            max: MAX_TARGET_WPM,
        })
    }
}

/// On-disk/on-wire shape. Cached delays are accepted but ignored.
#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SettingsFile {
    target_wpm: u32,
    #[serde(alias = "startDelaySeconds")]
    start_delay: u32,
    add_randomness: bool,
    speed_adjustment: f64,
    #[allow(dead_code)]
    char_delay: Option<u64>,
    #[allow(dead_code)]
    word_delay: Option<u64>,
}

impl Default for SettingsFile {
    fn default() -> Self {
        let defaults = TypingSettings::default();
        Self {
            target_wpm: defaults.target_wpm,
            start_delay: defaults.start_delay_seconds,
            add_randomness: defaults.add_randomness,
            speed_adjustment: defaults.speed_adjustment,
            char_delay: None,
            word_delay: None,
        }
    }
}

impl From<SettingsFile> for TypingSettings {
    fn from(file: SettingsFile) -> Self {
        TypingSettings::new(file.target_wpm)
            .with_start_delay(file.start_delay)
            .with_randomness(file.add_randomness)
            .with_speed_adjustment(file.speed_adjustment)
    }
}
