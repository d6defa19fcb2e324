use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::dom::{Document, SyntheticEvent};
use crate::input_locator::InputLocator;
use crate::selector::SelectorError;
use crate::settings::{Delays, SettingsError, TypingSettings};
use crate::target::{key_code, resolve_target, ElementTarget, ResolveError, TypingTarget};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(2000);
const CHANGE_EVENT_PROBABILITY: f64 = 0.1;
const HESITATION_PROBABILITY: f64 = 0.05;
const MAX_HESITATION_MS: f64 = 200.0;
const ANSWER_JITTER_MS: f64 = 20.0;
const SLEEP_STEP_MS: u64 = 50;

/// Shared cancellation flag, checked before every character.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Ctrl+C routing for a loop that serves several typing requests.
///
/// While a request is running an interrupt cancels it through the stop flag;
/// between requests it tells the caller to quit.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    stop: StopFlag,
    busy: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new(stop: StopFlag) -> Self {
        Self {
            stop,
            busy: Arc::default(),
        }
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Mark a request as running until the guard is dropped.
    pub fn begin(&self) -> BusyGuard<'_> {
        self.busy.store(true, Ordering::SeqCst);
        BusyGuard(&self.busy)
    }

    /// Returns `true` when nothing is running and the caller should exit.
    pub fn trigger(&self) -> bool {
        if self.busy.load(Ordering::SeqCst) {
            self.stop.stop();
            false
        } else {
            true
        }
    }
}

#[derive(Debug)]
pub struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Error)]
pub enum TypingError {
    #[error("invalid typing settings: {0}")]
    InvalidSettings(#[from] SettingsError),

    #[error("{0}")]
    ElementUnavailable(String),

    #[error("No suitable input field found")]
    NoInputFound,

    #[error(transparent)]
    Selector(#[from] SelectorError),
}

impl From<ResolveError> for TypingError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Selector(err) => TypingError::Selector(err),
            ResolveError::NotFound | ResolveError::NotEditable => {
                TypingError::ElementUnavailable(err.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    Cancelled,
}

/// Result of typing one generated answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerTyping {
    pub outcome: SessionOutcome,
    pub chars_typed: usize,
}

/// Interim throughput, recorded at most every two seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSample {
    pub chars_typed: usize,
    pub elapsed_ms: u64,
    pub current_wpm: f64,
    pub percent_complete: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSessionSummary {
    pub outcome: SessionOutcome,
    pub target_wpm: u32,
    pub actual_wpm: f64,
    pub efficiency_percent: f64,
    pub duration_ms: u64,
    pub total_chars: usize,
    pub average_char_delay_ms: f64,
    pub char_delay_ms: u64,
    pub word_delay_ms: u64,
    pub add_randomness: bool,
    pub speed_adjustment: f64,
    pub progress: Vec<ProgressSample>,
}

/// Words per minute for `chars` characters over `elapsed`, at five characters
/// per word. Zero when no time has passed.
pub fn words_per_minute(chars: usize, elapsed: Duration) -> f64 {
    let minutes = elapsed.as_secs_f64() / 60.0;
    if minutes <= 0.0 {
        return 0.0;
    }
    (chars as f64 / 5.0) / minutes
}

/// Per-keystroke pause model.
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    delays: Delays,
    randomness: bool,
}

impl Cadence {
    pub fn new(delays: Delays, randomness: bool) -> Self {
        Self { delays, randomness }
    }

    pub fn from_settings(settings: &TypingSettings) -> Self {
        Self::new(settings.delays(), settings.add_randomness())
    }

    /// Pause after a character: +/-30% jitter and an occasional hesitation of
    /// up to 200 ms when randomness is on.
    pub fn char_delay(&self, rng: &mut impl Rng) -> Duration {
        let mut ms = self.delays.char_delay_ms as f64;
        if self.randomness {
            ms = (ms * rng.gen_range(0.7..1.3)).round();
            if rng.gen_bool(HESITATION_PROBABILITY) {
                ms += rng.gen_range(0.0..MAX_HESITATION_MS);
            }
        }
        fractional_millis(ms)
    }

    /// Pause after the space between words: +/-20% jitter when randomness is on.
    pub fn word_delay(&self, rng: &mut impl Rng) -> Duration {
        let mut ms = self.delays.word_delay_ms as f64;
        if self.randomness {
            ms = (ms * rng.gen_range(0.8..1.2)).round();
        }
        fractional_millis(ms)
    }
}

/// Emit one keystroke: keydown, the text mutation, input, keyup, and
/// occasionally a change event.
pub fn type_character(target: &mut impl TypingTarget, c: char, rng: &mut impl Rng) {
    let key = c.to_string();
    let code = key_code(c);

    target.dispatch(SyntheticEvent::KeyDown {
        key: key.clone(),
        code: code.clone(),
    });
    target.append_char(c);
    target.dispatch(SyntheticEvent::Input {
        input_type: "insertText".to_string(),
        data: key.clone(),
    });
    target.dispatch(SyntheticEvent::KeyUp { key, code });

    if rng.gen_bool(CHANGE_EVENT_PROBABILITY) {
        target.dispatch(SyntheticEvent::Change);
    }
}

fn fractional_millis(ms: f64) -> Duration {
    Duration::from_micros((ms.max(0.0) * 1000.0).round() as u64)
}

pub(crate) async fn sleep_interruptible(stop: &StopFlag, duration: Duration) {
    let step = Duration::from_millis(SLEEP_STEP_MS);
    let mut remaining = duration;
    while !remaining.is_zero() {
        if stop.is_stopped() {
            return;
        }
        let chunk = remaining.min(step);
        sleep(chunk).await;
        remaining -= chunk;
    }
}

fn ensure_available(target: &impl TypingTarget) -> Result<(), TypingError> {
    if target.is_available() {
        Ok(())
    } else {
        Err(TypingError::ElementUnavailable(
            "input field is no longer in the document".to_string(),
        ))
    }
}

struct SessionClock {
    started: Instant,
    last_progress: Instant,
    total_len: usize,
    chars_typed: usize,
    progress: Vec<ProgressSample>,
}

impl SessionClock {
    fn start(total_len: usize) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_progress: now,
            total_len,
            chars_typed: 0,
            progress: Vec::new(),
        }
    }

    fn sample(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_progress) <= PROGRESS_INTERVAL {
            return;
        }
        let elapsed = now.duration_since(self.started);
        let sample = ProgressSample {
            chars_typed: self.chars_typed,
            elapsed_ms: elapsed.as_millis() as u64,
            current_wpm: words_per_minute(self.chars_typed, elapsed).round(),
            percent_complete: if self.total_len == 0 {
                100.0
            } else {
                (self.chars_typed as f64 / self.total_len as f64 * 100.0).round()
            },
        };
        info!(
            chars = sample.chars_typed,
            elapsed_s = %format!("{:.1}", elapsed.as_secs_f64()),
            wpm = sample.current_wpm,
            "typing progress"
        );
        self.progress.push(sample);
        self.last_progress = now;
    }

    fn finish(self, outcome: SessionOutcome, settings: &TypingSettings) -> TypingSessionSummary {
        let elapsed = self.started.elapsed();
        let actual_wpm = words_per_minute(self.chars_typed, elapsed);
        let target_wpm = settings.target_wpm();
        let duration_ms = elapsed.as_millis() as u64;
        let average_char_delay_ms = if self.chars_typed == 0 {
            0.0
        } else {
            elapsed.as_secs_f64() * 1000.0 / self.chars_typed as f64
        };

        TypingSessionSummary {
            outcome,
            target_wpm,
            actual_wpm,
            efficiency_percent: if target_wpm == 0 {
                0.0
            } else {
                actual_wpm / f64::from(target_wpm) * 100.0
            },
            duration_ms,
            total_chars: self.chars_typed,
            average_char_delay_ms,
            char_delay_ms: settings.char_delay_ms(),
            word_delay_ms: settings.word_delay_ms(),
            add_randomness: settings.add_randomness(),
            speed_adjustment: settings.speed_adjustment(),
            progress: self.progress,
        }
    }
}

/// Type `text` into `target` one character at a time.
///
/// Words are split on single spaces; a space and a word pause follow every
/// word but the last. A set `stop` flag ends the run early with
/// [`SessionOutcome::Cancelled`], leaving whatever was typed in place.
pub async fn type_text(
    text: &str,
    target: &mut impl TypingTarget,
    settings: &TypingSettings,
    rng: &mut impl Rng,
    stop: &StopFlag,
) -> Result<TypingSessionSummary, TypingError> {
    settings.validate()?;
    ensure_available(target)?;

    let cadence = Cadence::from_settings(settings);
    let words: Vec<&str> = text.split(' ').collect();
    let mut clock = SessionClock::start(text.chars().count());

    info!(
        target_wpm = settings.target_wpm(),
        char_delay_ms = settings.char_delay_ms(),
        word_delay_ms = settings.word_delay_ms(),
        "starting typing session"
    );

    for (word_index, word) in words.iter().enumerate() {
        debug!(word = word_index + 1, of = words.len(), %word, "typing word");

        for c in word.chars() {
            if stop.is_stopped() {
                info!(chars = clock.chars_typed, "typing cancelled");
                return Ok(clock.finish(SessionOutcome::Cancelled, settings));
            }
            ensure_available(target)?;

            type_character(target, c, rng);
            clock.chars_typed += 1;

            sleep_interruptible(stop, cadence.char_delay(rng)).await;
            clock.sample();
        }

        if word_index + 1 < words.len() {
            if stop.is_stopped() {
                info!(chars = clock.chars_typed, "typing cancelled");
                return Ok(clock.finish(SessionOutcome::Cancelled, settings));
            }
            ensure_available(target)?;

            type_character(target, ' ', rng);
            clock.chars_typed += 1;

            sleep_interruptible(stop, cadence.word_delay(rng)).await;
        }
    }

    let summary = clock.finish(SessionOutcome::Completed, settings);
    info!(
        target_wpm = summary.target_wpm,
        actual_wpm = %format!("{:.0}", summary.actual_wpm),
        efficiency = %format!("{:.1}%", summary.efficiency_percent),
        chars = summary.total_chars,
        duration_s = %format!("{:.1}", summary.duration_ms as f64 / 1000.0),
        "typing session complete"
    );
    Ok(summary)
}

/// Find the page's input field, focus and clear it, then type `text`.
pub async fn start_typing(
    doc: &mut Document,
    text: &str,
    settings: &TypingSettings,
    rng: &mut impl Rng,
    stop: &StopFlag,
) -> Result<TypingSessionSummary, TypingError> {
    settings.validate()?;

    let node = InputLocator::default()
        .locate(doc)
        .ok_or(TypingError::NoInputFound)?;
    let mut target = ElementTarget::new(doc, node).ok_or(TypingError::NoInputFound)?;

    target.activate();
    target.set_value("");

    type_text(text, &mut target, settings, rng, stop).await
}

/// Type a generated answer into the element matching `input_selector`.
///
/// Uses a flat `60000 / (speed * 5)` ms per character, twice that for spaces,
/// plus up to 20 ms of jitter per keystroke. A set `stop` flag ends typing
/// early with [`SessionOutcome::Cancelled`].
pub async fn type_answer(
    doc: &mut Document,
    input_selector: &str,
    answer: &str,
    speed_wpm: u32,
    rng: &mut impl Rng,
    stop: &StopFlag,
) -> Result<AnswerTyping, TypingError> {
    let mut target = resolve_target(doc, input_selector)?;

    target.dispatch(SyntheticEvent::Focus);
    target.set_value("");

    let char_delay_ms = (60_000.0 / (f64::from(speed_wpm.max(1)) * 5.0)).round();
    let word_delay_ms = char_delay_ms * 2.0;
    info!(speed_wpm, char_delay_ms, "typing answer");

    let mut typed = 0usize;
    for c in answer.chars() {
        if stop.is_stopped() {
            info!(chars = typed, "answer typing cancelled");
            return Ok(AnswerTyping {
                outcome: SessionOutcome::Cancelled,
                chars_typed: typed,
            });
        }
        ensure_available(&target)?;

        type_character(&mut target, c, rng);
        typed += 1;

        let base = if c == ' ' { word_delay_ms } else { char_delay_ms };
        let ms = base + rng.gen_range(0.0..ANSWER_JITTER_MS);
        sleep_interruptible(stop, fractional_millis(ms)).await;
    }

    info!(chars = typed, "answer typing completed");
    Ok(AnswerTyping {
        outcome: SessionOutcome::Completed,
        chars_typed: typed,
    })
}

/// Count down `seconds` one second at a time, calling `on_tick` with the
/// seconds remaining. Returns `false` if `stop` was set.
pub async fn countdown(seconds: u32, stop: &StopFlag, mut on_tick: impl FnMut(u32)) -> bool {
    for remaining in (1..=seconds).rev() {
        if stop.is_stopped() {
            return false;
        }
        on_tick(remaining);
        sleep_interruptible(stop, Duration::from_secs(1)).await;
    }
    !stop.is_stopped()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn fixed_cadence_without_randomness() {
        let cadence = Cadence::new(
            Delays {
                char_delay_ms: 185,
                word_delay_ms: 463,
            },
            false,
        );
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(cadence.char_delay(&mut rng), Duration::from_millis(185));
        assert_eq!(cadence.word_delay(&mut rng), Duration::from_millis(463));
    }

    #[test]
    fn jittered_char_delay_stays_in_range() {
        let cadence = Cadence::new(
            Delays {
                char_delay_ms: 100,
                word_delay_ms: 250,
            },
            true,
        );
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let ms = cadence.char_delay(&mut rng).as_secs_f64() * 1000.0;
            assert!((70.0..330.0).contains(&ms), "{ms}");
            let word = cadence.word_delay(&mut rng).as_secs_f64() * 1000.0;
            assert!((200.0..=300.0).contains(&word), "{word}");
        }
    }

    #[test]
    fn wpm_is_zero_without_elapsed_time() {
        assert_eq!(words_per_minute(10, Duration::ZERO), 0.0);
        assert_eq!(words_per_minute(50, Duration::from_secs(60)), 10.0);
    }
}
