use crate::dom::{DispatchedEvent, Document, NodeId, SyntheticEvent};
use crate::typing::{SessionOutcome, TypingSessionSummary};

#[derive(Debug, Default, Clone)]
struct TypingRun {
    target: Option<NodeId>,
    text: String,
    change_events: usize,
}

/// Folds a dispatched-event log into human-readable console lines.
///
/// Consecutive `input` events on one element collapse into a single
/// `Typing "..."` line; focus and click become their own lines.
#[derive(Debug, Default, Clone)]
pub struct EventTracer {
    run: TypingRun,
    pending_lines: Vec<String>,
}

impl EventTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, doc: &Document, event: &DispatchedEvent) {
        if self.run.target.is_some_and(|t| t != event.target) {
            self.flush_run(doc);
        }

        match &event.event {
            SyntheticEvent::Focus => {
                self.flush_run(doc);
                self.pending_lines
                    .push(format!("Focus {}", doc.describe(event.target)));
            }
            SyntheticEvent::Click => {
                self.flush_run(doc);
                self.pending_lines
                    .push(format!("Click {}", doc.describe(event.target)));
            }
            SyntheticEvent::Input { data, .. } => {
                self.run.target = Some(event.target);
                self.run.text.push_str(data);
            }
            SyntheticEvent::Change => {
                self.run.change_events += 1;
            }
            SyntheticEvent::KeyDown { .. } | SyntheticEvent::KeyUp { .. } => {}
        }
    }

    pub fn drain_lines(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_lines)
    }

    pub fn finish(&mut self, doc: &Document) -> Vec<String> {
        self.flush_run(doc);
        self.drain_lines()
    }

    fn flush_run(&mut self, doc: &Document) {
        let run = std::mem::take(&mut self.run);
        let Some(target) = run.target else {
            return;
        };
        if run.text.is_empty() {
            return;
        }
        let mut line = format!(
            "Typing \"{}\" into {}",
            escape_for_log(&run.text),
            doc.describe(target)
        );
        if run.change_events > 0 {
            line.push_str(&format!(" ({} change events)", run.change_events));
        }
        self.pending_lines.push(line);
    }
}

/// Console lines for every event `doc` has recorded so far.
pub fn event_console_trace(doc: &Document) -> Vec<String> {
    let mut tracer = EventTracer::new();
    for event in doc.events() {
        tracer.observe(doc, event);
    }
    tracer.finish(doc)
}

/// The end-of-session report.
pub fn summary_lines(summary: &TypingSessionSummary) -> Vec<String> {
    let status = match summary.outcome {
        SessionOutcome::Completed => "Session complete",
        SessionOutcome::Cancelled => "Session cancelled",
    };
    vec![
        status.to_string(),
        format!("  Target WPM: {}", summary.target_wpm),
        format!("  Actual WPM: {:.0}", summary.actual_wpm),
        format!("  Efficiency: {:.1}%", summary.efficiency_percent),
        format!("  Total characters: {}", summary.total_chars),
        format!("  Duration: {:.1}s", summary.duration_ms as f64 / 1000.0),
        format!("  Avg char delay: {:.1}ms", summary.average_char_delay_ms),
        format!("  Set char delay: {}ms", summary.char_delay_ms),
        format!("  Set word delay: {}ms", summary.word_delay_ms),
        format!(
            "  Randomness: {}",
            if summary.add_randomness { "ON" } else { "OFF" }
        ),
        format!("  Speed adjustment: {}x", summary.speed_adjustment),
    ]
}

/// One line per interim progress sample.
pub fn progress_lines(summary: &TypingSessionSummary) -> Vec<String> {
    summary
        .progress
        .iter()
        .map(|p| {
            format!(
                "Progress {} chars, {:.1}s, current WPM {:.0} ({:.0}%)",
                p.chars_typed,
                p.elapsed_ms as f64 / 1000.0,
                p.current_wpm,
                p.percent_complete
            )
        })
        .collect()
}

pub fn print_trace_line(line: &str) {
    const RESET: &str = "\x1b[0m";
    const TYPING: &str = "\x1b[34m";
    const FOCUS: &str = "\x1b[33m";
    const SESSION: &str = "\x1b[32m";

    if let Some(rest) = line.strip_prefix("Typing") {
        eprintln!("{TYPING}Typing{RESET}{rest}");
    } else if let Some(rest) = line.strip_prefix("Focus") {
        eprintln!("{FOCUS}Focus{RESET}{rest}");
    } else if let Some(rest) = line.strip_prefix("Session") {
        eprintln!("{SESSION}Session{RESET}{rest}");
    } else {
        eprintln!("{line}");
    }
}

fn escape_for_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}
