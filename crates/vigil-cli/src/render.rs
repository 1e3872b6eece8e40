//! Console rendering of races.

use std::io;

use console::{Term, style};
use tracing::warn;
use vigil_core::{AbortNotice, Fragment, Prompt};
use vigil_gate::{Consumer, RaceReport, RaceState};

/// Writes race output to a terminal as it happens.
pub struct ConsoleConsumer {
    term: Term,
    /// Text was written without a trailing newline.
    inline: bool,
}

impl ConsoleConsumer {
    pub fn new(term: Term) -> Self {
        Self { term, inline: false }
    }

    /// Prints the prompt banner and the start marker.
    pub fn start(&mut self, prompt: &Prompt) -> io::Result<()> {
        self.term.write_line("")?;
        self.term
            .write_line(&style(format!("=== Prompt: '{prompt}' ===")).bold().cyan().to_string())?;
        self.term
            .write_line(&style("[streaming started]").dim().to_string())
    }

    /// Ends any inline text and prints the race summary.
    pub fn finish(&mut self, report: &RaceReport) -> io::Result<()> {
        self.end_inline()?;
        self.term.write_line(&style(summary(report)).dim().to_string())
    }

    fn end_inline(&mut self) -> io::Result<()> {
        if self.inline {
            self.inline = false;
            self.term.write_line("")?;
        }
        Ok(())
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.inline = true;
        self.term.write_str(text)?;
        self.term.flush()
    }

    fn write_block(&mut self, lines: &[String]) -> io::Result<()> {
        self.end_inline()?;
        for line in lines {
            self.term.write_line(line)?;
        }
        Ok(())
    }

    fn report(result: io::Result<()>) {
        if let Err(error) = result {
            warn!(%error, "failed to write race output");
        }
    }
}

impl Consumer for ConsoleConsumer {
    fn on_release(&mut self, block: Vec<Fragment>) {
        let marker = style("[cleared, releasing buffer]").green().to_string();
        let result = self
            .write_block(&[marker])
            .and_then(|()| self.write_text(&Fragment::concat(&block)));
        Self::report(result);
    }

    fn on_fragment(&mut self, fragment: Fragment) {
        let result = self.write_text(fragment.as_str());
        Self::report(result);
    }

    fn on_abort(&mut self, notice: AbortNotice) {
        let lines = intervention(&notice)
            .into_iter()
            .map(|line| style(line).red().bold().to_string())
            .collect::<Vec<_>>();
        let result = self.write_block(&lines);
        Self::report(result);
    }

    fn on_blocked_wait(&mut self) {
        let marker = style("[stream finished, waiting for verdict]").yellow().to_string();
        let result = self.write_block(&[marker]);
        Self::report(result);
    }
}

/// Lines shown when a race is aborted.
pub fn intervention(notice: &AbortNotice) -> [String; 2] {
    [
        format!("[intervention] {}", notice.reason),
        format!("Blocked content: '{}...'", notice.preview),
    ]
}

/// Upper-case label of a race state.
pub fn state_label(state: RaceState) -> &'static str {
    match state {
        RaceState::Pending => "PENDING",
        RaceState::BlockedWait => "BLOCKED_WAIT",
        RaceState::Cleared => "CLEARED",
        RaceState::Aborted => "ABORTED",
    }
}

/// One-line summary of a finished race.
pub fn summary(report: &RaceReport) -> String {
    format!(
        "[summary] {state} (verdict {verdict}) | {delivered}/{observed} fragments delivered | blocked wait: {wait} | verdict after {verdict_ms} ms | total {total_ms} ms",
        state = state_label(report.state),
        verdict = report.verdict(),
        delivered = report.fragments_delivered,
        observed = report.fragments_observed,
        wait = if report.blocked_wait { "yes" } else { "no" },
        verdict_ms = report.time_to_verdict.as_millis(),
        total_ms = report.elapsed.as_millis(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    fn report(state: RaceState, blocked_wait: bool) -> RaceReport {
        RaceReport {
            state,
            blocked_wait,
            fragments_observed: 6,
            fragments_delivered: 6,
            released_block: 3,
            time_to_verdict: Duration::from_millis(120),
            elapsed: Duration::from_millis(300),
        }
    }

    #[test]
    fn test_intervention_lines() {
        let notice = AbortNotice::blocked(&[Fragment::new("I"), Fragment::new(" can")], 50);
        let [headline, content] = intervention(&notice);
        assert_eq!(headline, "[intervention] validation_blocked");
        assert_eq!(content, "Blocked content: 'I can...'");
    }

    #[test]
    fn test_summary_for_cleared_race() {
        let line = summary(&report(RaceState::Cleared, false));
        assert!(line.starts_with("[summary] CLEARED (verdict SAFE)"));
        assert!(line.contains("6/6 fragments delivered"));
        assert!(line.contains("blocked wait: no"));
        assert!(line.contains("verdict after 120 ms"));
    }

    #[test]
    fn test_summary_for_aborted_race() {
        let line = summary(&report(RaceState::Aborted, true));
        assert!(line.starts_with("[summary] ABORTED (verdict UNSAFE)"));
        assert!(line.contains("blocked wait: yes"));
    }
}
