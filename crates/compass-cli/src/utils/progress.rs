use compass::engine::progress::{Progress, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;

/// Renders the progress of a run on stderr.
///
/// A phase shows as a spinner. Each batch of parallel work inside it (reaction
/// ranges, metabolite ranges, samples) gets its own bar and leaves a one-line tally
/// of completed units behind when it ends.
#[derive(Clone)]
pub struct CliProgressHandler {
    display: Arc<Mutex<RunDisplay>>,
}

struct RunDisplay {
    bar: ProgressBar,
    hidden: bool,
    phase: Option<(&'static str, Instant)>,
    batch: Option<&'static str>,
    /// Lines left on screen, in order.
    printed: Vec<String>,
}

impl RunDisplay {
    fn new(hidden: bool) -> Self {
        let mut display = Self {
            bar: ProgressBar::hidden(),
            hidden,
            phase: None,
            batch: None,
            printed: Vec::new(),
        };
        display.bar = display.spinner("Initializing...".to_string());
        display.bar.finish_and_clear();
        display
    }

    fn spinner(&self, message: String) -> ProgressBar {
        let bar = ProgressBar::new_spinner().with_style(spinner_style());
        if self.hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_message(message);
        bar
    }

    fn print(&mut self, line: String) {
        self.bar.println(&line);
        self.printed.push(line);
    }

    fn phase_name(&self) -> &'static str {
        self.phase.map(|(name, _)| name).unwrap_or_default()
    }

    fn handle(&mut self, event: Progress) {
        match event {
            Progress::PhaseStart { name } => {
                self.bar.finish_and_clear();
                self.phase = Some((name, Instant::now()));
                self.batch = None;
                self.bar = self.spinner(format!("{name}..."));
                self.bar
                    .enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
            }
            Progress::TaskStart { label, total_steps } => {
                self.batch = Some(label);
                self.bar.disable_steady_tick();
                self.bar.reset();
                self.bar.set_style(bar_style());
                self.bar.set_length(total_steps);
                self.bar.set_position(0);
                self.bar.set_prefix(self.phase_name());
                self.bar.set_message(label);
            }
            Progress::TaskIncrement => self.bar.inc(1),
            Progress::TaskFinish => {
                let done = self.bar.position();
                let total = self.bar.length().unwrap_or(done);
                let label = self.batch.take().unwrap_or("tasks");
                let mut tally = format!("  {label}: {done}/{total}");
                if done < total {
                    tally.push_str(" (stopped early)");
                }
                self.print(tally);

                self.bar.set_style(spinner_style());
                self.bar.set_message(format!("{}...", self.phase_name()));
                self.bar
                    .enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
            }
            Progress::PhaseFinish => {
                let line = match self.phase.take() {
                    Some((name, started)) => format!("✓ {name} ({:.1?})", started.elapsed()),
                    None => "✓ Done".to_string(),
                };
                self.bar.disable_steady_tick();
                self.bar.finish_with_message(line.clone());
                self.printed.push(line);
            }
            Progress::PhaseSkipped { name } => {
                self.bar.finish_and_clear();
                self.phase = None;
                self.print(format!("↷ {name}: completed in a previous run"));
            }
            Progress::Message(message) => self.print(format!("  {message}")),
        }
    }
}

impl CliProgressHandler {
    pub fn new() -> Self {
        Self::with_display(RunDisplay::new(false))
    }

    fn with_display(display: RunDisplay) -> Self {
        Self {
            display: Arc::new(Mutex::new(display)),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let display = self.display.clone();

        Box::new(move |progress: Progress| {
            let Ok(mut display) = display.lock() else {
                warn!("Progress display mutex was poisoned. Cannot update progress.");
                return;
            };
            display.handle(progress);
        })
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:.bold} {msg:<18} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}
