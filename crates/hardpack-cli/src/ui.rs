use hardpack::engine::progress::{Progress, ProgressCallback};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::warn;

/// Renders engine [`Progress`] events: one spinner or bar per phase, with the latest
/// value of every run counter (acceptance ratio, sample count) appended to it.
pub struct UiManager {
    mp: Arc<MultiProgress>,
    phase: Option<PhaseDisplay>,
    event_receiver: mpsc::Receiver<Progress>,
    shutdown_receiver: watch::Receiver<bool>,
    _sentinel_bar: ProgressBar,
}

struct PhaseDisplay {
    name: &'static str,
    bar: ProgressBar,
    counters: Vec<(&'static str, f64)>,
}

impl PhaseDisplay {
    fn record(&mut self, label: &'static str, value: f64) {
        match self.counters.iter_mut().find(|(name, _)| *name == label) {
            Some(slot) => slot.1 = value,
            None => self.counters.push((label, value)),
        }
        self.bar.set_message(self.status());
    }

    fn status(&self) -> String {
        let mut status = self.name.to_string();
        for &(label, value) in &self.counters {
            status.push_str(" · ");
            status.push_str(&format_counter(label, value));
        }
        status
    }
}

/// Counts print as integers, ratios with three decimals.
fn format_counter(label: &str, value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{} {}", label, value as i64)
    } else {
        format!("{} {:.3}", label, value)
    }
}

impl UiManager {
    pub fn new() -> (Self, mpsc::Sender<Progress>, watch::Sender<bool>) {
        let (event_sender, event_receiver) = mpsc::channel(1024);
        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let mp = Arc::new(MultiProgress::new());
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
        let _sentinel_bar = mp.add(ProgressBar::hidden());
        let manager = Self {
            mp,
            phase: None,
            event_receiver,
            shutdown_receiver,
            _sentinel_bar,
        };

        (manager, event_sender, shutdown_sender)
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(event) = self.event_receiver.recv() => {
                    self.handle_progress(event);
                }
                result = self.shutdown_receiver.changed() => {
                    if result.is_err() || *self.shutdown_receiver.borrow() {
                        break;
                    }
                }
            }
        }
        // Drain whatever the workflow emitted right before shutdown.
        while let Ok(event) = self.event_receiver.try_recv() {
            self.handle_progress(event);
        }
        if let Some(phase) = self.phase.take() {
            phase.bar.finish_and_clear();
        }
        self._sentinel_bar.finish_and_clear();
    }

    fn handle_progress(&mut self, progress: Progress) {
        match progress {
            Progress::PhaseStart { name } => {
                if let Some(previous) = self.phase.take() {
                    previous.bar.finish_and_clear();
                }

                let bar = self.mp.add(ProgressBar::new_spinner());
                bar.enable_steady_tick(Duration::from_millis(80));
                bar.set_style(Self::spinner_style());
                bar.set_message(name);

                self.phase = Some(PhaseDisplay {
                    name,
                    bar,
                    counters: Vec::new(),
                });
            }
            Progress::PhaseFinish => {
                if let Some(phase) = self.phase.take() {
                    phase.bar.finish_and_clear();
                    self.mp.println(format!("✓ {}", phase.status())).ok();
                }
            }
            Progress::TaskStart { total_steps } => {
                if let Some(phase) = self.phase.as_ref() {
                    phase.bar.set_style(Self::bar_style());
                    phase.bar.set_length(total_steps);
                    phase.bar.set_position(0);
                    phase.bar.disable_steady_tick();
                }
            }
            Progress::TaskIncrement => {
                if let Some(phase) = self.phase.as_ref() {
                    phase.bar.inc(1);
                }
            }
            Progress::TaskFinish => {
                if let Some(phase) = self.phase.as_ref() {
                    if let Some(len) = phase.bar.length() {
                        phase.bar.set_position(len);
                    }
                    phase.bar.finish_with_message(phase.status());
                }
            }
            Progress::Counter { label, value } => {
                if let Some(phase) = self.phase.as_mut() {
                    phase.record(label, value);
                }
            }
            Progress::Message(msg) => {
                self.mp.println(format!("  {}", msg)).ok();
            }
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .expect("Invalid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<48} [{bar:30.cyan/blue}] {pos}/{len} ({eta})")
            .expect("Invalid template")
            .with_key("eta", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
            })
            .progress_chars("━╸ ")
    }
}

/// Forwards engine progress events to the [`UiManager`] without blocking the
/// simulation thread. Events are dropped when the channel is full.
#[derive(Clone)]
pub struct CliProgressHandler {
    sender: mpsc::Sender<Progress>,
}

impl CliProgressHandler {
    pub fn new(sender: mpsc::Sender<Progress>) -> Self {
        Self { sender }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let sender = self.sender.clone();
        Box::new(move |progress: Progress| {
            if let Err(e) = sender.try_send(progress) {
                warn!("Failed to send progress update to UI channel: {}", e);
            }
        })
    }
}
