use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use modelpadf::engine::progress::{Progress, ProgressCallback};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 100;
const CORRELATING: &str = "Correlating";

/// The line shown for a finished loop, with its cosine similarity once there is a previous loop.
pub fn loop_summary(loop_index: usize, total_loops: usize, similarity: Option<f64>) -> String {
    match similarity {
        Some(similarity) => format!(
            "Loop {}/{}  cosine similarity {:.6}",
            loop_index, total_loops, similarity
        ),
        None => format!("Loop {}/{}", loop_index, total_loops),
    }
}

/// Renders workflow phases as spinners and the per-atom correlation pass as a bar.
#[derive(Clone)]
pub struct CliProgressHandler {
    bar: Arc<Mutex<ProgressBar>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr())
            .with_style(Self::phase_style())
            .with_message("Preparing");
        bar.finish_and_clear();

        Self {
            bar: Arc::new(Mutex::new(bar)),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let bar = Arc::clone(&self.bar);

        Box::new(move |progress: Progress| {
            let Ok(bar) = bar.lock() else {
                warn!("Progress bar lock is poisoned; dropping a progress update.");
                return;
            };

            match progress {
                Progress::PhaseStart { name } => {
                    bar.reset();
                    bar.set_length(0);
                    bar.set_style(Self::phase_style());
                    bar.set_message(name.to_string());
                    bar.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                }
                Progress::PhaseFinish => {
                    bar.disable_steady_tick();
                    let phase = bar.message();
                    bar.finish_with_message(format!("✓ {}", phase));
                }
                Progress::TaskStart { total_steps } => {
                    bar.disable_steady_tick();
                    bar.reset();
                    bar.set_style(Self::atom_style());
                    bar.set_length(total_steps);
                    bar.set_position(0);
                    bar.set_message(CORRELATING);
                }
                Progress::TaskIncrement => bar.inc(1),
                Progress::TaskFinish => {
                    let length = bar.length().unwrap_or(0);
                    bar.set_position(length.max(bar.position()));
                    bar.finish();
                }
                Progress::LoopFinish {
                    loop_index,
                    total_loops,
                    similarity,
                } => {
                    let summary = loop_summary(loop_index, total_loops, similarity);
                    if similarity.is_some() {
                        bar.println(format!("  {}", summary));
                    } else {
                        bar.set_message(summary);
                    }
                }
                Progress::Message(msg) if bar.is_finished() => bar.set_message(msg),
                Progress::Message(msg) => bar.println(format!("  {}", msg)),
            }
        })
    }

    fn phase_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn atom_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<12} {bar:36.green/white} {pos:>6}/{len} atoms, eta {eta}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .with_key(
                "eta",
                |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let _ = write!(w, "{:.0}s", state.eta().as_secs_f64());
                },
            )
            .progress_chars("=> ")
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}
