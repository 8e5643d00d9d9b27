//! Response pipeline, one turn at a time.
//!
//! Each turn wires four workers through three unbounded channels:
//!
//! ```text
//! TextSource ─┬─ display ──> DisplayStation ──> DisplaySink
//!             └─ text ─────> SynthesisStation ─ audio ─> PlaybackStation ──> AudioOutput
//! ```

use crate::audio::AudioOutput;
use crate::defaults;
use crate::display::DisplaySink;
use crate::error::Result;
use crate::llm::TextGenerator;
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::display_station::DisplayStation;
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::gate::{PipelineState, TurnGate};
use crate::pipeline::playback_station::PlaybackStation;
use crate::pipeline::station::{StationRunner, WorkerContext, WorkerHandle};
use crate::pipeline::synthesis_station::SynthesisStation;
use crate::pipeline::text_source::TextSource;
use crate::tts::Synthesizer;
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded, unbounded};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Configuration for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Maximum time a worker blocks on an empty channel before re-checking
    /// the cancellation token.
    pub poll_interval: Duration,
    /// How long a cancelled turn may take to unwind before the remaining
    /// workers are detached.
    pub cancel_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: defaults::poll_interval(),
            cancel_timeout: defaults::cancel_timeout(),
        }
    }
}

/// Outcome of a finished turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnReport {
    /// Turn number, starting at 1.
    pub turn: u64,
    /// True if the turn was interrupted.
    pub cancelled: bool,
    /// Fragments received from the text generator.
    pub fragments: usize,
    /// Sentences fully synthesized.
    pub sentences: usize,
    /// Audio chunks played to completion.
    pub chunks_played: usize,
    /// Workers still running when the cancel timeout expired.
    pub stragglers: Vec<&'static str>,
    /// Wall time from start to retirement.
    pub elapsed: Duration,
}

/// Streaming response pipeline: TextGenerator → Synthesizer → AudioOutput,
/// with the raw text mirrored to a DisplaySink.
pub struct Pipeline {
    config: PipelineConfig,
    generator: Arc<dyn TextGenerator>,
    synthesizer: Arc<dyn Synthesizer>,
    output: Arc<dyn AudioOutput>,
    display: Arc<dyn DisplaySink>,
    error_reporter: Arc<dyn ErrorReporter>,
    gate: Arc<TurnGate>,
}

impl Pipeline {
    /// Creates a new pipeline with default error reporter.
    pub fn new(
        config: PipelineConfig,
        generator: Arc<dyn TextGenerator>,
        synthesizer: Arc<dyn Synthesizer>,
        output: Arc<dyn AudioOutput>,
        display: Arc<dyn DisplaySink>,
    ) -> Self {
        Self {
            config,
            generator,
            synthesizer,
            output,
            display,
            error_reporter: Arc::new(LogReporter),
            gate: TurnGate::new(),
        }
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.gate.state()
    }

    /// Handle for interrupting turns from another thread.
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            gate: self.gate.clone(),
        }
    }

    /// Interrupts the turn in flight. Returns false if there is none.
    pub fn interrupt(&self) -> bool {
        self.gate.cancel(None)
    }

    /// Waits up to `timeout` for the previous turn's workers to exit.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.gate.wait_idle(timeout)
    }

    /// Starts a turn for `input`.
    ///
    /// Blocks until every worker of the previous turn has exited, so two
    /// turns never overlap.
    pub fn start_turn(&self, input: &str) -> Result<TurnHandle> {
        let token = CancellationToken::new();
        let (turn, permit) = self.gate.acquire(token.clone());
        let started = Instant::now();
        tracing::info!(turn, model = self.generator.model_name(), "turn started");

        let (exit_tx, exited) = bounded(0);
        let ctx = WorkerContext::new(
            token.clone(),
            self.config.poll_interval,
            self.error_reporter.clone(),
        )
        .with_permit(permit)
        .with_exit_signal(exit_tx);

        match self.spawn_workers(input, ctx) {
            Ok(workers) => Ok(TurnHandle {
                turn,
                token,
                gate: self.gate.clone(),
                workers,
                exited,
                poll_interval: self.config.poll_interval,
                cancel_timeout: self.config.cancel_timeout,
                started,
            }),
            Err(e) => {
                // Workers already running see the token and unwind
                self.gate.cancel(Some(turn));
                Err(e)
            }
        }
    }

    /// Runs a turn to completion.
    pub fn run_turn(&self, input: &str) -> Result<TurnReport> {
        Ok(self.start_turn(input)?.wait())
    }

    /// Spawns consumers first so nothing the producer sends sits unread.
    fn spawn_workers(&self, input: &str, ctx: WorkerContext) -> Result<Vec<WorkerHandle>> {
        let (display_tx, display_rx) = unbounded();
        let (text_tx, text_rx) = unbounded();
        let (audio_tx, audio_rx) = unbounded();

        let mut workers = Vec::with_capacity(4);

        let playback = PlaybackStation::new(self.output.clone());
        workers.push(StationRunner::spawn(playback, audio_rx, None, ctx.clone())?.into_worker());

        let synthesis = SynthesisStation::new(self.synthesizer.clone())
            .with_error_reporter(self.error_reporter.clone());
        workers.push(
            StationRunner::spawn(synthesis, text_rx, Some(audio_tx), ctx.clone())?.into_worker(),
        );

        let display = DisplayStation::new(self.display.clone());
        workers.push(StationRunner::spawn(display, display_rx, None, ctx.clone())?.into_worker());

        let source = TextSource::new(self.generator.clone());
        workers.push(source.spawn(input.to_string(), display_tx, text_tx, ctx)?);

        Ok(workers)
    }
}

/// Cloneable handle that interrupts whatever turn is in flight.
#[derive(Clone)]
pub struct Interrupter {
    gate: Arc<TurnGate>,
}

impl Interrupter {
    /// Moves a running or draining turn to `Cancelling`. Returns false when
    /// the pipeline is idle or already cancelling.
    pub fn interrupt(&self) -> bool {
        let interrupted = self.gate.cancel(None);
        if interrupted {
            tracing::info!("turn interrupted");
        }
        interrupted
    }

    /// True while a turn is in flight.
    pub fn is_busy(&self) -> bool {
        self.gate.state().is_active()
    }
}

/// Handle to a turn in flight.
///
/// Dropping the handle without [`wait`](Self::wait) or
/// [`cancel`](Self::cancel) detaches the workers; the gate still reopens
/// when they exit.
pub struct TurnHandle {
    turn: u64,
    token: CancellationToken,
    gate: Arc<TurnGate>,
    workers: Vec<WorkerHandle>,
    /// Disconnects once every worker has dropped its context.
    exited: Receiver<()>,
    poll_interval: Duration,
    cancel_timeout: Duration,
    started: Instant,
}

impl TurnHandle {
    /// Turn number, starting at 1.
    pub fn id(&self) -> u64 {
        self.turn
    }

    /// This turn's cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True once every worker has exited.
    pub fn is_finished(&self) -> bool {
        self.workers.iter().all(WorkerHandle::is_finished)
    }

    /// Lets the turn drain naturally and waits for all workers.
    ///
    /// If the turn is interrupted meanwhile, waiting becomes bounded by the
    /// cancel timeout.
    pub fn wait(self) -> TurnReport {
        self.gate
            .transition(self.turn, &[PipelineState::Running], PipelineState::Draining);
        self.retire(None)
    }

    /// Interrupts the turn and waits, bounded, for the workers to unwind.
    pub fn cancel(self) -> TurnReport {
        if self.gate.cancel(Some(self.turn)) {
            tracing::info!(turn = self.turn, "turn interrupted");
        }
        // Covers a turn that was already past the gate
        self.token.cancel();
        let deadline = Instant::now() + self.cancel_timeout;
        self.retire(Some(deadline))
    }

    /// Waits for every worker to exit, or for the deadline to pass, then
    /// joins what has exited.
    ///
    /// Remaining threads are detached after the deadline. They still hold
    /// the turn permit, so the next turn waits for them.
    fn retire(mut self, mut deadline: Option<Instant>) -> TurnReport {
        let mut report = TurnReport {
            turn: self.turn,
            ..TurnReport::default()
        };

        let all_exited = loop {
            if deadline.is_none() && self.token.is_cancelled() {
                deadline = Some(Instant::now() + self.cancel_timeout);
            }

            // Without a deadline, wake up now and then to notice an interrupt
            let waited = match deadline {
                Some(deadline) => self.exited.recv_deadline(deadline),
                None => self.exited.recv_timeout(self.poll_interval),
            };
            match waited {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break true,
                Err(RecvTimeoutError::Timeout) => {
                    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        break false;
                    }
                }
            }
        };

        if all_exited {
            for worker in self.workers.drain(..) {
                record(&mut report, worker);
            }
        } else {
            let (finished, running): (Vec<_>, Vec<_>) =
                self.workers.drain(..).partition(WorkerHandle::is_finished);
            for worker in finished {
                record(&mut report, worker);
            }
            report.stragglers = running.iter().map(WorkerHandle::name).collect();
            tracing::warn!(
                turn = self.turn,
                stragglers = ?report.stragglers,
                "cancel timeout: worker(s) still running, detaching"
            );
        }

        report.cancelled = self.token.is_cancelled();
        report.elapsed = self.started.elapsed();
        tracing::info!(
            turn = report.turn,
            cancelled = report.cancelled,
            fragments = report.fragments,
            sentences = report.sentences,
            chunks = report.chunks_played,
            elapsed = ?report.elapsed,
            "turn finished"
        );
        report
    }
}

fn record(report: &mut TurnReport, worker: WorkerHandle) {
    let name = worker.name();
    match worker.join() {
        Ok(count) => match name {
            "text-source" => report.fragments = count,
            "synthesis" => report.sentences = count,
            "playback" => report.chunks_played = count,
            _ => {}
        },
        Err(msg) => tracing::error!(worker = name, "{msg}"),
    }
}
