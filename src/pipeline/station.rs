//! Core station abstraction and runner for the response pipeline.
//!
//! A station consumes one channel and optionally feeds another. The runner
//! owns the loop: it polls the input with a short timeout so the cancellation
//! token is re-checked even when nothing arrives, and it guarantees the
//! output stream is closed with exactly one end-of-stream sentinel however
//! the station stops.

use crate::error::{Result, TalkbackError};
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::error::{ErrorReporter, StationError};
use crate::pipeline::gate::TurnPermit;
use crate::pipeline::types::StreamItem;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Everything a worker needs from its turn, passed explicitly at spawn time.
///
/// Holding a context keeps the turn alive: the next turn cannot start until
/// every clone has been dropped.
#[derive(Clone)]
pub struct WorkerContext {
    /// Cancellation flag shared by all workers of the turn.
    pub token: CancellationToken,
    /// Maximum time a worker blocks on an empty channel.
    pub poll_interval: Duration,
    /// Where station errors go.
    pub reporter: Arc<dyn ErrorReporter>,
    _permit: Option<Arc<TurnPermit>>,
    // Never sent on: the channel disconnects once every clone is gone
    _exit: Option<Sender<()>>,
}

impl WorkerContext {
    /// Creates a context that is not tied to a turn gate.
    pub fn new(
        token: CancellationToken,
        poll_interval: Duration,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            token,
            poll_interval,
            reporter,
            _permit: None,
            _exit: None,
        }
    }

    pub(crate) fn with_permit(mut self, permit: Arc<TurnPermit>) -> Self {
        self._permit = Some(permit);
        self
    }

    /// Ties `exit` to this context: its receiver sees a disconnect as soon
    /// as the last clone is dropped.
    pub(crate) fn with_exit_signal(mut self, exit: Sender<()>) -> Self {
        self._exit = Some(exit);
        self
    }
}

/// Sending half of a station's output.
///
/// Refuses new items once the turn is cancelled, and sends the end-of-stream
/// sentinel exactly once, on [`close`](Self::close) or drop.
pub struct Emitter<O> {
    tx: Option<Sender<StreamItem<O>>>,
    token: CancellationToken,
    sent: usize,
}

impl<O> Emitter<O> {
    /// Creates an emitter. `None` makes a terminal station's emitter that
    /// only tracks cancellation.
    pub fn new(tx: Option<Sender<StreamItem<O>>>, token: CancellationToken) -> Self {
        Self { tx, token, sent: 0 }
    }

    /// Sends an item downstream.
    ///
    /// Fails with [`StationError::Cancelled`] once the token is set, and with
    /// a fatal error if the consumer has gone away.
    pub fn emit(&mut self, item: O) -> std::result::Result<(), StationError> {
        if self.token.is_cancelled() {
            return Err(StationError::Cancelled);
        }
        if let Some(ref tx) = self.tx
            && tx.send(StreamItem::Item(item)).is_err()
        {
            return Err(StationError::Fatal("downstream channel closed".to_string()));
        }
        self.sent += 1;
        Ok(())
    }

    /// Returns true if the turn has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of items emitted so far.
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Sends the end-of-stream sentinel. Later calls do nothing.
    pub fn close(&mut self) {
        if let Some(tx) = self.tx.take()
            && tx.send(StreamItem::End).is_err()
        {
            // Consumer already gone - nobody left to tell
        }
    }
}

impl<O> Drop for Emitter<O> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A processing station in the response pipeline.
pub trait Station: Send + 'static {
    /// The input type this station receives.
    type Input: Send + 'static;
    /// The output type this station produces.
    type Output: Send + 'static;

    /// Processes a single input item, emitting zero or more outputs.
    ///
    /// Returns:
    /// - `Ok(())` - item handled
    /// - `Err(Recoverable)` - item skipped, station continues
    /// - `Err(Fatal)` / `Err(Cancelled)` - station stops
    fn process(
        &mut self,
        input: Self::Input,
        out: &mut Emitter<Self::Output>,
    ) -> std::result::Result<(), StationError>;

    /// Called once when the input stream ends normally, before the output
    /// sentinel is sent. Override to flush buffered state.
    fn finish(
        &mut self,
        _out: &mut Emitter<Self::Output>,
    ) -> std::result::Result<(), StationError> {
        Ok(())
    }

    /// Returns the name of this station for logging and error reporting.
    fn name(&self) -> &'static str;

    /// Number of units this station completed (sentences spoken, chunks
    /// played, ...). Returned from the worker thread when it exits.
    fn completed(&self) -> usize {
        0
    }

    /// Called when the station is shutting down, for any reason.
    fn shutdown(&mut self) {}
}

/// Handle to a pipeline worker thread.
///
/// The thread's return value is the number of units it completed.
pub struct WorkerHandle {
    name: &'static str,
    handle: JoinHandle<usize>,
}

impl WorkerHandle {
    /// Spawns a named worker thread.
    pub fn spawn<F>(name: &'static str, body: F) -> Result<Self>
    where
        F: FnOnce() -> usize + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(format!("talkback-{name}"))
            .spawn(body)
            .map_err(|e| TalkbackError::WorkerSpawn {
                message: format!("{name}: {e}"),
            })?;
        Ok(Self { name, handle })
    }

    /// Name of the worker.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true once the thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the worker thread to complete.
    pub fn join(self) -> std::result::Result<usize, String> {
        let name = self.name;
        self.handle
            .join()
            .map_err(|_| format!("Worker '{}' thread panicked", name))
    }
}

/// Runs a station in a dedicated thread.
pub struct StationRunner<S: Station> {
    worker: WorkerHandle,
    _phantom: PhantomData<S>,
}

impl<S: Station> StationRunner<S> {
    /// Spawns a new station in a dedicated thread.
    ///
    /// # Arguments
    /// * `station` - The station implementation to run
    /// * `input_rx` - Channel to receive inputs from
    /// * `output_tx` - Channel to send outputs to (`None` for terminal stations)
    /// * `ctx` - Turn context (cancellation, poll interval, error reporter)
    pub fn spawn(
        mut station: S,
        input_rx: Receiver<StreamItem<S::Input>>,
        output_tx: Option<Sender<StreamItem<S::Output>>>,
        ctx: WorkerContext,
    ) -> Result<Self> {
        let worker = WorkerHandle::spawn(station.name(), move || {
            Self::run_station(&mut station, input_rx, output_tx, ctx)
        })?;

        Ok(Self {
            worker,
            _phantom: PhantomData,
        })
    }

    /// Main processing loop for the station.
    fn run_station(
        station: &mut S,
        input_rx: Receiver<StreamItem<S::Input>>,
        output_tx: Option<Sender<StreamItem<S::Output>>>,
        ctx: WorkerContext,
    ) -> usize {
        let station_name = station.name();
        let reporter = ctx.reporter.clone();
        let mut out = Emitter::new(output_tx, ctx.token.clone());

        loop {
            if ctx.token.is_cancelled() {
                reporter.report(station_name, &StationError::Cancelled);
                break;
            }

            match input_rx.recv_timeout(ctx.poll_interval) {
                Ok(StreamItem::Item(input)) => match station.process(input, &mut out) {
                    Ok(()) => {}
                    Err(error @ StationError::Recoverable(_)) => {
                        // Report but continue processing
                        reporter.report(station_name, &error);
                    }
                    Err(error) => {
                        reporter.report(station_name, &error);
                        break;
                    }
                },
                Ok(StreamItem::End) => {
                    if let Err(error) = station.finish(&mut out) {
                        reporter.report(station_name, &error);
                    }
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    // Nothing yet - loop around to re-check cancellation
                }
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::debug!(
                        station = station_name,
                        "input closed without end-of-stream marker"
                    );
                    if let Err(error) = station.finish(&mut out) {
                        reporter.report(station_name, &error);
                    }
                    break;
                }
            }
        }

        // Cleanup on shutdown
        station.shutdown();
        out.close();
        tracing::debug!(station = station_name, sent = out.sent(), "station stopped");

        // Release the turn only after the sentinel is out
        drop(ctx);
        station.completed()
    }

    /// Waits for the station thread to complete.
    pub fn join(self) -> std::result::Result<usize, String> {
        self.worker.join()
    }

    /// Returns the name of the station.
    pub fn name(&self) -> &'static str {
        self.worker.name()
    }

    /// Converts into an untyped worker handle.
    pub fn into_worker(self) -> WorkerHandle {
        self.worker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    // Mock station that doubles integers
    struct DoublerStation {
        shutdown_called: Arc<AtomicBool>,
    }

    impl Station for DoublerStation {
        type Input = i32;
        type Output = i32;

        fn process(
            &mut self,
            input: i32,
            out: &mut Emitter<i32>,
        ) -> std::result::Result<(), StationError> {
            out.emit(input * 2)
        }

        fn name(&self) -> &'static str {
            "Doubler"
        }

        fn shutdown(&mut self) {
            self.shutdown_called.store(true, Ordering::SeqCst);
        }
    }

    // Mock station that emits each input n times, then a trailer on finish
    struct FanOutStation;

    impl Station for FanOutStation {
        type Input = i32;
        type Output = i32;

        fn process(
            &mut self,
            input: i32,
            out: &mut Emitter<i32>,
        ) -> std::result::Result<(), StationError> {
            for _ in 0..input {
                out.emit(input)?;
            }
            Ok(())
        }

        fn finish(&mut self, out: &mut Emitter<i32>) -> std::result::Result<(), StationError> {
            out.emit(-1)
        }

        fn name(&self) -> &'static str {
            "FanOut"
        }
    }

    // Mock station that fails on certain inputs
    struct FailingStation {
        fail_on: i32,
        fatal: bool,
    }

    impl Station for FailingStation {
        type Input = i32;
        type Output = i32;

        fn process(
            &mut self,
            input: i32,
            out: &mut Emitter<i32>,
        ) -> std::result::Result<(), StationError> {
            if input == self.fail_on {
                let msg = format!("Failed on {}", input);
                if self.fatal {
                    Err(StationError::Fatal(msg))
                } else {
                    Err(StationError::Recoverable(msg))
                }
            } else {
                out.emit(input)
            }
        }

        fn name(&self) -> &'static str {
            "Failing"
        }
    }

    // Mock error reporter that collects errors
    #[derive(Default)]
    struct MockReporter {
        errors: Arc<Mutex<Vec<(String, StationError)>>>,
    }

    impl ErrorReporter for MockReporter {
        fn report(&self, station: &str, error: &StationError) {
            let mut errors = self.errors.lock().unwrap();
            errors.push((station.to_string(), error.clone()));
        }
    }

    fn context(token: &CancellationToken, reporter: Arc<dyn ErrorReporter>) -> WorkerContext {
        WorkerContext::new(token.clone(), Duration::from_millis(20), reporter)
    }

    fn drain(rx: &Receiver<StreamItem<i32>>) -> (Vec<i32>, usize) {
        let mut items = Vec::new();
        let mut ends = 0;
        while let Ok(msg) = rx.recv_timeout(Duration::from_secs(2)) {
            match msg {
                StreamItem::Item(v) => items.push(v),
                StreamItem::End => ends += 1,
            }
        }
        (items, ends)
    }

    #[test]
    fn test_station_runner_basic_processing() {
        let (input_tx, input_rx) = unbounded();
        let (output_tx, output_rx) = unbounded();
        let token = CancellationToken::new();
        let shutdown_flag = Arc::new(AtomicBool::new(false));

        let station = DoublerStation {
            shutdown_called: shutdown_flag.clone(),
        };
        let runner = StationRunner::spawn(
            station,
            input_rx,
            Some(output_tx),
            context(&token, Arc::new(MockReporter::default())),
        )
        .unwrap();

        assert_eq!(runner.name(), "Doubler");

        for i in 1..=3 {
            input_tx.send(StreamItem::Item(i)).unwrap();
        }
        input_tx.send(StreamItem::End).unwrap();

        let (outputs, ends) = drain(&output_rx);
        assert_eq!(outputs, vec![2, 4, 6]);
        assert_eq!(ends, 1);

        runner.join().unwrap();
        assert!(shutdown_flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_station_runner_multiple_outputs_and_finish() {
        let (input_tx, input_rx) = unbounded();
        let (output_tx, output_rx) = unbounded();
        let token = CancellationToken::new();

        let runner = StationRunner::spawn(
            FanOutStation,
            input_rx,
            Some(output_tx),
            context(&token, Arc::new(MockReporter::default())),
        )
        .unwrap();

        input_tx.send(StreamItem::Item(2)).unwrap();
        input_tx.send(StreamItem::Item(3)).unwrap();
        input_tx.send(StreamItem::End).unwrap();

        let (outputs, ends) = drain(&output_rx);
        assert_eq!(outputs, vec![2, 2, 3, 3, 3, -1]);
        assert_eq!(ends, 1);
        runner.join().unwrap();
    }

    #[test]
    fn test_station_runner_recoverable_error_continues() {
        let (input_tx, input_rx) = unbounded();
        let (output_tx, output_rx) = unbounded();
        let token = CancellationToken::new();
        let reporter = Arc::new(MockReporter::default());
        let errors = reporter.errors.clone();

        let station = FailingStation {
            fail_on: 2,
            fatal: false,
        };
        let runner =
            StationRunner::spawn(station, input_rx, Some(output_tx), context(&token, reporter))
                .unwrap();

        for i in 1..=3 {
            input_tx.send(StreamItem::Item(i)).unwrap();
        }
        input_tx.send(StreamItem::End).unwrap();

        let (outputs, ends) = drain(&output_rx);
        assert_eq!(outputs, vec![1, 3]);
        assert_eq!(ends, 1);

        let reported = errors.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].0, "Failing");
        assert_eq!(
            reported[0].1,
            StationError::Recoverable("Failed on 2".to_string())
        );
        drop(reported);

        runner.join().unwrap();
    }

    #[test]
    fn test_station_runner_fatal_error_closes_stream() {
        let (input_tx, input_rx) = unbounded();
        let (output_tx, output_rx) = unbounded();
        let token = CancellationToken::new();

        let station = FailingStation {
            fail_on: 2,
            fatal: true,
        };
        let runner = StationRunner::spawn(
            station,
            input_rx,
            Some(output_tx),
            context(&token, Arc::new(MockReporter::default())),
        )
        .unwrap();

        for i in 1..=3 {
            input_tx.send(StreamItem::Item(i)).unwrap();
        }

        let (outputs, ends) = drain(&output_rx);
        assert_eq!(outputs, vec![1]);
        assert_eq!(ends, 1);
        runner.join().unwrap();
    }

    #[test]
    fn test_exit_signal_fires_when_last_context_drops() {
        let (exit_tx, exited) = crossbeam_channel::bounded::<()>(0);
        let ctx = context(&CancellationToken::new(), Arc::new(MockReporter::default()))
            .with_exit_signal(exit_tx);
        let clone = ctx.clone();

        drop(ctx);
        assert_eq!(
            exited.recv_timeout(Duration::from_millis(20)),
            Err(RecvTimeoutError::Timeout)
        );

        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            drop(clone);
        });
        let start = Instant::now();
        assert_eq!(
            exited.recv_timeout(Duration::from_secs(2)),
            Err(RecvTimeoutError::Disconnected)
        );
        assert!(start.elapsed() < Duration::from_secs(1));
        worker.join().unwrap();
    }

    #[test]
    fn test_station_runner_stops_on_cancel_without_input() {
        let (_input_tx, input_rx) = unbounded::<StreamItem<i32>>();
        let (output_tx, output_rx) = unbounded();
        let token = CancellationToken::new();
        let reporter = Arc::new(MockReporter::default());
        let errors = reporter.errors.clone();

        let poll = Duration::from_millis(100);

        let runner = StationRunner::spawn(
            FanOutStation,
            input_rx,
            Some(output_tx),
            WorkerContext::new(token.clone(), poll, reporter),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        let cancelled_at = Instant::now();
        token.cancel();

        let (outputs, ends) = drain(&output_rx);
        let unwind = cancelled_at.elapsed();
        runner.join().unwrap();

        // Nothing in flight, so two poll intervals at most
        assert!(unwind <= 2 * poll, "unwind took {unwind:?}");
        assert!(outputs.is_empty(), "finish must not run on cancel");
        assert_eq!(ends, 1);
        assert!(
            errors
                .lock()
                .unwrap()
                .iter()
                .any(|(_, e)| *e == StationError::Cancelled)
        );
    }

    #[test]
    fn test_station_runner_input_disconnected_is_end() {
        let (input_tx, input_rx) = unbounded();
        let (output_tx, output_rx) = unbounded();
        let token = CancellationToken::new();

        let runner = StationRunner::spawn(
            FanOutStation,
            input_rx,
            Some(output_tx),
            context(&token, Arc::new(MockReporter::default())),
        )
        .unwrap();

        input_tx.send(StreamItem::Item(1)).unwrap();
        drop(input_tx);

        let (outputs, ends) = drain(&output_rx);
        assert_eq!(outputs, vec![1, -1]);
        assert_eq!(ends, 1);
        runner.join().unwrap();
    }

    #[test]
    fn test_emitter_refuses_after_cancel() {
        let (tx, rx) = unbounded();
        let token = CancellationToken::new();
        let mut emitter = Emitter::new(Some(tx), token.clone());

        emitter.emit(1).unwrap();
        token.cancel();
        assert_eq!(emitter.emit(2), Err(StationError::Cancelled));
        assert_eq!(emitter.sent(), 1);

        drop(emitter);
        let (items, ends) = drain(&rx);
        assert_eq!(items, vec![1]);
        assert_eq!(ends, 1);
    }

    #[test]
    fn test_emitter_close_sends_one_sentinel() {
        let (tx, rx) = unbounded::<StreamItem<i32>>();
        let mut emitter = Emitter::new(Some(tx), CancellationToken::new());

        emitter.close();
        emitter.close();
        drop(emitter);

        let (_, ends) = drain(&rx);
        assert_eq!(ends, 1);
    }

    #[test]
    fn test_emitter_without_channel_counts_items() {
        let mut emitter: Emitter<()> = Emitter::new(None, CancellationToken::new());
        emitter.emit(()).unwrap();
        emitter.emit(()).unwrap();
        assert_eq!(emitter.sent(), 2);
    }
}
