//! Talkback application entry point.
//!
//! Wires the configured collaborators into a [`Pipeline`] and runs the
//! conversation loop: read a prompt, stream the answer, repeat.

#[cfg(feature = "cpal-audio")]
use crate::audio::CpalOutput;
#[cfg(not(feature = "cpal-audio"))]
use crate::audio::CommandPlayer;
use crate::audio::{AudioOutput, SilentOutput};
use crate::config::Config;
use crate::defaults;
use crate::display::{DisplaySink, StdoutDisplay};
use crate::error::{Result, TalkbackError};
use crate::llm::ollama::OllamaClient;
use crate::pipeline::{Interrupter, Pipeline, TurnReport};
use crate::tts::{CommandSynthesizer, SilentSynthesizer, Synthesizer};
use owo_colors::OwoColorize;
use std::io::{BufRead, Write};
use std::sync::Arc;

/// Builds the production pipeline from configuration.
///
/// With `no_speech`, no synthesis command or player is ever started. With
/// `llm.start_server`, a local `ollama serve` is launched if nothing answers.
pub fn build_pipeline(
    config: &Config,
    no_speech: bool,
    display: Arc<dyn DisplaySink>,
) -> Result<Pipeline> {
    let generator = Arc::new(OllamaClient::new(config.ollama_config())?);
    if config.llm.start_server {
        generator.ensure_server()?;
    }

    let (synthesizer, output): (Arc<dyn Synthesizer>, Arc<dyn AudioOutput>) = if no_speech {
        (Arc::new(SilentSynthesizer), Arc::new(SilentOutput))
    } else {
        (
            Arc::new(CommandSynthesizer::new(config.synthesizer_config())),
            speaker_output(config)?,
        )
    };

    tracing::debug!(
        model = %config.llm.model,
        tts = synthesizer.name(),
        player = output.name(),
        "pipeline configured"
    );
    Ok(Pipeline::new(
        config.pipeline_config(),
        generator,
        synthesizer,
        output,
        display,
    ))
}

/// Opens the configured output device.
#[cfg(feature = "cpal-audio")]
fn speaker_output(config: &Config) -> Result<Arc<dyn AudioOutput>> {
    Ok(Arc::new(CpalOutput::new(config.audio.device.as_deref())?))
}

/// Pipes audio into the configured player command.
#[cfg(not(feature = "cpal-audio"))]
fn speaker_output(config: &Config) -> Result<Arc<dyn AudioOutput>> {
    Ok(Arc::new(CommandPlayer::new(
        config.audio.player.clone(),
        config.audio.player_args.clone(),
    )))
}

/// True if `input` ends the session (`exit` or `quit`, any case).
pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    defaults::EXIT_COMMANDS
        .iter()
        .any(|cmd| cmd.eq_ignore_ascii_case(input))
}

/// Run the interactive conversation loop on stdin/stdout.
///
/// Ctrl+C interrupts the answer being spoken; pressed while waiting for
/// input, it ends the session.
pub fn run_interactive(config: Config, no_speech: bool) -> Result<()> {
    let pipeline = build_pipeline(&config, no_speech, Arc::new(StdoutDisplay))?;
    spawn_interrupt_listener(pipeline.interrupter())?;

    eprintln!(
        "{} Talking to {}. Type {} to leave, Ctrl+C to interrupt.",
        "talkback".bold(),
        config.llm.model.cyan(),
        "exit".bold()
    );

    let stdin = std::io::stdin();
    let turns = converse(&pipeline, stdin.lock(), &mut std::io::stdout())?;
    tracing::info!(turns, "session ended");
    Ok(())
}

/// Run a single turn for `prompt` and wait for it to finish.
pub fn run_once(config: Config, prompt: &str, no_speech: bool) -> Result<TurnReport> {
    let pipeline = build_pipeline(&config, no_speech, Arc::new(StdoutDisplay))?;
    spawn_interrupt_listener(pipeline.interrupter())?;
    pipeline.run_turn(prompt)
}

/// Reads prompts from `input` until EOF or an exit command, running one turn
/// per prompt. Returns the number of turns run.
pub fn converse<R: BufRead, W: Write>(pipeline: &Pipeline, input: R, out: &mut W) -> Result<usize> {
    let mut turns = 0;
    let mut lines = input.lines();

    loop {
        write!(out, "{} ", "You:".bold())?;
        out.flush()?;

        let Some(line) = lines.next() else {
            writeln!(out)?;
            break;
        };
        let line = line?;
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if is_exit_command(prompt) {
            break;
        }

        write!(out, "{} ", "AI:".green().bold())?;
        out.flush()?;

        let report = pipeline.run_turn(prompt)?;
        turns += 1;
        if report.cancelled {
            writeln!(out, "{}", "[interrupted]".dimmed())?;
        }
        if !report.stragglers.is_empty() {
            tracing::warn!(
                stragglers = ?report.stragglers,
                "previous answer is still unwinding; the next one will wait for it"
            );
        }
    }

    Ok(turns)
}

/// Forwards Ctrl+C to the pipeline from a dedicated thread.
///
/// The pipeline is fully synchronous, so the signal future gets a small
/// runtime of its own.
fn spawn_interrupt_listener(interrupter: Interrupter) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("talkback-signals".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("failed to listen for Ctrl+C: {e}");
                        return;
                    }
                    if ctrl_c_ends_session(&interrupter) {
                        // Nothing to interrupt: leave like a plain Ctrl+C would
                        eprintln!();
                        std::process::exit(130);
                    }
                }
            });
        })
        .map_err(|e| TalkbackError::WorkerSpawn {
            message: format!("signal listener: {e}"),
        })?;
    Ok(())
}

/// Handles one Ctrl+C press. Interrupts the turn in flight and returns true
/// only when the pipeline is idle. A turn that is still unwinding keeps the
/// session alive.
fn ctrl_c_ends_session(interrupter: &Interrupter) -> bool {
    !interrupter.interrupt() && !interrupter.is_busy()
}
