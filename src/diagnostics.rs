//! System diagnostics and dependency checking.
//!
//! Verifies that the language model server and model, the synthesis command
//! and the audio output are installed and reachable.

use crate::config::Config;
use std::process::Command;

/// Result of a dependency check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Tool is installed and working
    Ok,
    /// Tool is not found
    NotFound,
    /// Tool is found but has issues (e.g., server not running)
    Warning(String),
}

/// Check if a command exists by running it with a harmless flag.
///
/// Some tools print usage with a non-zero status; being able to start the
/// process at all is what matters here.
fn check_command(command: &str, flag: &str) -> CheckResult {
    match Command::new(command).arg(flag).output() {
        Ok(output) if output.status.success() => CheckResult::Ok,
        Ok(_) => CheckResult::Warning(format!("'{}' found but {} failed", command, flag)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckResult::NotFound,
        Err(e) => CheckResult::Warning(format!("Error checking '{}': {}", command, e)),
    }
}

/// Check whether the Ollama server answers on the configured host.
#[cfg(feature = "ollama")]
fn check_ollama_server(config: &Config) -> CheckResult {
    use crate::llm::ollama::OllamaClient;

    match OllamaClient::new(config.ollama_config()) {
        Ok(client) if client.is_reachable() => CheckResult::Ok,
        Ok(_) => CheckResult::Warning(format!(
            "no answer from {} (start it with `ollama serve`)",
            config.llm.host
        )),
        Err(e) => CheckResult::Warning(e.to_string()),
    }
}

#[cfg(not(feature = "ollama"))]
fn check_ollama_server(_config: &Config) -> CheckResult {
    CheckResult::Warning("built without the `ollama` feature".to_string())
}

/// Check whether the configured model has been pulled.
#[cfg(feature = "ollama")]
fn check_ollama_model(config: &Config) -> CheckResult {
    use crate::llm::ollama::OllamaClient;

    let found = OllamaClient::new(config.ollama_config()).and_then(|c| c.has_model(&config.llm.model));
    model_result(found, &config.llm.model)
}

#[cfg(not(feature = "ollama"))]
fn check_ollama_model(_config: &Config) -> CheckResult {
    CheckResult::Warning("built without the `ollama` feature".to_string())
}

#[cfg_attr(not(feature = "ollama"), allow(dead_code))]
fn model_result(found: crate::error::Result<bool>, model: &str) -> CheckResult {
    match found {
        Ok(true) => CheckResult::Ok,
        Ok(false) => CheckResult::Warning(format!(
            "'{model}' is not pulled (run `ollama pull {model}`)"
        )),
        Err(e) => CheckResult::Warning(e.to_string()),
    }
}

/// Check the audio output: the sound device when built with `cpal-audio`,
/// the player command otherwise. Returns the label and install hint too.
#[cfg(feature = "cpal-audio")]
fn check_output(config: &Config) -> (String, CheckResult, &'static str) {
    use crate::audio::speaker::device_name;
    use crate::error::TalkbackError;

    let wanted = config.audio.device.as_deref().unwrap_or("default");
    match device_name(config.audio.device.as_deref()) {
        Ok(name) => (format!("{name} (audio output)"), CheckResult::Ok, ""),
        Err(TalkbackError::AudioDeviceNotFound { .. }) => (
            format!("{wanted} (audio output)"),
            CheckResult::NotFound,
            "Check `aplay -L` for device names, or unset audio.device",
        ),
        Err(e) => (
            format!("{wanted} (audio output)"),
            CheckResult::Warning(e.to_string()),
            "",
        ),
    }
}

#[cfg(not(feature = "cpal-audio"))]
fn check_output(config: &Config) -> (String, CheckResult, &'static str) {
    (
        format!("{} (audio playback)", config.audio.player),
        check_command(&config.audio.player, "--version"),
        "Install alsa-utils: sudo apt install alsa-utils",
    )
}

fn print_result(label: &str, result: &CheckResult, hint: &str) -> bool {
    print!("{label}: ");
    match result {
        CheckResult::Ok => {
            println!("✓ OK");
            true
        }
        CheckResult::NotFound => {
            println!("✗ NOT FOUND");
            if !hint.is_empty() {
                println!("  {hint}");
            }
            false
        }
        CheckResult::Warning(msg) => {
            println!("⚠ WARNING: {msg}");
            false
        }
    }
}

/// Run all dependency checks and print results.
///
/// Returns true if everything needed for spoken responses is available.
pub fn check_dependencies(config: &Config) -> bool {
    println!("Checking system dependencies...\n");

    // The server may run elsewhere, so a missing local binary is only informational
    print!("ollama (binary): ");
    match check_command("ollama", "--version") {
        CheckResult::Ok => println!("✓ OK"),
        CheckResult::NotFound => println!("- not installed locally"),
        CheckResult::Warning(msg) => println!("⚠ WARNING: {msg}"),
    }

    let server_ok = print_result(
        &format!("ollama server ({})", config.llm.host),
        &check_ollama_server(config),
        "",
    );

    let tts_ok = print_result(
        &format!("{} (speech synthesis)", config.tts.command),
        &check_command(&config.tts.command, "--help"),
        "Install piper: https://github.com/rhasspy/piper",
    );

    let model_ok = server_ok
        && print_result(
            &format!("model {}", config.llm.model),
            &check_ollama_model(config),
            "",
        );

    let (output_label, output_result, output_hint) = check_output(config);
    let player_ok = print_result(&output_label, &output_result, output_hint);

    println!();
    if !server_ok {
        println!("✗ No language model server. Start one with `ollama serve`.");
    } else if !model_ok {
        println!(
            "✗ Model missing. Fetch it with `ollama pull {}`.",
            config.llm.model
        );
    } else if tts_ok && player_ok {
        println!("✓ Ready to talk.");
    } else {
        println!("⚠ Speech is unavailable. `talkback --no-speech` still works.");
    }

    model_ok && tts_ok && player_ok
}
