//! Where response text is shown as it streams in.

use crate::error::{Result, TalkbackError};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Pluggable text display.
pub trait DisplaySink: Send + Sync {
    /// Show a fragment immediately, without adding separators.
    fn write(&self, fragment: &str) -> Result<()>;

    /// Called once after the last fragment of a turn.
    fn end(&self) -> Result<()> {
        Ok(())
    }
}

/// Prints fragments to stdout, flushing after each one.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutDisplay;

impl DisplaySink for StdoutDisplay {
    fn write(&self, fragment: &str) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(fragment.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }

    fn end(&self) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout)?;
        stdout.flush()?;
        Ok(())
    }
}

/// Collects displayed text into a string (for testing).
#[derive(Debug, Clone, Default)]
pub struct CollectorDisplay {
    text: Arc<Mutex<String>>,
    ended: Arc<Mutex<usize>>,
}

impl CollectorDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn text(&self) -> String {
        self.text.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// How many times [`DisplaySink::end`] was called.
    pub fn ends(&self) -> usize {
        self.ended.lock().map(|e| *e).unwrap_or_default()
    }
}

impl DisplaySink for CollectorDisplay {
    fn write(&self, fragment: &str) -> Result<()> {
        self.text
            .lock()
            .map_err(|_| TalkbackError::Other("display buffer poisoned".to_string()))?
            .push_str(fragment);
        Ok(())
    }

    fn end(&self) -> Result<()> {
        *self
            .ended
            .lock()
            .map_err(|_| TalkbackError::Other("display buffer poisoned".to_string()))? += 1;
        Ok(())
    }
}
