//! Adapter around the external simulation binaries.
//!
//! The model ships as two executables: a translator that turns a simulation
//! definition (`.apsim`) into a runnable unit (`.sim`), and the engine that
//! executes a unit. Both are driven as child processes with their streams
//! redirected to files next to the input.

use crate::RunResult;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

/// How completion of one execution is recognized. The engine's exit status
/// is unreliable, so completion is judged from its diagnostic stream.
pub trait CompletionCheck {
    fn is_complete(&self, log_tail: &str) -> bool;
}

/// Paths and policy for invoking the model executables.
#[derive(Debug, Clone)]
pub struct ModelBinary {
    pub convert_exe: PathBuf,
    pub run_exe: PathBuf,
    /// Substring of the diagnostic stream that marks a finished execution.
    pub completion_marker: String,
    /// Wall-clock limit per child process. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl ModelBinary {
    pub fn new(convert_exe: PathBuf, run_exe: PathBuf) -> Self {
        ModelBinary {
            convert_exe,
            run_exe,
            completion_marker: "100%".to_string(),
            timeout: None,
        }
    }

    /// Translate one simulation definition into its runnable unit. Stdout
    /// and stderr both land in `<stem>.tmp` for later cleanup.
    pub fn convert(&self, definition: &Path) -> RunResult<PathBuf> {
        let log_path = definition.with_extension("tmp");
        let log = File::create(&log_path)?;
        let log_err = log.try_clone()?;
        self.wait(
            Command::new(&self.convert_exe)
                .arg(definition)
                .stdout(log)
                .stderr(log_err),
        )?;
        Ok(log_path)
    }

    /// Execute one runnable unit. The engine's report goes to `<stem>.sum`,
    /// its diagnostics to `<stem>.tmp`. Returns the last diagnostic line so
    /// the caller can judge completion.
    pub fn execute(&self, unit: &Path) -> RunResult<String> {
        let summary = File::create(unit.with_extension("sum"))?;
        let diag_path = unit.with_extension("tmp");
        let diag = File::create(&diag_path)?;
        self.wait(
            Command::new(&self.run_exe)
                .arg(unit)
                .stdout(summary)
                .stderr(diag),
        )?;
        let text = fs::read_to_string(&diag_path).unwrap_or_default();
        Ok(text.lines().last().unwrap_or("").to_string())
    }

    fn wait(&self, cmd: &mut Command) -> RunResult<()> {
        let mut child = cmd.spawn()?;
        match self.timeout {
            None => {
                child.wait()?;
            }
            Some(limit) => {
                let started = Instant::now();
                loop {
                    if child.try_wait()?.is_some() {
                        break;
                    }
                    if started.elapsed() >= limit {
                        warn!("child exceeded {:?} limit, killing", limit);
                        child.kill().ok();
                        child.wait()?;
                        break;
                    }
                    thread::sleep(Duration::from_millis(50));
                }
            }
        }
        Ok(())
    }
}

impl CompletionCheck for ModelBinary {
    fn is_complete(&self, log_tail: &str) -> bool {
        log_tail.contains(&self.completion_marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_is_judged_from_log_tail() {
        let binary = ModelBinary::new(PathBuf::from("a"), PathBuf::from("b"));
        assert!(binary.is_complete("Simulation 100% complete"));
        assert!(!binary.is_complete("Simulation 40% complete"));
        assert!(!binary.is_complete(""));
    }
}
