use std::path::Path;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{Result, SerifuError};

/// Abstract invocation of an external helper binary (text recognizer,
/// region capture tool, speech synthesizer).
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl ToolCommand {
    /// Create a new tool command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add a path argument
    pub fn path_arg<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Execute and wait, discarding output
    pub async fn execute(&self) -> Result<()> {
        self.execute_capturing_stdout().await.map(|_| ())
    }

    /// Execute and wait, returning captured stdout
    pub async fn execute_capturing_stdout(&self) -> Result<String> {
        debug!("Executing tool command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| {
                SerifuError::Tool(format!("Failed to execute {}: {}", self.binary_path, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SerifuError::Tool(format!(
                "{} failed: {}",
                self.description, stderr
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Spawn without waiting. The child is killed if its handle is dropped,
    /// which is what lets an in-flight utterance be superseded.
    pub fn spawn(&self) -> Result<Child> {
        debug!("Spawning tool command: {} {:?}", self.binary_path, self.args);

        Command::new(&self.binary_path)
            .args(&self.args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SerifuError::Tool(format!("Failed to spawn {}: {}", self.binary_path, e)))
    }

    /// Check the binary responds at all. Used as an availability probe
    /// before a subsystem commits to its primary implementation.
    pub async fn probe(&self) -> bool {
        Command::new(&self.binary_path)
            .args(&self.args)
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }
}
