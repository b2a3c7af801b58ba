//! External exporter invocation: the artifact acquisition boundary.
//!
//! Producing an artifact from a live disassembly session is an
//! out-of-process concern; the only contract here is "run the exporter,
//! then consume the completed artifact file it produced". A nonzero exit
//! status or a missing output file is an acquisition failure, reported
//! distinctly from a decode failure.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::error::{AncalagonError, Result};

/// Invocation recipe for the external export step.
///
/// The exporter runs as `<command> <fixed args..> <executable> <output>`.
#[derive(Debug, Clone)]
pub struct Exporter {
    command: PathBuf,
    args: Vec<String>,
}

impl Exporter {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    /// Append a fixed argument passed before the executable and output paths.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Run the exporter for `executable` and return the artifact path.
    ///
    /// When `output` is not given, the artifact lands next to the executable
    /// with an `.export` extension.
    pub fn export(&self, executable: &Path, output: Option<&Path>) -> Result<PathBuf> {
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| executable.with_extension("export"));

        debug!(
            command = %self.command.display(),
            executable = %executable.display(),
            output = %output.display(),
            "running exporter"
        );

        let status = Command::new(&self.command)
            .args(&self.args)
            .arg(executable)
            .arg(&output)
            .status()
            .map_err(|e| {
                AncalagonError::Acquisition(format!(
                    "failed to spawn {}: {e}",
                    self.command.display()
                ))
            })?;

        if !status.success() {
            return Err(AncalagonError::Acquisition(format!(
                "exporter exited with {status}"
            )));
        }
        if !output.is_file() {
            return Err(AncalagonError::Acquisition(format!(
                "no artifact produced at {}",
                output.display()
            )));
        }

        info!(
            executable = %executable.display(),
            output = %output.display(),
            "export complete"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_command_is_acquisition_failure() {
        let exporter = Exporter::new("/nonexistent/exporter-binary");
        let err = exporter
            .export(Path::new("/tmp/sample.bin"), None)
            .unwrap_err();
        assert!(matches!(err, AncalagonError::Acquisition(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_acquisition_failure() {
        let exporter = Exporter::new("false");
        let err = exporter
            .export(Path::new("/tmp/sample.bin"), None)
            .unwrap_err();
        match err {
            AncalagonError::Acquisition(message) => {
                assert!(message.contains("exited"), "unexpected message: {message}")
            }
            other => panic!("expected acquisition failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_exit_without_output_is_acquisition_failure() {
        let exporter = Exporter::new("true");
        let err = exporter
            .export(Path::new("/tmp/never-written.bin"), None)
            .unwrap_err();
        match err {
            AncalagonError::Acquisition(message) => assert!(
                message.contains("no artifact produced"),
                "unexpected message: {message}"
            ),
            other => panic!("expected acquisition failure, got {other:?}"),
        }
    }
}
