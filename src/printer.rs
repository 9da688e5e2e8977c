//! Print action boundary.
//!
//! The directive processor invokes printing through [`PrintAction`] so tests
//! can substitute a recording double. The real implementation shells out to
//! `lpr` synchronously.

use std::path::Path;
use std::process::Command;

use tracing::{info, warn};

use crate::error::{Result, SweepError};

/// A synchronous print service.
pub trait PrintAction {
    /// Print the file at `path`; `Err` means the file should stay pending.
    fn print(&self, path: &Path) -> Result<()>;
}

/// Prints via the system `lpr` command.
pub struct LprPrinter {
    /// Printer name (`None` = system default).
    pub printer: Option<String>,
    /// Suffixes the spooler accepts; others are skipped with a warning.
    pub supported_suffixes: Vec<String>,
}

impl LprPrinter {
    /// Build from print configuration.
    pub fn new(printer: Option<String>, supported_suffixes: Vec<String>) -> Self {
        Self {
            printer,
            supported_suffixes,
        }
    }

    fn is_supported(&self, path: &Path) -> bool {
        let suffix = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        self.supported_suffixes.iter().any(|s| s == &suffix)
    }
}

impl PrintAction for LprPrinter {
    fn print(&self, path: &Path) -> Result<()> {
        if !self.is_supported(path) {
            // Matches the spooler tool's behavior: unsupported types are
            // skipped without blocking archival.
            warn!(path = %path.display(), "Unsupported file type for printing, skipping");
            return Ok(());
        }

        let mut cmd = Command::new("lpr");
        if let Some(printer) = &self.printer {
            cmd.arg("-P").arg(printer);
        }
        cmd.arg(path);

        let status = cmd.status().map_err(|e| SweepError::Print {
            path: path.to_path_buf(),
            reason: format!("could not spawn lpr: {e}"),
        })?;

        if !status.success() {
            return Err(SweepError::Print {
                path: path.to_path_buf(),
                reason: format!("lpr exited with {status}"),
            });
        }

        info!(path = %path.display(), printer = ?self.printer, "Sent to printer");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_suffix_support() {
        let printer = LprPrinter::new(None, vec![".pdf".to_string(), ".html".to_string()]);
        assert!(printer.is_supported(&PathBuf::from("a/b/report.PDF")));
        assert!(printer.is_supported(&PathBuf::from("page.html")));
        assert!(!printer.is_supported(&PathBuf::from("data.csv")));
        assert!(!printer.is_supported(&PathBuf::from("noext")));
    }
}
