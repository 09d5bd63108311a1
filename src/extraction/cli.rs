//! 7-Zip command-line tool and its discovery

use super::traits::{ArchiveTool, ToolExit};
use crate::config::ToolConfig;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Executable names searched for in PATH, in preference order
const BINARY_NAMES: &[&str] = &["7z", "7zz", "7za"];

/// Install locations checked when PATH search finds nothing
const WELL_KNOWN_LOCATIONS: &[&str] = &[
    r"C:\Program Files\7-Zip\7z.exe",
    r"C:\Program Files (x86)\7-Zip\7z.exe",
    "/usr/bin/7z",
    "/usr/local/bin/7z",
    "/opt/homebrew/bin/7z",
    "/usr/bin/7zz",
    "/usr/local/bin/7zz",
    "/opt/homebrew/bin/7zz",
];

/// Runs the external `7z` binary: `7z x "<archive>" -o"<outDir>" -y`
///
/// Given the first volume of a split archive, 7-Zip locates the remaining
/// volumes itself.
#[derive(Debug, Clone)]
pub struct SevenZipCli {
    binary_path: PathBuf,
}

impl SevenZipCli {
    /// Create a handler with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// The binary this handler runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Attempt to find 7-Zip in PATH
    ///
    /// Uses the `which` crate to search for `7z`, `7zz` and `7za` in that order.
    pub fn from_path() -> Option<Self> {
        BINARY_NAMES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(Self::new)
    }

    /// Check the platform's usual install locations
    pub fn from_well_known_locations() -> Option<Self> {
        WELL_KNOWN_LOCATIONS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
            .map(Self::new)
    }

    /// Resolve the tool from configuration
    ///
    /// The configured path wins if it exists. Otherwise, when `search_path` is
    /// enabled, PATH and then the well-known install locations are searched.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotSupported` if no executable could be found.
    pub fn discover(config: &ToolConfig) -> crate::Result<Self> {
        if let Some(path) = &config.path {
            if path.is_file() {
                info!(tool = %path.display(), "using configured decompression tool");
                return Ok(Self::new(path.clone()));
            }
            warn!(
                tool = %path.display(),
                "configured decompression tool does not exist, falling back to discovery"
            );
        }

        if config.search_path {
            if let Some(tool) = Self::from_path().or_else(Self::from_well_known_locations) {
                info!(tool = %tool.binary_path.display(), "discovered decompression tool");
                return Ok(tool);
            }
        }

        Err(crate::Error::NotSupported(
            "7-Zip executable not found. Configure tool.path or install 7z in PATH.".into(),
        ))
    }
}

#[async_trait]
impl ArchiveTool for SevenZipCli {
    async fn extract(&self, archive: &Path, output_dir: &Path) -> crate::Result<ToolExit> {
        let mut out_arg = OsString::from("-o");
        out_arg.push(output_dir);

        let output = Command::new(&self.binary_path)
            .arg("x") // Extract with full paths
            .arg(archive)
            .arg(out_arg)
            .arg("-y") // Assume yes on all queries (overwrite)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    crate::Error::NotSupported(format!(
                        "cannot execute {}: {}",
                        self.binary_path.display(),
                        e
                    ))
                }
                _ => crate::Error::ExternalTool(format!("Failed to execute 7z: {}", e)),
            })?;

        let exit = ToolExit::from(output.status);
        if !exit.is_non_fatal() {
            debug!(
                ?archive,
                code = ?exit.code,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "7z reported a fatal status"
            );
        }
        Ok(exit)
    }

    fn name(&self) -> &'static str {
        "cli-7z"
    }
}
