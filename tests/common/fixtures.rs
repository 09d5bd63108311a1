//! Fake decompression tools and part-file fixtures

use async_trait::async_trait;
use split_ingest::{ArchiveTool, Config, ToolExit};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// In-process stand-in for 7-Zip
///
/// Each call pops the next exit code from `codes` (repeating the last one
/// once the queue is down to a single entry) and writes `files` into the
/// output directory unless the code is fatal.
pub struct FakeTool {
    codes: Mutex<VecDeque<i32>>,
    files: Vec<(&'static str, &'static str)>,
    delay: Duration,
    calls: AtomicU32,
    archives: Mutex<Vec<PathBuf>>,
}

impl FakeTool {
    /// Always exits 0 and writes `files`
    pub fn succeeding(files: Vec<(&'static str, &'static str)>) -> Self {
        Self::with_codes(vec![0], files)
    }

    /// Always exits with `code` and writes nothing
    pub fn failing(code: i32) -> Self {
        Self::with_codes(vec![code], Vec::new())
    }

    /// Exits with each of `codes` in turn
    pub fn with_codes(codes: Vec<i32>, files: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            codes: Mutex::new(codes.into()),
            files,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            archives: Mutex::new(Vec::new()),
        }
    }

    /// Sleep for `delay` inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of times `extract` ran
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Archives passed to `extract`, in call order
    pub fn archives(&self) -> Vec<PathBuf> {
        self.archives.lock().unwrap().clone()
    }

    fn next_code(&self) -> i32 {
        let mut codes = self.codes.lock().unwrap();
        if codes.len() > 1 {
            codes.pop_front().unwrap()
        } else {
            codes.front().copied().unwrap_or(0)
        }
    }
}

#[async_trait]
impl ArchiveTool for FakeTool {
    async fn extract(&self, archive: &Path, output_dir: &Path) -> split_ingest::Result<ToolExit> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.archives.lock().unwrap().push(archive.to_path_buf());
        tokio::time::sleep(self.delay).await;

        let code = self.next_code();
        if code <= 1 {
            for (name, content) in &self.files {
                let path = output_dir.join(name);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(path, content).unwrap();
            }
        }
        Ok(ToolExit::code(code))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Write parts `<base>.001` through `<base>.<count>` into `Incoming`
///
/// Returns the path of the first part.
pub fn write_parts(config: &Config, base: &str, count: u32) -> PathBuf {
    for seq in 1..=count {
        write_part(config, base, seq);
    }
    config.incoming_dir().join(format!("{base}.001"))
}

/// Write a single part into `Incoming`
pub fn write_part(config: &Config, base: &str, seq: u32) -> PathBuf {
    let path = config.incoming_dir().join(format!("{base}.{seq:03}"));
    std::fs::write(&path, format!("{base} part {seq}")).unwrap();
    path
}

/// File names directly inside `dir`, sorted
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Write an executable shell script that behaves like `7z x <archive> -o<out> -y`
///
/// It writes `extracted.txt` (holding the archive path) into the output
/// directory and exits with `exit_code`.
#[cfg(unix)]
pub fn fake_7z_script(dir: &Path, exit_code: i32) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("fake7z");
    let body = format!(
        "#!/bin/sh\n\
         out=\"${{3#-o}}\"\n\
         mkdir -p \"$out\"\n\
         printf '%s' \"$2\" > \"$out/extracted.txt\"\n\
         exit {exit_code}\n"
    );
    std::fs::write(&script, body).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}
