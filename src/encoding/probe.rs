//! Alpha-channel probe
//!
//! Runs the media tool with an `alphaextract,signalstats` filter chain that
//! prints per-frame statistics as metadata, then reads a single field from
//! the combined output: `lavfi.signalstats.YMIN`. A minimum luma below 255 on
//! the extracted alpha plane means at least one pixel is not fully opaque.
//! Everything that knows about the probe's text format lives in this file.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::args;

const PROBE_FILTER_ARGS: &str =
    r#"-vf "alphaextract,signalstats,metadata=print:file=-" -v quiet -f null -"#;

/// Alpha plane values are 8-bit; anything below full saturation is see-through
const OPAQUE_LEVEL: u32 = 255;

static YMIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"lavfi\.signalstats\.YMIN=(?<val>\d+)").expect("YMIN pattern is valid")
});

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to start probe '{executable}', make sure it is installed and on PATH: {source}")]
    Launch {
        executable: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed waiting for probe: {0}")]
    Wait(#[source] io::Error),
}

/// Outcome of a transparency probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transparency {
    /// The probe exited non-zero; nothing is known
    Unknown,
    Opaque,
    Transparent,
}

impl Transparency {
    /// Collapses the outcome for profile selection. `Unknown` counts as
    /// opaque: the alpha filter fails on inputs without an alpha plane.
    pub fn is_transparent(self) -> bool {
        matches!(self, Transparency::Transparent)
    }
}

/// Parses probe output. Only the first `YMIN` field is considered.
pub fn parse_output(success: bool, output: &str) -> Transparency {
    if !success {
        return Transparency::Unknown;
    }

    let value = YMIN_PATTERN
        .captures(output)
        .and_then(|caps| caps.name("val"))
        .and_then(|val| val.as_str().parse::<u32>().ok());

    match value {
        Some(level) if level < OPAQUE_LEVEL => Transparency::Transparent,
        _ => Transparency::Opaque,
    }
}

#[derive(Debug)]
pub struct TransparencyProbe {
    executable: String,
    input: PathBuf,
    child: Option<Child>,
}

impl TransparencyProbe {
    pub fn new(input: &Path, executable: &str) -> Self {
        Self {
            executable: executable.to_string(),
            input: input.to_path_buf(),
            child: None,
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-i".to_string(),
            self.input.to_string_lossy().into_owned(),
        ];
        args.extend(args::split(PROBE_FILTER_ARGS));
        args
    }

    pub async fn check(&mut self) -> Result<Transparency, ProbeError> {
        let (success, output) = self.run().await?;
        let outcome = parse_output(success, &output);
        info!(input = %self.input.display(), ?outcome, "Transparency probe finished");
        Ok(outcome)
    }

    /// Runs the probe and returns its exit success with stdout and stderr
    /// concatenated.
    async fn run(&mut self) -> Result<(bool, String), ProbeError> {
        let child = Command::new(&self.executable)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProbeError::Launch {
                executable: self.executable.clone(),
                source,
            })?;

        let child = self.child.insert(child);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (out, err) = tokio::join!(read_all(stdout), read_all(stderr));

        let status = child.wait().await.map_err(ProbeError::Wait)?;
        self.child = None;

        debug!(input = %self.input.display(), %status, "Probe exited");
        Ok((status.success(), out + &err))
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Terminates a running probe. Safe to call repeatedly.
    pub fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!(input = %self.input.display(), "Killing probe process");
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "Probe already gone");
            }
        }
    }
}

impl Drop for TransparencyProbe {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn read_all<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = stream.read_to_end(&mut buf).await {
        warn!(error = %e, "Failed reading probe output");
    }
    String::from_utf8_lossy(&buf).into_owned()
}
