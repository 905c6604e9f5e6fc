//! One encoder run for one input file against one profile

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::args;
use super::profile::EncodingProfile;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("No command specified for encoding profile")]
    MissingCommand,

    #[error("No extension specified for encoding profile")]
    MissingExtension,

    #[error("Failed to start encoder '{executable}', make sure it is installed and on PATH: {source}")]
    Launch {
        executable: String,
        #[source]
        source: io::Error,
    },

    #[error("Encoding already started")]
    AlreadyStarted,

    #[error("Failed waiting for encoder: {0}")]
    Wait(#[source] io::Error),
}

/// A single encoder invocation.
///
/// The output path is derived at construction: same directory as the input,
/// input stem plus a random token plus the profile extension. The instance
/// runs at most once; dropping it kills a still-running encoder.
#[derive(Debug)]
pub struct EncodingInvocation {
    executable: String,
    input: PathBuf,
    output: PathBuf,
    args: Vec<String>,
    log: String,
    child: Option<Child>,
    started: bool,
}

impl EncodingInvocation {
    pub fn new(
        input: &Path,
        profile: &EncodingProfile,
        default_executable: &str,
    ) -> Result<Self, EncodeError> {
        let command = profile.command.trim();
        if command.is_empty() {
            return Err(EncodeError::MissingCommand);
        }
        let extension = profile
            .normalized_extension()
            .ok_or(EncodeError::MissingExtension)?;

        let executable = profile
            .executable_override
            .as_deref()
            .map(str::trim)
            .filter(|exe| !exe.is_empty())
            .unwrap_or(default_executable)
            .to_string();

        let output = output_path(input, &extension);
        let args = args::encoder_args(command, input, &output);

        Ok(Self {
            executable,
            input: input.to_path_buf(),
            output,
            args,
            log: String::new(),
            child: None,
            started: false,
        })
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Encoder stderr collected so far, one line per `\n`
    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Runs the encoder to completion. `Ok(true)` means exit code zero.
    ///
    /// Stdout is discarded; stderr is read line by line into [`Self::log`].
    pub async fn run(&mut self) -> Result<bool, EncodeError> {
        if self.started {
            return Err(EncodeError::AlreadyStarted);
        }
        self.started = true;

        info!(executable = %self.executable, args = ?self.args, "Starting encoder");

        let child = Command::new(&self.executable)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EncodeError::Launch {
                executable: self.executable.clone(),
                source,
            })?;

        let child = self.child.insert(child);
        if let Some(stderr) = child.stderr.take() {
            collect_lines(stderr, &mut self.log).await;
        }

        let status = child.wait().await.map_err(EncodeError::Wait)?;
        self.child = None;

        debug!(input = %self.input.display(), %status, "Encoder exited");
        Ok(status.success())
    }

    /// Terminates a running encoder. Safe to call repeatedly.
    pub fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!(input = %self.input.display(), "Killing encoder process");
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "Encoder already gone");
            }
        }
    }
}

impl Drop for EncodingInvocation {
    fn drop(&mut self) {
        self.kill();
    }
}

fn output_path(input: &Path, extension: &str) -> PathBuf {
    let dir = input
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    dir.join(format!("{stem}_{}{extension}", Uuid::new_v4().simple()))
}

async fn collect_lines(stderr: ChildStderr, log: &mut String) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                log.push_str(line.trim_end_matches(['\r', '\n']));
                log.push('\n');
            }
            Err(e) => {
                warn!(error = %e, "Failed reading encoder output");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn profile(command: &str, extension: &str, executable: Option<&str>) -> EncodingProfile {
        EncodingProfile {
            command: command.to_string(),
            extension: extension.to_string(),
            content_type: Some("video/webm".to_string()),
            target_types: vec!["video/mp4".to_string()],
            exclude_transparent: false,
            executable_override: executable.map(String::from),
        }
    }

    #[test]
    fn test_rejects_incomplete_profiles() {
        let input = Path::new("temp/clip.mp4");
        assert!(matches!(
            EncodingInvocation::new(input, &profile("  ", ".webm", None), "ffmpeg"),
            Err(EncodeError::MissingCommand)
        ));
        assert!(matches!(
            EncodingInvocation::new(input, &profile("-c copy", "", None), "ffmpeg"),
            Err(EncodeError::MissingExtension)
        ));
    }

    #[test]
    fn test_output_lives_next_to_input_with_dotted_extension() {
        let input = Path::new("temp/clip.mp4");
        let first = EncodingInvocation::new(input, &profile("-c copy", "webm", None), "ffmpeg").unwrap();
        let second = EncodingInvocation::new(input, &profile("-c copy", "webm", None), "ffmpeg").unwrap();

        assert_eq!(first.output().parent(), Some(Path::new("temp")));
        let name = first.output().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("clip_"), "{name}");
        assert!(name.ends_with(".webm"), "{name}");
        assert_ne!(first.output(), second.output());
        assert_ne!(first.output(), input);
    }

    #[test]
    fn test_bare_file_name_uses_current_directory() {
        let inv = EncodingInvocation::new(Path::new("clip.mp4"), &profile("-c copy", ".mkv", None), "ffmpeg").unwrap();
        assert_eq!(inv.output().parent(), Some(Path::new(".")));
    }

    #[test]
    fn test_executable_override_wins() {
        let input = Path::new("temp/clip.mp4");
        let inv = EncodingInvocation::new(input, &profile("-c copy", ".mkv", Some("/opt/ffmpeg")), "ffmpeg").unwrap();
        assert_eq!(inv.executable(), "/opt/ffmpeg");

        let inv = EncodingInvocation::new(input, &profile("-c copy", ".mkv", Some(" ")), "ffmpeg").unwrap();
        assert_eq!(inv.executable(), "ffmpeg");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run_collects_stderr() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, b"payload").unwrap();

        let mut inv = EncodingInvocation::new(
            &input,
            &profile(r#"-c "cp $INPUT $OUTPUT; echo first >&2; echo second >&2""#, ".webm", Some("sh")),
            "ffmpeg",
        )
        .unwrap();

        assert!(inv.run().await.unwrap());
        assert_eq!(inv.log(), "first\nsecond\n");
        assert_eq!(std::fs::read(inv.output()).unwrap(), b"payload");
        assert!(!inv.is_running());

        assert!(matches!(inv.run().await, Err(EncodeError::AlreadyStarted)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_reported_as_failure() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("clip.mp4");

        let mut inv = EncodingInvocation::new(&input, &profile("-c copy", ".webm", Some("false")), "ffmpeg").unwrap();
        assert!(!inv.run().await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_launch_error() {
        let mut inv = EncodingInvocation::new(
            Path::new("clip.mp4"),
            &profile("-c copy", ".webm", Some("definitely-not-an-encoder-binary")),
            "ffmpeg",
        )
        .unwrap();

        let err = inv.run().await.unwrap_err();
        assert!(matches!(err, EncodeError::Launch { .. }));
        assert!(err.to_string().contains("definitely-not-an-encoder-binary"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_is_idempotent_after_abandoned_run() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("clip.mp4");

        let mut inv = EncodingInvocation::new(
            &input,
            &profile(r#"-c "sleep 30 # $INPUT""#, ".webm", Some("sh")),
            "ffmpeg",
        )
        .unwrap();

        let timed_out = tokio::time::timeout(Duration::from_millis(200), inv.run()).await;
        assert!(timed_out.is_err());
        assert!(inv.is_running());

        inv.kill();
        inv.kill();
        assert!(!inv.is_running());
    }
}
