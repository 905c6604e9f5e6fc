use crate::encoding::EncodingProfile;
use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default = "default_profiles")]
    pub profiles: Vec<EncodingProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pipeline: PipelineConfig::default(),
            archive: ArchiveConfig::default(),
            profiles: default_profiles(),
        }
    }
}

/// HTTP listener and upload limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_host")]
    pub bind_host: IpAddr,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Largest accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: ByteSize,
    /// Working area for uploads and encoder output; purged on startup
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.listen_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            listen_port: default_listen_port(),
            max_body_bytes: default_max_body_bytes(),
            temp_dir: default_temp_dir(),
        }
    }
}

fn default_bind_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_listen_port() -> u16 {
    9200
}

fn default_max_body_bytes() -> ByteSize {
    ByteSize(2 * 1024 * 1024 * 1024) // 2 GB
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

/// Detection, encoding and cleanup behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Replace the declared upload type with the sniffed one
    #[serde(default = "default_true")]
    pub fix_content_type: bool,
    /// Encoder runs allowed at once; values below 1 are treated as 1
    #[serde(default = "default_max_concurrent_encoders")]
    pub max_concurrent_encoders: usize,
    /// Grace period between response completion and temp file removal
    #[serde(default = "default_cleanup_delay_ms")]
    pub cleanup_delay_ms: u64,
    #[serde(default = "default_media_tool")]
    pub encoder_executable: String,
    #[serde(default = "default_media_tool")]
    pub probe_executable: String,
}

impl PipelineConfig {
    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_delay_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fix_content_type: true,
            max_concurrent_encoders: default_max_concurrent_encoders(),
            cleanup_delay_ms: default_cleanup_delay_ms(),
            encoder_executable: default_media_tool(),
            probe_executable: default_media_tool(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_encoders() -> usize {
    1
}

fn default_cleanup_delay_ms() -> u64 {
    1000
}

fn default_media_tool() -> String {
    "ffmpeg".to_string()
}

/// Archival directory handling
///
/// `directory` is a template; see [`crate::artifacts::archive`] for tokens.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ArchiveConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// After a successful forward, delete the archived file named like the upload
    #[serde(default)]
    pub delete_original_after_success: bool,
    /// After a successful forward, move the result into the archive when a
    /// file named like the upload was already there
    #[serde(default)]
    pub move_result_to_archive: bool,
}

fn default_profiles() -> Vec<EncodingProfile> {
    vec![EncodingProfile::default_av1()]
}
