use serde::{Deserialize, Serialize};

/// Encoder configuration bound to one or more source content types
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EncodingProfile {
    /// Encoder argument template, see [`super::args::encoder_args`]
    #[serde(default)]
    pub command: String,
    /// Output extension, with or without the leading dot
    #[serde(default)]
    pub extension: String,
    /// Content type of the encoded artifact; the upload's type is kept when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Source content types this profile applies to, matched case-insensitively
    #[serde(default)]
    pub target_types: Vec<String>,
    /// Skip this profile for input detected as transparent
    #[serde(default)]
    pub exclude_transparent: bool,
    /// Encoder binary used instead of the pipeline default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_override: Option<String>,
}

impl EncodingProfile {
    pub fn targets(&self, content_type: &str) -> bool {
        self.target_types
            .iter()
            .any(|target| target.trim().eq_ignore_ascii_case(content_type.trim()))
    }

    /// Extension normalised to start with a dot, `None` when blank
    pub fn normalized_extension(&self) -> Option<String> {
        let ext = self.extension.trim();
        if ext.is_empty() || ext == "." {
            return None;
        }
        Some(if ext.starts_with('.') {
            ext.to_string()
        } else {
            format!(".{ext}")
        })
    }

    /// The AV1/Opus profile written into freshly created configurations
    pub fn default_av1() -> Self {
        Self {
            command: "-c:v libsvtav1 -preset 5 -crf 40 -g 240 -svtav1-params tune=0:fast-decode=1 -c:a libopus -ac 2 -b:a 128k".to_string(),
            extension: ".webm".to_string(),
            content_type: Some("video/webm".to_string()),
            target_types: [
                "video/mp4",
                "video/mpeg",
                "video/webm",
                "video/x-msvideo",
                "video/avi",
                "video/quicktime",
                "video/x-flv",
                "video/ogg",
                "application/vnd.rn-realmedia",
                "video/x-ms-wmv",
                "video/3gpp",
                "video/3gpp2",
                "video/x-matroska",
                "video/h264",
                "video/h265",
                "video/x-f4v",
                "video/x-ms-asf",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            exclude_transparent: false,
            executable_override: None,
        }
    }
}

/// Whether any profile for this type would be skipped for transparent input.
///
/// When none would, probing cannot change the selection and is skipped.
pub fn needs_transparency_probe(profiles: &[EncodingProfile], content_type: &str) -> bool {
    profiles
        .iter()
        .any(|profile| profile.exclude_transparent && profile.targets(content_type))
}

/// Picks the first profile that targets `content_type` and accepts the
/// input's transparency. `None` means the upload is forwarded unchanged.
pub fn select<'a>(
    profiles: &'a [EncodingProfile],
    content_type: &str,
    transparent: bool,
) -> Option<&'a EncodingProfile> {
    profiles.iter().find(|profile| {
        profile.targets(content_type) && (!profile.exclude_transparent || !transparent)
    })
}
