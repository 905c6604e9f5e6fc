//! Per-request stage coordination
//!
//! [`Pipeline`] takes a downloaded upload and decides what gets forwarded:
//! it optionally corrects the content type from the file's magic bytes,
//! probes for transparency when some candidate profile cares, picks a
//! profile and runs the encoder behind the [`AdmissionController`]. It owns
//! no per-request state; everything lives in the [`InFlightRequest`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::admission::AdmissionController;
use crate::artifacts::{ArtifactError, InFlightRequest, RequestState};
use crate::config::{Config, PipelineConfig};
use crate::detect;
use crate::encoding::{
    EncodeError, EncodingInvocation, EncodingProfile, ProbeError, TransparencyProbe,
    needs_transparency_probe, select,
};
use crate::forward::ForwardError;
use crate::observability::Metrics;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("Failed to encode file:\n{log}")]
    EncodeFailed { log: String },

    #[error(transparent)]
    Forward(#[from] ForwardError),

    #[error("Failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// What [`Pipeline::prepare`] did to the upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preparation {
    /// No profile matched; the upload goes downstream as received
    Unchanged,
    /// The upload was encoded with the named output extension
    Encoded { extension: String },
}

/// Shared pipeline context, built once at startup
#[derive(Debug)]
pub struct Pipeline {
    settings: PipelineConfig,
    profiles: Vec<EncodingProfile>,
    admission: AdmissionController,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> Self {
        Self {
            settings: config.pipeline.clone(),
            profiles: config.profiles.clone(),
            admission: AdmissionController::new(config.pipeline.max_concurrent_encoders),
            metrics,
        }
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn profiles(&self) -> &[EncodingProfile] {
        &self.profiles
    }

    /// Runs detection, probing, selection and encoding on a request in the
    /// `Downloaded` state. On success the request's final artifact is ready
    /// to forward.
    pub async fn prepare(&self, request: &mut InFlightRequest) -> Result<Preparation, PipelineError> {
        if self.settings.fix_content_type {
            let declared = request.content_type().to_string();
            let detected = detect::detect_file(request.temp_path(), Some(&declared)).await;
            if !detected.eq_ignore_ascii_case(&declared) {
                info!(declared = %declared, detected = %detected, "Corrected content type");
            }
            request.set_content_type(detected);
            request.advance(RequestState::TypeFixed)?;
        }

        let content_type = request.content_type().to_string();
        let transparent = if needs_transparency_probe(&self.profiles, &content_type) {
            let mut probe = TransparencyProbe::new(request.temp_path(), &self.settings.probe_executable);
            let outcome = probe.check().await?;
            request.advance(RequestState::TransparencyChecked)?;
            info!(content_type = %content_type, ?outcome, "Transparency probed");
            outcome.is_transparent()
        } else {
            false
        };

        let Some(profile) = select(&self.profiles, &content_type, transparent) else {
            info!(content_type = %content_type, transparent, "No encoding profile matches, forwarding unchanged");
            return Ok(Preparation::Unchanged);
        };

        self.encode(request, profile).await
    }

    async fn encode(
        &self,
        request: &mut InFlightRequest,
        profile: &EncodingProfile,
    ) -> Result<Preparation, PipelineError> {
        let mut invocation =
            EncodingInvocation::new(request.temp_path(), profile, &self.settings.encoder_executable)?;
        let extension = profile
            .normalized_extension()
            .ok_or(EncodeError::MissingExtension)?;

        request.track_scratch(invocation.output().to_path_buf());
        request.advance(RequestState::Encoding)?;

        let label = request.temp_path().display().to_string();
        let outcome = {
            let _permit = self.admission.acquire(&label).await;
            invocation.run().await
        };

        match outcome {
            Ok(true) => {
                request.advance(RequestState::Encoded)?;
                request.set_encoded(
                    invocation.output().to_path_buf(),
                    &extension,
                    profile.content_type.as_deref(),
                );
                self.metrics.encode_completed();
                Ok(Preparation::Encoded { extension })
            }
            Ok(false) => {
                request.advance(RequestState::EncodeFailed)?;
                self.metrics.encode_failed();
                warn!(input = %label, "Encoder exited with failure");
                Err(PipelineError::EncodeFailed {
                    log: invocation.log().to_string(),
                })
            }
            Err(e) => {
                request.advance(RequestState::EncodeFailed)?;
                self.metrics.encode_failed();
                Err(e.into())
            }
        }
    }
}
