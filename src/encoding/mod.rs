//! External encoder orchestration
//!
//! - [`profile`]: encoding profiles and the selector that picks one per upload
//! - [`process`]: a single encoder run with captured diagnostics
//! - [`probe`]: alpha-channel probe used by transparency-aware profiles
//! - [`args`]: argument template splitting and placeholder substitution

pub mod args;
pub mod probe;
pub mod process;
pub mod profile;

pub use probe::{ProbeError, Transparency, TransparencyProbe};
pub use process::{EncodeError, EncodingInvocation};
pub use profile::{EncodingProfile, needs_transparency_probe, select};
