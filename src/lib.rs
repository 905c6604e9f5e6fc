pub mod admission;
pub mod api;
pub mod artifacts;
pub mod config;
pub mod detect;
pub mod encoding;
pub mod forward;
pub mod humanize;
pub mod observability;
pub mod pipeline;
