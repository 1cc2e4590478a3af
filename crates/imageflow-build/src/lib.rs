//! imageflow build orchestration
//!
//! Turns a step configuration into an ordered sequence of docker build, pull,
//! push, tag and login commands plus a vulnerability scan, against one or
//! more container registries.

pub mod auth;
pub mod context;
pub mod dockerfile;
pub mod engine;
pub mod error;
pub mod image;
pub mod orchestrator;
pub mod plan;
pub mod runner;
pub mod scan;
pub mod stages;
pub mod tag;

pub use auth::{RegistryLogin, is_allowed_to_push, registry_host, resolve};
pub use engine::{BuildInvocation, DockerCli};
pub use error::{BuildError, Result};
pub use image::ImageReference;
pub use orchestrator::Orchestrator;
pub use plan::{BuildPlan, BuildStep};
pub use runner::{CommandOutcome, CommandRunner, CommandSpec, ProcessRunner, RecordingRunner};
pub use scan::{ScanVerdict, VulnerabilityGate, severity_filter};
pub use stages::{FromLineExtractor, Stage, StageExtractor, extract_stages};
pub use tag::{TagSet, sanitize_tag};
