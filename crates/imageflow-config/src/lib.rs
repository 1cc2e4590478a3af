//! imageflow step configuration
//!
//! Holds the immutable [`StepConfig`] built once per invocation and the typed
//! registry credentials injected by the CI server.

pub mod credentials;
pub mod error;
pub mod step;

pub use credentials::{ApiTokenCredential, ContainerRegistryCredential, Credential, CredentialSet};
pub use error::{ConfigError, Result};
pub use step::{
    Action, CacheStrategy, Environment, PipelineInfo, ScannerConfig, Severity, StepConfig,
    split_list,
};
