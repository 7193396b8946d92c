//! Configuration management module
//!
//! Responsible for loading application settings, the model registry and credentials

pub mod credentials;
pub mod registry;
pub mod settings;

pub use credentials::{CredentialProvider, EnvCredentials, StaticCredentials};
pub use registry::{ModelDescriptor, ModelRegistry, ProviderKind};
pub use settings::Settings;
