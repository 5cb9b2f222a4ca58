use thiserror::Error;

pub mod descriptor;
pub mod id;

pub use descriptor::{
    Artifact, Configuration, DependencyDescriptor, License, ModuleDescriptor, Visibility,
};
pub use id::{ArtifactId, ArtifactRevisionId, ModuleId, ModuleRevisionId};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading module descriptor: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid publication date `{0}`")]
    InvalidDate(String),
    #[error("Invalid module revision id `{0}`")]
    InvalidModuleRevisionId(String),
    #[error("Invalid encoded module revision id `{0}`")]
    InvalidEncodedId(String),
    #[error("Configuration `{0}` extends unknown configuration `{1}`")]
    UnknownExtendedConfiguration(String, String),
    #[error("Invalid configuration mapping `{0}`")]
    InvalidConfigurationMapping(String),
}
