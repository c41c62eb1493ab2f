//! Artifact loading and contract deployment

pub mod artifact;
pub mod deployer;

pub use artifact::{ArtifactStore, ContractArtifact};
pub use deployer::{Deployer, Deployment};
