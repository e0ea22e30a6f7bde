//! Secrets and request signing for shopbot.
//!
//! Provides:
//! - **Secrets**: named secret lookup from AWS SSM Parameter Store with an
//!   environment fallback and a process-lifetime cache
//! - **SigV4**: AWS Signature Version 4 headers for the SSM, Bedrock and
//!   hosted agent runtime calls

pub mod secrets;
pub mod sigv4;

pub use secrets::{EnvSource, ParameterStore, ProcessEnv, SecretError, SecretProvider, SsmParameterStore};
pub use sigv4::{AwsCredentials, SigV4Signer, SigningError};
