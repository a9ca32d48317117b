//! AWS backends for the OTA publishing pipeline
//!
//! - [`s3`]: object storage on a versioned S3 bucket
//! - [`signer`]: AWS Signer profiles and signing jobs
//! - [`iot`]: AWS IoT streams and OTA updates
//! - [`session`]: shared configuration, region and account resolution

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod iot;
pub mod s3;
pub mod session;
pub mod signer;

pub use iot::IotClient;
pub use s3::S3ObjectStore;
pub use session::AwsSession;
pub use signer::SignerClient;
