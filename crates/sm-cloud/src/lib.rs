//! sm-cloud: Credentials and the AWS remote service for Summoner
//!
//! The [`CredentialProvider`] keeps short-lived credentials fresh and is the
//! only credential source handed to SDK clients, so every remote call
//! re-resolves credentials right before it is signed. [`AwsCloud`] implements
//! the [`sm_core::CloudApi`] boundary on top of the EC2 and SSM clients.

pub mod aws;
pub mod credentials;

pub use aws::AwsCloud;
pub use credentials::{
    AssumeRoleSource, CredentialError, CredentialProvider, CredentialSettings, CredentialSource,
    ProfileSource,
};
