//! Core trait definitions

mod cloud;

pub use cloud::CloudApi;
