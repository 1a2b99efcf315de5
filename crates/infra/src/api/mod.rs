//! Medipim provider API client

mod client;

pub use client::{MedipimClient, MedipimClientConfig};
