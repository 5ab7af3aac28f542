//! Bindscope Inference: client side of the remote affinity endpoint.
//!
//! The endpoint is consumed only through its request/response contract:
//!
//! ```text
//! POST /predict {smiles, fasta, drug_name?, protein_name?}
//!   -> {binding_affinity_pk, confidence_score (0..1)}
//! ```
//!
//! Clients:
//!   HttpInferenceClient: reqwest-based client for the HTTP endpoint
//!   TimeoutClient:       deadline wrapper around any other client

pub mod client;
pub mod error;
pub mod http;
pub mod timeout;

pub use client::{InferenceClient, InferenceRequest, InferenceResponse};
pub use error::{InferenceError, Result};
pub use http::HttpInferenceClient;
pub use timeout::TimeoutClient;
