//! Conversion of trained models into the TF.js layers-model format.

pub mod converter;
pub mod json_visitor;
pub mod patches;
pub mod schema;

pub use converter::{convert_model, TfjsArtifact};
