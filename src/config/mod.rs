pub mod revisr;

pub use revisr::{RevisrConfig, Substitution, TrackingConfig, TrackingMode};
