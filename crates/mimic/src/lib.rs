//! Top-level facade crate for mimic.
//!
//! Re-exports core types and the engine library so hosts can depend on a
//! single crate.

pub mod core {
    pub use mimic_core::*;
}

pub mod engine {
    pub use mimic_engine::*;
}
