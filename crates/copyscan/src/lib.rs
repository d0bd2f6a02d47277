//! Public facade crate for `copyscan`.
//!
//! Re-exports the backend-agnostic types/traits from `copyscan-core` plus the
//! [`Checker`] entry point and the bundled session backends.

pub use copyscan_core::*;
pub use copyscan_local::{
    Checker, HttpSession, HttpSessionFactory, PlaywrightSession, PlaywrightSessionFactory,
    Segmenter, WorkerPool,
};
