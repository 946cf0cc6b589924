//! Execution engine: the [`Emulator`], its interpreter and its limits.
//!
//! # Architecture
//!
//! | Module | Description |
//! |--------|-------------|
//! | `context` | The [`Emulator`], type and member resolution across modules |
//! | `interpreter` | Frames, instruction dispatch, exception handling |
//! | `limits` | [`EmulationLimits`] |
//! | `error` | [`EmulationError`] |

mod context;
mod error;
mod interpreter;
mod limits;

pub use context::Emulator;
pub(crate) use context::{EmResult, NULL_REFERENCE_MESSAGE};
pub use error::EmulationError;
pub use limits::EmulationLimits;
