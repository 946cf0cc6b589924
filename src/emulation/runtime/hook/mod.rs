//! Hook system for method interception during emulation.
//!
//! Every call the emulator makes is first offered to the [`HookManager`]. A matching
//! hook can run before the callee, replace it, or adjust its result. The built-in
//! methods of the emulated runtime library (reflection, delegates, strings) are hooks
//! as well, registered at [`HookPriority::RUNTIME`], so any user hook on the same
//! method takes precedence.
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | `types` | Priorities, results, context |
//! | `matcher` | Matcher trait and implementations |
//! | `core` | The [`Hook`] builder and executor |
//! | `manager` | [`HookManager`] for hook registration and lookup |
//!
//! # Hook Execution Flow
//!
//! ```text
//! Method call
//!         │
//!         ▼
//! ┌───────────────────┐
//! │  Find matching    │───► No match ───► Execute IL body
//! │  hook             │
//! └───────────────────┘
//!         │ Match found
//!         ▼
//! ┌───────────────────┐
//! │  Execute pre_hook │───► Bypass(value) ───► Return value
//! └───────────────────┘
//!         │ Continue
//!         ▼
//! ┌───────────────────┐
//! │  Execute IL body  │
//! └───────────────────┘
//!         │
//!         ▼
//! ┌───────────────────┐
//! │  Execute post_hook│───► Can replace result
//! └───────────────────┘
//! ```
//!
//! # Shared State
//!
//! Hook handlers are `Fn + Send + Sync`. State a handler updates, such as a call
//! counter, belongs to whoever registers the hook and is captured explicitly, typically
//! as an `Arc<AtomicUsize>`. The emulator makes no assumption about it.
//!
//! ```rust
//! use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};
//! use dotweave::emulation::{Hook, HookManager, PreHookResult};
//!
//! let calls = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&calls);
//!
//! let mut manager = HookManager::with_runtime();
//! manager.register(
//!     Hook::new("count-entries")
//!         .match_method_name("OnEntry")
//!         .pre(move |_, _| {
//!             counter.fetch_add(1, Ordering::SeqCst);
//!             PreHookResult::Continue
//!         }),
//! );
//! # assert_eq!(calls.load(Ordering::SeqCst), 0);
//! ```

mod core;
mod manager;
mod matcher;
mod types;

pub use core::Hook;
pub use manager::HookManager;
pub use matcher::{HookMatcher, NameMatcher, RuntimeMatcher, SignatureMatcher};
pub use types::{
    HookContext, HookOutcome, HookPriority, PostHookFn, PostHookResult, PreHookFn, PreHookResult,
};
