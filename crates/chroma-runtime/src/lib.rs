//! `chroma-runtime` – the sorting controller.
//!
//! Strictly sequential: every frame is captured after the previous motion
//! has been acknowledged, and every motion goes through the kernel's
//! [`MotionGate`].
//!
//! # Modules
//!
//! - [`servo`] – [`VisualServo`][servo::VisualServo]: damped, clamped
//!   closed-loop alignment with a hard iteration ceiling.
//! - [`search`] – [`sweep`][search::sweep] and
//!   [`Searcher`][search::Searcher]: boustrophedon scan of the search region.
//! - [`pick_place`] – [`PickAndPlace`][pick_place::PickAndPlace]: the
//!   search → align → pick → place state machine with retreat-on-reject.
//! - [`auto_sort`] – [`AutoSort`][auto_sort::AutoSort]: repeats cycles over
//!   the configured colors until a pass sorts nothing.
//! - [`loop_guard`] – [`LoopGuard`][loop_guard::LoopGuard]: detects the same
//!   color being picked over and over.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging plus optional OTLP span export.

pub mod auto_sort;
pub mod loop_guard;
pub mod pick_place;
pub mod search;
pub mod servo;
pub mod telemetry;

pub use auto_sort::AutoSort;
pub use loop_guard::LoopGuard;
pub use pick_place::{CycleState, PickAndPlace};
pub use search::{SearchOutcome, Searcher, sweep};
pub use servo::{AlignOutcome, ServoState, VisualServo};
pub use telemetry::{TracerProviderGuard, init_tracing};

// Callers build the gate themselves; spare them a direct kernel dependency.
pub use chroma_kernel::MotionGate;
