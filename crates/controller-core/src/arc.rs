use arc_swap::{ArcSwap, ArcSwapOption};
use std::sync::Arc;

/// A cheaply-cloneable, atomically-swappable `Arc<T>`, used for state that is
/// updated rarely (config, registry snapshots) but read on every request.
pub type Atomic<T> = Arc<ArcSwap<T>>;
pub type AtomicOption<T> = Arc<ArcSwapOption<T>>;
