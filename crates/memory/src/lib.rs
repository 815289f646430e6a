//! Buffer Pool & Memory Manager (spec §4.8, §3)
//!
//! `MemoryManager` is the process-wide budget singleton; `BufferPool`
//! reserves against it on every hand-out. Both are injected rather than
//! reached for as globals (§9: "forbid package-level singletons except
//! the Memory Manager, whose lifecycle is start/stop at process
//! init/teardown").

mod buffer_pool;
mod manager;

pub use buffer_pool::BufferPool;
pub use manager::{MemoryManager, MemoryManagerConfig, PressureLevel};
