//! Work queue of job ids.
//!
//! Producers push job ids; a dispatcher pops them in FIFO order with a
//! bounded blocking wait. Delivery is at-most-once per enqueue.

pub mod error;
pub mod memory;
pub mod queue;
pub mod redis_queue;

pub use error::{QueueError, QueueOp, QueueResult};
pub use memory::MemoryWorkQueue;
pub use queue::{QueueConfig, WorkQueue};
pub use redis_queue::RedisWorkQueue;
