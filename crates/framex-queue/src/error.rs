//! Errors raised by work queue backends.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

/// Which queue operation a backend failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOp {
    Connect,
    Push,
    Pop,
}

impl std::fmt::Display for QueueOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            QueueOp::Connect => "connect",
            QueueOp::Push => "push",
            QueueOp::Pop => "pop",
        })
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// The backend rejected or dropped an operation.
    #[error("queue {op} failed: {reason}")]
    Backend { op: QueueOp, reason: String },

    /// An entry popped from the queue is not a job id.
    #[error("malformed queue entry: {0:?}")]
    Malformed(String),

    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
}

impl QueueError {
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        Self::Backend { op: QueueOp::Connect, reason: reason.into() }
    }

    pub fn enqueue_failed(reason: impl Into<String>) -> Self {
        Self::Backend { op: QueueOp::Push, reason: reason.into() }
    }

    pub fn dequeue_failed(reason: impl Into<String>) -> Self {
        Self::Backend { op: QueueOp::Pop, reason: reason.into() }
    }

    /// Operation that failed, when known.
    pub fn op(&self) -> Option<QueueOp> {
        match self {
            QueueError::Backend { op, .. } => Some(*op),
            QueueError::Malformed(_) => Some(QueueOp::Pop),
            QueueError::Redis(_) => None,
        }
    }
}
