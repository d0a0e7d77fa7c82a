use thiserror::Error;

use crate::message::TargetRef;
use crate::registry::Handle;

pub type RingResult<T> = Result<T, RingError>;

/// Raw error numbers written into completion results as negative values.
pub mod errno {
    pub const ENXIO: i32 = 6;
    pub const EBADF: i32 = 9;
    pub const EAGAIN: i32 = 11;
    pub const EBUSY: i32 = 16;
    pub const EEXIST: i32 = 17;
    pub const EINVAL: i32 = 22;
    pub const EBADFD: i32 = 77;
    pub const EOPNOTSUPP: i32 = 95;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RingError {
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("{0} does not name an open ring")]
    InvalidTarget(TargetRef),

    #[error("target ring {0} is not enabled")]
    TargetDisabled(Handle),

    #[error("submission queue full ({capacity} entries)")]
    SubmissionQueueFull { capacity: usize },

    #[error("ring {0} is disabled")]
    RingDisabled(Handle),

    #[error("ring is bound to another issuing thread")]
    NotIssuer,

    #[error("handle {0} is not open")]
    BadHandle(Handle),

    #[error("fixed-file slot busy: {0}")]
    Busy(&'static str),

    #[error("no fixed files registered")]
    NoFixedFiles,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("failed to spawn offload worker: {0}")]
    WorkerSpawn(String),
}

impl RingError {
    /// Negative result code carried by a completion reporting this error.
    pub fn errno(&self) -> i32 {
        let code = match self {
            RingError::Unsupported(_) => errno::EOPNOTSUPP,
            RingError::InvalidTarget(_)
            | RingError::TargetDisabled(_)
            | RingError::RingDisabled(_) => errno::EBADFD,
            RingError::SubmissionQueueFull { .. } | RingError::Busy(_) => errno::EBUSY,
            RingError::NotIssuer => errno::EEXIST,
            RingError::BadHandle(_) => errno::EBADF,
            RingError::NoFixedFiles => errno::ENXIO,
            RingError::InvalidArgument(_) => errno::EINVAL,
            RingError::WorkerSpawn(_) => errno::EAGAIN,
        };
        -code
    }

    /// True for the BADFD class: the target reference is unusable.
    pub fn is_invalid_target(&self) -> bool {
        matches!(
            self,
            RingError::InvalidTarget(_) | RingError::TargetDisabled(_)
        )
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, RingError::Unsupported(_))
    }
}

/// True when a completion result reports that the operation is not available.
pub fn is_unsupported_result(res: i32) -> bool {
    res == -errno::EOPNOTSUPP || res == -errno::EINVAL
}
