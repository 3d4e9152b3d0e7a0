use udcn_common::FaceId;
use udcn_core::PacketError;

/// Resource failures of the PIT-CS composite table. Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PcctError {
    #[error("PCCT is full")]
    Full,
    #[error("name and forwarding hint exceed the PCC key capacity")]
    NameTooLong,
    #[error("no unused PCC token found")]
    TokenExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{section}.{field}: {reason}")]
    Invalid {
        section: &'static str,
        field: &'static str,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(section: &'static str, field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            section,
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FibError {
    #[error("FIB entry needs at least one nexthop")]
    NoNexthop,
    #[error("FIB entry has too many nexthops ({0})")]
    TooManyNexthops(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum DiskError {
    #[error("disk slot {0} is invalid")]
    InvalidSlot(u64),
    #[error("disk slot {0} is empty")]
    EmptySlot(u64),
    #[error("Data of {size} octets does not fit a {slot_size} octet slot")]
    TooLarge { size: usize, slot_size: usize },
    #[error("disk I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored Data is corrupt: {0}")]
    Corrupt(#[from] PacketError),
    #[error("disk worker has stopped")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("forwarder is already running")]
    AlreadyRunning,
    #[error("failed to spawn forwarding thread: {0}")]
    SpawnFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FaceError {
    #[error("face id {0} is reserved")]
    InvalidFace(FaceId),
    #[error("face {0} already exists")]
    FaceAlreadyExists(FaceId),
    #[error("face {0} not found")]
    FaceNotFound(FaceId),
}
