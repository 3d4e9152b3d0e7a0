pub mod arena;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod cs;
pub mod disk;
pub mod error;
pub mod face;
pub mod fib;
pub mod fwd;
pub mod input;
pub mod pcct;
pub mod pit;
pub mod runtime;
pub mod strategy;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock, Time};
pub use config::{CsConfig, FwConfig, FwdConfig, InputConfig, PcctConfig, PitConfig};
pub use crypto::{DigestHelper, InlineDigest, ThreadedDigest};
pub use cs::{Cs, CsArc, CsHit, CsListId};
pub use disk::{DiskStore, FileDiskStore, MemDiskStore};
pub use error::{ConfigError, DiskError, FaceError, FibError, PcctError, RuntimeError};
pub use face::{FaceTable, FaceTx};
pub use fib::{Fib, FibEntry, FibTable};
pub use fwd::{FwDeps, FwFwd, FwFwdCountersSnapshot, FwFwdStats};
pub use input::{FwInput, FwInputCounters};
pub use pcct::{PccKey, Pcct};
pub use pit::{Pit, PitEntry, PitFindResult, PitHandle, PitInsertResult};
pub use runtime::Forwarder;
pub use strategy::{SgCtx, SgEvent, SgForwardResult, Strategy, StrategyId, StrategyTable};
