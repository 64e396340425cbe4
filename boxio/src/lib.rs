//! boxio - stdio attachment for containers over named pipes
//!
//! The crate has three layers:
//!
//! - **Provisioning** ([`fifo`]): creates the per-container FIFO set under
//!   `<root>/io/<id>` and opens its host side.
//! - **Copying** ([`attach::copy`]): one task per stream direction moving
//!   bytes between a client endpoint and a pipe.
//! - **Coordination** ([`attach::AttachGroup`]): owns the copy tasks of one
//!   attach/exec session, exposes wait/cancel, and releases every pipe
//!   handle exactly once on close.

#[cfg(not(unix))]
compile_error!("boxio requires named pipes and only builds on unix targets");

pub mod attach;
pub mod fifo;
pub mod options;
pub mod stream;
pub mod util;

pub use attach::{AttachGroup, AttachOptions, AttachState, CopyOutcome, Release, StdinCloser};
pub use boxio_shared::{BoxioError, BoxioResult};
pub use fifo::{FifoSet, StdioConfig, new_fifos};
pub use options::BoxioOptions;
pub use stream::StreamType;
