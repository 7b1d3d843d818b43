//! Live status probes for blockhost.
//!
//! Two clients talk to a running engine over the network:
//!
//! - [`ping`]: the TCP server list ping, decoding both the modern (1.4-1.6)
//!   and the legacy reply shapes
//! - [`query`]: a UDP query session with challenge handshake and full
//!   statistics
//!
//! Neither retries. Both are bounded by a caller-supplied timeout.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ping;
pub mod query;
pub mod types;

pub use error::{ProbeError, Result};
pub use ping::ping;
pub use query::{full_query, QuerySession};
pub use types::{FullStat, PingResult};
