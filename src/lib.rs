// drift_monitor: host-side measurement of device clock drift over a serial link

pub mod config;
pub mod fixed_point;
pub mod monitor;
pub mod protocol;
pub mod serial;
pub mod session;
pub mod simulator;
pub mod sink;
pub mod time_source;

pub use monitor::{DriftMonitor, MonitorError, MonitorStats, Outcome};
pub use protocol::{LineKind, RawLine, classify};
pub use session::SessionState;
pub use sink::{FileLogSink, LogSink, MemoryLogSink};
pub use time_source::{HostSample, SystemTimeSource, TimeSource};
