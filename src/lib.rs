// Enable non-default lints
#![warn(future_incompatible)]
#![warn(nonstandard_style)]
#![warn(rust_2018_idioms)]
#![warn(unused)]

//! Device bring-up and burst I/O for poll-mode NIC ports.
//!
//! `configure` takes a port from unconfigured to running (queues, rings, RSS, flow director) and hands
//! back a `ConfiguredPort`, which is the only way to get at the port's registers. Per-queue workers then
//! call `send_all` and `receive_with_timestamps` on it in tight loops.

mod volatile;

pub mod env;
pub mod lifecycle;
pub mod nic;
pub mod pci;

pub use env::{Clock, Environment, Errno, PortId, QueueId};
pub use lifecycle::RunningFlag;
pub use nic::buffer_pool::{Mbuf, Mempool};
pub use nic::config::{rss, DeviceConfig, Tuning};
pub use nic::device::{configure, ConfigureError, ConfiguredPort};
pub use nic::family::HardwareFamily;
pub use nic::info::MacAddress;
pub use nic::queues::{receive_with_timestamps, send_all, send_all_until, RxTimestamper};
pub use nic::regs::{RegisterWindow, Registers};
