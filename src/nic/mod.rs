pub(crate) mod driver_constants;

pub mod buffer_pool;
pub mod config;
pub mod device;
pub mod device_limits;
pub mod family;
pub mod fdir;
pub mod info;
pub mod queues;
pub mod regs;

pub const FRAMING_OVERHEAD: u64 = driver_constants::FRAMING_OVERHEAD;
pub const DEFAULT_BIT_RATE: u64 = driver_constants::DEFAULT_BIT_RATE;
pub const PACKET_SIZE: usize = driver_constants::PACKET_SIZE;
