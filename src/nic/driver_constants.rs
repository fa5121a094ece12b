pub const DEFAULT_RX_DESCS: u16 = 512;

pub const DEFAULT_TX_DESCS: u16 = 256;

// Taken from the DPDK l2fwd example, tuned for 10 GbE
pub const RX_PTHRESH: u8 = 8;
pub const RX_HTHRESH: u8 = 8;
pub const RX_WTHRESH: u8 = 4;

pub const TX_PTHRESH: u8 = 36;
pub const TX_HTHRESH: u8 = 0;
pub const TX_WTHRESH: u8 = 0;

// Preamble + start delimiter (8), inter-frame gap (12), FCS (4)
pub const FRAMING_OVERHEAD: u64 = 24;

pub const DEFAULT_BIT_RATE: u64 = 10_000_000_000;

pub const PACKET_SIZE: usize = 2048;

pub const FDIR_FLEX_OFFSET: u16 = 42;

pub const FDIR_DROP_QUEUE: u8 = 63;
