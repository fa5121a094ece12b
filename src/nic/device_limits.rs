pub const MAX_PORTS: usize = 32;

pub const MAX_RECEIVE_QUEUES: u16 = 128;

pub const MAX_TRANSMIT_QUEUES: u16 = 128;

pub const MAX_RING_DESCRIPTORS: u16 = 4096;

pub const QUEUE_STAT_COUNTERS: usize = 16;
