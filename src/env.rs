mod environment;
pub use environment::{
    Clock, DeviceInfo, Environment, Errno, LinkSpeed, PortConf, PortId, QueueId, RssConf, RxConf, RxMode, RxMqMode, Thresholds, TxConf, TxMqMode, SOCKET_ID_ANY,
};

pub mod linux;
pub use linux::MonotonicClock;
#[cfg(target_arch = "x86_64")]
pub use linux::Tsc;

pub mod ring;
pub use ring::RingEnvironment;
