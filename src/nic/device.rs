use log::{debug, error, info, warn};
use thiserror::Error;

use crate::env::{
    Clock, Environment, Errno, LinkSpeed, PortConf, PortId, QueueId, RssConf, RxConf, RxMode, RxMqMode, TxConf, TxMqMode, SOCKET_ID_ANY,
};
use crate::lifecycle::RunningFlag;

use super::buffer_pool::Mbuf;
use super::config::DeviceConfig;
use super::device_limits;
use super::family::HardwareFamily;
use super::fdir::{FdirConf, FLEX_PAYLOAD_LEN};
use super::queues::{self, RxTimestamper};
use super::regs::Registers;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Receive,
    Transmit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigureError {
    #[error("port {port} is out of range, at most {max} ports are supported")]
    PortOutOfRange { port: PortId, max: usize },
    #[error("{requested} {direction:?} queues requested but at most {max} are supported")]
    TooManyQueues { direction: Direction, requested: u16, max: u16 },
    #[error("receive queue {queue} has no buffer pool")]
    MissingPool { queue: QueueId },
    #[error("flex payload offset {offset} leaves no room for {len} bytes")]
    FlexOffsetOutOfRange { offset: u16, len: usize },
    #[error("could not query device info: {0}")]
    DeviceInfo(Errno),
    #[error("could not configure port: {0}")]
    Configure(Errno),
    #[error("could not configure tx queue {queue}: {errno}")]
    TxQueueSetup { queue: QueueId, errno: Errno },
    #[error("could not configure rx queue {queue}: {errno}")]
    RxQueueSetup { queue: QueueId, errno: Errno },
    #[error("could not start port: {0}")]
    Start(Errno),
}

impl ConfigureError {
    /// The failing step's status code; requests rejected before touching the device report -EINVAL.
    pub fn status(&self) -> i32 {
        match self {
            ConfigureError::PortOutOfRange { .. }
            | ConfigureError::TooManyQueues { .. }
            | ConfigureError::MissingPool { .. }
            | ConfigureError::FlexOffsetOutOfRange { .. } => Errno::invalid().status(),
            ConfigureError::DeviceInfo(errno) | ConfigureError::Configure(errno) | ConfigureError::Start(errno) => errno.status(),
            ConfigureError::TxQueueSetup { errno, .. } | ConfigureError::RxQueueSetup { errno, .. } => errno.status(),
        }
    }
}

/// A port that went through `configure` and started.
/// Every queue below `rx_queues`/`tx_queues` can be polled.
pub struct ConfiguredPort<'e, E: Environment + ?Sized> {
    env: &'e E,
    port: PortId,
    family: HardwareFamily,
    rx_queues: u16,
    tx_queues: u16,
    registers: Option<Registers>,
}

pub fn port_conf(family: HardwareFamily, config: &DeviceConfig) -> PortConf {
    PortConf {
        rx_mode: RxMode {
            mq_mode: if config.enable_rss { RxMqMode::Rss } else { RxMqMode::None },
            header_split: false,
            hw_ip_checksum: true,
            hw_vlan_filter: false,
            hw_vlan_strip: config.strip_vlan,
            hw_strip_crc: true,
            jumbo_frame: false,
        },
        tx_mq_mode: TxMqMode::None,
        link_speeds: LinkSpeed::Autoneg,
        rss: RssConf { key: None, hash_functions: config.rss_mask },
        fdir: FdirConf::profile(family, &config.tuning),
    }
}

fn validate(port: PortId, config: &DeviceConfig, max_rx_queues: u16, max_tx_queues: u16) -> Result<(), ConfigureError> {
    let max_rx = max_rx_queues.min(device_limits::MAX_RECEIVE_QUEUES);
    if config.rx_queues > max_rx {
        return Err(ConfigureError::TooManyQueues { direction: Direction::Receive, requested: config.rx_queues, max: max_rx });
    }
    let max_tx = max_tx_queues.min(device_limits::MAX_TRANSMIT_QUEUES);
    if config.tx_queues > max_tx {
        return Err(ConfigureError::TooManyQueues { direction: Direction::Transmit, requested: config.tx_queues, max: max_tx });
    }
    if config.pools.len() < config.rx_queues as usize {
        return Err(ConfigureError::MissingPool { queue: config.pools.len() as QueueId });
    }
    let offset = config.tuning.flex_offset;
    if offset.checked_add(FLEX_PAYLOAD_LEN as u16 - 1).is_none() {
        return Err(ConfigureError::FlexOffsetOutOfRange { offset, len: FLEX_PAYLOAD_LEN });
    }
    debug!("Port {}: request for {} rx / {} tx queues is within limits", port, config.rx_queues, config.tx_queues);
    Ok(())
}

/// Brings `port` from unconfigured to running.
///
/// Steps run strictly in order and the first failure is returned as is: earlier steps are not rolled back,
/// callers retry from scratch. The register base is captured after start even if starting failed.
pub fn configure<'e, E: Environment + ?Sized>(env: &'e E, port: PortId, config: &DeviceConfig) -> Result<ConfiguredPort<'e, E>, ConfigureError> {
    if port as usize >= device_limits::MAX_PORTS {
        return Err(ConfigureError::PortOutOfRange { port, max: device_limits::MAX_PORTS });
    }

    let info = env.dev_info(port).map_err(|errno| {
        error!("Port {}: could not query device info ({})", port, errno);
        ConfigureError::DeviceInfo(errno)
    })?;
    let family = HardwareFamily::from_driver_name(&info.driver_name);
    debug!("Port {}: driver {} is in the {:?} family", port, info.driver_name, family);

    validate(port, config, info.max_rx_queues, info.max_tx_queues)?;

    let conf = port_conf(family, config);
    if let Err(errno) = env.dev_configure(port, config.rx_queues, config.tx_queues, &conf) {
        error!("Port {}: could not configure device ({})", port, errno);
        return Err(ConfigureError::Configure(errno));
    }

    let tx_conf = TxConf {
        thresholds: config.tuning.tx_thresh,
        no_multi_segs: true,
        no_offloads: config.disable_offloads,
    };
    let tx_descs = config.effective_tx_descs();
    for queue in 0..config.tx_queues {
        if let Err(errno) = env.tx_queue_setup(port, queue, tx_descs, SOCKET_ID_ANY, &tx_conf) {
            error!("Port {}: could not configure tx queue {} ({})", port, queue, errno);
            return Err(ConfigureError::TxQueueSetup { queue, errno });
        }
    }

    let rx_conf = RxConf { thresholds: config.tuning.rx_thresh, drop_enable: config.drop_enable };
    let rx_descs = config.effective_rx_descs();
    for queue in 0..config.rx_queues {
        if let Err(errno) = env.rx_queue_setup(port, queue, rx_descs, SOCKET_ID_ANY, &rx_conf, &config.pools[queue as usize]) {
            error!("Port {}: could not configure rx queue {} ({})", port, queue, errno);
            return Err(ConfigureError::RxQueueSetup { queue, errno });
        }
    }

    let started = env.dev_start(port);

    let registers = match env.dev_info(port) {
        Ok(info) => info.registers.map(Registers::new),
        Err(errno) => {
            warn!("Port {}: could not capture the register base ({})", port, errno);
            None
        }
    };

    if let Err(errno) = started {
        error!("Port {}: could not start device ({})", port, errno);
        return Err(ConfigureError::Start(errno));
    }

    info!(
        "Port {}: running with {} rx queues ({} descriptors), {} tx queues ({} descriptors), rss {}",
        port,
        config.rx_queues,
        rx_descs,
        config.tx_queues,
        tx_descs,
        if config.enable_rss { "on" } else { "off" }
    );

    Ok(ConfiguredPort {
        env,
        port,
        family,
        rx_queues: config.rx_queues,
        tx_queues: config.tx_queues,
        registers,
    })
}

impl<'e, E: Environment + ?Sized> ConfiguredPort<'e, E> {
    pub fn port(&self) -> PortId {
        self.port
    }

    pub fn family(&self) -> HardwareFamily {
        self.family
    }

    pub fn rx_queues(&self) -> u16 {
        self.rx_queues
    }

    pub fn tx_queues(&self) -> u16 {
        self.tx_queues
    }

    pub fn env(&self) -> &'e E {
        self.env
    }

    /// None when the device exposes no memory-mapped register file.
    pub fn registers(&self) -> Option<&Registers> {
        self.registers.as_ref()
    }

    fn check_rx(&self, queue: QueueId) {
        if queue >= self.rx_queues {
            panic!("Port {} has no rx queue {}", self.port, queue);
        }
    }

    fn check_tx(&self, queue: QueueId) {
        if queue >= self.tx_queues {
            panic!("Port {} has no tx queue {}", self.port, queue);
        }
    }

    #[inline(always)]
    pub fn rx_burst(&self, queue: QueueId, pkts: &mut [Option<Mbuf>]) -> usize {
        self.check_rx(queue);
        self.env.rx_burst(self.port, queue, pkts)
    }

    #[inline(always)]
    pub fn tx_burst(&self, queue: QueueId, pkts: &mut [Option<Mbuf>]) -> usize {
        self.check_tx(queue);
        self.env.tx_burst(self.port, queue, pkts)
    }

    pub fn send_all(&self, queue: QueueId, pkts: &mut [Option<Mbuf>]) {
        self.check_tx(queue);
        queues::send_all(self.env, self.port, queue, pkts)
    }

    pub fn send_all_until(&self, queue: QueueId, pkts: &mut [Option<Mbuf>], running: &RunningFlag) -> usize {
        self.check_tx(queue);
        queues::send_all_until(self.env, self.port, queue, pkts, running)
    }

    pub fn receive_with_timestamps<C: Clock>(&self, queue: QueueId, pkts: &mut [Option<Mbuf>], stamper: &RxTimestamper<C>, running: &RunningFlag) -> usize {
        self.check_rx(queue);
        queues::receive_with_timestamps(self.env, self.port, queue, pkts, stamper, running)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::env::ring::{Call, RingPortSpec, Stage};
    use crate::env::RingEnvironment;
    use crate::nic::buffer_pool::Mempool;
    use crate::nic::config::{rss, Tuning};
    use crate::nic::fdir::FlowType;

    fn single(driver_name: &str) -> RingEnvironment {
        RingEnvironment::new(vec![RingPortSpec { driver_name: driver_name.to_owned(), ..RingPortSpec::default() }]).unwrap()
    }

    fn pool() -> Arc<Mempool> {
        Mempool::create("rx", 64, 2048)
    }

    #[test]
    fn steps_run_in_order() {
        let env = single("net_ring");
        let config = DeviceConfig::new().rx_queues(2).tx_queues(2).pool(pool()).pool(pool());
        let port = configure(&env, 0, &config).unwrap();
        assert_eq!(port.rx_queues(), 2);
        assert_eq!(port.tx_queues(), 2);
        assert!(port.registers().is_some());
        assert_eq!(
            env.calls(0),
            vec![
                Call::Info,
                Call::Configure { rx_queues: 2, tx_queues: 2 },
                Call::TxQueueSetup { queue: 0, descs: 256 },
                Call::TxQueueSetup { queue: 1, descs: 256 },
                Call::RxQueueSetup { queue: 0, descs: 512 },
                Call::RxQueueSetup { queue: 1, descs: 512 },
                Call::Start,
                Call::Info,
            ]
        );
    }

    #[test]
    fn port_conf_follows_request() {
        let env = single("net_ring");
        let config = DeviceConfig::new().pool(pool()).rss(true).strip_vlan(true).rss_mask(rss::IPV4);
        configure(&env, 0, &config).unwrap();
        let conf = env.port_conf(0).unwrap();
        assert_eq!(conf.rx_mode.mq_mode, RxMqMode::Rss);
        assert!(conf.rx_mode.hw_ip_checksum);
        assert!(conf.rx_mode.hw_strip_crc);
        assert!(conf.rx_mode.hw_vlan_strip);
        assert_eq!(conf.link_speeds, LinkSpeed::Autoneg);
        assert_eq!(conf.rss.hash_functions, rss::IPV4);
        assert_eq!(conf.fdir.flex.masks[0].flow_type, FlowType::Unknown);

        let env = single("net_ring");
        configure(&env, 0, &DeviceConfig::new().pool(pool())).unwrap();
        let conf = env.port_conf(0).unwrap();
        assert_eq!(conf.rx_mode.mq_mode, RxMqMode::None);
        assert!(!conf.rx_mode.hw_vlan_strip);
    }

    #[test]
    fn i40e_gets_its_own_flow_type() {
        let env = single("net_i40e");
        let port = configure(&env, 0, &DeviceConfig::new().pool(pool())).unwrap();
        assert_eq!(port.family(), HardwareFamily::I40e);
        assert_eq!(env.port_conf(0).unwrap().fdir.flex.masks[0].flow_type, FlowType::L2Payload);
    }

    #[test]
    fn queue_conf_uses_fixed_thresholds() {
        let env = single("net_ring");
        let config = DeviceConfig::new().pool(pool()).rx_descs(1024).tx_descs(128).drop_enable(true).disable_offloads(true);
        configure(&env, 0, &config).unwrap();

        let tuning = Tuning::default();
        let (descs, rx_conf) = env.rx_queue(0, 0).unwrap();
        assert_eq!(descs, 1024);
        assert_eq!(rx_conf.thresholds, tuning.rx_thresh);
        assert!(rx_conf.drop_enable);

        let (descs, tx_conf) = env.tx_queue(0, 0).unwrap();
        assert_eq!(descs, 128);
        assert_eq!(tx_conf.thresholds, tuning.tx_thresh);
        assert!(tx_conf.no_multi_segs);
        assert!(tx_conf.no_offloads);
    }

    #[test]
    fn rejects_invalid_requests_before_configuring() {
        let env = single("net_ring");
        let err = configure(&env, 40, &DeviceConfig::new().pool(pool())).err().unwrap();
        assert_eq!(err, ConfigureError::PortOutOfRange { port: 40, max: 32 });

        let err = configure(&env, 0, &DeviceConfig::new().rx_queues(2).pool(pool())).err().unwrap();
        assert_eq!(err, ConfigureError::MissingPool { queue: 1 });
        assert_eq!(err.status(), -libc::EINVAL);

        let err = configure(&env, 0, &DeviceConfig::new().tx_queues(17).pool(pool())).err().unwrap();
        assert_eq!(err, ConfigureError::TooManyQueues { direction: Direction::Transmit, requested: 17, max: 16 });

        assert!(env.calls(0).iter().all(|c| *c == Call::Info));
    }

    #[test]
    fn rejects_flex_offset_without_room_for_the_payload() {
        let env = single("net_ring");
        let tuning = Tuning { flex_offset: 65_521, ..Tuning::default() };
        let err = configure(&env, 0, &DeviceConfig::new().pool(pool()).tuning(tuning)).err().unwrap();
        assert_eq!(err, ConfigureError::FlexOffsetOutOfRange { offset: 65_521, len: 16 });
        assert_eq!(err.status(), -libc::EINVAL);
        assert_eq!(env.calls(0), vec![Call::Info]);

        // The last offset that still fits
        let tuning = Tuning { flex_offset: 65_520, ..Tuning::default() };
        let port = configure(&env, 0, &DeviceConfig::new().pool(pool()).tuning(tuning)).unwrap();
        assert_eq!(env.port_conf(port.port()).unwrap().fdir.flex.payloads[0].src_offset[15], u16::MAX);
    }

    #[test]
    #[should_panic(expected = "no rx queue 1")]
    fn raw_rx_burst_on_missing_queue_panics() {
        let env = single("net_ring");
        let port = configure(&env, 0, &DeviceConfig::new().pool(pool())).unwrap();
        let mut pkts: Vec<Option<Mbuf>> = (0..4).map(|_| None).collect();
        port.rx_burst(1, &mut pkts);
    }

    #[test]
    #[should_panic(expected = "no tx queue 0")]
    fn raw_tx_burst_on_missing_queue_panics() {
        let env = single("net_ring");
        let port = configure(&env, 0, &DeviceConfig::new().tx_queues(0).pool(pool())).unwrap();
        port.tx_burst(0, &mut []);
    }

    #[test]
    fn first_failing_tx_queue_aborts() {
        let env = single("net_ring");
        env.inject_failure(0, Stage::TxQueue(1), Errno(-12));
        let config = DeviceConfig::new().rx_queues(1).tx_queues(3).pool(pool());
        let err = configure(&env, 0, &config).err().unwrap();
        assert_eq!(err, ConfigureError::TxQueueSetup { queue: 1, errno: Errno(-12) });
        assert_eq!(err.status(), -12);
        assert_eq!(err.to_string(), "could not configure tx queue 1: status -12");

        let calls = env.calls(0);
        assert_eq!(calls.last(), Some(&Call::TxQueueSetup { queue: 1, descs: 256 }));
        assert!(!calls.iter().any(|c| matches!(c, Call::RxQueueSetup { .. } | Call::Start)));
        assert!(!env.is_started(0));
    }

    #[test]
    fn first_failing_rx_queue_aborts() {
        let env = single("net_ring");
        env.inject_failure(0, Stage::RxQueue(0), Errno(-22));
        let err = configure(&env, 0, &DeviceConfig::new().pool(pool())).err().unwrap();
        assert_eq!(err, ConfigureError::RxQueueSetup { queue: 0, errno: Errno(-22) });
        assert!(!env.calls(0).contains(&Call::Start));
    }

    #[test]
    fn configure_failure_is_returned() {
        let env = single("net_ring");
        env.inject_failure(0, Stage::Configure, Errno(-95));
        let err = configure(&env, 0, &DeviceConfig::new().pool(pool())).err().unwrap();
        assert_eq!(err.status(), -95);
        assert_eq!(env.calls(0).len(), 2);
    }

    #[test]
    fn start_failure_still_captures_registers() {
        let env = single("net_ring");
        env.inject_failure(0, Stage::Start, Errno(-5));
        let err = configure(&env, 0, &DeviceConfig::new().pool(pool())).err().unwrap();
        assert_eq!(err, ConfigureError::Start(Errno(-5)));
        assert_eq!(env.calls(0).last(), Some(&Call::Info));
    }

    #[test]
    fn failing_first_query_aborts() {
        let env = single("net_ring");
        env.inject_failure(0, Stage::Info, Errno(-19));
        let err = configure(&env, 0, &DeviceConfig::new().pool(pool())).err();
        assert_eq!(err, Some(ConfigureError::DeviceInfo(Errno(-19))));
        assert_eq!(env.calls(0), vec![Call::Info]);
    }

    // Answers the first device-info query only
    struct ForgetfulEnvironment {
        inner: RingEnvironment,
        info_calls: AtomicUsize,
    }

    impl Environment for ForgetfulEnvironment {
        fn dev_info(&self, port: PortId) -> Result<crate::env::DeviceInfo, Errno> {
            if self.info_calls.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(Errno(-19));
            }
            self.inner.dev_info(port)
        }

        fn mac_addr(&self, port: PortId) -> Result<[u8; 6], Errno> {
            self.inner.mac_addr(port)
        }

        fn dev_configure(&self, port: PortId, rx_queues: u16, tx_queues: u16, conf: &PortConf) -> Result<(), Errno> {
            self.inner.dev_configure(port, rx_queues, tx_queues, conf)
        }

        fn tx_queue_setup(&self, port: PortId, queue: QueueId, descs: u16, socket_id: i32, conf: &TxConf) -> Result<(), Errno> {
            self.inner.tx_queue_setup(port, queue, descs, socket_id, conf)
        }

        fn rx_queue_setup(&self, port: PortId, queue: QueueId, descs: u16, socket_id: i32, conf: &RxConf, pool: &Arc<Mempool>) -> Result<(), Errno> {
            self.inner.rx_queue_setup(port, queue, descs, socket_id, conf, pool)
        }

        fn dev_start(&self, port: PortId) -> Result<(), Errno> {
            self.inner.dev_start(port)
        }

        fn rx_burst(&self, port: PortId, queue: QueueId, pkts: &mut [Option<Mbuf>]) -> usize {
            self.inner.rx_burst(port, queue, pkts)
        }

        fn tx_burst(&self, port: PortId, queue: QueueId, pkts: &mut [Option<Mbuf>]) -> usize {
            self.inner.tx_burst(port, queue, pkts)
        }
    }

    #[test]
    fn failed_register_capture_does_not_fail_configure() {
        let env = ForgetfulEnvironment { inner: single("net_ring"), info_calls: AtomicUsize::new(0) };
        let port = configure(&env, 0, &DeviceConfig::new().pool(pool())).unwrap();
        assert!(port.registers().is_none());
        assert!(env.inner.is_started(0));
    }
}
