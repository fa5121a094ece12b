// Enable non-default lints
#![warn(future_incompatible)]
#![warn(nonstandard_style)]
#![warn(rust_2018_idioms)]
#![warn(unused)]

use std::error::Error;
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn, LevelFilter, Log, Metadata, Record};

use burstnic::env::{MonotonicClock, RingEnvironment};
use burstnic::nic::{info as port_info, PACKET_SIZE};
use burstnic::{configure, lifecycle, ConfiguredPort, DeviceConfig, Mbuf, Mempool, RunningFlag, RxTimestamper};

const POOL_SIZE: usize = 4096;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging() {
    let level = std::env::var("BURSTNIC_LOG").ok().and_then(|s| s.parse::<LevelFilter>().ok()).unwrap_or(LevelFilter::Info);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn parse_arg(args: &[String], index: usize, default: usize) -> Result<usize, Box<dyn Error>> {
    match args.get(index) {
        Some(s) => Ok(s.parse::<usize>().map_err(|e| format!("argument {} ({}): {}", index, s, e))?),
        None => Ok(default),
    }
}

#[derive(Default)]
struct RxSummary {
    packets: usize,
    bytes: u64,
    first: u64,
    last: u64,
}

#[inline(never)]
fn transmit(port: &ConfiguredPort<'_, RingEnvironment>, pool: &std::sync::Arc<Mempool>, total: usize, batch: usize, size: u32, running: &RunningFlag) -> usize {
    let mut sent = 0;
    let mut pkts: Vec<Option<Mbuf>> = Vec::with_capacity(batch);
    while sent < total && running.is_running() {
        pkts.clear();
        while pkts.len() < batch.min(total - sent) {
            match pool.alloc() {
                Some(mut m) => {
                    m.set_pkt_len(size);
                    let seq = ((sent + pkts.len()) as u64).to_le_bytes();
                    m.data_mut()[..seq.len()].copy_from_slice(&seq);
                    pkts.push(Some(m));
                }
                None => break,
            }
        }
        sent += port.send_all_until(0, &mut pkts, running);
    }
    sent
}

#[inline(never)]
fn receive(port: &ConfiguredPort<'_, RingEnvironment>, stamper: &RxTimestamper<MonotonicClock>, batch: usize, total: usize, running: &RunningFlag) -> RxSummary {
    let mut summary = RxSummary::default();
    let mut pkts: Vec<Option<Mbuf>> = (0..batch).map(|_| None).collect();
    while summary.packets < total {
        let rx = port.receive_with_timestamps(0, &mut pkts, stamper, running);
        if rx == 0 {
            break;
        }
        for slot in pkts[..rx].iter_mut() {
            if let Some(m) = slot.take() {
                if summary.packets == 0 {
                    summary.first = m.timestamp();
                }
                summary.last = m.timestamp();
                summary.bytes += m.pkt_len() as u64;
                summary.packets += 1;
            }
        }
    }
    summary
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 4 {
        return Err("Expected at most 3 args (+ implicit exe name): [packets] [batch] [packet size]".into());
    }
    let total = parse_arg(&args, 1, 100_000)?;
    let batch = parse_arg(&args, 2, 64)?.max(1);
    let size = parse_arg(&args, 3, 60)?.clamp(60, PACKET_SIZE) as u32;

    let running = RunningFlag::new();
    lifecycle::stop_on_signals(&running)?;

    let env = RingEnvironment::pair()?;
    let tx_pool = Mempool::create("tx0", POOL_SIZE, PACKET_SIZE);
    let rx_pool = Mempool::create("rx1", POOL_SIZE, PACKET_SIZE);

    let tx_port = configure(&env, 0, &DeviceConfig::new().rx_queues(0).tx_queues(1))?;
    let rx_port = configure(&env, 1, &DeviceConfig::new().rx_queues(1).tx_queues(0).pool(rx_pool))?;
    for port in [tx_port.port(), rx_port.port()] {
        info!("Port {}: {} ({:08x}), MAC {}", port, port_info::driver_name(&env, port)?, port_info::pci_id(&env, port)?.packed(), port_info::mac_address(&env, port)?);
    }

    let stamper = RxTimestamper::with_default_rate(MonotonicClock);

    info!("All good, sending {} packets of {} bytes in batches of {}...", total, size, batch);
    let start = Instant::now();
    let (sent, summary) = thread::scope(|s| {
        let receiver = s.spawn(|| receive(&rx_port, &stamper, batch, total, &running));
        let sent = transmit(&tx_port, &tx_pool, total, batch, size, &running);

        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while !receiver.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        running.stop();
        (sent, receiver.join())
    });
    let summary = summary.map_err(|_| "receiver panicked")?;
    let elapsed = start.elapsed();

    if summary.packets < sent {
        warn!("Only {} of {} sent packets arrived", summary.packets, sent);
    }
    let span = summary.last.saturating_sub(summary.first);
    info!(
        "Received {} packets ({} bytes) in {:?}, estimated arrivals span {} ns",
        summary.packets, summary.bytes, elapsed, span
    );
    Ok(())
}
