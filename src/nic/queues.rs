use crate::env::{Clock, Environment, PortId, QueueId};
use crate::lifecycle::RunningFlag;

use super::buffer_pool::Mbuf;
use super::driver_constants;

/// Hands every packet in `pkts` to the transmit ring, retrying the remainder after partial bursts.
/// Spins until done: there is no timeout and no way to cancel.
pub fn send_all<E: Environment + ?Sized>(env: &E, port: PortId, queue: QueueId, pkts: &mut [Option<Mbuf>]) {
    let mut sent = 0;
    while sent < pkts.len() {
        sent += env.tx_burst(port, queue, &mut pkts[sent..]);
    }
}

/// Same as `send_all`, but gives up once `running` is cleared. Returns how many packets were sent,
/// the unsent ones are left in place.
pub fn send_all_until<E: Environment + ?Sized>(env: &E, port: PortId, queue: QueueId, pkts: &mut [Option<Mbuf>], running: &RunningFlag) -> usize {
    let mut sent = 0;
    while sent < pkts.len() && running.is_running() {
        sent += env.tx_burst(port, queue, &mut pkts[sent..]);
    }
    sent
}

/// Turns byte counts into clock ticks at an assumed line rate.
pub struct RxTimestamper<C> {
    clock: C,
    ticks_per_byte: f64,
}

impl<C: Clock> RxTimestamper<C> {
    pub fn new(clock: C, bits_per_second: u64) -> RxTimestamper<C> {
        if bits_per_second == 0 {
            panic!("Bit rate must be non-zero");
        }
        let ticks_per_byte = clock.hz() as f64 * 8.0 / bits_per_second as f64;
        RxTimestamper { clock, ticks_per_byte }
    }

    pub fn with_default_rate(clock: C) -> RxTimestamper<C> {
        RxTimestamper::new(clock, driver_constants::DEFAULT_BIT_RATE)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn ticks_per_byte(&self) -> f64 {
        self.ticks_per_byte
    }

    /// Serialization delay of `bytes` on the wire, rounded down.
    #[inline(always)]
    pub fn delay(&self, bytes: u64) -> u64 {
        (bytes as f64 * self.ticks_per_byte) as u64
    }
}

/// Polls until at least one packet arrives or `running` is cleared (then returns 0).
///
/// The clock is read once, right before the burst, so a pause between the two cannot be blamed on the
/// packets. Packet i is stamped with that tick plus the serialization delay of packets 0..i, each
/// counted with its framing overhead.
pub fn receive_with_timestamps<E, C>(env: &E, port: PortId, queue: QueueId, pkts: &mut [Option<Mbuf>], stamper: &RxTimestamper<C>, running: &RunningFlag) -> usize
where
    E: Environment + ?Sized,
    C: Clock,
{
    if pkts.is_empty() {
        return 0;
    }
    while running.is_running() {
        let tsc = stamper.clock.ticks();
        let rx = env.rx_burst(port, queue, pkts);
        let mut bytes_before: u64 = 0;
        for m in pkts[..rx].iter_mut().flatten() {
            m.set_timestamp(tsc.wrapping_add(stamper.delay(bytes_before)));
            bytes_before += m.pkt_len() as u64 + driver_constants::FRAMING_OVERHEAD;
        }
        if rx > 0 {
            return rx;
        }
    }
    0
}
