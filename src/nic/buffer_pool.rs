use std::fmt;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use spin::Mutex;

/// Fixed set of packet buffers, all allocated up front.
pub struct Mempool {
    name: String,
    buffer_size: usize,
    capacity: usize,
    free: Mutex<Vec<Box<[u8]>>>,
}

impl Mempool {
    pub fn create(name: &str, capacity: usize, buffer_size: usize) -> Arc<Mempool> {
        let mut free = Vec::with_capacity(capacity);
        for _n in 0..capacity {
            free.push(vec![0u8; buffer_size].into_boxed_slice());
        }
        Arc::new(Mempool {
            name: name.to_owned(),
            buffer_size,
            capacity,
            free: Mutex::new(free),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    // Note that Rust represents "None" as NULL for Options of boxes, so this is as cheap as a pointer
    pub fn alloc(self: &Arc<Self>) -> Option<Mbuf> {
        let data = self.free.lock().pop()?;
        Some(Mbuf {
            data: ManuallyDrop::new(data),
            pkt_len: 0,
            udata64: 0,
            pool: Arc::clone(self),
        })
    }

    fn give(&self, data: Box<[u8]>) {
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(data);
        }
    }
}

impl fmt::Debug for Mempool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mempool")
            .field("name", &self.name)
            .field("buffer_size", &self.buffer_size)
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .finish()
    }
}

/// Handle to one packet buffer. Dropping it returns the storage to its pool.
pub struct Mbuf {
    data: ManuallyDrop<Box<[u8]>>,
    pkt_len: u32,
    udata64: u64,
    pool: Arc<Mempool>,
}

impl Mbuf {
    pub fn data(&self) -> &[u8] {
        &self.data[..self.pkt_len as usize]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.pkt_len as usize]
    }

    pub fn buffer_size(&self) -> usize {
        self.data.len()
    }

    pub fn pkt_len(&self) -> u32 {
        self.pkt_len
    }

    pub fn set_pkt_len(&mut self, len: u32) {
        if len as usize > self.data.len() {
            panic!("Packet length {} exceeds buffer size {}", len, self.data.len());
        }
        self.pkt_len = len;
    }

    /// Auxiliary 64-bit field, holds the estimated arrival tick after a timestamped receive.
    pub fn timestamp(&self) -> u64 {
        self.udata64
    }

    pub fn set_timestamp(&mut self, ticks: u64) {
        self.udata64 = ticks;
    }

    pub fn pool(&self) -> &Arc<Mempool> {
        &self.pool
    }

    pub fn free(self) {
        drop(self);
    }
}

impl Drop for Mbuf {
    fn drop(&mut self) {
        // Safe because `data` is never touched again after this
        let data = unsafe { ManuallyDrop::take(&mut self.data) };
        self.pool.give(data);
    }
}

impl fmt::Debug for Mbuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mbuf")
            .field("pool", &self.pool.name)
            .field("pkt_len", &self.pkt_len)
            .field("udata64", &self.udata64)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_until_empty_then_recycle() {
        let pool = Mempool::create("test", 2, 64);
        let a = pool.alloc().unwrap();
        let b = pool.alloc().unwrap();
        assert!(pool.alloc().is_none());
        assert_eq!(pool.available(), 0);

        a.free();
        assert_eq!(pool.available(), 1);
        drop(b);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn recycled_buffers_start_clean() {
        let pool = Mempool::create("test", 1, 64);
        let mut m = pool.alloc().unwrap();
        m.set_pkt_len(60);
        m.set_timestamp(1234);
        drop(m);

        let m = pool.alloc().unwrap();
        assert_eq!(m.pkt_len(), 0);
        assert_eq!(m.timestamp(), 0);
        assert_eq!(m.buffer_size(), 64);
    }

    #[test]
    #[should_panic]
    fn length_beyond_buffer_panics() {
        let pool = Mempool::create("test", 1, 64);
        let mut m = pool.alloc().unwrap();
        m.set_pkt_len(65);
    }
}
