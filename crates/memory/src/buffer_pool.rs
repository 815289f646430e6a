use std::sync::Arc;

use parking_lot::Mutex;

use crate::manager::MemoryManager;

/// Power-of-two bucket sizes from 4 KiB to 1 MiB (§3 Buffer Pool).
const BUCKET_SIZES: [usize; 9] = [
    4 * 1024,
    8 * 1024,
    16 * 1024,
    32 * 1024,
    64 * 1024,
    128 * 1024,
    256 * 1024,
    512 * 1024,
    1024 * 1024,
];

/// Caps how many freed buffers a single bucket keeps around; beyond
/// this the buffer is dropped (and its reservation still released) to
/// avoid an unbounded idle pool.
const MAX_PER_BUCKET: usize = 64;

struct Bucket {
    size: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

/// Sized byte-buffer reuse with a memory budget (§4.8). Every `get`
/// reserves memory through the `MemoryManager`; every `put` releases it.
pub struct BufferPool {
    memory: Arc<MemoryManager>,
    buckets: Vec<Bucket>,
}

impl BufferPool {
    pub fn new(memory: Arc<MemoryManager>) -> Self {
        let buckets = BUCKET_SIZES
            .iter()
            .map(|&size| Bucket {
                size,
                free: Mutex::new(Vec::new()),
            })
            .collect();
        Self { memory, buckets }
    }

    fn bucket_for(&self, size: usize) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.size == size)
    }

    /// Returns a buffer of exactly `size` bytes, or `None` if the
    /// memory manager refuses the reservation.
    pub fn get(&self, size: usize) -> Option<Vec<u8>> {
        if !self.memory.check_and_reserve(size as u64) {
            return None;
        }
        if let Some(bucket) = self.bucket_for(size) {
            if let Some(mut buf) = bucket.free.lock().pop() {
                buf.clear();
                buf.resize(size, 0);
                return Some(buf);
            }
        }
        Some(vec![0u8; size])
    }

    /// Return a buffer to the pool. Always releases its reservation;
    /// only buffers whose length matches a standard bucket are kept.
    pub fn put(&self, buf: Vec<u8>) {
        let size = buf.len();
        self.memory.release(size as u64);
        if let Some(bucket) = self.bucket_for(size) {
            let mut free = bucket.free.lock();
            if free.len() < MAX_PER_BUCKET {
                free.push(buf);
            }
        }
    }

    /// Drain every bucket, releasing reservations is already done at
    /// `put` time, so cleanup here only needs to drop the stored
    /// buffers.
    pub fn cleanup(&self) {
        for bucket in &self.buckets {
            bucket.free.lock().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::MemoryManagerConfig;

    fn pool(budget: u64) -> BufferPool {
        BufferPool::new(MemoryManager::new(MemoryManagerConfig {
            budget,
            ..Default::default()
        }))
    }

    #[test]
    fn get_reserves_and_put_releases() {
        let pool = pool(4096 * 2);
        let buf = pool.get(4096).unwrap();
        assert_eq!(buf.len(), 4096);
        assert_eq!(pool.memory.current(), 4096);
        pool.put(buf);
        assert_eq!(pool.memory.current(), 0);
    }

    #[test]
    fn get_fails_when_budget_exhausted() {
        let pool = pool(2048);
        assert!(pool.get(4096).is_none());
        assert_eq!(pool.memory.current(), 0);
    }

    #[test]
    fn non_standard_size_allocates_fresh_but_still_reserves() {
        let pool = pool(10_000);
        let buf = pool.get(777).unwrap();
        assert_eq!(buf.len(), 777);
        assert_eq!(pool.memory.current(), 777);
        pool.put(buf);
        assert_eq!(pool.memory.current(), 0);
    }

    #[test]
    fn bucket_reuse_round_trips_size() {
        let pool = pool(1024 * 1024);
        let a = pool.get(8192).unwrap();
        pool.put(a);
        let b = pool.get(8192).unwrap();
        assert_eq!(b.len(), 8192);
    }

    #[test]
    fn cleanup_drains_buckets() {
        let pool = pool(1024 * 1024);
        let a = pool.get(4096).unwrap();
        pool.put(a);
        pool.cleanup();
        // Bucket emptied; next get still succeeds by fresh allocation.
        let b = pool.get(4096).unwrap();
        assert_eq!(b.len(), 4096);
    }
}
