// Atomic parameters - Lock-free communication control threads ↔ audio thread
// Floats are stored as their bit patterns inside integer atomics

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Thread-safe f32 parameter
#[derive(Debug)]
pub struct AtomicF32 {
    inner: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            inner: AtomicU32::new(value.to_bits()),
        }
    }

    /// Set the value (called from control threads)
    pub fn set(&self, value: f32) {
        self.inner.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Get the value (called from the audio thread)
    pub fn get(&self) -> f32 {
        f32::from_bits(self.inner.load(Ordering::Relaxed))
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Thread-safe f64 parameter, used for BPM
#[derive(Debug)]
pub struct AtomicF64 {
    inner: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            inner: AtomicU64::new(value.to_bits()),
        }
    }

    pub fn set(&self, value: f64) {
        self.inner.store(value.to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.inner.load(Ordering::Acquire))
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_atomic_f32_roundtrip() {
        let p = AtomicF32::new(0.5);
        assert_eq!(p.get(), 0.5);
        p.set(-0.25);
        assert_eq!(p.get(), -0.25);
    }

    #[test]
    fn test_atomic_f64_across_threads() {
        let bpm = Arc::new(AtomicF64::new(120.0));
        let writer = Arc::clone(&bpm);

        thread::spawn(move || writer.set(87.5)).join().unwrap();

        assert_eq!(bpm.get(), 87.5);
    }
}
