//! Rolling waveform window shared between acquisition and rendering
//!
//! One producer appends samples at a wrapping cursor; the render loop copies
//! the whole window once per frame. Both sides take the same lock, so a
//! snapshot is never torn by a concurrent write.

use std::sync::{Mutex, PoisonError};

/// Fixed-capacity circular sample store with a leads-connected flag
#[derive(Debug)]
pub struct WaveformStore {
    capacity: usize,
    inner: Mutex<Window>,
}

#[derive(Debug)]
struct Window {
    samples: Vec<f32>,
    /// Total samples ever written; the cursor is this modulo capacity
    written: u64,
    connected: bool,
}

/// Immutable copy of the window taken under the store lock
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub samples: Vec<f32>,
    pub connected: bool,
    /// Index the next sample will be written to (the oldest sample)
    pub cursor: usize,
}

impl Snapshot {
    /// Write cursor as a fraction of the window, in [0, 1)
    pub fn cursor_fraction(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.cursor as f32 / self.samples.len() as f32
    }
}

impl WaveformStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Window {
                samples: vec![0.0; capacity],
                written: 0,
                connected: false,
            }),
        }
    }

    /// Append one sample at the cursor and mark the leads connected.
    ///
    /// Must only be called from the acquisition thread.
    pub fn write(&self, sample: f32) {
        let mut window = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let index = (window.written % self.capacity as u64) as usize;
        window.samples[index] = sample;
        window.written += 1;
        window.connected = true;
    }

    /// Flag the leads as disconnected without touching the samples
    pub fn mark_disconnected(&self) {
        let mut window = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        window.connected = false;
    }

    pub fn snapshot(&self) -> Snapshot {
        let window = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Snapshot {
            samples: window.samples.clone(),
            connected: window.connected,
            cursor: (window.written % self.capacity as u64) as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_new_store_is_disconnected_and_zeroed() {
        let store = WaveformStore::new(8);
        let snap = store.snapshot();
        assert_eq!(snap.samples, vec![0.0; 8]);
        assert!(!snap.connected);
        assert_eq!(snap.cursor, 0);
    }

    #[test]
    fn test_write_advances_cursor_and_connects() {
        let store = WaveformStore::new(4);
        store.write(0.5);
        store.write(-0.25);

        let snap = store.snapshot();
        assert_eq!(snap.samples, vec![0.5, -0.25, 0.0, 0.0]);
        assert_eq!(snap.cursor, 2);
        assert!(snap.connected);
        assert!((snap.cursor_fraction() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_write_wraps_at_capacity() {
        let store = WaveformStore::new(3);
        for sample in [1.0, 2.0, 3.0, 4.0, 5.0] {
            store.write(sample);
        }

        let snap = store.snapshot();
        assert_eq!(snap.samples, vec![4.0, 5.0, 3.0]);
        assert_eq!(snap.cursor, 2);
    }

    #[test]
    fn test_mark_disconnected_keeps_samples() {
        let store = WaveformStore::new(2);
        store.write(1.0);
        store.mark_disconnected();

        let snap = store.snapshot();
        assert!(!snap.connected);
        assert_eq!(snap.samples[0], 1.0);

        store.write(2.0);
        assert!(store.snapshot().connected);
    }

    #[test]
    fn test_snapshot_is_never_torn() {
        // Every write fills the window with one value, so any mix of values
        // in a snapshot would mean a torn read.
        const N: usize = 64;
        let store = Arc::new(WaveformStore::new(N));
        let writer_store = Arc::clone(&store);

        let writer = std::thread::spawn(move || {
            for round in 0..200 {
                for _ in 0..N {
                    writer_store.write(round as f32);
                }
            }
        });

        for _ in 0..500 {
            let snap = store.snapshot();
            let mut values: Vec<f32> = snap.samples.clone();
            values.dedup();
            // A window written round-by-round holds at most two rounds, split
            // exactly at the cursor.
            assert!(values.len() <= 3, "unexpected window {:?}", values);
            if snap.cursor != 0 {
                let head = snap.samples[0];
                assert!(snap.samples[..snap.cursor].iter().all(|&v| v == head));
            }
        }

        writer.join().unwrap();
    }
}
