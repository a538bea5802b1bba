// Wand Inference - Double Buffer
//
// Two fixed slabs of raw scalars. The sampling task writes the active slab;
// when it fills, the roles swap and the ready flag is raised. The inference
// task claims the other slab with `take_ready`, which clears the flag.
//
// The role index, fill offset and ready flag live behind one lock so both
// tasks always see "which slab is readable" and "ready" as a consistent pair.
// Each slab has its own lock: the producer never waits on the consumer during
// a normal cycle, and if it ever laps the consumer it blocks instead of
// scribbling over a slab that is still being read.

use std::ops::Deref;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::NUM_CHANNELS;
use crate::error::Overrun;

#[derive(Debug, Default)]
struct Handoff {
    /// Slab currently owned by the producer (0 or 1).
    write_idx: usize,
    /// Scalars written into the active slab so far.
    fill: usize,
    ready: bool,
    /// Fills that landed while `ready` was still set, not yet reported.
    overruns: u64,
    closed: bool,
}

pub struct DoubleBuffer {
    slabs: [Mutex<Vec<f32>>; 2],
    state: Mutex<Handoff>,
    slab_len: usize,
}

/// Read access to the slab most recently handed off by the producer.
pub struct ReadySlab<'a> {
    guard: MutexGuard<'a, Vec<f32>>,
}

impl Deref for ReadySlab<'_> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.guard
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Plain scalars inside; a panicked holder cannot leave them torn.
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DoubleBuffer {
    /// Allocate both slabs, each holding `samples_per_slab` 6-channel samples.
    pub fn new(samples_per_slab: usize) -> Self {
        let slab_len = samples_per_slab * NUM_CHANNELS;
        Self {
            slabs: [Mutex::new(vec![0.0; slab_len]), Mutex::new(vec![0.0; slab_len])],
            state: Mutex::new(Handoff::default()),
            slab_len,
        }
    }

    pub fn slab_len(&self) -> usize {
        self.slab_len
    }

    /// Append one sample to the active slab. Returns `true` once the slab is
    /// full; a full slab ignores further writes until [`try_swap`](Self::try_swap).
    pub fn write(&self, sample: &[f32; NUM_CHANNELS]) -> bool {
        let (idx, offset) = {
            let state = lock(&self.state);
            if state.fill >= self.slab_len {
                log::warn!("write to full slab dropped; swap pending");
                return true;
            }
            (state.write_idx, state.fill)
        };

        // Only the producer moves `write_idx`, so `idx` cannot go stale here.
        lock(&self.slabs[idx])[offset..offset + NUM_CHANNELS].copy_from_slice(sample);

        let mut state = lock(&self.state);
        state.fill += NUM_CHANNELS;
        state.fill >= self.slab_len
    }

    /// Hand a full slab to the consumer: raise the ready flag, swap roles,
    /// rewind the fill offset. `Ok(false)` if the active slab is not full yet.
    ///
    /// The swap always happens. If the previous handoff was never claimed the
    /// older slab is lost, the overrun is counted, and `Err(Overrun)` returned.
    pub fn try_swap(&self) -> Result<bool, Overrun> {
        let mut state = lock(&self.state);
        if state.fill < self.slab_len {
            return Ok(false);
        }

        let overrun = state.ready;
        state.fill = 0;
        state.ready = true;
        state.write_idx ^= 1;

        if overrun {
            state.overruns += 1;
            Err(Overrun)
        } else {
            Ok(true)
        }
    }

    pub fn is_ready(&self) -> bool {
        lock(&self.state).ready
    }

    /// Claim the ready slab and clear the flag. `None` if nothing is ready.
    ///
    /// Drop the returned slab before calling back into this buffer.
    pub fn take_ready(&self) -> Option<ReadySlab<'_>> {
        let state_guard = {
            let mut state = lock(&self.state);
            if !state.ready {
                return None;
            }
            state.ready = false;
            state
        };
        let read_idx = state_guard.write_idx ^ 1;
        // Lock the slab before releasing the handoff so the producer cannot
        // lap around onto it in between.
        let guard = lock(&self.slabs[read_idx]);
        drop(state_guard);
        Some(ReadySlab { guard })
    }

    /// Number of overruns since the last call, resetting the counter.
    pub fn take_overruns(&self) -> u64 {
        std::mem::take(&mut lock(&self.state).overruns)
    }

    /// Mark end of stream. A pending slab can still be taken.
    pub fn close(&self) {
        lock(&self.state).closed = true;
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}
