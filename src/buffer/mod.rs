// Wand Inference - Sample Buffers
//
// `double`: the producer/consumer slab pair with the ready-flag handoff.
// `ring`: the circular inference window, one slice per drained slab.

pub mod double;
pub mod ring;

pub use double::{DoubleBuffer, ReadySlab};
pub use ring::RingWindow;
