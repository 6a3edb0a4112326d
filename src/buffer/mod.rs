// Buffer module - Global sequencing and per-application ring buffers

mod ring;
mod store;

pub use ring::RingBuffer;
pub use store::{BufferStatus, BufferStore, Sequencer};
