// Sweeper module - Background disk maintenance independent of the writer

mod retention;
mod rotation;

pub use retention::RetentionSweeper;
pub use rotation::RotationSweeper;
