//! Display side of the bridge: what the cockpit panel shows and how it is framed.

pub mod frame;
pub mod transform;

pub use frame::{ChecksumMode, DisplayFrame, FrameEncoder, GearState};
pub use transform::Transformer;
