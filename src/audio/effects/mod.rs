//! Audio effect nodes.
//!
//! This module provides audio processing effects that implement [`Node`](crate::pipeline::Node).

pub mod gate;
pub mod level_meter;

pub use gate::Gate;
pub use level_meter::{LevelMeter, calculate_rms_level, load_level, store_level};
