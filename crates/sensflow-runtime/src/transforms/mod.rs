#![forbid(unsafe_code)]

//! Intermediate stages: each listens to one or more upstream cells and owns
//! an output cell.
//!
//! All transforms always propagate: an input equal to the previous one
//! still produces an emission.

pub mod join;
pub mod lambda;
pub mod linear;
pub mod moving_average;
pub mod window;

pub use join::{Join2, JoinAll, JoinInput};
pub use lambda::Lambda;
pub use linear::Linear;
pub use moving_average::{MAX_SAMPLE_SIZE, MovingAverage};
pub use window::RingWindow;
