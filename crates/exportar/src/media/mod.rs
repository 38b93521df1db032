//! Encoders turning frame sequences into shareable media.
//!
//! The sequencer's contract (ordered, fixed-rate, all-or-nothing) is what
//! makes these encoders safe: they never see a partial sequence.

mod gif;

pub use gif::{GifEncoder, GifSettings};
