pub mod buffer;
pub mod grid;
pub mod render;
pub mod rle;
pub mod rule_set;
pub mod rules;
pub mod sequencer;

mod parse_util;
