//! Fragmented MP4 handling
//!
//! Box-level parsing of a live byte stream and regrouping of the boxes into
//! boundary-aligned fragments.

pub mod fragment;
pub mod parser;

pub use fragment::{Fragment, FragmentReassembler};
pub use parser::{BoxReader, BoxSource, BoxType, Mp4Box};
