//! Fragment reassembly
//!
//! Groups boxes into fragments that each end on a boundary box
//! (`moov` for the init segment, `mdat` for every media fragment).

use super::parser::{BoxType, Mp4Box};

/// Boundary-aligned, independently parseable chunk of MP4 data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Concatenated boxes, boundary box last
    pub data: Vec<u8>,
    /// Types of the boxes in `data`, in order
    pub box_types: Vec<BoxType>,
}

impl Fragment {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Accumulates boxes until a boundary arrives
#[derive(Debug, Default)]
pub struct FragmentReassembler {
    pending: Vec<u8>,
    pending_types: Vec<BoxType>,
    emitted: u64,
}

impl FragmentReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a box; returns the completed fragment when `mp4_box` is a boundary
    pub fn push(&mut self, mp4_box: Mp4Box) -> Option<Fragment> {
        let Mp4Box {
            header,
            box_type,
            data,
        } = mp4_box;

        self.pending.extend_from_slice(&header);
        self.pending.extend_from_slice(&data);
        self.pending_types.push(box_type);

        if !box_type.is_fragment_boundary() {
            return None;
        }

        self.emitted += 1;
        Some(Fragment {
            data: std::mem::take(&mut self.pending),
            box_types: std::mem::take(&mut self.pending_types),
        })
    }

    /// Number of fragments emitted so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Bytes held back waiting for a boundary
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    /// Drop whatever did not end on a boundary. Returns the discarded byte count.
    pub fn discard_pending(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        self.pending_types.clear();
        discarded
    }
}
