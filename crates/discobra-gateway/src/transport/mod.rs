//! Transport framing

mod inflater;

pub use inflater::{Frame, FrameReassembler, ZLIB_SUFFIX};
