mod decoder;
mod frame;

pub use decoder::{DecodeError, FrameDecoder, FRAME_END_MARKER, FRAME_START_MARKER};
pub use frame::{FieldValue, FrameRecord};
