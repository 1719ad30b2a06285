// Wire module - envelope codec and length-prefixed framing

mod envelope;
mod frame;

pub use envelope::{CodecError, Envelope, Method};
pub use frame::{
    decode_frame, encode_frame, frame_len, read_frame, write_frame, FrameError, LEN_SIZE,
};
