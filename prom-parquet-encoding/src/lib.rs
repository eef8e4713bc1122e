pub mod bit_io;
pub mod gorilla;

pub use gorilla::{FloatColumnCodec, GorillaDecoder, GorillaEncoder};
