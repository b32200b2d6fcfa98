pub mod codec;
pub mod events;

pub use codec::{decode, decode_value, encode, CodecError};
pub use events::*;
