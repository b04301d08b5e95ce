//! Binary persistence helpers for the on-disk index format

pub mod codec;

pub use codec::{Crc32Reader, Crc32Writer};
