//! Stream decoding for the two container types this crate opens:
//! cross-reference streams and object streams.
//!
//! Only FlateDecode (plus an optional PNG predictor) is supported;
//! user-level streams pass through the editor verbatim and are never
//! decoded here.

pub mod flate;
pub mod predictor;

pub use flate::{deflate, inflate};
pub use predictor::decode_predictor;
