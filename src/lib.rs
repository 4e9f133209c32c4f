//! # `ccsds121`
//!
//! Pure Rust implementation of the [CCSDS 121.0-B-2](https://ccsds.org/Pubs/121x0b2ec1s.pdf)
//! lossless adaptive entropy coder for fixed-width integer sample streams,
//! the block-adaptive Rice coder used for Earth-observation instrument
//! data (and as the compression backend of GRIB2 template 5.42).
//!
//! ## Design
//!
//! - **Safe Rust** - `#![forbid(unsafe_code)]`
//! - **Streaming** - the encoder is a resumable state machine; calls may
//!   suspend on input or output exhaustion and continue later with
//!   byte-identical results
//! - **Bit-exact** - per-block code option selection computes exact coded
//!   lengths, and the emitters reproduce them bit for bit
//!
//! ## API Overview
//!
//! ### High-Level Functions
//!
//! - [`encode_buffer()`] - Compress an entire sample buffer
//! - [`decode_buffer()`] - Decompress an entire coded buffer
//!
//! ### Streaming
//!
//! - [`Encoder`] - Resumable encoding session driven by
//!   [`Encoder::encode`] with caller-owned input and output windows
//!
//! ### Configuration
//!
//! - [`Params`] - Sample width, block size, reference sample interval
//! - [`Flags`] - Signedness, byte order, preprocessing, 3-byte packing,
//!   restricted options, per-RSI padding
//!
//! ## Usage
//!
//! ```rust
//! use ccsds121::{decode_buffer, encode_buffer, Flags, Params};
//!
//! // 16-bit big-endian samples, preprocessed, 16-sample blocks.
//! let params = Params::new(16, 16, 64, Flags::DATA_MSB | Flags::DATA_PREPROCESS);
//!
//! let samples: Vec<u8> = (0u16..256).flat_map(u16::to_be_bytes).collect();
//! let coded = encode_buffer(&samples, params).unwrap();
//! let decoded = decode_buffer(&coded, params, 256).unwrap();
//!
//! assert_eq!(samples, decoded);
//! assert!(coded.len() < samples.len());
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

mod bitreader;
mod bitwriter;
mod decoder;
mod encoder;
mod error;
mod options;
mod params;
mod preprocess;
mod sample;

pub use decoder::decode_buffer;
pub use encoder::{encode_buffer, Encoder, Flush, Progress};
pub use error::Error;
pub use params::{Flags, Params};
