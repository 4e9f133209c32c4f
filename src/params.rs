//! Stream parameters and derived coding layout.
//!
//! A stream is described by the sample width, the block size, the reference
//! sample interval (RSI) and a set of flags, exactly as in CCSDS 121.0-B-2.
//! Everything else the coder needs (option-ID width, splitting range,
//! bytes per sample, value bounds, extractor selection) is derived from
//! those four values at session setup.

use bitflags::bitflags;

use crate::error::Error;
use crate::sample::SampleFormat;

bitflags! {
    /// Stream configuration flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u32 {
        /// Samples are two's complement signed integers.
        const DATA_SIGNED = 1 << 0;
        /// Samples of 17-24 bits are packed into three bytes.
        const DATA_3BYTE = 1 << 1;
        /// Multi-byte samples are stored most significant byte first.
        const DATA_MSB = 1 << 2;
        /// Apply the unit-delay predictor before entropy coding.
        const DATA_PREPROCESS = 1 << 3;
        /// Use the restricted set of code options for samples of at most
        /// 4 bits (CCSDS 121.0-B-2 issue 2).
        const RESTRICTED = 1 << 4;
        /// Zero-pad the output to a byte boundary at the end of each RSI.
        const PAD_RSI = 1 << 5;
    }
}

/// Stream configuration, immutable for the life of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    /// Sample width in bits (1-32).
    pub bits_per_sample: u32,
    /// Samples per block (8, 16, 32 or 64).
    pub block_size: u32,
    /// Reference sample interval in blocks (1-4096).
    pub rsi: u32,
    /// Configuration flags.
    pub flags: Flags,
}

impl Params {
    /// Create a new parameter set.
    pub fn new(bits_per_sample: u32, block_size: u32, rsi: u32, flags: Flags) -> Self {
        Self {
            bits_per_sample,
            block_size,
            rsi,
            flags,
        }
    }

    /// Validate the parameters and derive the coding layout.
    pub(crate) fn layout(&self) -> Result<Layout, Error> {
        if self.bits_per_sample == 0 || self.bits_per_sample > 32 {
            return Err(Error::InvalidBitsPerSample(self.bits_per_sample));
        }
        if !matches!(self.block_size, 8 | 16 | 32 | 64) {
            return Err(Error::InvalidBlockSize(self.block_size));
        }
        if self.rsi == 0 || self.rsi > 4096 {
            return Err(Error::InvalidRsi(self.rsi));
        }

        let msb = self.flags.contains(Flags::DATA_MSB);
        let (id_len, format) = if self.bits_per_sample > 16 {
            let format = if self.bits_per_sample <= 24 && self.flags.contains(Flags::DATA_3BYTE) {
                if msb {
                    SampleFormat::U24Msb
                } else {
                    SampleFormat::U24Lsb
                }
            } else if msb {
                SampleFormat::U32Msb
            } else {
                SampleFormat::U32Lsb
            };
            (5, format)
        } else if self.bits_per_sample > 8 {
            let format = if msb {
                SampleFormat::U16Msb
            } else {
                SampleFormat::U16Lsb
            };
            (4, format)
        } else if self.flags.contains(Flags::RESTRICTED) {
            if self.bits_per_sample > 4 {
                return Err(Error::RestrictedWidth(self.bits_per_sample));
            }
            let id_len = if self.bits_per_sample <= 2 { 1 } else { 2 };
            (id_len, SampleFormat::U8)
        } else {
            (3, SampleFormat::U8)
        };

        let (xmin, xmax) = if self.flags.contains(Flags::DATA_SIGNED) {
            let half = 1i64 << (self.bits_per_sample - 1);
            (-half, half - 1)
        } else {
            (0, (1i64 << self.bits_per_sample) - 1)
        };

        // The two highest option IDs are taken by the uncompressed and
        // low-entropy codes. With a 1-bit ID there is no splitting option.
        let kmax = if id_len > 1 { (1 << id_len) - 3 } else { 0 };

        let bytes_per_sample = format.bytes_per_sample();
        let samples_per_rsi = self.rsi as usize * self.block_size as usize;

        Ok(Layout {
            id_len,
            kmax,
            format,
            bytes_per_sample,
            rsi_len: samples_per_rsi * bytes_per_sample,
            samples_per_rsi,
            xmin,
            xmax,
        })
    }
}

/// Coding layout derived from a validated parameter set.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    /// Width of the option-ID field in bits.
    pub id_len: u32,
    /// Largest usable splitting position.
    pub kmax: u32,
    /// Sample extractor for this width and byte order.
    pub format: SampleFormat,
    /// Bytes occupied by one sample in the raw stream.
    pub bytes_per_sample: usize,
    /// Raw bytes per reference sample interval.
    pub rsi_len: usize,
    /// Samples per reference sample interval.
    pub samples_per_rsi: usize,
    /// Smallest representable sample value.
    pub xmin: i64,
    /// Largest representable sample value.
    pub xmax: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(bits: u32, flags: Flags) -> Layout {
        Params::new(bits, 16, 64, flags).layout().unwrap()
    }

    #[test]
    fn test_id_len_by_width() {
        assert_eq!(layout(1, Flags::empty()).id_len, 3);
        assert_eq!(layout(8, Flags::empty()).id_len, 3);
        assert_eq!(layout(9, Flags::empty()).id_len, 4);
        assert_eq!(layout(16, Flags::empty()).id_len, 4);
        assert_eq!(layout(17, Flags::empty()).id_len, 5);
        assert_eq!(layout(32, Flags::empty()).id_len, 5);
    }

    #[test]
    fn test_id_len_restricted() {
        assert_eq!(layout(1, Flags::RESTRICTED).id_len, 1);
        assert_eq!(layout(2, Flags::RESTRICTED).id_len, 1);
        assert_eq!(layout(3, Flags::RESTRICTED).id_len, 2);
        assert_eq!(layout(4, Flags::RESTRICTED).id_len, 2);
    }

    #[test]
    fn test_restricted_rejects_wide_samples() {
        let result = Params::new(5, 16, 64, Flags::RESTRICTED).layout();
        assert!(matches!(result, Err(Error::RestrictedWidth(5))));

        let result = Params::new(8, 16, 64, Flags::RESTRICTED).layout();
        assert!(matches!(result, Err(Error::RestrictedWidth(8))));

        // The restricted flag is only examined for 8-bit-and-narrower data.
        assert!(Params::new(12, 16, 64, Flags::RESTRICTED).layout().is_ok());
    }

    #[test]
    fn test_kmax() {
        assert_eq!(layout(8, Flags::empty()).kmax, 5);
        assert_eq!(layout(16, Flags::empty()).kmax, 13);
        assert_eq!(layout(32, Flags::empty()).kmax, 29);
        assert_eq!(layout(2, Flags::RESTRICTED).kmax, 0);
        assert_eq!(layout(4, Flags::RESTRICTED).kmax, 1);
    }

    #[test]
    fn test_bytes_per_sample() {
        assert_eq!(layout(8, Flags::empty()).bytes_per_sample, 1);
        assert_eq!(layout(12, Flags::empty()).bytes_per_sample, 2);
        assert_eq!(layout(20, Flags::empty()).bytes_per_sample, 4);
        assert_eq!(layout(20, Flags::DATA_3BYTE).bytes_per_sample, 3);
        assert_eq!(layout(24, Flags::DATA_3BYTE).bytes_per_sample, 3);
        // 3-byte packing does not apply above 24 bits.
        assert_eq!(layout(25, Flags::DATA_3BYTE).bytes_per_sample, 4);
        assert_eq!(layout(32, Flags::empty()).bytes_per_sample, 4);
    }

    #[test]
    fn test_value_bounds() {
        let l = layout(8, Flags::empty());
        assert_eq!((l.xmin, l.xmax), (0, 255));

        let l = layout(8, Flags::DATA_SIGNED);
        assert_eq!((l.xmin, l.xmax), (-128, 127));

        let l = layout(32, Flags::empty());
        assert_eq!((l.xmin, l.xmax), (0, u32::MAX.into()));

        let l = layout(32, Flags::DATA_SIGNED);
        assert_eq!((l.xmin, l.xmax), (i32::MIN.into(), i32::MAX.into()));
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(matches!(
            Params::new(0, 8, 1, Flags::empty()).layout(),
            Err(Error::InvalidBitsPerSample(0))
        ));
        assert!(matches!(
            Params::new(33, 8, 1, Flags::empty()).layout(),
            Err(Error::InvalidBitsPerSample(33))
        ));
        assert!(matches!(
            Params::new(8, 12, 1, Flags::empty()).layout(),
            Err(Error::InvalidBlockSize(12))
        ));
        assert!(matches!(
            Params::new(8, 8, 0, Flags::empty()).layout(),
            Err(Error::InvalidRsi(0))
        ));
        assert!(matches!(
            Params::new(8, 8, 4097, Flags::empty()).layout(),
            Err(Error::InvalidRsi(4097))
        ));
    }

    #[test]
    fn test_rsi_len() {
        let l = Params::new(16, 8, 4, Flags::DATA_MSB).layout().unwrap();
        assert_eq!(l.samples_per_rsi, 32);
        assert_eq!(l.rsi_len, 64);
    }
}
