//! Unit-delay predictor turning raw samples into mapped residuals.
//!
//! The first sample of each reference sample interval is kept literal; every
//! following sample is replaced by its prediction error against the previous
//! sample, folded into a non-negative integer (CCSDS 121.0-B-2 section 4).
//! The folding is exact: small errors map near zero, and when the error
//! exceeds the headroom towards the nearer value bound the residual falls
//! back to the sample's distance from the opposite bound, so the mapping
//! stays invertible and bounded by `xmax - xmin`.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

/// Map an RSI of unsigned samples to residuals.
pub(crate) fn map_unsigned(raw: &[u32], residuals: &mut [u32], xmax: u32) {
    residuals[0] = raw[0];
    for i in 1..raw.len() {
        let prev = raw[i - 1];
        let cur = raw[i];
        residuals[i] = if cur >= prev {
            let delta = cur - prev;
            if delta <= prev {
                2 * delta
            } else {
                cur
            }
        } else {
            let delta = prev - cur;
            if delta <= xmax - prev {
                2 * delta - 1
            } else {
                xmax - cur
            }
        };
    }
}

/// Map an RSI of signed samples to residuals.
///
/// Samples arrive as raw bit patterns and are sign-extended from
/// `bits_per_sample` before prediction. The reference residual keeps the
/// raw pattern.
pub(crate) fn map_signed(
    raw: &[u32],
    residuals: &mut [u32],
    bits_per_sample: u32,
    xmin: i64,
    xmax: i64,
) {
    let m = 1i64 << (bits_per_sample - 1);
    let extend = |v: u32| (i64::from(v) ^ m).wrapping_sub(m);

    residuals[0] = raw[0];
    let mut prev = extend(raw[0]);
    for i in 1..raw.len() {
        let cur = extend(raw[i]);
        let d = if cur < prev {
            let delta = prev - cur;
            if delta <= xmax - prev {
                2 * delta - 1
            } else {
                xmax - cur
            }
        } else {
            let delta = cur - prev;
            if delta <= prev - xmin {
                2 * delta
            } else {
                cur - xmin
            }
        };
        residuals[i] = d as u32;
        prev = cur;
    }
}
