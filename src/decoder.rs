//! One-shot decoder for adaptive-entropy coded streams.
//!
//! Inverts every coding option the encoder can produce: sample splitting,
//! second extension, uncompressed passthrough and zero-block runs with the
//! run-of-segment escape. When the stream was preprocessed the unit-delay
//! prediction is undone on the fly; the decoded samples are re-packed into
//! the configured raw byte layout, so decoding inverts encoding byte for
//! byte.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use crate::bitreader::BitReader;
use crate::error::Error;
use crate::params::{Flags, Layout, Params};
use crate::sample::SampleFormat;

/// Decode `num_samples` samples from a coded stream.
///
/// Returns the packed raw samples (`num_samples * bytes_per_sample` bytes)
/// in the byte layout described by `params`.
pub fn decode_buffer(input: &[u8], params: Params, num_samples: usize) -> Result<Vec<u8>, Error> {
    let layout = params.layout()?;
    let preprocess = params.flags.contains(Flags::DATA_PREPROCESS);
    let pad_rsi = params.flags.contains(Flags::PAD_RSI);
    let bs = params.block_size as usize;
    let bps = params.bits_per_sample;
    let max_id = (1u32 << layout.id_len) - 1;

    let mut sink = SampleSink::new(params, layout, num_samples)?;
    let mut reader = BitReader::new(input);
    let mut values = vec![0u32; bs];
    let mut block_in_rsi: u32 = 0;

    while !sink.done() {
        let at_ref = preprocess && block_in_rsi == 0;
        let id = reader.read_bits(layout.id_len)?;
        let mut blocks_consumed = 1;

        if id == 0 {
            let selector = reader.read_bit()?;
            let reference = if at_ref {
                Some(reader.read_bits(bps)?)
            } else {
                None
            };

            if selector == 0 {
                // Zero-block run. The fundamental sequence codes the run
                // length; 5 is the escape for "to the end of the segment".
                let mut run = reader.read_fs()? + 1;
                if run == 5 {
                    let fill_rsi = params.rsi - block_in_rsi;
                    let fill_segment = 64 - (block_in_rsi % 64);
                    run = fill_rsi.min(fill_segment);
                } else if run > 5 {
                    run -= 1;
                }
                blocks_consumed = run;

                let mut zeros = run as usize * bs;
                if let Some(raw) = reference {
                    sink.put_literal(raw);
                    zeros -= 1;
                }
                for _ in 0..zeros {
                    if sink.done() {
                        break;
                    }
                    sink.put_residual(0);
                }
            } else {
                // Second extension. Pairs cover the whole block; on a
                // reference block the first pair's first element repeats
                // the reference sample and is dropped.
                let mut i = usize::from(reference.is_some());
                while i < bs {
                    let m = reader.read_fs()?;
                    let (a, b) = second_extension_pair(m)?;
                    if i % 2 == 0 {
                        values[i] = a;
                        values[i + 1] = b;
                        i += 2;
                    } else {
                        values[i] = b;
                        i += 1;
                    }
                }
                if let Some(raw) = reference {
                    sink.put_literal(raw);
                }
                for &d in &values[usize::from(reference.is_some())..] {
                    if sink.done() {
                        break;
                    }
                    sink.put_residual(d);
                }
            }
        } else if id == max_id {
            // Uncompressed: every sample of the block verbatim. On a
            // reference block the first one is the literal reference.
            for v in &mut values {
                *v = reader.read_bits(bps)?;
            }
            let mut rest = values.iter();
            if at_ref {
                sink.put_literal(values[0]);
                rest.next();
            }
            for &d in rest {
                if sink.done() {
                    break;
                }
                sink.put_residual(d);
            }
        } else {
            // Splitting at k = id - 1: unary quotients first, then the
            // k-bit remainders of every coded sample.
            let k = id - 1;
            let reference = if at_ref {
                Some(reader.read_bits(bps)?)
            } else {
                None
            };
            let n = bs - usize::from(at_ref);
            for v in &mut values[..n] {
                let q = u64::from(reader.read_fs()?) << k;
                if q > u64::from(u32::MAX) {
                    return Err(Error::InvalidStream("split quotient out of range"));
                }
                *v = q as u32;
            }
            if k > 0 {
                for v in &mut values[..n] {
                    *v |= reader.read_bits(k)?;
                }
            }
            if let Some(raw) = reference {
                sink.put_literal(raw);
            }
            for &d in &values[..n] {
                if sink.done() {
                    break;
                }
                sink.put_residual(d);
            }
        }

        block_in_rsi += blocks_consumed;
        if block_in_rsi >= params.rsi {
            block_in_rsi = 0;
            if pad_rsi {
                reader.align_byte();
            }
        }
    }

    Ok(sink.into_bytes())
}

/// Invert the pair code `(a + b)(a + b + 1)/2 + b`.
fn second_extension_pair(m: u32) -> Result<(u32, u32), Error> {
    if m > 0x1_0000 {
        return Err(Error::InvalidStream("second-extension code out of range"));
    }
    let mut s = 0u32;
    while (s + 1) * (s + 2) / 2 <= m {
        s += 1;
    }
    let b = m - s * (s + 1) / 2;
    Ok((s - b, b))
}

/// Accumulates decoded samples, undoing the predictor when configured.
struct SampleSink {
    out: Vec<u8>,
    format: SampleFormat,
    preprocess: bool,
    signed: bool,
    bits_per_sample: u32,
    xmin: i64,
    xmax: i64,
    prev: i64,
    produced: usize,
    limit: usize,
}

impl SampleSink {
    fn new(params: Params, layout: Layout, limit: usize) -> Result<Self, Error> {
        let mut out = Vec::new();
        out.try_reserve_exact(limit * layout.bytes_per_sample)?;
        Ok(Self {
            out,
            format: layout.format,
            preprocess: params.flags.contains(Flags::DATA_PREPROCESS),
            signed: params.flags.contains(Flags::DATA_SIGNED),
            bits_per_sample: params.bits_per_sample,
            xmin: layout.xmin,
            xmax: layout.xmax,
            prev: 0,
            produced: 0,
            limit,
        })
    }

    fn done(&self) -> bool {
        self.produced >= self.limit
    }

    fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    /// Write a sample carried literally in the stream.
    fn put_literal(&mut self, raw: u32) {
        if self.done() {
            return;
        }
        self.prev = if self.signed {
            sign_extend(raw, self.bits_per_sample)
        } else {
            i64::from(raw)
        };
        self.format.put_sample(&mut self.out, raw);
        self.produced += 1;
    }

    /// Write a sample from a mapped residual.
    fn put_residual(&mut self, d: u32) {
        if self.done() {
            return;
        }
        let raw = if self.preprocess {
            let x = unmap(d, self.prev, self.xmin, self.xmax);
            self.prev = x;
            (x as u64 & ((1u64 << self.bits_per_sample) - 1)) as u32
        } else {
            d
        };
        self.format.put_sample(&mut self.out, raw);
        self.produced += 1;
    }
}

fn sign_extend(raw: u32, bits_per_sample: u32) -> i64 {
    let m = 1i64 << (bits_per_sample - 1);
    (i64::from(raw) ^ m).wrapping_sub(m)
}

/// Undo the residual folding given the previous sample value.
fn unmap(d: u32, prev: i64, xmin: i64, xmax: i64) -> i64 {
    let theta = (prev - xmin).min(xmax - prev);
    let d = i64::from(d);
    if d > 2 * theta {
        // The prediction error exceeded the headroom towards the nearer
        // bound; the residual is the distance from the opposite bound.
        if theta == prev - xmin {
            prev + (d - theta)
        } else {
            prev - (d - theta)
        }
    } else if d % 2 == 0 {
        prev + d / 2
    } else {
        prev - (d + 1) / 2
    }
}
