//! Streaming adaptive entropy encoder.
//!
//! The encoder is a resumable state machine driven by [`Encoder::encode`]:
//! it pulls one reference sample interval (RSI) of samples at a time,
//! preprocesses them into mapped residuals, aggregates runs of all-zero
//! blocks, picks the cheapest code option per block and bit-packs the coded
//! data sets into the caller's output buffer. A call may return with input
//! left unconsumed (output full) or output left unwritten (input dry); the
//! caller replenishes whichever ran out and calls again. Output bytes are
//! identical no matter how the input and output are sliced across calls.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::too_many_lines)]

use log::{debug, trace};

use crate::bitwriter::{BitWriter, CDS_LEN};
use crate::error::Error;
use crate::options::{
    emit_second_extension, emit_splitting, emit_uncompressed, emit_zero_run, select_option,
    CodeOption, ROS,
};
use crate::params::{Flags, Layout, Params};
use crate::preprocess::{map_signed, map_unsigned};

/// Flush behavior of an [`Encoder::encode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// More input will follow; suspend when the current input runs dry.
    None,
    /// This is the end of the stream: pad the last RSI and byte, then
    /// finish.
    Finish,
}

/// Bytes moved by one [`Encoder::encode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Input bytes consumed.
    pub consumed: usize,
    /// Output bytes produced.
    pub produced: usize,
}

/// Encoder state machine modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    GetBlock,
    GetRsiResumable,
    CheckZeroBlock,
    SelectOption,
    EncodeSplitting,
    EncodeUncompressed,
    EncodeSecondExtension,
    EncodeZeroRun,
    FlushResumable,
}

/// Step outcome: re-enter the state machine or yield to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ctrl {
    Continue,
    Exit,
}

/// Input and output windows of a single encode call.
struct Io<'a> {
    input: &'a [u8],
    in_pos: usize,
    output: &'a mut [u8],
    out_pos: usize,
}

impl Io<'_> {
    #[inline]
    fn avail_in(&self) -> usize {
        self.input.len() - self.in_pos
    }

    #[inline]
    fn avail_out(&self) -> usize {
        self.output.len() - self.out_pos
    }
}

/// Adaptive entropy encoding session.
pub struct Encoder {
    params: Params,
    layout: Layout,

    /// Raw samples of the current RSI; only allocated when preprocessing
    /// needs the previous raw sample next to the residuals.
    data_raw: Option<Vec<u32>>,
    /// Residuals of the current RSI (the raw samples themselves when
    /// preprocessing is off).
    data_pp: Vec<u32>,

    /// Start of the current block within `data_pp`.
    block_start: usize,
    /// Blocks of the current RSI still to encode after this one.
    blocks_avail: u32,
    /// The current block starts with a literal reference sample.
    ref_block: bool,
    /// Bit length of the uncompressed option for the current block.
    uncomp_len: u64,
    /// Splitting position of the previous block, seeding the next search.
    k: u32,

    /// Consecutive all-zero blocks aggregated but not yet emitted.
    zero_blocks: u32,
    /// The first aggregated zero block was a reference block.
    zero_ref: bool,
    zero_ref_sample: u32,
    /// A non-zero block is waiting behind a pending zero-run emission.
    block_nonzero: bool,

    mode: Mode,
    /// Resumable in-RSI sample index.
    ingest: usize,
    /// Resumable staging-flush offset.
    copy_pos: usize,
    flush: Flush,
    flushed: bool,
    produced_any: bool,
    final_pad_done: bool,
    final_byte_pending: bool,

    writer: BitWriter,
    total_in: u64,
    total_out: u64,
}

impl Encoder {
    /// Create an encoding session, validating the parameters and
    /// allocating the per-RSI working buffers.
    pub fn new(params: Params) -> Result<Self, Error> {
        let layout = params.layout()?;

        let n = layout.samples_per_rsi;
        let mut data_pp = Vec::new();
        data_pp.try_reserve_exact(n)?;
        data_pp.resize(n, 0);

        let data_raw = if params.flags.contains(Flags::DATA_PREPROCESS) {
            let mut raw = Vec::new();
            raw.try_reserve_exact(n)?;
            raw.resize(n, 0);
            Some(raw)
        } else {
            None
        };

        debug!(
            "encoder: {} bit samples, block {}, rsi {}, id len {}, {:?}",
            params.bits_per_sample, params.block_size, params.rsi, layout.id_len, layout.format
        );

        Ok(Self {
            params,
            layout,
            data_raw,
            data_pp,
            block_start: 0,
            blocks_avail: 0,
            ref_block: false,
            uncomp_len: u64::from(params.block_size) * u64::from(params.bits_per_sample),
            k: 0,
            zero_blocks: 0,
            zero_ref: false,
            zero_ref_sample: 0,
            block_nonzero: false,
            mode: Mode::GetBlock,
            ingest: 0,
            copy_pos: 0,
            flush: Flush::None,
            flushed: false,
            produced_any: false,
            final_pad_done: false,
            final_byte_pending: false,
            writer: BitWriter::new(),
            total_in: 0,
            total_out: 0,
        })
    }

    /// Run the state machine until it needs more input or more output.
    ///
    /// Returns how many bytes were consumed and produced; the caller
    /// re-slices its buffers accordingly before the next call. Once called
    /// with [`Flush::Finish`], keep calling (with empty input) until
    /// [`Encoder::is_flushed`] reports completion.
    pub fn encode(&mut self, input: &[u8], output: &mut [u8], flush: Flush) -> Progress {
        self.flush = flush;
        let mut io = Io {
            input,
            in_pos: 0,
            output,
            out_pos: 0,
        };

        while self.step(&mut io) == Ctrl::Continue {}

        self.writer.leave_direct(io.output, &mut io.out_pos);
        self.total_in += io.in_pos as u64;
        self.total_out += io.out_pos as u64;
        Progress {
            consumed: io.in_pos,
            produced: io.out_pos,
        }
    }

    /// Whether a requested terminal flush has fully reached the output.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Total input bytes consumed over the life of the session.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Total output bytes produced over the life of the session.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// End the session.
    ///
    /// Fails if a terminal flush was requested but its last bytes were
    /// never picked up.
    pub fn finish(self) -> Result<(), Error> {
        if self.flush == Flush::Finish && !self.flushed {
            return Err(Error::IncompleteFlush);
        }
        Ok(())
    }

    fn step(&mut self, io: &mut Io) -> Ctrl {
        match self.mode {
            Mode::GetBlock => self.step_get_block(io),
            Mode::GetRsiResumable => self.step_get_rsi_resumable(io),
            Mode::CheckZeroBlock => self.step_check_zero_block(),
            Mode::SelectOption => self.step_select_option(),
            Mode::EncodeSplitting => {
                let bs = self.params.block_size as usize;
                emit_splitting(
                    &mut self.writer,
                    io.output,
                    &self.data_pp[self.block_start..self.block_start + bs],
                    self.ref_block,
                    self.k,
                    self.layout.id_len,
                    self.params.bits_per_sample,
                );
                self.flush_block(io)
            }
            Mode::EncodeUncompressed => {
                let bs = self.params.block_size as usize;
                emit_uncompressed(
                    &mut self.writer,
                    io.output,
                    &self.data_pp[self.block_start..self.block_start + bs],
                    self.layout.id_len,
                    self.params.bits_per_sample,
                );
                self.flush_block(io)
            }
            Mode::EncodeSecondExtension => {
                let bs = self.params.block_size as usize;
                emit_second_extension(
                    &mut self.writer,
                    io.output,
                    &self.data_pp[self.block_start..self.block_start + bs],
                    self.ref_block,
                    self.layout.id_len,
                    self.params.bits_per_sample,
                );
                self.flush_block(io)
            }
            Mode::EncodeZeroRun => {
                let reference = self.zero_ref.then_some(self.zero_ref_sample);
                emit_zero_run(
                    &mut self.writer,
                    io.output,
                    self.zero_blocks,
                    reference,
                    self.layout.id_len,
                    self.params.bits_per_sample,
                );
                self.zero_blocks = 0;
                self.zero_ref = false;
                self.flush_block(io)
            }
            Mode::FlushResumable => self.step_flush_resumable(io),
        }
    }

    /// Provide the next block, pulling in a whole RSI when the block
    /// buffer is spent.
    fn step_get_block(&mut self, io: &mut Io) -> Ctrl {
        self.writer
            .stage_or_direct(io.output, io.out_pos, self.zero_blocks > 0);

        if self.block_nonzero {
            // The zero run ahead of this block has been emitted; code the
            // deferred block now.
            self.block_nonzero = false;
            self.mode = Mode::SelectOption;
            return Ctrl::Continue;
        }

        if self.blocks_avail == 0 {
            self.blocks_avail = self.params.rsi - 1;
            self.block_start = 0;

            if io.avail_in() >= self.layout.rsi_len {
                let format = self.layout.format;
                let buf = match self.data_raw {
                    Some(ref mut raw) => raw.as_mut_slice(),
                    None => self.data_pp.as_mut_slice(),
                };
                format.get_rsi(io.input, &mut io.in_pos, buf);
                self.preprocess_rsi();
                self.mode = Mode::CheckZeroBlock;
            } else {
                self.ingest = 0;
                self.mode = Mode::GetRsiResumable;
            }
        } else {
            if self.ref_block {
                self.ref_block = false;
                self.uncomp_len =
                    u64::from(self.params.block_size) * u64::from(self.params.bits_per_sample);
            }
            self.block_start += self.params.block_size as usize;
            self.blocks_avail -= 1;
            self.mode = Mode::CheckZeroBlock;
        }
        Ctrl::Continue
    }

    /// Ingest an RSI sample by sample while input is short, yielding to
    /// the caller whenever it runs dry.
    fn step_get_rsi_resumable(&mut self, io: &mut Io) -> Ctrl {
        let n = self.layout.samples_per_rsi;
        let bs = self.params.block_size as usize;

        while self.ingest < n {
            if io.avail_in() >= self.layout.bytes_per_sample {
                let v = self.layout.format.get_sample(io.input, &mut io.in_pos);
                let i = self.ingest;
                match self.data_raw {
                    Some(ref mut raw) => raw[i] = v,
                    None => self.data_pp[i] = v,
                }
                self.ingest += 1;
            } else if self.flush == Flush::Finish {
                if self.ingest == 0 {
                    return self.finalize_stream(io);
                }
                // Pad the RSI to whole blocks by replicating the last
                // sample; only the blocks holding real samples get coded.
                self.blocks_avail = ((self.ingest + bs - 1) / bs - 1) as u32;
                let i = self.ingest;
                let buf = match self.data_raw {
                    Some(ref mut raw) => raw.as_mut_slice(),
                    None => self.data_pp.as_mut_slice(),
                };
                let last = buf[i - 1];
                buf[i..n].fill(last);
                self.ingest = n;
            } else {
                return Ctrl::Exit;
            }
        }

        self.preprocess_rsi();
        self.mode = Mode::CheckZeroBlock;
        Ctrl::Continue
    }

    /// Map the freshly ingested RSI to residuals, if configured.
    fn preprocess_rsi(&mut self) {
        if !self.params.flags.contains(Flags::DATA_PREPROCESS) {
            return;
        }
        let Some(raw) = self.data_raw.as_deref() else {
            return;
        };
        if self.params.flags.contains(Flags::DATA_SIGNED) {
            map_signed(
                raw,
                &mut self.data_pp,
                self.params.bits_per_sample,
                self.layout.xmin,
                self.layout.xmax,
            );
        } else {
            map_unsigned(raw, &mut self.data_pp, self.layout.xmax as u32);
        }
        self.ref_block = true;
        self.uncomp_len =
            u64::from(self.params.block_size - 1) * u64::from(self.params.bits_per_sample);
    }

    /// Aggregate consecutive all-zero blocks; emit the pending run at a
    /// segment or RSI boundary, or when a non-zero block interrupts it.
    fn step_check_zero_block(&mut self) -> Ctrl {
        let bs = self.params.block_size as usize;
        let block = &self.data_pp[self.block_start..self.block_start + bs];

        if block[usize::from(self.ref_block)..].iter().any(|&d| d != 0) {
            if self.zero_blocks > 0 {
                self.block_nonzero = true;
                self.mode = Mode::EncodeZeroRun;
            } else {
                self.mode = Mode::SelectOption;
            }
        } else {
            self.zero_blocks += 1;
            if self.zero_blocks == 1 {
                self.zero_ref = self.ref_block;
                self.zero_ref_sample = block[0];
            }
            if self.blocks_avail == 0 || (self.params.rsi - self.blocks_avail) % 64 == 0 {
                if self.zero_blocks > 4 {
                    self.zero_blocks = ROS;
                }
                self.mode = Mode::EncodeZeroRun;
            } else {
                self.mode = Mode::GetBlock;
            }
        }
        Ctrl::Continue
    }

    fn step_select_option(&mut self) -> Ctrl {
        let bs = self.params.block_size as usize;
        let (option, k) = select_option(
            &self.data_pp[self.block_start..self.block_start + bs],
            self.ref_block,
            self.k,
            self.layout.kmax,
            self.layout.id_len,
            self.uncomp_len,
        );
        self.k = k;
        self.mode = match option {
            CodeOption::Splitting => Mode::EncodeSplitting,
            CodeOption::SecondExtension => Mode::EncodeSecondExtension,
            CodeOption::Uncompressed => Mode::EncodeUncompressed,
        };
        Ctrl::Continue
    }

    /// Hand the finished CDS to the output: in direct mode by advancing
    /// the caller's cursor, otherwise through the resumable staging copy.
    fn flush_block(&mut self, io: &mut Io) -> Ctrl {
        self.produced_any = true;

        if self.blocks_avail == 0
            && self.params.flags.contains(Flags::PAD_RSI)
            && !self.block_nonzero
        {
            let pad = self.writer.bits_free() % 8;
            self.writer.emit(io.output, 0, pad);
        }

        if self.writer.is_direct() {
            io.out_pos = self.writer.pos();
            self.mode = Mode::GetBlock;
        } else {
            self.copy_pos = 0;
            self.mode = Mode::FlushResumable;
        }
        Ctrl::Continue
    }

    /// Copy the staged CDS out in as many pieces as the output allows.
    fn step_flush_resumable(&mut self, io: &mut Io) -> Ctrl {
        let n = (self.writer.pos() - self.copy_pos).min(io.avail_out());
        io.output[io.out_pos..io.out_pos + n]
            .copy_from_slice(&self.writer.staged()[self.copy_pos..self.copy_pos + n]);
        io.out_pos += n;
        self.copy_pos += n;

        if io.avail_out() == 0 {
            return Ctrl::Exit;
        }
        self.mode = Mode::GetBlock;
        Ctrl::Continue
    }

    /// Terminal flush with nothing buffered: pad the in-progress byte with
    /// zero bits, deliver it, and mark the stream flushed.
    fn finalize_stream(&mut self, io: &mut Io) -> Ctrl {
        if !self.final_pad_done {
            self.final_pad_done = true;
            if self.writer.bits_free() < 8 {
                let pad = self.writer.bits_free();
                self.writer.emit(io.output, 0, pad);
                self.final_byte_pending = true;
            } else if !self.produced_any {
                // An entirely empty stream still flushes one zero byte.
                self.writer.emit(io.output, 0, 8);
                self.final_byte_pending = true;
            }
        }

        if self.final_byte_pending {
            if io.avail_out() > 0 {
                if !self.writer.is_direct() {
                    io.output[io.out_pos] = self.writer.staged()[self.writer.pos() - 1];
                }
                io.out_pos += 1;
                self.final_byte_pending = false;
                self.flushed = true;
            }
        } else {
            self.flushed = true;
        }

        if self.flushed {
            trace!(
                "stream flushed: {} bytes in, {} bytes out",
                self.total_in + io.in_pos as u64,
                self.total_out + io.out_pos as u64
            );
        }
        Ctrl::Exit
    }
}

/// Encode a whole buffer in one call: session setup, a terminal-flush
/// encode loop, and teardown.
pub fn encode_buffer(input: &[u8], params: Params) -> Result<Vec<u8>, Error> {
    let mut encoder = Encoder::new(params)?;

    let mut chunk = Vec::new();
    chunk.try_reserve_exact(CDS_LEN * 16)?;
    chunk.resize(CDS_LEN * 16, 0);

    let mut out: Vec<u8> = Vec::new();
    let mut consumed = 0;
    loop {
        let progress = encoder.encode(&input[consumed..], &mut chunk, Flush::Finish);
        consumed += progress.consumed;
        out.try_reserve(progress.produced)?;
        out.extend_from_slice(&chunk[..progress.produced]);
        if encoder.is_flushed() {
            break;
        }
    }
    encoder.finish()?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(bits: u32, block: u32, rsi: u32, flags: Flags) -> Params {
        Params::new(bits, block, rsi, flags)
    }

    #[test]
    fn test_zero_block_single_byte() {
        // One all-zero block: low-entropy ID '0000' plus fs(0), padded out
        // to a single byte.
        let out = encode_buffer(&[0u8; 8], params(8, 8, 1, Flags::empty())).unwrap();
        assert_eq!(out, vec![0x08]);
    }

    #[test]
    fn test_incompressible_block_goes_uncompressed() {
        // 0xFF samples: '111' then 64 one bits, 67 bits in all.
        let out = encode_buffer(&[0xFF; 8], params(8, 8, 1, Flags::empty())).unwrap();
        let mut expected = vec![0xFF; 8];
        expected.push(0xE0);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_ramp_block_splits() {
        // 0..7 selects splitting with k = 1:
        // '010', fs codes for d >> 1, then the eight LSBs.
        let input: Vec<u8> = (0..8).collect();
        let out = encode_buffer(&input, params(8, 8, 1, Flags::empty())).unwrap();
        assert_eq!(out, vec![0x5A, 0x92, 0x22, 0xAA]);
    }

    #[test]
    fn test_empty_stream_flushes_one_zero_byte() {
        let out = encode_buffer(&[], params(8, 8, 1, Flags::empty())).unwrap();
        assert_eq!(out, vec![0x00]);
    }

    #[test]
    fn test_two_zero_blocks_one_run() {
        // Both blocks of the RSI aggregate into a single run of 2:
        // '0000' fs(1) = 6 bits.
        let out = encode_buffer(&[0u8; 16], params(8, 8, 2, Flags::empty())).unwrap();
        assert_eq!(out, vec![0x04]);
    }

    #[test]
    fn test_zero_run_flushed_by_nonzero_block() {
        // A zero block then a noisy block: the run of 1 is emitted first
        // ('0000' fs(0) = 5 bits), then the deferred block uncompressed
        // ('111' + 64 bits).
        let mut input = vec![0u8; 8];
        input.extend_from_slice(&[0xFF; 8]);
        let out = encode_buffer(&input, params(8, 8, 2, Flags::empty())).unwrap();

        // 5 + 3 + 64 = 72 bits -> exactly 9 bytes.
        assert_eq!(out.len(), 9);
        assert_eq!(out[0], 0b0000_1111); // run CDS then '111' ID
        for b in &out[1..9] {
            assert_eq!(*b, 0xFF);
        }
    }

    #[test]
    fn test_partial_final_block_padded() {
        // Three samples with flush: the RSI is padded by replicating the
        // last sample, and exactly one block is coded.
        let out = encode_buffer(&[1, 2, 3], params(8, 8, 4, Flags::empty())).unwrap();
        assert!(!out.is_empty());
        // Padded block is [1,2,3,3,3,3,3,3]; splitting with k around 1.
        // Just pin the round-trip length here; exact bits are covered by
        // the decoder tests.
        let decoded =
            crate::decoder::decode_buffer(&out, params(8, 8, 4, Flags::empty()), 8).unwrap();
        assert_eq!(decoded, vec![1, 2, 3, 3, 3, 3, 3, 3]);
    }

    #[test]
    fn test_unflushed_stream_errors_on_finish() {
        let mut encoder = Encoder::new(params(8, 8, 1, Flags::empty())).unwrap();
        let mut out = [0u8; 0];
        let progress = encoder.encode(&[0u8; 8], &mut out, Flush::Finish);
        assert_eq!(progress.produced, 0);
        assert!(!encoder.is_flushed());
        assert!(matches!(encoder.finish(), Err(Error::IncompleteFlush)));
    }

    #[test]
    fn test_flush_completes_across_calls() {
        let mut encoder = Encoder::new(params(8, 8, 1, Flags::empty())).unwrap();
        let input = [0u8; 8];
        let mut tiny = [0u8; 1];

        let mut out = Vec::new();
        let mut consumed = 0;
        for _ in 0..16 {
            let progress = encoder.encode(&input[consumed..], &mut tiny, Flush::Finish);
            consumed += progress.consumed;
            out.extend_from_slice(&tiny[..progress.produced]);
            if encoder.is_flushed() {
                break;
            }
        }
        assert!(encoder.is_flushed());
        assert_eq!(out, vec![0x08]);
        assert_eq!(encoder.total_out(), 1);
        encoder.finish().unwrap();
    }

    #[test]
    fn test_totals_accumulate() {
        let input: Vec<u8> = (0..16).collect();
        let mut encoder = Encoder::new(params(8, 8, 1, Flags::empty())).unwrap();
        let mut out = vec![0u8; 1024];

        let first = encoder.encode(&input[..10], &mut out, Flush::None);
        let second = encoder.encode(&input[10..], &mut out[first.produced..], Flush::Finish);
        let mut done = first.produced + second.produced;
        while !encoder.is_flushed() {
            let p = encoder.encode(&[], &mut out[done..], Flush::Finish);
            done += p.produced;
        }
        assert_eq!(encoder.total_in(), 16);
        assert_eq!(encoder.total_out(), done as u64);
        encoder.finish().unwrap();
    }
}
