//! Per-block code option assessment, selection and emission.
//!
//! Every block is coded with one of four options (CCSDS 121.0-B-2
//! section 3): sample splitting at a position k, the second-extension
//! low-entropy code, a zero-block run, or uncompressed passthrough. The
//! assessors compute exact coded lengths without emitting anything; the
//! emitters then produce the chosen coded data set bit for bit.

use crate::bitwriter::BitWriter;

/// Sentinel for "option not viable" when comparing coded lengths.
pub(crate) const NOT_VIABLE: u64 = u64::MAX;

/// Run-length sentinel for a zero run that fills its 64-block segment.
pub(crate) const ROS: u32 = 64;

/// Code option chosen for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CodeOption {
    Splitting,
    SecondExtension,
    Uncompressed,
}

/// Length in bits of the splitting-option CDS body for the best k.
///
/// Each residual is split at position k into k binary LSB and a
/// fundamental-sequence coded MSB part, so the body costs
/// `sum(d >> k) + n * (k + 1)` bits. That cost is unimodal in k (Kiely,
/// IPN Progress Report 42-159), which the search exploits: starting from
/// the previous block's winner it walks uphill or downhill and stops as
/// soon as the length can only grow. Growth is detectable without another
/// evaluation: raising k by one adds n bits of binary part, so once the
/// fundamental-sequence part is smaller than the block there is nothing
/// left to trade.
///
/// Returns the winning k and its length.
pub(crate) fn assess_splitting(coded: &[u32], k_seed: u32, kmax: u32) -> (u32, u64) {
    let n = coded.len() as u64;
    let mut k = k_seed;
    let mut k_min = k_seed;
    let mut len_min = u64::MAX;
    let mut no_turn = k == 0;
    let mut dir_up = true;

    loop {
        let fs_len: u64 = coded.iter().map(|&d| u64::from(d >> k)).sum();
        let len = fs_len + n * u64::from(k + 1);

        if len < len_min {
            if len_min != u64::MAX {
                no_turn = true;
            }
            len_min = len;
            k_min = k;

            if dir_up {
                if fs_len < n || k >= kmax {
                    if no_turn {
                        break;
                    }
                    k = k_seed - 1;
                    dir_up = false;
                    no_turn = true;
                } else {
                    k += 1;
                }
            } else if fs_len >= n || k == 0 {
                break;
            } else {
                k -= 1;
            }
        } else {
            if no_turn {
                break;
            }
            k = k_seed - 1;
            dir_up = false;
            no_turn = true;
        }
    }

    (k_min, len_min)
}

/// Length in bits of the second-extension CDS body, or [`NOT_VIABLE`].
///
/// Adjacent residuals are paired; a pair (a, b) costs the fundamental
/// sequence for `(a + b)(a + b + 1)/2 + b`. A pair sum beyond the
/// uncompressed length can only lose (and could overflow the triangular
/// term), so assessment bails out early.
pub(crate) fn assess_second_extension(block: &[u32], uncomp_len: u64) -> u64 {
    let mut len: u64 = 1;
    for pair in block.chunks_exact(2) {
        let s = u64::from(pair[0]) + u64::from(pair[1]);
        if s > uncomp_len {
            return NOT_VIABLE;
        }
        len += s * (s + 1) / 2 + u64::from(pair[1]) + 1;
    }
    len
}

/// Pick the cheapest code option for the current block.
///
/// `block` is the whole block of residuals; `has_ref` marks a reference
/// block whose first residual is the literal reference sample. Returns the
/// chosen option and the splitting position to seed the next search with.
pub(crate) fn select_option(
    block: &[u32],
    has_ref: bool,
    k_seed: u32,
    kmax: u32,
    id_len: u32,
    uncomp_len: u64,
) -> (CodeOption, u32) {
    let (k, split_len) = if id_len > 1 {
        assess_splitting(&block[usize::from(has_ref)..], k_seed, kmax)
    } else {
        // A 1-bit ID leaves no room for splitting codes.
        (k_seed, NOT_VIABLE)
    };
    let se_len = assess_second_extension(block, uncomp_len);

    let option = if split_len < uncomp_len {
        if split_len < se_len {
            CodeOption::Splitting
        } else {
            CodeOption::SecondExtension
        }
    } else if uncomp_len <= se_len {
        CodeOption::Uncompressed
    } else {
        CodeOption::SecondExtension
    };
    (option, k)
}

/// Emit a splitting CDS: option ID k+1, optional reference sample, the
/// fundamental-sequence parts, then the k-bit binary parts.
pub(crate) fn emit_splitting(
    w: &mut BitWriter,
    out: &mut [u8],
    block: &[u32],
    has_ref: bool,
    k: u32,
    id_len: u32,
    bits_per_sample: u32,
) {
    w.emit(out, k + 1, id_len);
    if has_ref {
        w.emit(out, block[0], bits_per_sample);
    }
    let coded = &block[usize::from(has_ref)..];
    w.emit_block_fs(out, coded, k);
    if k > 0 {
        w.emit_block(out, coded, k);
    }
}

/// Emit an uncompressed CDS: all-ones option ID, then every sample of the
/// block verbatim (the reference sample, if any, is part of the block).
pub(crate) fn emit_uncompressed(
    w: &mut BitWriter,
    out: &mut [u8],
    block: &[u32],
    id_len: u32,
    bits_per_sample: u32,
) {
    w.emit(out, (1 << id_len) - 1, id_len);
    w.emit_block(out, block, bits_per_sample);
}

/// Emit a second-extension CDS: zero-prefixed option ID 1, optional
/// reference sample, then one fundamental sequence per residual pair.
pub(crate) fn emit_second_extension(
    w: &mut BitWriter,
    out: &mut [u8],
    block: &[u32],
    has_ref: bool,
    id_len: u32,
    bits_per_sample: u32,
) {
    w.emit(out, 1, id_len + 1);
    if has_ref {
        w.emit(out, block[0], bits_per_sample);
    }
    for pair in block.chunks_exact(2) {
        let s = u64::from(pair[0]) + u64::from(pair[1]);
        let fs = s * (s + 1) / 2 + u64::from(pair[1]);
        w.emit_fs(out, fs as u32);
    }
}

/// Emit a zero-run CDS: zero-prefixed option ID 0, the reference sample of
/// the first aggregated block if it had one, then the run length code.
///
/// Runs of up to four blocks are coded as `fs(n - 1)`; the value 4 is the
/// escape for a run filling its segment (ROS), so longer explicit counts
/// shift up by one.
pub(crate) fn emit_zero_run(
    w: &mut BitWriter,
    out: &mut [u8],
    run: u32,
    reference: Option<u32>,
    id_len: u32,
    bits_per_sample: u32,
) {
    w.emit(out, 0, id_len + 1);
    if let Some(sample) = reference {
        w.emit(out, sample, bits_per_sample);
    }
    if run == ROS {
        w.emit_fs(out, 4);
    } else if run >= 5 {
        w.emit_fs(out, run);
    } else {
        w.emit_fs(out, run - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_len_at(coded: &[u32], k: u32) -> u64 {
        let fs: u64 = coded.iter().map(|&d| u64::from(d >> k)).sum();
        fs + coded.len() as u64 * u64::from(k + 1)
    }

    fn bits_emitted(emit: impl FnOnce(&mut BitWriter, &mut [u8])) -> u64 {
        let mut w = BitWriter::new();
        let mut out: [u8; 0] = [];
        emit(&mut w, &mut out);
        w.pos() as u64 * 8 + 8 - u64::from(w.bits_free())
    }

    #[test]
    fn test_splitting_finds_minimum() {
        let blocks: [&[u32]; 5] = [
            &[0, 1, 2, 3, 4, 5, 6, 7],
            &[255; 8],
            &[0; 8],
            &[1, 128, 3, 200, 90, 2, 0, 17],
            &[40, 41, 39, 44, 38, 40, 42, 41],
        ];
        for coded in blocks {
            for seed in 0..=5 {
                let (k, len) = assess_splitting(coded, seed, 5);
                let best = (0..=5).map(|k| split_len_at(coded, k)).min().unwrap();
                assert_eq!(len, best, "block {coded:?} seed {seed}");
                assert_eq!(len, split_len_at(coded, k), "block {coded:?} seed {seed}");
            }
        }
    }

    #[test]
    fn test_splitting_seed_independence() {
        let coded: &[u32] = &[9, 14, 11, 8, 13, 12, 10, 9];
        let lengths: Vec<u64> = (0..=13)
            .map(|seed| assess_splitting(coded, seed, 13).1)
            .collect();
        assert!(lengths.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_second_extension_length() {
        // Pairs (0,1), (2,0): 1 + (1+1+1) + (3+0+1) = 8 bits.
        assert_eq!(assess_second_extension(&[0, 1, 2, 0], 64), 8);
        // All zero: 1 + 4 pairs x 1 bit.
        assert_eq!(assess_second_extension(&[0; 8], 64), 5);
    }

    #[test]
    fn test_second_extension_bails_out() {
        assert_eq!(assess_second_extension(&[200, 200, 0, 0], 64), NOT_VIABLE);
    }

    #[test]
    fn test_selection_prefers_uncompressed_for_noise() {
        let block: &[u32] = &[255; 8];
        let (option, _) = select_option(block, false, 0, 5, 3, 64);
        assert_eq!(option, CodeOption::Uncompressed);
    }

    #[test]
    fn test_selection_prefers_second_extension_for_sparse_pairs() {
        let block: &[u32] = &[0, 0, 0, 1, 0, 0, 0, 0];
        let (option, _) = select_option(block, false, 0, 5, 3, 64);
        assert_eq!(option, CodeOption::SecondExtension);
    }

    #[test]
    fn test_selection_prefers_splitting_for_mid_entropy() {
        let block: &[u32] = &[12, 9, 14, 11, 8, 13, 12, 10];
        let (option, k) = select_option(block, false, 0, 5, 3, 64);
        assert_eq!(option, CodeOption::Splitting);
        assert_eq!(split_len_at(block, k), assess_splitting(block, 0, 5).1);
    }

    #[test]
    fn test_selection_without_splitting_ids() {
        // id_len 1: splitting is never assessed.
        let block: &[u32] = &[1, 2, 1, 0, 3, 1, 2, 1];
        let (option, k) = select_option(block, false, 0, 0, 1, 16);
        assert_eq!(option, CodeOption::Uncompressed);
        assert_eq!(k, 0);
    }

    #[test]
    fn test_emitted_splitting_length_matches_assessment() {
        let block: &[u32] = &[12, 9, 14, 11, 8, 13, 12, 10];
        for has_ref in [false, true] {
            let coded = &block[usize::from(has_ref)..];
            let (k, len) = assess_splitting(coded, 0, 5);
            let emitted = bits_emitted(|w, out| {
                emit_splitting(w, out, block, has_ref, k, 3, 8);
            });
            let overhead = 3 + if has_ref { 8 } else { 0 };
            assert_eq!(emitted, len + overhead, "has_ref={has_ref}");
        }
    }

    #[test]
    fn test_emitted_second_extension_length_matches_assessment() {
        let block: &[u32] = &[0, 1, 2, 0, 1, 1, 0, 0];
        let len = assess_second_extension(block, 64);
        let emitted = bits_emitted(|w, out| {
            emit_second_extension(w, out, block, false, 3, 8);
        });
        // The assessed length already counts the ID's selector bit.
        assert_eq!(emitted, len + 3);
    }

    #[test]
    fn test_emitted_uncompressed_length() {
        let block: &[u32] = &[255; 8];
        let emitted = bits_emitted(|w, out| {
            emit_uncompressed(w, out, block, 3, 8);
        });
        assert_eq!(emitted, 3 + 64);
    }

    #[test]
    fn test_zero_run_codes() {
        // Short runs: fs(n - 1).
        for run in 1..=4 {
            let emitted = bits_emitted(|w, out| {
                emit_zero_run(w, out, run, None, 3, 8);
            });
            assert_eq!(emitted, 4 + u64::from(run), "run {run}");
        }
        // Explicit counts above four shift past the ROS escape.
        let emitted = bits_emitted(|w, out| emit_zero_run(w, out, 5, None, 3, 8));
        assert_eq!(emitted, 4 + 6);
        // ROS itself is fs(4).
        let emitted = bits_emitted(|w, out| emit_zero_run(w, out, ROS, None, 3, 8));
        assert_eq!(emitted, 4 + 5);
    }
}
