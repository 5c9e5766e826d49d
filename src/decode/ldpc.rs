//! Non-binary LDPC(162,81) decoder over GF(64) for B2b navigation pages,
//! using Extended Min-Sum belief propagation with truncated check-node
//! convolution.

use crate::basic::bits::{bits2hex, hex2bits, hex2bytes};
use crate::basic::var::*;
use crate::decode::DecodeError;
use once_cell::sync::Lazy;

/// GF symbol width (bits) and field order.
const N_GF: usize = 6;
const Q_GF: usize = 64;

/// code dimensions: 81 checks over 162 symbol columns
const LDPC_M: usize = 81;
const LDPC_N: usize = 162;
const ROW_W: usize = 4;

/// column indices of the non-zero entries of H, row by row
static H_IDX: [[u16; ROW_W]; LDPC_M] = [
    [19, 67, 109, 130], [27, 71, 85, 161], [31, 78, 96, 122], [2, 44, 83, 125],
    [26, 71, 104, 132], [30, 39, 93, 154], [4, 46, 85, 127], [21, 62, 111, 127],
    [13, 42, 101, 146], [18, 66, 108, 129], [27, 72, 100, 153], [29, 70, 84, 160],
    [23, 61, 113, 126], [8, 50, 89, 131], [34, 74, 111, 157], [12, 44, 100, 145],
    [22, 60, 112, 128], [0, 49, 115, 151], [6, 47, 106, 144], [33, 53, 82, 140],
    [3, 45, 84, 126], [38, 80, 109, 147], [9, 60, 96, 141], [1, 43, 82, 124],
    [20, 77, 88, 158], [37, 54, 122, 159], [3, 65, 104, 149], [5, 47, 86, 128],
    [0, 42, 81, 123], [32, 79, 97, 120], [35, 72, 112, 158], [15, 57, 93, 138],
    [22, 75, 107, 143], [24, 69, 102, 133], [1, 50, 116, 152], [24, 57, 119, 135],
    [17, 59, 95, 140], [7, 45, 107, 145], [34, 51, 83, 138], [14, 43, 99, 144],
    [21, 77, 106, 142], [16, 58, 94, 139], [20, 68, 110, 131], [2, 48, 114, 150],
    [10, 52, 91, 133], [25, 70, 103, 134], [32, 41, 95, 153], [14, 56, 91, 137],
    [33, 73, 113, 156], [28, 73, 101, 154], [4, 63, 102, 147], [6, 48, 87, 129],
    [8, 46, 105, 146], [30, 80, 98, 121], [41, 68, 119, 150], [35, 52, 81, 139],
    [16, 63, 114, 124], [13, 55, 90, 136], [31, 40, 94, 155], [10, 61, 97, 142],
    [36, 56, 121, 161], [29, 74, 99, 155], [5, 64, 103, 148], [18, 75, 89, 156],
    [36, 78, 110, 148], [19, 76, 87, 157], [15, 65, 116, 123], [11, 53, 92, 134],
    [25, 58, 117, 136], [39, 66, 117, 151], [11, 62, 98, 143], [9, 51, 90, 132],
    [38, 55, 120, 160], [7, 49, 88, 130], [17, 64, 115, 125],
    [28, 69, 86, 159], [23, 76, 105, 141], [12, 54, 92, 135],
    [40, 67, 118, 152], [37, 79, 108, 149], [26, 59, 118, 137],
];

/// the matching non-zero GF(64) coefficients of H
static H_ELE: [[u8; ROW_W]; LDPC_M] = [
    [46, 45, 44, 15], [15, 24, 50, 37], [24, 50, 37, 15], [15, 32, 18, 61],
    [58, 56, 60, 62], [37, 53, 61, 29], [46, 58, 18, 6], [36, 19, 3, 57],
    [54, 7, 38, 23], [51, 59, 63, 47], [9, 3, 43, 29], [56, 8, 46, 13],
    [26, 22, 14, 2], [63, 26, 41, 12], [17, 32, 58, 37], [38, 23, 55, 22],
    [35, 1, 31, 44], [44, 51, 35, 13], [30, 1, 44, 7], [27, 5, 2, 62],
    [16, 63, 20, 9], [27, 56, 8, 43], [1, 44, 30, 24], [5, 26, 27, 37],
    [42, 47, 37, 32], [38, 12, 25, 51], [43, 34, 48, 57], [39, 9, 30, 48],
    [63, 13, 54, 10], [2, 46, 56, 35], [47, 20, 33, 26], [62, 54, 56, 60],
    [1, 21, 25, 7], [43, 58, 19, 49], [28, 4, 52, 44], [46, 44, 14, 15],
    [41, 48, 2, 27], [49, 21, 7, 35], [40, 21, 44, 17], [24, 23, 45, 11],
    [46, 25, 22, 48], [13, 29, 53, 61], [52, 17, 24, 61], [29, 41, 10, 16],
    [60, 24, 4, 50], [32, 49, 58, 19], [43, 34, 48, 57], [29, 7, 10, 16],
    [25, 11, 7, 1], [32, 49, 58, 19], [42, 14, 24, 33], [39, 56, 30, 48],
    [13, 27, 56, 8], [53, 40, 61, 18], [8, 43, 27, 56], [18, 40, 32, 61],
    [60, 48, 2, 27], [50, 54, 60, 62], [58, 19, 32, 49], [9, 3, 63, 43],
    [53, 35, 16, 13], [23, 25, 30, 16], [18, 6, 61, 21], [15, 1, 42, 45],
    [20, 16, 63, 9], [27, 37, 5, 26], [29, 7, 10, 16], [11, 60, 6, 49],
    [43, 47, 18, 20], [42, 14, 24, 33], [43, 22, 41, 20], [22, 15, 12, 33],
    [9, 41, 57, 58], [5, 31, 51, 30], [9, 3, 63, 43],
    [37, 53, 61, 29], [6, 45, 56, 19], [33, 45, 36, 34],
    [19, 24, 42, 14], [1, 45, 15, 6], [8, 43, 27, 56],
];

/// powers of the multiplicative generator of GF(64)
static GF_VEC: [u8; 63] = [
    1, 2, 4, 8, 16, 32, 3, 6, 12, 24, 48, 35, 5, 10, 20, 40, 19, 38, 15, 30, 60, 59, 53, 41, 17,
    34, 7, 14, 28, 56, 51, 37, 9, 18, 36, 11, 22, 44, 27, 54, 47, 29, 58, 55, 45, 25, 50, 39, 13,
    26, 52, 43, 21, 42, 23, 46, 31, 62, 63, 61, 57, 49, 33,
];

/// discrete-log table: GF_VEC[GF_POW[x]] == x for x != 0
static GF_POW: [u8; 64] = [
    0, 0, 1, 6, 2, 12, 7, 26, 3, 32, 13, 35, 8, 48, 27, 18, 4, 24, 33, 16, 14, 52, 36, 54, 9, 45,
    49, 38, 28, 41, 19, 56, 5, 62, 25, 11, 34, 31, 17, 47, 15, 23, 53, 51, 37, 44, 55, 40, 10, 61,
    46, 30, 50, 22, 39, 43, 29, 60, 42, 21, 20, 59, 57, 58,
];

/// full GF(64) multiplication table, built once
static GF_MUL: Lazy<[[u8; Q_GF]; Q_GF]> = Lazy::new(|| {
    let mut mul = [[0u8; Q_GF]; Q_GF];
    for i in 1..Q_GF {
        for j in 1..Q_GF {
            mul[i][j] = GF_VEC[(GF_POW[i] as usize + GF_POW[j] as usize) % (Q_GF - 1)];
        }
    }
    mul
});

#[inline]
fn popcount6(x: u8) -> u32 {
    (x & 0x3F).count_ones()
}

/// pack a bit sequence into 6-bit GF symbols, MSB first
fn bits2syms(bits: &[u8]) -> Vec<u8> {
    bits.chunks_exact(N_GF)
        .map(|c| c.iter().fold(0u8, |v, b| (v << 1) | (b & 1)))
        .collect()
}

/// unpack GF symbols back to bits, 6 MSB-first per symbol
fn syms2bits(code: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(code.len() * N_GF);
    for &c in code {
        for j in (0..N_GF).rev() {
            bits.push((c >> j) & 1);
        }
    }
    bits
}

/// Extended Min-Sum of two check-node operands: keep the NM smallest entries
/// of each side, convolve over the XOR group, fill the rest with the tail
/// maximum.
fn ext_min_sum(a: &[f32; Q_GF], b: &[f32; Q_GF], nm: usize) -> [f32; Q_GF] {
    let mut idx_a: [usize; Q_GF] = std::array::from_fn(|i| i);
    let mut idx_b: [usize; Q_GF] = std::array::from_fn(|i| i);
    idx_a.sort_by(|&x, &y| a[x].total_cmp(&a[y]));
    idx_b.sort_by(|&x, &y| b[x].total_cmp(&b[y]));

    let max_l = a[idx_a[nm - 1]] + b[idx_b[nm - 1]];
    let mut out = [max_l; Q_GF];
    for &ia in idx_a.iter().take(nm) {
        for &ib in idx_b.iter().take(nm) {
            let v = a[ia] + b[ib];
            let k = ia ^ ib;
            if v < out[k] {
                out[k] = v;
            }
        }
    }
    out
}

#[inline]
fn normalize(msg: &mut [f32; Q_GF]) {
    let mn = msg.iter().cloned().fold(f32::INFINITY, f32::min);
    for v in msg.iter_mut() {
        *v -= mn;
    }
}

/// Belief-propagation decode of a symbol-bit sequence. Returns the decoded
/// bit sequence and the number of corrected bit positions, or -1 when the
/// decoder did not converge within the iteration cap.
pub fn decode_ldpc_bits(syms: &[u8], cfg: &Config) -> (Vec<u8>, i32) {
    let nvars = syms.len() / N_GF;
    if nvars == 0 {
        return (Vec::new(), 0);
    }
    let mut code = bits2syms(&syms[..nvars * N_GF]);

    // a-priori LLR from the hard symbols
    let llr_unit = -(cfg.err_prob.ln()) as f32;
    let prior: Vec<[f32; Q_GF]> = code
        .iter()
        .map(|&c| std::array::from_fn(|x| llr_unit * popcount6(c ^ x as u8) as f32))
        .collect();

    // edge list of H, restricted to columns the input actually covers
    let mut ie = Vec::with_capacity(LDPC_M * ROW_W);
    let mut je = Vec::with_capacity(LDPC_M * ROW_W);
    let mut he = Vec::with_capacity(LDPC_M * ROW_W);
    for i in 0..LDPC_M {
        for j in 0..ROW_W {
            if (H_IDX[i][j] as usize) < nvars {
                ie.push(i);
                je.push(H_IDX[i][j] as usize);
                he.push(H_ELE[i][j]);
            }
        }
    }
    let ne = ie.len();

    let mut v2c: Vec<[f32; Q_GF]> = vec![[0.0; Q_GF]; ne];
    let mut c2v: Vec<[f32; Q_GF]> = vec![[0.0; Q_GF]; ne];
    for i in 0..ne {
        for x in 0..Q_GF {
            v2c[i][GF_MUL[he[i] as usize][x] as usize] = prior[je[i]][x];
        }
    }

    let parity_ok = |code: &[u8]| {
        let mut s = [0u8; LDPC_M];
        for i in 0..ne {
            s[ie[i]] ^= GF_MUL[he[i] as usize][code[je[i]] as usize];
        }
        s.iter().all(|&v| v == 0)
    };

    for _ in 0..cfg.max_iter {
        if parity_ok(&code) {
            let dec = syms2bits(&code);
            let nerr = dec
                .iter()
                .zip(syms.iter())
                .filter(|(a, b)| (*a ^ *b) & 1 != 0)
                .count();
            return (dec, nerr as i32);
        }

        // check-node update
        for i in 0..ne {
            let mut ls: Option<[f32; Q_GF]> = None;
            for j in 0..ne {
                if ie[i] == ie[j] && i != j {
                    ls = Some(match ls {
                        None => v2c[j],
                        Some(acc) => ext_min_sum(&acc, &v2c[j], cfg.nm_ems),
                    });
                }
            }
            let mut ls = ls.unwrap_or([0.0; Q_GF]);
            normalize(&mut ls);
            for x in 0..Q_GF {
                c2v[i][x] = ls[GF_MUL[he[i] as usize][x] as usize];
            }
        }

        // variable-node update
        for i in 0..ne {
            let mut ls = prior[je[i]];
            for j in 0..ne {
                if je[i] == je[j] && i != j {
                    for x in 0..Q_GF {
                        ls[x] += c2v[j][x];
                    }
                }
            }
            normalize(&mut ls);
            for x in 0..Q_GF {
                v2c[i][GF_MUL[he[i] as usize][x] as usize] = ls[x];
            }
        }

        // hard decision
        for i in 0..nvars {
            let mut li = prior[i];
            for j in 0..ne {
                if je[j] == i {
                    for x in 0..Q_GF {
                        li[x] += c2v[j][x];
                    }
                }
            }
            let mut argmin = 0;
            for x in 1..Q_GF {
                if li[x] < li[argmin] {
                    argmin = x;
                }
            }
            code[i] = argmin as u8;
        }
    }

    (syms2bits(&code), -1)
}

/// Full nav-bits pipeline: drop the trailing two hex characters, convert to
/// bits, drop the 12-bit preamble remnant, LDPC-decode, and serialize the
/// corrected bits back to bytes.
pub fn decode_navbits(nav_hex: &str, cfg: &Config) -> Result<Vec<u8>, DecodeError> {
    let hex = if nav_hex.len() >= 2 {
        &nav_hex[..nav_hex.len() - 2]
    } else {
        nav_hex
    };
    let mut bits = hex2bits(hex)?;
    if bits.len() < 12 {
        return Err(DecodeError::ShortFrame {
            want: 12,
            got: bits.len(),
        });
    }
    bits.drain(..12);

    let (dec_bits, nerr) = decode_ldpc_bits(&bits, cfg);
    if nerr < 0 {
        return Err(DecodeError::LdpcUnconverged);
    }

    let hex_out = bits2hex(&dec_bits);
    hex2bytes(&hex_out)
}
