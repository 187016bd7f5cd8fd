//! Ordinal encoding of the five-letter nucleotide alphabet.

pub const A: u8 = 0;
pub const C: u8 = 1;
pub const G: u8 = 2;
pub const T: u8 = 3;
pub const N: u8 = 4;

/// Number of symbols, `N` included.
pub const ALPHABET_SIZE: usize = 5;

const COMPLEMENT: [u8; ALPHABET_SIZE] = [T, G, C, A, N];
const SYMBOLS: &[u8; ALPHABET_SIZE] = b"ACGTN";

/// Maps an ASCII nucleotide to its ordinal. Anything outside `ACGT` becomes `N`.
#[inline]
pub fn encode(base: u8) -> u8 {
    match base {
        b'A' | b'a' => A,
        b'C' | b'c' => C,
        b'G' | b'g' => G,
        b'T' | b't' | b'U' | b'u' => T,
        _ => N,
    }
}

#[inline]
pub fn decode(ordinal: u8) -> u8 {
    SYMBOLS[ordinal.min(N) as usize]
}

#[inline]
pub fn complement(ordinal: u8) -> u8 {
    COMPLEMENT[ordinal.min(N) as usize]
}

pub fn encode_seq(seq: &[u8]) -> Vec<u8> {
    seq.iter().map(|&b| encode(b)).collect()
}

pub fn decode_seq(ordinals: &[u8]) -> String {
    ordinals.iter().map(|&o| decode(o) as char).collect()
}

/// Reverse complement of an ordinal-encoded sequence.
pub fn reverse_complement(ordinals: &[u8]) -> Vec<u8> {
    ordinals.iter().rev().map(|&o| complement(o)).collect()
}
