//! Zobrist constants for PolyGlot book keys.
//!
//! The array follows the PolyGlot Random64 layout exactly: `[0..768)`
//! piece-square keys indexed `64 * kind + square` with
//! `kind = 2 * piece_type + 1` for white pieces and `2 * piece_type` for
//! black, `[768..772)` castling rights (WK, WQ, BK, BQ), `[772..780)`
//! en-passant files a through h, and `[780]` side to move (white).
//!
//! The constants are generated from a fixed xorshift seed, so keys are
//! stable across processes and platforms. Keys computed here therefore
//! only match books built with this same table; pointing the array at
//! the published PolyGlot constants is a drop-in substitution.

const SEED: u64 = 0x70AC_4CD9_F04F_21F5;

fn generate() -> [u64; 781] {
    let mut seed = SEED;
    let mut next_rand = || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };

    let mut keys = [0u64; 781];
    for key in keys.iter_mut() {
        *key = next_rand();
    }
    keys
}

lazy_static::lazy_static! {
    pub static ref RANDOM64: [u64; 781] = generate();
}

/// PolyGlot piece kind: black pawn = 0, white pawn = 1, ..., white king
/// = 11.
pub fn piece_kind(piece: chess::Piece, color: chess::Color) -> usize {
    2 * piece.to_index() + usize::from(color == chess::Color::White)
}
