//! PolyGlot opening book: big-endian 16-byte records, binary-searched by
//! position key, with weighted random move selection.

pub mod zobrist;

use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chess::{Board, ChessMove, Color, MoveGen, Piece, Square, EMPTY};
use rand::Rng;

use zobrist::{piece_kind, RANDOM64};

const ENTRY_SIZE: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BookEntry {
    pub key: u64,
    pub mv: u16,
    pub weight: u16,
    pub learn: u32,
}

/// In-memory book, sorted by key after load. Read-only once loaded.
#[derive(Default)]
pub struct OpeningBook {
    entries: Vec<BookEntry>,
    loaded: bool,
}

impl OpeningBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads every complete 16-byte record from `path`; trailing partial
    /// records are discarded silently.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let mut file = fs::File::open(path)
            .with_context(|| format!("could not open book file {}", path.display()))?;
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)
            .with_context(|| format!("could not read book file {}", path.display()))?;

        self.entries.clear();
        for record in raw.chunks_exact(ENTRY_SIZE) {
            self.entries.push(BookEntry {
                key: u64::from_be_bytes(record[0..8].try_into().unwrap()),
                mv: u16::from_be_bytes(record[8..10].try_into().unwrap()),
                weight: u16::from_be_bytes(record[10..12].try_into().unwrap()),
                learn: u32::from_be_bytes(record[12..16].try_into().unwrap()),
            });
        }
        self.entries.sort_by_key(|entry| entry.key);
        self.loaded = !self.entries.is_empty();

        Ok(self.entries.len())
    }

    /// Weighted random pick among the book moves for this position, or
    /// `None` when the position is out of book.
    pub fn get_move(&self, board: &Board) -> Option<ChessMove> {
        if !self.loaded {
            return None;
        }
        let entries = self.find_entries(polyglot_key(board));
        self.pick_weighted(entries, board, &mut rand::thread_rng())
    }

    /// Contiguous run of entries matching `key`.
    fn find_entries(&self, key: u64) -> &[BookEntry] {
        let start = self.entries.partition_point(|entry| entry.key < key);
        let run = self.entries[start..]
            .iter()
            .take_while(|entry| entry.key == key)
            .count();
        &self.entries[start..start + run]
    }

    /// Draws proportionally to entry weights and verifies legality.
    /// Deterministic given the injected RNG, which tests seed.
    pub fn pick_weighted(
        &self,
        entries: &[BookEntry],
        board: &Board,
        rng: &mut impl Rng,
    ) -> Option<ChessMove> {
        let total: u32 = entries.iter().map(|entry| entry.weight as u32).sum();
        if total == 0 {
            return None;
        }

        let draw = rng.gen_range(0..total);
        let mut running = 0u32;
        for entry in entries {
            running += entry.weight as u32;
            if draw < running {
                let mv = decode_move(entry.mv, board)?;
                return board.legal(mv).then_some(mv);
            }
        }
        None
    }
}

/// PolyGlot position key: piece-square, castling, strict en passant and
/// side-to-move contributions XOR-ed together.
pub fn polyglot_key(board: &Board) -> u64 {
    let mut key = 0u64;

    for sq in *board.combined() {
        let (Some(piece), Some(color)) = (board.piece_on(sq), board.color_on(sq)) else {
            continue;
        };
        key ^= RANDOM64[64 * piece_kind(piece, color) + sq.to_index()];
    }

    let white = board.castle_rights(Color::White);
    let black = board.castle_rights(Color::Black);
    if white.has_kingside() {
        key ^= RANDOM64[768];
    }
    if white.has_queenside() {
        key ^= RANDOM64[769];
    }
    if black.has_kingside() {
        key ^= RANDOM64[770];
    }
    if black.has_queenside() {
        key ^= RANDOM64[771];
    }

    // Strict PolyGlot rule: the en-passant file is keyed only when a
    // pawn of the side to move stands ready to capture.
    if let Some(ep) = board.en_passant() {
        let capturers = chess::get_adjacent_files(ep.get_file())
            & chess::get_rank(ep.get_rank())
            & *board.pieces(Piece::Pawn)
            & *board.color_combined(board.side_to_move());
        if capturers != EMPTY {
            key ^= RANDOM64[772 + ep.get_file().to_index()];
        }
    }

    if board.side_to_move() == Color::White {
        key ^= RANDOM64[780];
    }

    key
}

/// Decodes a PolyGlot move word against `board`.
///
/// Bits 0..5 are the destination, 6..11 the source, 12..14 the promotion
/// piece. Books encode castling as king-captures-rook; that form is
/// translated to the king hop the move model uses.
pub fn decode_move(packed: u16, board: &Board) -> Option<ChessMove> {
    // SAFETY: both indices are masked to 0..=63.
    let to = unsafe { Square::new((packed & 0x3F) as u8) };
    let from = unsafe { Square::new(((packed >> 6) & 0x3F) as u8) };
    let promotion = (packed >> 12) & 0x7;

    if promotion > 0 {
        let piece = match promotion {
            1 => Piece::Knight,
            2 => Piece::Bishop,
            3 => Piece::Rook,
            _ => Piece::Queen,
        };
        return Some(ChessMove::new(from, to, Some(piece)));
    }

    if board.piece_on(from) == Some(Piece::King) {
        let castle_to = if from == Square::E1 && to == Square::H1 {
            Some(Square::G1)
        } else if from == Square::E1 && to == Square::A1 {
            Some(Square::C1)
        } else if from == Square::E8 && to == Square::H8 {
            Some(Square::G8)
        } else if from == Square::E8 && to == Square::A8 {
            Some(Square::C8)
        } else {
            None
        };
        if let Some(castle_to) = castle_to {
            return Some(ChessMove::new(from, castle_to, None));
        }
    }

    // En-passant and normal moves share the plain from/to shape.
    Some(ChessMove::new(from, to, None))
}

/// Encodes a move into the PolyGlot word (castling kept in king-hop
/// form, which `decode_move` also accepts via the legality check).
pub fn encode_move(mv: ChessMove) -> u16 {
    let promo: u16 = match mv.get_promotion() {
        Some(Piece::Knight) => 1,
        Some(Piece::Bishop) => 2,
        Some(Piece::Rook) => 3,
        Some(Piece::Queen) => 4,
        _ => 0,
    };
    (promo << 12) | ((mv.get_source().to_index() as u16) << 6) | mv.get_dest().to_index() as u16
}

/// A book move must be legal in the probed position.
pub fn is_legal_book_move(board: &Board, mv: ChessMove) -> bool {
    MoveGen::new_legal(board).any(|legal| legal == mv)
}
