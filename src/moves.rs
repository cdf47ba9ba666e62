//! Predicates and conversions over the `chess` crate move model.
//!
//! `chess::ChessMove` carries only (from, to, promotion). Castling is the
//! king's two-square hop and en passant is the diagonal pawn move onto the
//! empty target square, so the move kind has to be derived from the board
//! the move is played on.

use chess::{Board, ChessMove, Color, MoveGen, Piece, Rank, Square};

/// Destination square of a legal en-passant capture, if one exists.
///
/// `Board::en_passant` reports the square of the capturable pawn itself
/// (rank 4 or 5); the capture lands one rank beyond it.
pub fn en_passant_target(board: &Board) -> Option<Square> {
    board.en_passant().map(|sq| {
        let rank = match board.side_to_move() {
            Color::White => sq.get_rank().to_index() + 1,
            Color::Black => sq.get_rank().to_index() - 1,
        };
        Square::make_square(Rank::from_index(rank), sq.get_file())
    })
}

pub fn is_en_passant(board: &Board, mv: ChessMove) -> bool {
    board.piece_on(mv.get_source()) == Some(Piece::Pawn)
        && en_passant_target(board) == Some(mv.get_dest())
}

pub fn is_capture(board: &Board, mv: ChessMove) -> bool {
    board.piece_on(mv.get_dest()).is_some() || is_en_passant(board, mv)
}

pub fn is_castle(board: &Board, mv: ChessMove) -> bool {
    let file_distance = (mv.get_source().get_file().to_index() as i32
        - mv.get_dest().get_file().to_index() as i32)
        .abs();
    board.piece_on(mv.get_source()) == Some(Piece::King) && file_distance == 2
}

/// A normal move: not a promotion, castling or en-passant capture.
pub fn is_normal(board: &Board, mv: ChessMove) -> bool {
    mv.get_promotion().is_none() && !is_castle(board, mv) && !is_en_passant(board, mv)
}

/// The piece removed from the board by `mv`, treating en passant as a
/// pawn capture.
pub fn captured_piece(board: &Board, mv: ChessMove) -> Option<Piece> {
    board.piece_on(mv.get_dest()).or_else(|| {
        if is_en_passant(board, mv) {
            Some(Piece::Pawn)
        } else {
            None
        }
    })
}

/// Renders a move in UCI long algebraic form; `None` becomes `0000`.
pub fn to_uci(mv: Option<ChessMove>) -> String {
    let Some(mv) = mv else {
        return "0000".to_string();
    };
    let mut out = format!("{}{}", mv.get_source(), mv.get_dest());
    if let Some(promo) = mv.get_promotion() {
        out.push(match promo {
            Piece::Queen => 'q',
            Piece::Rook => 'r',
            Piece::Bishop => 'b',
            Piece::Knight => 'n',
            _ => 'q',
        });
    }
    out
}

/// Resolves a UCI move string against the legal moves of `board`.
pub fn from_uci(board: &Board, token: &str) -> Option<ChessMove> {
    MoveGen::new_legal(board).find(|&mv| to_uci(Some(mv)) == token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn uci_round_trip() {
        let board = Board::default();
        let mv = from_uci(&board, "e2e4").expect("e2e4 is legal");
        assert_eq!(to_uci(Some(mv)), "e2e4");
        assert_eq!(to_uci(None), "0000");
        assert!(from_uci(&board, "e2e5").is_none());
    }

    #[test]
    fn en_passant_is_a_pawn_capture() {
        // After 1.e4 c5 2.e5 d5 white may capture exd6.
        let board =
            Board::from_str("rnbqkbnr/pp2pppp/8/2ppP3/8/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 3")
                .unwrap();
        let mv = from_uci(&board, "e5d6").expect("exd6 is legal");
        assert!(is_en_passant(&board, mv));
        assert!(is_capture(&board, mv));
        assert_eq!(captured_piece(&board, mv), Some(Piece::Pawn));
        assert!(!is_normal(&board, mv));
    }

    #[test]
    fn castling_is_detected_from_the_king_hop() {
        let board =
            Board::from_str("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();
        let mv = from_uci(&board, "e1g1").expect("short castling is legal");
        assert!(is_castle(&board, mv));
        assert!(!is_capture(&board, mv));
        let quiet = from_uci(&board, "e1f1").unwrap();
        assert!(is_normal(&board, quiet));
    }
}
