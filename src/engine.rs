//! Engine facade: owns the last-good position and the persistent search
//! state, and services the UCI front-end.

use std::str::FromStr;
use std::sync::mpsc::Sender;

use anyhow::{anyhow, Result};
use chess::{Board, Piece};
use log::{info, warn};

use crate::defs::DEFAULT_HASH_MB;
use crate::eval;
use crate::moves;
use crate::search::{SearchLimits, Searcher};

pub struct Engine {
    board: Board,
    game_history: Vec<u64>,
    halfmove_clock: u32,
    searcher: Searcher,
    threads: usize,
    tb_path: Option<String>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let board = Board::default();
        Self {
            board,
            game_history: vec![board.get_hash()],
            halfmove_clock: 0,
            searcher: Searcher::new(DEFAULT_HASH_MB),
            threads: 1,
            tb_path: None,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Resets the position and clears the transposition and ordering
    /// tables for a fresh game.
    pub fn new_game(&mut self) {
        self.board = Board::default();
        self.game_history = vec![self.board.get_hash()];
        self.halfmove_clock = 0;
        self.searcher.tt.lock().clear();
        self.searcher.tables.lock().clear();
    }

    /// Applies a `position` command. On any error the previous position
    /// is left untouched.
    pub fn set_position(&mut self, fen: Option<&str>, move_tokens: &[&str]) -> Result<()> {
        let (mut board, mut clock) = match fen {
            None => (Board::default(), 0),
            Some(fen) => parse_fen(fen)?,
        };
        let mut history = vec![board.get_hash()];

        for token in move_tokens {
            let mv = moves::from_uci(&board, token)
                .ok_or_else(|| anyhow!("illegal move {token}"))?;
            let resets_clock = moves::is_capture(&board, mv)
                || board.piece_on(mv.get_source()) == Some(Piece::Pawn);
            board = board.make_move_new(mv);
            clock = if resets_clock { 0 } else { clock + 1 };
            history.push(board.get_hash());
        }

        self.board = board;
        self.halfmove_clock = clock;
        self.game_history = history;
        Ok(())
    }

    /// Kicks off an asynchronous search on the current position; output
    /// lines arrive on `tx`.
    pub fn go(&self, limits: SearchLimits, tx: Sender<String>) {
        self.searcher.search_async(
            self.board,
            self.game_history.clone(),
            self.halfmove_clock,
            limits,
            tx,
        );
    }

    pub fn stop(&self) {
        self.searcher.stop();
    }

    pub fn is_searching(&self) -> bool {
        self.searcher.is_searching()
    }

    pub fn set_hash_size(&self, mb: usize) {
        self.searcher.tt.lock().resize(mb.max(1));
        info!("transposition table resized to {} MB", mb.max(1));
    }

    /// Accepted for UCI compatibility; the search core is single
    /// threaded.
    pub fn set_threads(&mut self, threads: usize) {
        self.threads = threads.max(1);
    }

    /// Loads a PolyGlot book; on failure the engine keeps playing
    /// without one.
    pub fn set_book_path(&self, path: &str) {
        let mut book = self.searcher.book.write();
        match book.load(path) {
            Ok(count) => info!("loaded {count} book entries from {path}"),
            Err(err) => warn!("book unavailable: {err:#}"),
        }
    }

    /// Stored for UCI compatibility; tablebase probing is not wired up.
    pub fn set_tablebases(&mut self, path: &str) {
        self.tb_path = Some(path.to_string());
    }

    pub fn evaluate(&self) -> i32 {
        eval::evaluate(&self.board)
    }

    pub fn analysis(&self) -> String {
        format!(
            "eval: {} cp (side to move)\nmaterial: {} cp (white)\nphase: {}",
            self.evaluate(),
            eval::material_balance(&self.board),
            if eval::is_endgame(&self.board) {
                "endgame"
            } else {
                "middlegame"
            },
        )
    }
}

fn parse_fen(fen: &str) -> Result<(Board, u32)> {
    let board = Board::from_str(fen).map_err(|err| anyhow!("bad FEN {fen:?}: {err}"))?;
    // `chess::Board` does not carry the halfmove clock; recover it from
    // the FEN field directly.
    let clock = fen
        .split_whitespace()
        .nth(4)
        .and_then(|field| field.parse().ok())
        .unwrap_or(0);
    Ok((board, clock))
}
