//! Iterative-deepening driver and the negamax alpha-beta search with
//! principal-variation search, null-move pruning, late-move reductions,
//! check/promotion extensions and a capture-only quiescence search.

pub mod ordering;
pub mod tt;

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chess::{Board, ChessMove, Color, MoveGen, Piece, EMPTY};
use parking_lot::{Mutex, RwLock};

use crate::book::OpeningBook;
use crate::defs::{piece_value, DEFAULT_HASH_MB, MATE_IN_MAX_PLY, MATE_VALUE, MAX_DEPTH, MAX_PLY};
use crate::eval::evaluate;
use crate::moves;
use ordering::OrderingTables;
use tt::{TranspositionTable, TtFlag};

/// Margin added to the captured piece value in quiescence delta pruning.
const DELTA_MARGIN: i32 = 200;

#[derive(Clone, Copy, Debug, Default)]
pub struct SearchLimits {
    pub depth: i32,
    pub movetime: u64,
    pub wtime: u64,
    pub btime: u64,
    pub winc: u64,
    pub binc: u64,
    pub infinite: bool,
}

impl SearchLimits {
    /// Hard deadline for this request, if any: an explicit movetime wins,
    /// otherwise a clock allocation of time/30 + increment/2 clamped to
    /// at least 100 ms.
    pub fn time_budget(&self, side: Color) -> Option<Duration> {
        if self.movetime > 0 {
            return Some(Duration::from_millis(self.movetime));
        }
        if self.infinite || (self.wtime == 0 && self.btime == 0) {
            return None;
        }
        let (time, inc) = match side {
            Color::White => (self.wtime, self.winc),
            Color::Black => (self.btime, self.binc),
        };
        Some(Duration::from_millis((time / 30 + inc / 2).max(100)))
    }
}

/// Per-request bookkeeping: node counter, selective depth, deadline and
/// the stop latch. Nodes only ever increase and a tripped stop stays
/// tripped for the rest of the request.
pub struct SearchInfo {
    pub nodes: u64,
    pub depth: i32,
    pub seldepth: i32,
    start: Instant,
    time_limit: Option<Duration>,
    stop: Arc<AtomicBool>,
    stopped: bool,
}

impl SearchInfo {
    pub fn new(stop: Arc<AtomicBool>, time_limit: Option<Duration>) -> Self {
        Self {
            nodes: 0,
            depth: 0,
            seldepth: 0,
            start: Instant::now(),
            time_limit,
            stop,
            stopped: false,
        }
    }

    pub fn should_stop(&mut self) -> bool {
        if self.stopped {
            return true;
        }
        if self.stop.load(AtomicOrdering::Relaxed) {
            self.stopped = true;
            return true;
        }
        if let Some(limit) = self.time_limit {
            if self.start.elapsed() >= limit {
                self.stopped = true;
                return true;
            }
        }
        false
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Bounded principal-variation line.
#[derive(Clone, Copy)]
pub struct PvLine {
    moves: [ChessMove; MAX_DEPTH],
    len: usize,
}

impl Default for PvLine {
    fn default() -> Self {
        Self::new()
    }
}

impl PvLine {
    pub fn new() -> Self {
        Self {
            moves: [ChessMove::default(); MAX_DEPTH],
            len: 0,
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn push(&mut self, mv: ChessMove) {
        if self.len < MAX_DEPTH {
            self.moves[self.len] = mv;
            self.len += 1;
        }
    }

    /// Rebuilds this line as `mv` followed by `child`.
    pub fn load(&mut self, mv: ChessMove, child: &PvLine) {
        self.clear();
        self.push(mv);
        for &m in child.iter() {
            self.push(m);
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChessMove> {
        self.moves[..self.len].iter()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub struct SearchResult {
    pub best_move: Option<ChessMove>,
    pub score: i32,
    pub nodes: u64,
    pub pv: PvLine,
}

struct Undo {
    board: Board,
    halfmove_clock: u32,
}

/// Single-threaded searcher over one position. Borrows the persistent
/// transposition table and ordering tables for the duration of a request.
pub struct Worker<'a> {
    board: Board,
    halfmove_clock: u32,
    game_history: &'a [u64],
    path_history: Vec<u64>,
    pub tt: &'a mut TranspositionTable,
    pub tables: &'a mut OrderingTables,
    pub info: &'a mut SearchInfo,
}

impl<'a> Worker<'a> {
    pub fn new(
        board: Board,
        halfmove_clock: u32,
        game_history: &'a [u64],
        tt: &'a mut TranspositionTable,
        tables: &'a mut OrderingTables,
        info: &'a mut SearchInfo,
    ) -> Self {
        Self {
            board,
            halfmove_clock,
            game_history,
            path_history: Vec::with_capacity(MAX_PLY),
            tt,
            tables,
            info,
        }
    }

    /// Root PVS: full window on the first move, zero window afterwards
    /// with a full re-search on fail-high. Root moves are ordered without
    /// a hash move and every improvement is committed to the table.
    pub fn search_root(&mut self, depth: i32) -> SearchResult {
        let mut result = SearchResult {
            best_move: None,
            score: -MATE_VALUE,
            nodes: 0,
            pv: PvLine::new(),
        };

        let root_hash = self.board.get_hash();
        let mut root_moves: Vec<ChessMove> = MoveGen::new_legal(&self.board).collect();
        if root_moves.is_empty() {
            result.score = if *self.board.checkers() != EMPTY {
                -MATE_VALUE
            } else {
                0
            };
            return result;
        }

        self.tables.order_moves(&self.board, &mut root_moves, None, 0);

        let mut alpha = -MATE_VALUE;
        let beta = MATE_VALUE;
        let mut pv_found = false;

        for &mv in root_moves.iter() {
            if self.info.should_stop() {
                break;
            }

            let undo = self.make_move(mv);
            let mut child_pv = PvLine::new();
            let mut score;

            if !pv_found {
                score = -self.search(depth - 1, 1, -beta, -alpha, &mut child_pv, true);
            } else {
                score = -self.search(depth - 1, 1, -alpha - 1, -alpha, &mut child_pv, true);
                if score > alpha && score < beta {
                    child_pv.clear();
                    score = -self.search(depth - 1, 1, -beta, -alpha, &mut child_pv, true);
                }
            }
            self.unmake_move(undo);

            if self.info.should_stop() {
                break;
            }

            if score > alpha {
                alpha = score;
                result.best_move = Some(mv);
                result.score = score;
                result.pv.load(mv, &child_pv);
                pv_found = true;
                self.tt
                    .store(root_hash, depth, score, TtFlag::Exact, Some(mv), 0);
            }
        }

        result.nodes = self.info.nodes;
        result
    }

    /// Interior negamax. Returns a score from the side to move's
    /// perspective; aborted subtrees return 0 and are discarded upstream.
    pub fn search(
        &mut self,
        depth: i32,
        ply: i32,
        mut alpha: i32,
        mut beta: i32,
        pv: &mut PvLine,
        null_allowed: bool,
    ) -> i32 {
        pv.clear();

        if self.info.should_stop() {
            return 0;
        }
        self.info.nodes += 1;
        if ply > self.info.seldepth {
            self.info.seldepth = ply;
        }

        // Mate distance pruning.
        alpha = alpha.max(-MATE_VALUE + ply);
        beta = beta.min(MATE_VALUE - ply - 1);
        if alpha >= beta {
            return alpha;
        }

        if ply > 0 && (self.is_repetition() || self.halfmove_clock >= 100) {
            return 0;
        }

        let in_check = *self.board.checkers() != EMPTY;
        let pv_node = beta - alpha > 1;

        if depth <= 0 {
            return self.quiescence(ply, alpha, beta);
        }

        if ply >= MAX_PLY as i32 {
            return evaluate(&self.board);
        }

        let hash = self.board.get_hash();
        let mut hash_move = None;
        if let Some(entry) = self.tt.probe(hash) {
            hash_move = entry.best_move();

            if entry.depth as i32 >= depth && !pv_node {
                // Mate scores live in the table in distance-from-root
                // form; shift them back to this node's frame.
                let mut tt_score = entry.score as i32;
                if tt_score > MATE_IN_MAX_PLY {
                    tt_score -= ply;
                } else if tt_score < -MATE_IN_MAX_PLY {
                    tt_score += ply;
                }

                match entry.flag {
                    TtFlag::Exact => return tt_score,
                    TtFlag::Lower if tt_score >= beta => return tt_score,
                    TtFlag::Upper if tt_score <= alpha => return tt_score,
                    _ => {}
                }
            }
        }

        // Null-move pruning: hand the opponent a free move; if the
        // zero-window reply still fails high the node is pruned.
        if null_allowed && !pv_node && !in_check && depth >= 3 && self.has_non_pawn_material() {
            if let Some(null_board) = self.board.null_move() {
                let reduction = 3 + depth / 6;
                let undo = self.make_null(null_board);
                let mut scratch = PvLine::new();
                let null_score = -self.search(
                    depth - reduction - 1,
                    ply + 1,
                    -beta,
                    -beta + 1,
                    &mut scratch,
                    false,
                );
                self.unmake_move(undo);

                if null_score >= beta {
                    return null_score;
                }
            }
        }

        let mut move_list: Vec<ChessMove> = MoveGen::new_legal(&self.board).collect();
        if move_list.is_empty() {
            return if in_check { -MATE_VALUE + ply } else { 0 };
        }

        self.tables
            .order_moves(&self.board, &mut move_list, hash_move, ply as usize);

        let mut best_score = -MATE_VALUE;
        let mut best_move = None;
        let mut flag = TtFlag::Upper;
        let mut legal_move_found = false;

        for (i, &mv) in move_list.iter().enumerate() {
            if self.info.should_stop() {
                break;
            }

            let is_cap = moves::is_capture(&self.board, mv);
            let is_normal = moves::is_normal(&self.board, mv);
            let mover = self.board.side_to_move();

            let undo = self.make_move(mv);
            legal_move_found = true;
            self.tt.prefetch(self.board.get_hash());

            let gives_check = *self.board.checkers() != EMPTY;
            let extension = i32::from(gives_check || mv.get_promotion().is_some());
            let new_depth = depth - 1 + extension;

            let mut child_pv = PvLine::new();
            let score;

            if i >= 4 && depth >= 3 && !in_check && !gives_check && is_normal && !is_cap {
                // Late move reduction for quiet moves sorted far down the
                // list; re-search at full depth on fail-high.
                let reduction = if pv_node {
                    (depth / 6 + i as i32 / 8 - 1).max(0)
                } else {
                    (depth / 4 + i as i32 / 6).max(0)
                };

                let mut s = -self.search(
                    new_depth - reduction,
                    ply + 1,
                    -alpha - 1,
                    -alpha,
                    &mut child_pv,
                    true,
                );
                if s > alpha {
                    s = -self.search(new_depth, ply + 1, -alpha - 1, -alpha, &mut child_pv, true);
                }
                score = s;
            } else if i == 0 || pv_node {
                score = -self.search(new_depth, ply + 1, -beta, -alpha, &mut child_pv, true);
            } else {
                let mut s = -self.search(new_depth, ply + 1, -alpha - 1, -alpha, &mut child_pv, true);
                if s > alpha && s < beta {
                    child_pv.clear();
                    s = -self.search(new_depth, ply + 1, -beta, -alpha, &mut child_pv, true);
                }
                score = s;
            }

            self.unmake_move(undo);

            if self.info.should_stop() {
                break;
            }

            if score > best_score {
                best_score = score;
                best_move = Some(mv);

                if score > alpha {
                    alpha = score;
                    flag = TtFlag::Exact;
                    pv.load(mv, &child_pv);

                    if score >= beta {
                        flag = TtFlag::Lower;
                        if !is_cap {
                            self.tables.update_history(mv, mover, depth);
                            self.tables.update_killers(mv, ply as usize);
                        }
                        break;
                    }
                }
            }
        }

        // Unreachable on correct input since the empty move list was
        // handled above; kept as a defensive check.
        if !legal_move_found {
            return if in_check { -MATE_VALUE + ply } else { 0 };
        }

        let mut store_score = best_score;
        if store_score > MATE_IN_MAX_PLY {
            store_score += ply;
        } else if store_score < -MATE_IN_MAX_PLY {
            store_score -= ply;
        }
        self.tt.store(hash, depth, store_score, flag, best_move, 0);

        best_score
    }

    /// Capture-only quiescence with stand-pat and delta pruning.
    pub fn quiescence(&mut self, ply: i32, mut alpha: i32, beta: i32) -> i32 {
        if self.info.should_stop() {
            return 0;
        }
        self.info.nodes += 1;
        if ply > self.info.seldepth {
            self.info.seldepth = ply;
        }

        let stand_pat = evaluate(&self.board);
        if stand_pat >= beta {
            return beta;
        }
        if stand_pat > alpha {
            alpha = stand_pat;
        }

        let mut captures = self.generate_captures();
        self.tables
            .order_moves(&self.board, &mut captures, None, ply as usize);

        let in_check = *self.board.checkers() != EMPTY;

        for &mv in captures.iter() {
            if self.info.should_stop() {
                break;
            }

            // Delta pruning: skip captures that cannot lift the score
            // back to alpha even with a margin.
            if !in_check {
                let gain = moves::captured_piece(&self.board, mv)
                    .map(piece_value)
                    .unwrap_or(0);
                if stand_pat + gain + DELTA_MARGIN < alpha {
                    continue;
                }
            }

            let undo = self.make_move(mv);
            let score = -self.quiescence(ply + 1, -beta, -alpha);
            self.unmake_move(undo);

            if score >= beta {
                return beta;
            }
            if score > alpha {
                alpha = score;
            }
        }

        alpha
    }

    fn make_move(&mut self, mv: ChessMove) -> Undo {
        let undo = Undo {
            board: self.board,
            halfmove_clock: self.halfmove_clock,
        };
        let resets_clock = moves::is_capture(&self.board, mv)
            || self.board.piece_on(mv.get_source()) == Some(Piece::Pawn);
        self.path_history.push(self.board.get_hash());
        self.board = self.board.make_move_new(mv);
        self.halfmove_clock = if resets_clock {
            0
        } else {
            self.halfmove_clock + 1
        };
        undo
    }

    fn make_null(&mut self, null_board: Board) -> Undo {
        let undo = Undo {
            board: self.board,
            halfmove_clock: self.halfmove_clock,
        };
        self.path_history.push(self.board.get_hash());
        self.board = null_board;
        undo
    }

    fn unmake_move(&mut self, undo: Undo) {
        self.path_history.pop();
        self.board = undo.board;
        self.halfmove_clock = undo.halfmove_clock;
    }

    /// Twofold repetition along the current search path, or a third
    /// occurrence against the game history.
    fn is_repetition(&self) -> bool {
        let hash = self.board.get_hash();
        if self.path_history.contains(&hash) {
            return true;
        }
        self.game_history.iter().filter(|&&h| h == hash).count() >= 2
    }

    fn has_non_pawn_material(&self) -> bool {
        let us = *self.board.color_combined(self.board.side_to_move());
        let pieces = *self.board.pieces(Piece::Knight)
            | *self.board.pieces(Piece::Bishop)
            | *self.board.pieces(Piece::Rook)
            | *self.board.pieces(Piece::Queen);
        us & pieces != EMPTY
    }

    /// Legal captures, including en passant.
    fn generate_captures(&self) -> Vec<ChessMove> {
        let mut mask = *self.board.color_combined(!self.board.side_to_move());
        if let Some(target) = moves::en_passant_target(&self.board) {
            mask = mask | chess::BitBoard::from_square(target);
        }
        let mut gen = MoveGen::new_legal(&self.board);
        gen.set_iterator_mask(mask);
        gen.collect()
    }
}

/// Owns the persistent search state and runs requests on a worker
/// thread so `stop` stays responsive on the UCI thread.
pub struct Searcher {
    pub tt: Arc<Mutex<TranspositionTable>>,
    pub tables: Arc<Mutex<OrderingTables>>,
    pub book: Arc<RwLock<OpeningBook>>,
    stop: Arc<AtomicBool>,
    searching: Arc<AtomicBool>,
}

impl Default for Searcher {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_MB)
    }
}

impl Searcher {
    pub fn new(hash_mb: usize) -> Self {
        Self {
            tt: Arc::new(Mutex::new(TranspositionTable::new(hash_mb))),
            tables: Arc::new(Mutex::new(OrderingTables::new())),
            book: Arc::new(RwLock::new(OpeningBook::new())),
            stop: Arc::new(AtomicBool::new(false)),
            searching: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_searching(&self) -> bool {
        self.searching.load(AtomicOrdering::SeqCst)
    }

    /// Starts a search for the given snapshot and streams `info` lines
    /// and the final `bestmove` through `tx`.
    pub fn search_async(
        &self,
        board: Board,
        game_history: Vec<u64>,
        halfmove_clock: u32,
        limits: SearchLimits,
        tx: Sender<String>,
    ) {
        let tt = Arc::clone(&self.tt);
        let tables = Arc::clone(&self.tables);
        let book = Arc::clone(&self.book);
        let stop = Arc::clone(&self.stop);
        let searching = Arc::clone(&self.searching);

        std::thread::spawn(move || {
            searching.store(true, AtomicOrdering::SeqCst);
            stop.store(false, AtomicOrdering::SeqCst);

            if let Some(book_move) = book.read().get_move(&board) {
                let _ = tx.send(format!("bestmove {}", moves::to_uci(Some(book_move))));
                searching.store(false, AtomicOrdering::SeqCst);
                return;
            }

            let time_limit = limits.time_budget(board.side_to_move());
            let mut info = SearchInfo::new(stop, time_limit);

            let mut tt = tt.lock();
            let mut tables = tables.lock();
            tt.new_search();

            let max_depth = if limits.depth > 0 {
                limits.depth.min(MAX_DEPTH as i32)
            } else {
                MAX_DEPTH as i32
            };

            let mut best_move = None;
            let mut worker = Worker::new(
                board,
                halfmove_clock,
                &game_history,
                &mut tt,
                &mut tables,
                &mut info,
            );

            for depth in 1..=max_depth {
                let result = worker.search_root(depth);
                if worker.info.should_stop() {
                    break;
                }

                best_move = result.best_move;
                worker.info.depth = depth;
                let _ = tx.send(format_info(worker.info, &result));

                if result.score.abs() > MATE_IN_MAX_PLY {
                    break;
                }
            }

            let _ = tx.send(format!("bestmove {}", moves::to_uci(best_move)));
            searching.store(false, AtomicOrdering::SeqCst);
        });
    }
}

fn format_info(info: &SearchInfo, result: &SearchResult) -> String {
    let elapsed = info.elapsed_ms();
    let nps = info.nodes * 1000 / (elapsed + 1);
    let mut line = format!(
        "info depth {} seldepth {} score {} nodes {} nps {} time {}",
        info.depth,
        info.seldepth,
        format_score(result.score),
        info.nodes,
        nps,
        elapsed,
    );
    if !result.pv.is_empty() {
        line.push_str(" pv");
        for &mv in result.pv.iter() {
            line.push(' ');
            line.push_str(&moves::to_uci(Some(mv)));
        }
    }
    line
}

/// Centipawns, or `mate k` in moves for forced mates.
fn format_score(score: i32) -> String {
    if score.abs() > MATE_IN_MAX_PLY {
        let plies = MATE_VALUE - score.abs();
        let mate_in = (plies + 1) / 2;
        if score > 0 {
            format!("mate {mate_in}")
        } else {
            format!("mate -{mate_in}")
        }
    } else {
        format!("cp {score}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_format_as_cp_or_mate() {
        assert_eq!(format_score(42), "cp 42");
        assert_eq!(format_score(-310), "cp -310");
        assert_eq!(format_score(MATE_VALUE - 1), "mate 1");
        assert_eq!(format_score(MATE_VALUE - 4), "mate 2");
        assert_eq!(format_score(-(MATE_VALUE - 2)), "mate -1");
    }

    #[test]
    fn movetime_beats_clock_allocation() {
        let limits = SearchLimits {
            movetime: 250,
            wtime: 60_000,
            ..Default::default()
        };
        assert_eq!(
            limits.time_budget(Color::White),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn clock_allocation_is_clamped_to_100ms() {
        let limits = SearchLimits {
            wtime: 900,
            btime: 900,
            ..Default::default()
        };
        assert_eq!(
            limits.time_budget(Color::White),
            Some(Duration::from_millis(100))
        );

        let healthy = SearchLimits {
            wtime: 60_000,
            winc: 2_000,
            btime: 60_000,
            ..Default::default()
        };
        assert_eq!(
            healthy.time_budget(Color::White),
            Some(Duration::from_millis(3_000))
        );
    }

    #[test]
    fn infinite_searches_have_no_deadline() {
        let limits = SearchLimits {
            infinite: true,
            wtime: 1000,
            ..Default::default()
        };
        assert_eq!(limits.time_budget(Color::White), None);
    }
}
