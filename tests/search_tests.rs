use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use chess::{Board, ChessMove, MoveGen};
use stonewall::defs::{MATE_VALUE, MAX_DEPTH};
use stonewall::eval::evaluate;
use stonewall::moves;
use stonewall::search::ordering::OrderingTables;
use stonewall::search::tt::{TranspositionTable, TtFlag};
use stonewall::search::{PvLine, SearchInfo, SearchLimits, Searcher, Worker};

struct Harness {
    tt: TranspositionTable,
    tables: OrderingTables,
    info: SearchInfo,
    board: Board,
    halfmove_clock: u32,
}

impl Harness {
    fn new(fen: &str) -> Self {
        Self {
            tt: TranspositionTable::new(16),
            tables: OrderingTables::new(),
            info: SearchInfo::new(Arc::new(AtomicBool::new(false)), None),
            board: Board::from_str(fen).expect("valid test FEN"),
            halfmove_clock: 0,
        }
    }

    fn worker(&mut self) -> Worker<'_> {
        Worker::new(
            self.board,
            self.halfmove_clock,
            &[],
            &mut self.tt,
            &mut self.tables,
            &mut self.info,
        )
    }

    /// Iterative deepening up to `depth`, returning the last completed
    /// result like the driver does.
    fn deepen(&mut self, depth: i32) -> (Option<ChessMove>, i32, Vec<ChessMove>) {
        let mut worker = self.worker();
        let mut best = (None, 0, Vec::new());
        for d in 1..=depth {
            let result = worker.search_root(d);
            best = (
                result.best_move,
                result.score,
                result.pv.iter().copied().collect(),
            );
            if result.score.abs() > MATE_VALUE - MAX_DEPTH as i32 {
                break;
            }
        }
        best
    }
}

const STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[test]
fn startpos_depth_one_gives_a_quiet_legal_move() {
    let mut harness = Harness::new(STARTPOS);
    let (best, score, _) = harness.deepen(1);

    let best = best.expect("start position has moves");
    let legal: Vec<ChessMove> = MoveGen::new_legal(&harness.board).collect();
    assert_eq!(legal.len(), 20);
    assert!(legal.contains(&best));
    assert!(score.abs() < 100, "startpos score {score}");
}

#[test]
fn finds_mate_in_one() {
    let mut harness = Harness::new("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1");
    let (best, score, _) = harness.deepen(3);

    assert_eq!(moves::to_uci(best), "a1a8");
    assert_eq!(score, MATE_VALUE - 1);
}

#[test]
fn stalemate_returns_no_move_and_zero() {
    let mut harness = Harness::new("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
    let mut worker = harness.worker();
    let result = worker.search_root(3);

    assert!(result.best_move.is_none());
    assert_eq!(result.score, 0);
}

#[test]
fn checkmated_root_reports_mate_against_us() {
    let mut harness = Harness::new("R5k1/5ppp/8/8/8/8/5PPP/6K1 b - - 0 1");
    let mut worker = harness.worker();
    let result = worker.search_root(3);

    assert!(result.best_move.is_none());
    assert_eq!(result.score, -MATE_VALUE);
}

#[test]
fn fifty_move_rule_draws_at_interior_nodes() {
    let mut harness = Harness::new("8/5pk1/6p1/8/3N4/8/5PPP/6K1 w - - 0 1");
    harness.halfmove_clock = 100;
    let mut worker = harness.worker();
    let mut pv = PvLine::new();
    let score = worker.search(3, 1, -MATE_VALUE, MATE_VALUE, &mut pv, true);
    assert_eq!(score, 0);
}

#[test]
fn quiescence_collects_a_hanging_queen() {
    let fen = "k7/8/8/3q4/4P3/8/8/K7 w - - 0 1";
    let mut harness = Harness::new(fen);
    let stand_pat = evaluate(&harness.board);
    let mut worker = harness.worker();
    let score = worker.quiescence(0, -MATE_VALUE, MATE_VALUE);

    // Capturing the queen must be worth roughly her value over the
    // static score.
    assert!(
        score >= stand_pat + 700,
        "qsearch {score} vs stand pat {stand_pat}"
    );
}

#[test]
fn tt_exact_entry_short_circuits_zero_window_nodes() {
    let mut harness = Harness::new(STARTPOS);
    let hash = harness.board.get_hash();
    harness.tt.store(hash, 5, 123, TtFlag::Exact, None, 0);

    let mut worker = harness.worker();
    let mut pv = PvLine::new();
    let score = worker.search(4, 1, 122, 123, &mut pv, false);
    assert_eq!(score, 123);
}

#[test]
fn pv_moves_are_legal_in_sequence() {
    let mut harness =
        Harness::new("r2qkbnr/ppp2ppp/2np4/4p3/2B1P1b1/2N2N2/PPPP1PPP/R1BQK2R w KQkq - 4 5");
    let (best, _, pv) = harness.deepen(4);

    assert!(!pv.is_empty());
    assert_eq!(best, Some(pv[0]));
    let mut board = harness.board;
    for mv in pv {
        assert!(board.legal(mv), "pv move {} illegal", moves::to_uci(Some(mv)));
        board = board.make_move_new(mv);
    }
}

#[test]
fn repetition_against_game_history_is_a_draw() {
    // The position after 1.Nf3 Ng8f6 2.Ng1 Nf6g8 repeats the start
    // position; seed the game history with it twice.
    let board = Board::default();
    let mut tt = TranspositionTable::new(4);
    let mut tables = OrderingTables::new();
    let mut info = SearchInfo::new(Arc::new(AtomicBool::new(false)), None);
    let history = vec![board.get_hash(), board.get_hash()];
    let mut worker = Worker::new(board, 0, &history, &mut tt, &mut tables, &mut info);

    let mut pv = PvLine::new();
    let score = worker.search(2, 1, -MATE_VALUE, MATE_VALUE, &mut pv, true);
    assert_eq!(score, 0);
}

#[test]
fn driver_respects_a_50ms_budget() {
    let searcher = Searcher::new(8);
    let board = Board::default();
    let limits = SearchLimits {
        movetime: 50,
        ..Default::default()
    };

    let (tx, rx) = mpsc::channel();
    searcher.search_async(board, vec![board.get_hash()], 0, limits, tx);

    let mut saw_depth_one = false;
    let mut best = None;
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(line) if line.starts_with("info depth 1 ") => saw_depth_one = true,
            Ok(line) if line.starts_with("bestmove ") => {
                best = Some(line["bestmove ".len()..].to_string());
                break;
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }

    assert!(saw_depth_one, "depth 1 must complete within the budget");
    let best = best.expect("a bestmove must be emitted");
    assert!(moves::from_uci(&board, &best).is_some(), "bestmove {best}");
}

#[test]
fn stop_flag_aborts_the_search() {
    let stop = Arc::new(AtomicBool::new(true));
    let mut tt = TranspositionTable::new(4);
    let mut tables = OrderingTables::new();
    let mut info = SearchInfo::new(stop, None);
    let board = Board::default();
    let mut worker = Worker::new(board, 0, &[], &mut tt, &mut tables, &mut info);

    let mut pv = PvLine::new();
    let score = worker.search(6, 1, -MATE_VALUE, MATE_VALUE, &mut pv, true);
    assert_eq!(score, 0);

    let result = worker.search_root(6);
    assert!(result.best_move.is_none());
}
