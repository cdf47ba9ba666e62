use chess::{ChessMove, Piece, Square};
use stonewall::search::tt::{TranspositionTable, TtFlag};

#[test]
fn store_and_probe_round_trip() {
    let mut tt = TranspositionTable::new(1);
    let mv = ChessMove::new(Square::E2, Square::E4, None);

    tt.store(0xDEADBEEF, 5, 42, TtFlag::Exact, Some(mv), 17);
    let entry = tt.probe(0xDEADBEEF).expect("entry should be found");
    assert_eq!(entry.depth, 5);
    assert_eq!(entry.score, 42);
    assert_eq!(entry.eval, 17);
    assert_eq!(entry.flag, TtFlag::Exact);
    assert_eq!(entry.best_move(), Some(mv));

    assert!(tt.probe(0xDEADBEE0).is_none());
}

#[test]
fn probe_checks_the_verification_key() {
    let mut tt = TranspositionTable::new(1);
    let hash = 0x42;
    tt.store(hash, 5, 9, TtFlag::Exact, None, 0);

    // Same slot index, different high hash bits: no hit.
    assert!(tt.probe(hash | (1 << 40)).is_none());
    assert!(tt.probe(hash).is_some());
}

#[test]
fn all_flags_and_signed_scores_survive() {
    let mut tt = TranspositionTable::new(1);
    for (i, flag) in [TtFlag::Exact, TtFlag::Lower, TtFlag::Upper]
        .into_iter()
        .enumerate()
    {
        let hash = 0xFEED_0000 + i as u64;
        tt.store(hash, 7, -29_999, flag, None, -150);
        let entry = tt.probe(hash).expect("entry should be found");
        assert_eq!(entry.flag, flag);
        assert_eq!(entry.score, -29_999);
        assert_eq!(entry.eval, -150);
        assert_eq!(entry.best_move(), None);
    }
}

#[test]
fn promotion_moves_survive_packing() {
    let mut tt = TranspositionTable::new(1);
    let promo = ChessMove::new(Square::B7, Square::B8, Some(Piece::Knight));
    tt.store(0xABCD, 3, 250, TtFlag::Lower, Some(promo), 0);
    assert_eq!(tt.probe(0xABCD).unwrap().best_move(), Some(promo));
}

#[test]
fn clear_empties_the_table() {
    let mut tt = TranspositionTable::new(1);
    tt.store(0xABC, 2, 10, TtFlag::Lower, None, 15);
    assert!(tt.probe(0xABC).is_some());
    tt.clear();
    assert!(tt.probe(0xABC).is_none());
}

#[test]
fn same_age_keeps_the_deeper_entry() {
    let mut tt = TranspositionTable::new(1);
    tt.new_search();

    tt.store(0x1234, 8, 100, TtFlag::Exact, None, 0);
    // A shallower same-age store for the same position is ignored.
    tt.store(0x1234, 3, 55, TtFlag::Upper, None, 0);
    let entry = tt.probe(0x1234).unwrap();
    assert_eq!(entry.depth, 8);
    assert_eq!(entry.score, 100);

    // An equal-depth store wins.
    tt.store(0x1234, 8, 77, TtFlag::Lower, None, 0);
    assert_eq!(tt.probe(0x1234).unwrap().score, 77);
}

#[test]
fn stale_entries_always_lose() {
    let mut tt = TranspositionTable::new(1);
    tt.new_search();
    tt.store(0x1234, 12, 100, TtFlag::Exact, None, 0);

    tt.new_search();
    tt.store(0x1234, 1, -5, TtFlag::Upper, None, 0);
    let entry = tt.probe(0x1234).unwrap();
    assert_eq!(entry.depth, 1);
    assert_eq!(entry.score, -5);
}

#[test]
fn a_different_position_evicts_the_incumbent() {
    let mut tt = TranspositionTable::new(1);
    let hash_a = 0x42;
    // Same slot index, different verification key.
    let hash_b = hash_a | (1 << 40);

    tt.store(hash_a, 10, 1, TtFlag::Exact, None, 0);
    tt.store(hash_b, 1, 2, TtFlag::Exact, None, 0);

    assert!(tt.probe(hash_a).is_none());
    assert_eq!(tt.probe(hash_b).unwrap().score, 2);
}

#[test]
fn hashfull_reports_sampled_occupancy() {
    let mut tt = TranspositionTable::new(1);
    assert_eq!(tt.hashfull(), 0);

    // Hashes 1..=500 land in the sampled prefix of the table.
    for hash in 1..=500u64 {
        tt.store(hash, 1, 0, TtFlag::Exact, None, 0);
    }
    assert_eq!(tt.hashfull(), 500);
}

#[test]
fn resize_clears_and_clamps() {
    let mut tt = TranspositionTable::new(1);
    tt.store(0x99, 4, 9, TtFlag::Exact, None, 0);
    tt.resize(2);
    assert!(tt.probe(0x99).is_none());

    // A zero request is clamped to one megabyte.
    tt.resize(0);
    assert!(tt.capacity() > 0);
    assert!(tt.capacity().is_power_of_two());
}
