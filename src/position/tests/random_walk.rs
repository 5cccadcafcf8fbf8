//! Property tests over random legal playouts.

use proptest::prelude::*;
use rand::prelude::*;
use rand::Rng;

use crate::eval::{compute_full_sum, evaluate, EvalHashTable, EvalSum, Evaluator};
use crate::position::movegen::legal_moves;
use crate::position::{CheckInfo, Move, Position};

/// A shared evaluator with a scattering of non-zero feature weights, so
/// the differential-update law is tested against real table reads. The
/// KPP diagonal stays zero; the partial-sum update relies on that.
static SPARSE_EVALUATOR: once_cell::sync::Lazy<Evaluator> = once_cell::sync::Lazy::new(|| {
    use crate::eval::FE_END;
    use crate::position::Square;
    let mut ev = Evaluator::zeroed();
    let mut rng = StdRng::seed_from_u64(9);
    for _ in 0..400 {
        let k = Square::from_index(rng.gen_range(0..81));
        let i = rng.gen_range(0..FE_END);
        let j = rng.gen_range(0..FE_END);
        if i != j {
            ev.set_kpp(k, i, j, (rng.gen_range(-50..50), rng.gen_range(-50..50)));
        }
        let bk = Square::from_index(rng.gen_range(0..81));
        let wk = Square::from_index(rng.gen_range(0..81));
        ev.set_kkp(bk, wk, i, (rng.gen_range(-500..500), rng.gen_range(-500..500)));
    }
    ev
});

fn random_playout(seed: u64, max_moves: usize) -> (Position, Vec<Move>) {
    let mut pos = Position::startpos();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut played = Vec::new();
    for _ in 0..max_moves {
        let moves = legal_moves(&pos);
        if moves.is_empty() {
            break;
        }
        let mv = moves.get(rng.gen_range(0..moves.len())).unwrap();
        pos.do_move_simple(mv);
        played.push(mv);
    }
    (pos, played)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// do_move then undo_move restores every observable field.
    #[test]
    fn prop_make_unmake_restores_state(seed in any::<u64>(), num_moves in 1usize..40) {
        let start = Position::startpos();
        let start_key = start.key();
        let start_sfen = start.to_sfen();

        let (mut pos, played) = random_playout(seed, num_moves);
        for mv in played.iter().rev() {
            pos.undo_move(*mv);
        }
        prop_assert_eq!(pos.key(), start_key);
        prop_assert_eq!(pos.to_sfen(), start_sfen);
        prop_assert_eq!(pos.material(), 0);
    }

    /// The incremental keys always match a from-scratch recomputation.
    #[test]
    fn prop_keys_consistent(seed in any::<u64>(), num_moves in 1usize..40) {
        let (pos, _) = random_playout(seed, num_moves);
        prop_assert_eq!(pos.board_key(), pos.compute_board_key());
        prop_assert_eq!(pos.hand_key(), pos.compute_hand_key());
        prop_assert_eq!(pos.material(), pos.compute_material());
    }

    /// move_gives_check answers exactly "is the mover's opponent in check
    /// after do_move".
    #[test]
    fn prop_gives_check_matches(seed in any::<u64>(), num_moves in 1usize..30) {
        let (mut pos, _) = random_playout(seed, num_moves);
        let moves = legal_moves(&pos);
        for i in 0..moves.len() {
            let mv = moves.get(i).unwrap();
            let ci = CheckInfo::new(&pos);
            let gives = pos.move_gives_check(mv, &ci);
            pos.do_move(mv, &ci, gives);
            prop_assert_eq!(pos.in_check(), gives);
            pos.undo_move(mv);
        }
    }

    /// SFEN round trip preserves the position.
    #[test]
    fn prop_sfen_round_trip(seed in any::<u64>(), num_moves in 1usize..60) {
        let (pos, _) = random_playout(seed, num_moves);
        let reparsed = Position::from_sfen(&pos.to_sfen()).unwrap();
        prop_assert_eq!(reparsed.key(), pos.key());
        prop_assert_eq!(reparsed.material(), pos.material());
        prop_assert_eq!(reparsed.to_sfen(), pos.to_sfen());
    }

    /// Differential evaluation equals full re-evaluation along any line
    /// (the king-move bailout falls back to full evaluation internally).
    #[test]
    fn prop_differential_eval_matches_full(seed in any::<u64>(), num_moves in 1usize..25) {
        let ev = &*SPARSE_EVALUATOR;
        let cache = EvalHashTable::new();
        let mut pos = Position::startpos();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut prev: Option<EvalSum> = None;

        for _ in 0..num_moves {
            let moves = legal_moves(&pos);
            if moves.is_empty() {
                break;
            }
            let mv = moves.get(rng.gen_range(0..moves.len())).unwrap();
            pos.do_move_simple(mv);
            let (_, sum) = evaluate(&mut pos, ev, &cache, prev);
            prop_assert_eq!(sum, compute_full_sum(&pos, ev));
            prev = Some(sum);
        }
    }

    /// Every legal move passes the pseudo-legality and pin filters it is
    /// supposed to have survived.
    #[test]
    fn prop_legal_moves_are_pseudo_legal(seed in any::<u64>(), num_moves in 1usize..40) {
        let (pos, _) = random_playout(seed, num_moves);
        let pinned = pos.pinned_bb();
        let moves = legal_moves(&pos);
        for i in 0..moves.len() {
            let mv = moves.get(i).unwrap();
            prop_assert!(pos.move_is_pseudo_legal(mv, true), "{}", mv);
            prop_assert!(
                pos.pseudo_legal_move_is_legal(mv, pinned, false, false),
                "{}",
                mv
            );
        }
    }
}
