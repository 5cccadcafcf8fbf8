//! Generator consistency over a corpus of played-out positions.

use rand::prelude::*;

use crate::position::movegen::{generate, legal_moves, GenType};
use crate::position::{MoveList, Position};

fn corpus() -> Vec<Position> {
    let mut out = vec![Position::startpos()];
    for seed in 0..12u64 {
        let mut pos = Position::startpos();
        let mut rng = StdRng::seed_from_u64(seed * 71 + 5);
        for _ in 0..(10 + seed * 7) {
            let moves = legal_moves(&pos);
            if moves.is_empty() {
                break;
            }
            let mv = moves.get(rng.gen_range(0..moves.len())).unwrap();
            pos.do_move_simple(mv);
        }
        out.push(pos);
    }
    out
}

#[test]
fn test_legal_is_subset_of_legal_all() {
    for pos in corpus() {
        let mut legal = MoveList::new();
        let mut all = MoveList::new();
        generate(GenType::Legal, &pos, &mut legal);
        generate(GenType::LegalAll, &pos, &mut all);
        for mv in legal.iter() {
            assert!(all.contains(mv), "{} missing from LegalAll", mv);
        }
    }
}

#[test]
fn test_legal_moves_survive_filters() {
    for pos in corpus() {
        let pinned = pos.pinned_bb();
        for mv in legal_moves(&pos).iter() {
            assert!(pos.move_is_pseudo_legal(mv, true), "{}", mv);
            assert!(pos.pseudo_legal_move_is_legal(mv, pinned, false, false), "{}", mv);
        }
    }
}

#[test]
fn test_staged_generators_cover_non_evasions() {
    // Outside check, captures + quiets + drops must produce exactly the
    // pseudo-legal set, with only promotion-policy differences; compare
    // through the legality filter to the Legal list.
    for pos in corpus() {
        if pos.in_check() {
            continue;
        }
        let pinned = pos.pinned_bb();
        let mut staged = MoveList::new();
        generate(GenType::CapturePlusPro, &pos, &mut staged);
        generate(GenType::NonCaptureMinusPro, &pos, &mut staged);
        generate(GenType::Drop, &pos, &mut staged);

        let legal = legal_moves(&pos);
        for mv in staged.iter() {
            if pos.pseudo_legal_move_is_legal(mv, pinned, false, false) {
                assert!(
                    legal.contains(mv),
                    "staged move {} not in Legal at {}",
                    mv,
                    pos.to_sfen()
                );
            }
        }
    }
}

#[test]
fn test_evasions_all_resolve_check() {
    let mut found_check_position = false;
    for mut pos in corpus() {
        if !pos.in_check() {
            continue;
        }
        found_check_position = true;
        let list = legal_moves(&pos);
        for i in 0..list.len() {
            let mv = list.get(i).unwrap();
            pos.do_move_simple(mv);
            let us = pos.turn().opposite();
            assert!(
                pos.attackers_to_color(pos.turn(), pos.king_square(us)).is_empty(),
                "{} fails to resolve check",
                mv
            );
            pos.undo_move(mv);
        }
    }
    // The corpus is random; in-check members are likely but not certain.
    let _ = found_check_position;
}

#[test]
fn test_recaptures_land_on_square() {
    for pos in corpus() {
        let last = pos.last_move();
        if last.is_none() || !last.is_capture() {
            continue;
        }
        let mut list = MoveList::new();
        crate::position::movegen::generate_recaptures(&pos, last.to(), &mut list);
        for mv in list.iter() {
            assert_eq!(mv.to(), last.to());
            assert!(mv.is_capture());
        }
    }
}
