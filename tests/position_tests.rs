//! Library-level position and table tests.

use shogi_engine::position::movegen::{self, GenType};
use shogi_engine::position::{Color, HandPiece, Move, MoveList, PieceType, Position, Repetition};
use shogi_engine::tt::{TranspositionTable, BOUND_LOWER};

#[test]
fn startpos_has_thirty_legal_moves() {
    let pos = Position::startpos();
    assert_eq!(movegen::legal_moves(&pos).len(), 30);
}

#[test]
fn opening_line_round_trips() {
    let mut pos = Position::startpos();
    let line = ["7g7f", "3c3d", "8h2b+", "3a2b", "B*4e"];
    let before = pos.to_sfen();
    let mut played = Vec::new();
    for tok in line {
        let mv = pos.move_from_usi(tok).unwrap();
        pos.do_move_simple(mv);
        played.push(mv);
    }
    // The exchange left White a bishop in hand; Black dropped its own back.
    assert_eq!(pos.hand(Color::White).num(HandPiece::Bishop), 1);
    assert_eq!(pos.hand(Color::Black).num(HandPiece::Bishop), 0);
    for mv in played.iter().rev() {
        pos.undo_move(*mv);
    }
    assert_eq!(pos.to_sfen(), before);
}

#[test]
fn fourfold_shuffle_classifies_as_draw() {
    let mut pos = Position::startpos();
    for _ in 0..4 {
        for tok in ["2h3h", "8b7b", "3h2h", "7b8b"] {
            let mv = pos.move_from_usi(tok).unwrap();
            pos.do_move_simple(mv);
        }
    }
    assert_eq!(pos.is_draw(i32::MAX), Repetition::Draw);
}

#[test]
fn pawn_drop_mate_is_not_pseudo_legal() {
    let pos = Position::from_sfen("8k/6G2/8G/9/9/9/9/9/4K4 b P 1").unwrap();
    let drop = Move::new_drop(PieceType::PAWN, "1b".parse().unwrap());
    assert!(!pos.move_is_pseudo_legal(drop, true));

    let mut all = MoveList::new();
    movegen::generate(GenType::LegalAll, &pos, &mut all);
    assert!(!all.contains(drop));
}

#[test]
fn legal_moves_resolve_their_own_checks() {
    let mut pos = Position::from_sfen("4k4/9/9/9/4r4/9/9/9/4K4 b - 1").unwrap();
    assert!(pos.in_check());
    let list = movegen::legal_moves(&pos);
    assert!(!list.is_empty());
    for i in 0..list.len() {
        let mv = list.get(i).unwrap();
        pos.do_move_simple(mv);
        assert!(!pos
            .attackers_to_color(pos.turn(), pos.king_square(pos.turn().opposite()))
            .is_any());
        pos.undo_move(mv);
    }
}

#[test]
fn tt_probe_after_save_round_trips() {
    let tt = TranspositionTable::new(4);
    let pos = Position::startpos();
    let key = pos.key();
    let mv = pos.move_from_usi("7g7f").unwrap();

    let (found, _, entry) = tt.probe(key);
    assert!(!found);
    entry.save(key, 33, BOUND_LOWER, 6, mv.to_u16(), 12, tt.generation());

    let (found, data, _) = tt.probe(key);
    assert!(found);
    assert_eq!(data.score, 33);
    assert_eq!(data.depth, 6);
    assert_eq!(data.bound, BOUND_LOWER);
    let rebuilt = pos.move16_to_move(data.move16);
    assert_eq!(rebuilt, mv);

    // A different key lands on some other slot or reports a miss.
    let (found2, _, _) = tt.probe(key ^ 0xffff_0000_0000_0000);
    assert!(!found2);
}

#[test]
fn mate_in_one_detector_agrees_with_search_definition() {
    let mut pos = Position::from_sfen("8k/6+R2/8G/9/9/9/9/9/4K4 b - 1").unwrap();
    let mv = pos.mate_move_in_1ply();
    assert!(!mv.is_none());
    pos.do_move_simple(mv);
    assert!(movegen::legal_moves(&pos).is_empty());
    assert!(pos.in_check());
}
