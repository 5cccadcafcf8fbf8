//! Staged pseudo-legal move generation.
//!
//! Each generator tag writes into a caller-provided `MoveList`. Promotion
//! policy is decided per tag: capture-flavoured tags elide the pointless
//! non-promotions, `NonEvasion` (the base of the legal generators) keeps
//! every choice the rules allow, and the evasion generator's `all` flag
//! adds the remaining under-promotions.

use crate::position::attack_tables as tables;
use crate::position::state::Position;
use crate::position::types::{
    can_promote, Bitboard, Color, HandPiece, Move, MoveList, PieceType, Rank, Square,
};

/// Generator tag. Final legality is `Legal`/`LegalAll`'s responsibility;
/// every other tag may emit king-into-check or pinned-piece moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenType {
    /// Captures (with forced/valuable promotions only).
    Capture,
    /// Quiet moves.
    NonCapture,
    /// Captures plus quiet pawn promotions.
    CapturePlusPro,
    /// Quiets minus quiet pawn promotions (the move picker's quiet stage).
    NonCaptureMinusPro,
    /// Drops onto empty squares.
    Drop,
    /// Check evasions; only sensible when in check.
    Evasion,
    /// Every pseudo-legal move; the union of the above.
    NonEvasion,
    /// Fully legal moves.
    Legal,
    /// Fully legal moves including under-promotions in evasions.
    LegalAll,
}

/// Generate moves of the given kind into `list`.
pub fn generate(gt: GenType, pos: &Position, list: &mut MoveList) {
    match gt {
        GenType::Capture
        | GenType::NonCapture
        | GenType::CapturePlusPro
        | GenType::NonCaptureMinusPro => generate_general(gt, pos, list),
        GenType::Drop => generate_drops(pos, list, pos.empty_squares()),
        GenType::Evasion => generate_evasions(pos, list, false),
        GenType::NonEvasion => generate_non_evasions(pos, list),
        GenType::Legal => generate_legal(pos, list, false),
        GenType::LegalAll => generate_legal(pos, list, true),
    }
}

/// Captures landing on one square, for the quiescence recapture stage.
pub fn generate_recaptures(pos: &Position, to: Square, list: &mut MoveList) {
    let us = pos.turn();
    let mut from_bb = pos.attackers_to_color(us, to);
    while from_bb.is_any() {
        let from = from_bb.pop();
        let pt = pos.piece_on(from).piece_type();
        let promote = pt.can_be_promoted()
            && (can_promote(us.is_black(), to.rank()) || can_promote(us.is_black(), from.rank()));
        push_move(pos, list, pt, from, to, promote);
    }
}

/// Convenience: the legal move list of a position.
#[must_use]
pub fn legal_moves(pos: &Position) -> MoveList {
    let mut list = MoveList::new();
    generate(GenType::Legal, pos, &mut list);
    list
}

#[inline]
fn push_move(
    pos: &Position,
    list: &mut MoveList,
    pt: PieceType,
    from: Square,
    to: Square,
    promote: bool,
) {
    list.push(Move::new(
        pt,
        from,
        to,
        promote,
        pos.piece_on(to).piece_type(),
    ));
}

/// The last rank a piece of `us` can stand on unpromoted, as a "to-rank is
/// past this" predicate. `depth` 1 covers pawns and lances, 2 knights.
#[inline]
fn past_back_rank(us: Color, rank: Rank, depth: u8) -> bool {
    if us.is_black() {
        rank.0 >= depth
    } else {
        rank.0 <= 8 - depth
    }
}

fn generate_general(gt: GenType, pos: &Position, list: &mut MoveList) {
    let us = pos.turn();
    let them = us.opposite();
    let zone = Bitboard::in_front_mask(us.is_black(), if us.is_black() { Rank(3) } else { Rank(5) });

    let target_pawn = match gt {
        GenType::Capture => pos.pieces_c(them),
        GenType::NonCapture => pos.empty_squares(),
        GenType::CapturePlusPro => pos.pieces_c(them) | pos.occupied().and_not(zone),
        GenType::NonCaptureMinusPro => pos.occupied().and_not(!zone),
        _ => unreachable!(),
    };
    let target_other = match gt {
        GenType::Capture | GenType::CapturePlusPro => pos.pieces_c(them),
        GenType::NonCapture | GenType::NonCaptureMinusPro => pos.empty_squares(),
        _ => unreachable!(),
    };

    generate_pawn_moves(gt, pos, list, target_pawn, false);
    generate_lance_moves(gt, pos, list, target_other, false);
    generate_knight_moves(pos, list, target_other);
    generate_silver_moves(pos, list, target_other);
    generate_slider_moves(gt, pos, list, PieceType::BISHOP, target_other, false);
    generate_slider_moves(gt, pos, list, PieceType::ROOK, target_other, false);
    generate_gold_like_moves(pos, list, target_other);
    generate_king_moves(pos, list, target_other);
}

fn generate_non_evasions(pos: &Position, list: &mut MoveList) {
    let us = pos.turn();
    let empty = pos.empty_squares();
    generate_drops(pos, list, empty);
    let target = empty | pos.pieces_c(us.opposite());
    generate_pawn_moves(GenType::NonEvasion, pos, list, target, false);
    generate_lance_moves(GenType::NonEvasion, pos, list, target, false);
    generate_knight_moves(pos, list, target);
    generate_silver_moves(pos, list, target);
    generate_slider_moves(GenType::NonEvasion, pos, list, PieceType::BISHOP, target, false);
    generate_slider_moves(GenType::NonEvasion, pos, list, PieceType::ROOK, target, false);
    generate_gold_like_moves(pos, list, target);
    generate_king_moves(pos, list, target);
}

fn generate_legal(pos: &Position, list: &mut MoveList, all: bool) {
    let pinned = pos.pinned_bb();
    if pos.in_check() {
        generate_evasions(pos, list, all);
    } else {
        generate_non_evasions(pos, list);
    }
    // Drop king self-captures and pinned-piece exposures.
    let mut i = 0;
    while i < list.len() {
        let mv = list.as_slice()[i].mv;
        if pos.pseudo_legal_move_is_legal(mv, pinned, false, false) {
            i += 1;
        } else {
            list.swap_remove(i);
        }
    }
}

/// Pawn pushes. In-zone pushes promote; the non-promotion stays available
/// in `NonEvasion` and `all` modes except onto the back rank.
fn generate_pawn_moves(
    gt: GenType,
    pos: &Position,
    list: &mut MoveList,
    target: Bitboard,
    all: bool,
) {
    let us = pos.turn();
    let pawns = pos.pieces_cp(us, PieceType::PAWN);
    let mut to_bb = (if us.is_black() {
        pawns.shift_up()
    } else {
        pawns.shift_down()
    }) & target;
    let back: i8 = if us.is_black() { 1 } else { -1 };

    if gt != GenType::NonCaptureMinusPro {
        let zone =
            Bitboard::in_front_mask(us.is_black(), if us.is_black() { Rank(3) } else { Rank(5) });
        let mut in_zone = to_bb & zone;
        to_bb = to_bb.and_not(zone);
        while in_zone.is_any() {
            let to = in_zone.pop();
            let from = to.add_unchecked(back);
            push_move(pos, list, PieceType::PAWN, from, to, true);
            if (gt == GenType::NonEvasion || all) && past_back_rank(us, to.rank(), 1) {
                push_move(pos, list, PieceType::PAWN, from, to, false);
            }
        }
    }
    while to_bb.is_any() {
        let to = to_bb.pop();
        let from = to.add_unchecked(back);
        push_move(pos, list, PieceType::PAWN, from, to, false);
    }
}

fn generate_lance_moves(
    gt: GenType,
    pos: &Position,
    list: &mut MoveList,
    target: Bitboard,
    all: bool,
) {
    let us = pos.turn();
    let mut from_bb = pos.pieces_cp(us, PieceType::LANCE);
    while from_bb.is_any() {
        let from = from_bb.pop();
        let mut to_bb = tables::lance_attack(us, from, pos.occupied()) & target;
        while to_bb.is_any() {
            let to = to_bb.pop();
            if can_promote(us.is_black(), to.rank()) {
                push_move(pos, list, PieceType::LANCE, from, to, true);
                if gt == GenType::NonEvasion || all {
                    if past_back_rank(us, to.rank(), 1) {
                        push_move(pos, list, PieceType::LANCE, from, to, false);
                    }
                } else if gt != GenType::NonCapture && gt != GenType::NonCaptureMinusPro {
                    // Keep the tactically meaningful third-rank
                    // non-promotion, skip the second-rank one.
                    if past_back_rank(us, to.rank(), 2) {
                        push_move(pos, list, PieceType::LANCE, from, to, false);
                    }
                }
            } else {
                push_move(pos, list, PieceType::LANCE, from, to, false);
            }
        }
    }
}

fn generate_knight_moves(pos: &Position, list: &mut MoveList, target: Bitboard) {
    let us = pos.turn();
    let mut from_bb = pos.pieces_cp(us, PieceType::KNIGHT);
    while from_bb.is_any() {
        let from = from_bb.pop();
        let mut to_bb = tables::knight_attack(us, from) & target;
        while to_bb.is_any() {
            let to = to_bb.pop();
            if can_promote(us.is_black(), to.rank()) {
                push_move(pos, list, PieceType::KNIGHT, from, to, true);
                if past_back_rank(us, to.rank(), 2) {
                    push_move(pos, list, PieceType::KNIGHT, from, to, false);
                }
            } else {
                push_move(pos, list, PieceType::KNIGHT, from, to, false);
            }
        }
    }
}

fn generate_silver_moves(pos: &Position, list: &mut MoveList, target: Bitboard) {
    let us = pos.turn();
    let mut from_bb = pos.pieces_cp(us, PieceType::SILVER);
    while from_bb.is_any() {
        let from = from_bb.pop();
        let from_zone = can_promote(us.is_black(), from.rank());
        let mut to_bb = tables::silver_attack(us, from) & target;
        while to_bb.is_any() {
            let to = to_bb.pop();
            if from_zone || can_promote(us.is_black(), to.rank()) {
                push_move(pos, list, PieceType::SILVER, from, to, true);
            }
            push_move(pos, list, PieceType::SILVER, from, to, false);
        }
    }
}

/// Bishop and rook: when a promotion is available only the promotion is
/// generated, except in `NonEvasion`/`all` modes which keep the
/// under-promotion too.
fn generate_slider_moves(
    gt: GenType,
    pos: &Position,
    list: &mut MoveList,
    pt: PieceType,
    target: Bitboard,
    all: bool,
) {
    let us = pos.turn();
    let mut from_bb = pos.pieces_cp(us, pt);
    while from_bb.is_any() {
        let from = from_bb.pop();
        let from_zone = can_promote(us.is_black(), from.rank());
        let mut to_bb = tables::attacks_from(pt, us, from, pos.occupied()) & target;
        while to_bb.is_any() {
            let to = to_bb.pop();
            if from_zone || can_promote(us.is_black(), to.rank()) {
                push_move(pos, list, pt, from, to, true);
                if gt == GenType::NonEvasion || all {
                    push_move(pos, list, pt, from, to, false);
                }
            } else {
                push_move(pos, list, pt, from, to, false);
            }
        }
    }
}

/// Golds, promoted minors, horses and dragons never promote; one scan over
/// the combined set.
fn generate_gold_like_moves(pos: &Position, list: &mut MoveList, target: Bitboard) {
    let us = pos.turn();
    let mut from_bb = (pos.golds()
        | pos.pieces2(PieceType::HORSE, PieceType::DRAGON))
        & pos.pieces_c(us);
    while from_bb.is_any() {
        let from = from_bb.pop();
        let pt = pos.piece_on(from).piece_type();
        let mut to_bb = tables::attacks_from(pt, us, from, pos.occupied()) & target;
        while to_bb.is_any() {
            let to = to_bb.pop();
            push_move(pos, list, pt, from, to, false);
        }
    }
}

fn generate_king_moves(pos: &Position, list: &mut MoveList, target: Bitboard) {
    let us = pos.turn();
    let from = pos.king_square(us);
    let mut to_bb = tables::king_attack(from) & target;
    while to_bb.is_any() {
        let to = to_bb.pop();
        push_move(pos, list, PieceType::KING, from, to, false);
    }
}

/// Drops of every held piece kind onto `target` squares, with the dead-rank
/// restrictions and both pawn-drop rules enforced here.
fn generate_drops(pos: &Position, list: &mut MoveList, target: Bitboard) {
    let us = pos.turn();
    let hand = pos.hand(us);

    if hand.exists(HandPiece::Pawn) != 0 {
        let back = if us.is_black() { Rank(0) } else { Rank(8) };
        let mut to_bb = target.and_not(Bitboard::rank_mask(back));

        // One pawn per file.
        for f in 0..9u8 {
            let file = crate::position::types::File(f);
            if !pos.no_pawns_on_file(us, file) {
                to_bb = to_bb.and_not(Bitboard::file_mask(file));
            }
        }

        // The square directly in front of the enemy king needs the
        // drop-mate test; a mating pawn drop is forbidden outright.
        let ksq = pos.king_square(us.opposite());
        let their_back = if us.is_black() { Rank(8) } else { Rank(0) };
        if ksq.rank() != their_back {
            let check_sq = ksq.add_unchecked(if us.is_black() { 1 } else { -1 });
            if to_bb.contains(check_sq) && pos.piece_on(check_sq).is_empty() {
                if !pos.is_pawn_drop_check_mate(us, check_sq) {
                    list.push(Move::new_drop(PieceType::PAWN, check_sq));
                }
                to_bb.toggle(check_sq);
            }
        }

        while to_bb.is_any() {
            list.push(Move::new_drop(PieceType::PAWN, to_bb.pop()));
        }
    }

    if !hand.exists_except_pawn() {
        return;
    }

    // Order kinds by how restricted their drop squares are.
    let mut kinds = [PieceType::OCCUPIED; 6];
    let mut n = 0;
    if hand.exists(HandPiece::Knight) != 0 {
        kinds[n] = PieceType::KNIGHT;
        n += 1;
    }
    let no_knight = n;
    if hand.exists(HandPiece::Lance) != 0 {
        kinds[n] = PieceType::LANCE;
        n += 1;
    }
    let no_knight_lance = n;
    for (hp, pt) in [
        (HandPiece::Silver, PieceType::SILVER),
        (HandPiece::Gold, PieceType::GOLD),
        (HandPiece::Bishop, PieceType::BISHOP),
        (HandPiece::Rook, PieceType::ROOK),
    ] {
        if hand.exists(hp) != 0 {
            kinds[n] = pt;
            n += 1;
        }
    }

    let rank1 = Bitboard::rank_mask(if us.is_black() { Rank(0) } else { Rank(8) });
    let rank2 = Bitboard::rank_mask(if us.is_black() { Rank(1) } else { Rank(7) });

    // Back rank: no lances or knights.
    let mut to_bb = target & rank1;
    while to_bb.is_any() {
        let to = to_bb.pop();
        for &pt in &kinds[no_knight_lance..n] {
            list.push(Move::new_drop(pt, to));
        }
    }
    // Second rank: no knights.
    let mut to_bb = target & rank2;
    while to_bb.is_any() {
        let to = to_bb.pop();
        for &pt in &kinds[no_knight..n] {
            list.push(Move::new_drop(pt, to));
        }
    }
    // Everywhere else: everything.
    let mut to_bb = target.and_not(rank1 | rank2);
    while to_bb.is_any() {
        let to = to_bb.pop();
        for &pt in &kinds[..n] {
            list.push(Move::new_drop(pt, to));
        }
    }
}

/// Squares the king may not step to because a checking slider rakes them;
/// ORed across checkers for double checks.
fn banned_king_squares(pos: &Position, check_sq: Square, ksq: Square) -> Bitboard {
    let pc = pos.piece_on(check_sq);
    let them = pc.color();
    match pc.piece_type() {
        PieceType::PAWN | PieceType::KNIGHT => Bitboard::EMPTY,
        PieceType::LANCE => tables::lance_attack_to_edge(them, check_sq),
        PieceType::SILVER => tables::silver_attack(them, check_sq),
        PieceType::GOLD
        | PieceType::PRO_PAWN
        | PieceType::PRO_LANCE
        | PieceType::PRO_KNIGHT
        | PieceType::PRO_SILVER => tables::gold_attack(them, check_sq),
        PieceType::BISHOP => tables::bishop_attack_to_edge(check_sq),
        PieceType::HORSE => tables::horse_attack_to_edge(check_sq),
        PieceType::ROOK => tables::rook_attack_to_edge(check_sq),
        PieceType::DRAGON => {
            if tables::square_relation(check_sq, ksq) & tables::direction::DIAG != 0 {
                // A diagonal dragon check may be blocked between the king's
                // flight squares, so the to-edge table over-bans.
                tables::dragon_attack(check_sq, pos.occupied())
            } else {
                tables::dragon_attack_to_edge(check_sq)
            }
        }
        _ => Bitboard::EMPTY,
    }
}

fn generate_evasions(pos: &Position, list: &mut MoveList, all: bool) {
    debug_assert!(pos.in_check());

    let us = pos.turn();
    let ksq = pos.king_square(us);
    let checkers = pos.checkers();

    let mut banned = Bitboard::EMPTY;
    let mut checkers_num = 0;
    let mut check_sq = Square::from_index(0);
    let mut bb = checkers;
    while bb.is_any() {
        check_sq = bb.pop();
        checkers_num += 1;
        banned |= banned_king_squares(pos, check_sq, ksq);
    }

    // King steps; attacked-square filtering is the legality pass's job.
    let mut to_bb = tables::king_attack(ksq)
        .and_not(pos.pieces_c(us))
        .and_not(banned);
    while to_bb.is_any() {
        let to = to_bb.pop();
        push_move(pos, list, PieceType::KING, ksq, to, false);
    }

    // Against a double check only the king moves.
    if checkers_num > 1 {
        return;
    }

    let target1 = tables::between(check_sq, ksq);
    let target2 = target1 | checkers;

    generate_pawn_moves(GenType::Evasion, pos, list, target2, all);
    generate_lance_moves(GenType::Evasion, pos, list, target2, all);
    generate_knight_moves(pos, list, target2);
    generate_silver_moves(pos, list, target2);
    generate_slider_moves(GenType::Evasion, pos, list, PieceType::BISHOP, target2, all);
    generate_slider_moves(GenType::Evasion, pos, list, PieceType::ROOK, target2, all);
    generate_gold_like_moves(pos, list, target2);

    if target1.is_any() {
        generate_drops(pos, list, target1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startpos_has_thirty_legal_moves() {
        let pos = Position::startpos();
        let list = legal_moves(&pos);
        assert_eq!(list.len(), 30);
    }

    #[test]
    fn test_legal_subset_of_legal_all() {
        let pos = Position::startpos();
        let mut legal = MoveList::new();
        let mut legal_all = MoveList::new();
        generate(GenType::Legal, &pos, &mut legal);
        generate(GenType::LegalAll, &pos, &mut legal_all);
        for mv in legal.iter() {
            assert!(legal_all.contains(mv), "{mv} missing from LegalAll");
        }
    }

    #[test]
    fn test_staged_union_matches_non_evasion() {
        let pos = Position::startpos();
        let mut union = MoveList::new();
        generate(GenType::CapturePlusPro, &pos, &mut union);
        generate(GenType::NonCaptureMinusPro, &pos, &mut union);
        generate(GenType::Drop, &pos, &mut union);
        let mut non_evasion = MoveList::new();
        generate(GenType::NonEvasion, &pos, &mut non_evasion);
        // At the start position there are no promotions or drops, so the
        // staged generators must cover exactly the pseudo-legal set.
        assert_eq!(union.len(), non_evasion.len());
        for mv in union.iter() {
            assert!(non_evasion.contains(mv));
        }
    }

    #[test]
    fn test_no_double_pawn_drop() {
        // Black holds a pawn but has pawns on every file except 5 (the 5g
        // pawn was traded somewhere else for the sake of the test).
        let pos = Position::from_sfen(
            "lnsgkgsnl/1r5b1/ppppppppp/9/9/9/PPPP1PPPP/1B5R1/LNSGKGSNL b P 1",
        )
        .unwrap();
        let mut drops = MoveList::new();
        generate(GenType::Drop, &pos, &mut drops);
        for mv in drops.iter() {
            assert!(mv.is_drop());
            if mv.dropped_piece_type() == PieceType::PAWN {
                assert_eq!(mv.to().file().usi_char(), '5');
                assert_ne!(mv.to().rank().usi_char(), 'a');
            }
        }
        assert!(drops.len() > 0);
    }

    #[test]
    fn test_evasions_resolve_check() {
        // White rook gives check down the 5-file to the black king on 5i.
        let pos = Position::from_sfen("4k4/9/9/9/4r4/9/9/9/4K4 b - 1").unwrap();
        assert!(pos.in_check());
        let list = legal_moves(&pos);
        assert!(list.len() > 0);
        let mut pos = pos;
        for i in 0..list.len() {
            let mv = list.get(i).unwrap();
            pos.do_move_simple(mv);
            assert!(
                !pos.attackers_to_color(pos.turn(), pos.king_square(pos.turn().opposite()))
                    .is_any(),
                "evasion {mv} leaves king capturable"
            );
            pos.undo_move(mv);
        }
    }

    #[test]
    fn test_double_check_only_king_moves() {
        // Black king on 5i checked by a rook on 5a (file) and a bishop on
        // 1e (diagonal through 4f..2h? 1e-2f-3g-4h-5i yes).
        let pos = Position::from_sfen("3kr4/9/9/9/8b/9/9/9/4K4 b - 1").unwrap();
        assert_eq!(pos.checkers().count(), 2);
        let list = legal_moves(&pos);
        for mv in list.iter() {
            assert_eq!(mv.piece_type_from(), PieceType::KING);
        }
    }
}
