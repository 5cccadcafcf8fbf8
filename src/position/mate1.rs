//! One-ply mate detection and the no-mate-by-pawn-drop rule.

use crate::position::attack_tables as tables;
use crate::position::movegen::{self, GenType};
use crate::position::state::{CheckInfo, Position};
use crate::position::types::{Bitboard, Color, Move, MoveList, Square};

impl Position {
    /// Whether a non-king piece of `them` can capture the checking piece
    /// on `sq` without exposing its own king.
    #[must_use]
    pub(crate) fn can_piece_capture(&self, them: Color, sq: Square) -> bool {
        let mut from_bb = self.attackers_to_except_king(them, sq);
        if from_bb.is_empty() {
            return false;
        }
        let ksq = self.king_square(them);
        let dc_bb = self.discovered_check_bb_them();
        while from_bb.is_any() {
            let from = from_bb.pop();
            if !self.is_discovered_check(from, sq, ksq, dc_bb) {
                return true;
            }
        }
        false
    }

    /// Shogi's forbidden pawn-drop mate: would a pawn dropped on `sq`
    /// (which must deliver check) leave the opponent with no defence?
    #[must_use]
    pub fn is_pawn_drop_check_mate(&self, us: Color, sq: Square) -> bool {
        let them = us.opposite();

        // Any unpinned defender capture refutes the mate.
        if self.can_piece_capture(them, sq) {
            return false;
        }

        // Otherwise the king must escape or take the pawn itself. The
        // pawn occupies `sq` for the attack scan and the king vacates.
        let ksq = self.king_square(them);
        let mut temp_occ = self.occupied() | Bitboard::from_square(sq);
        temp_occ.clear(ksq);

        let mut king_move = self.pieces_c(them).and_not(tables::king_attack(ksq));
        while king_move.is_any() {
            let to = king_move.pop();
            if self.attackers_to_c(us, to, temp_occ).is_empty() {
                return false;
            }
        }
        true
    }

    /// A move that mates the opponent in exactly one ply, or `NONE`.
    ///
    /// Candidates are the pseudo-legal moves that give check; each
    /// surviving candidate is verified by playing it and confirming the
    /// opponent has no legal reply. Pawn-drop mates never appear because
    /// the drop generator already excludes them.
    #[must_use]
    pub fn mate_move_in_1ply(&mut self) -> Move {
        debug_assert!(!self.in_check());

        let ci = CheckInfo::new(self);
        let mut list = MoveList::new();
        movegen::generate(GenType::NonEvasion, self, &mut list);

        for i in 0..list.len() {
            let mv = list.as_slice()[i].mv;
            if !self.move_gives_check(mv, &ci) {
                continue;
            }
            if !self.pseudo_legal_move_is_legal(mv, ci.pinned, false, false) {
                continue;
            }
            self.do_move(mv, &ci, true);
            let mate = movegen::legal_moves(self).is_empty();
            self.undo_move(mv);
            if mate {
                return mv;
            }
        }
        Move::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::types::PieceType;

    #[test]
    fn test_gold_drop_mate() {
        // Bare white king on 5a, black gold in hand, black tokin on 5c
        // guarding the drop square 5b.
        let mut pos = Position::from_sfen("4k4/9/4+P4/9/9/9/9/9/4K4 b G 1").unwrap();
        let mv = pos.mate_move_in_1ply();
        assert!(!mv.is_none());
        assert!(mv.is_drop());
        assert_eq!(mv.dropped_piece_type(), PieceType::GOLD);
        assert_eq!(mv.to().to_string(), "5b");
    }

    #[test]
    fn test_no_mate_when_king_escapes() {
        // Same but without the tokin: the gold drop is not supported, the
        // king simply takes it.
        let mut pos = Position::from_sfen("4k4/9/9/9/9/9/9/9/4K4 b G 1").unwrap();
        assert!(pos.mate_move_in_1ply().is_none());
    }

    #[test]
    fn test_pawn_drop_mate_is_illegal_and_excluded() {
        // White king boxed in on 1a by golds on 3b and 1c; P*1b would mate
        // and must therefore be absent from every generated move list.
        let pos = Position::from_sfen("8k/6G2/8G/9/9/9/9/9/4K4 b P 1").unwrap();
        let drop_sq: Square = "1b".parse().unwrap();
        assert!(pos.is_pawn_drop_check_mate(Color::Black, drop_sq));

        let mut all = MoveList::new();
        movegen::generate(GenType::LegalAll, &pos, &mut all);
        let bad = Move::new_drop(PieceType::PAWN, drop_sq);
        assert!(!all.contains(bad));
        assert!(!pos.move_is_pseudo_legal(bad, true));
        // Without the pawn-drop checks the same move parses as plausible.
        assert!(pos.move_is_pseudo_legal(bad, false));
    }

    #[test]
    fn test_mate_by_board_move() {
        // White king 1a, black dragon on 3b supported by a gold on 1c;
        // 3b2b is a contact mate.
        let mut pos = Position::from_sfen("8k/6+R2/8G/9/9/9/9/9/4K4 b - 1").unwrap();
        let mv = pos.mate_move_in_1ply();
        assert!(!mv.is_none(), "expected a mate in one");
        assert!(!mv.is_drop());
    }
}
