//! Precomputed attack tables and board geometry.
//!
//! Sliding attacks are table lookups keyed by the relevant blocker squares,
//! through a hardware bit-extract on BMI2 targets and a magic
//! multiply-and-shift everywhere else. Everything is built once at first
//! use and read-only afterwards.

mod magics;
mod tables;

use once_cell::sync::Lazy;

pub use tables::direction;
use tables::{lance_slide, occupied_to_index, AttackTables};

use crate::position::types::{Bitboard, Color, PieceType, Square};

static TABLES: Lazy<AttackTables> = Lazy::new(AttackTables::build);

/// Force table construction; called once at engine startup so the first
/// search does not pay for it.
pub fn init() {
    Lazy::force(&TABLES);
}

#[inline]
#[must_use]
pub fn rook_attack(sq: Square, occupied: Bitboard) -> Bitboard {
    let t = &*TABLES;
    let i = sq.index();
    let mask = t.rook_mask[i];
    let slot = occupied_to_index(
        occupied & mask,
        mask,
        magics_rook(i),
        magics::ROOK_SHIFT_BITS[i],
    );
    t.rook_attack[t.rook_index[i] as usize + slot]
}

#[inline]
#[must_use]
pub fn bishop_attack(sq: Square, occupied: Bitboard) -> Bitboard {
    let t = &*TABLES;
    let i = sq.index();
    let mask = t.bishop_mask[i];
    let slot = occupied_to_index(
        occupied & mask,
        mask,
        magics_bishop(i),
        magics::BISHOP_SHIFT_BITS[i],
    );
    t.bishop_attack[t.bishop_index[i] as usize + slot]
}

#[inline]
fn magics_rook(i: usize) -> u64 {
    magics::ROOK_MAGIC[i]
}

#[inline]
fn magics_bishop(i: usize) -> u64 {
    magics::BISHOP_MAGIC[i]
}

#[inline]
#[must_use]
pub fn lance_attack(c: Color, sq: Square, occupied: Bitboard) -> Bitboard {
    let part = Bitboard::part_of(sq);
    let idx = ((occupied.part(part) >> lance_slide(sq)) & 127) as usize;
    TABLES.lance[c.index()][sq.index()][idx]
}

/// The rook's file-direction reach only. Shares the lance index so the
/// lookup stays one shift.
#[inline]
#[must_use]
pub fn rook_attack_file(sq: Square, occupied: Bitboard) -> Bitboard {
    let part = Bitboard::part_of(sq);
    let idx = ((occupied.part(part) >> lance_slide(sq)) & 127) as usize;
    let t = &*TABLES;
    t.lance[Color::Black.index()][sq.index()][idx] | t.lance[Color::White.index()][sq.index()][idx]
}

#[inline]
#[must_use]
pub fn king_attack(sq: Square) -> Bitboard {
    TABLES.king[sq.index()]
}

#[inline]
#[must_use]
pub fn gold_attack(c: Color, sq: Square) -> Bitboard {
    TABLES.gold[c.index()][sq.index()]
}

#[inline]
#[must_use]
pub fn silver_attack(c: Color, sq: Square) -> Bitboard {
    TABLES.silver[c.index()][sq.index()]
}

#[inline]
#[must_use]
pub fn knight_attack(c: Color, sq: Square) -> Bitboard {
    TABLES.knight[c.index()][sq.index()]
}

#[inline]
#[must_use]
pub fn pawn_attack(c: Color, sq: Square) -> Bitboard {
    TABLES.pawn[c.index()][sq.index()]
}

#[inline]
#[must_use]
pub fn horse_attack(sq: Square, occupied: Bitboard) -> Bitboard {
    bishop_attack(sq, occupied) | king_attack(sq)
}

#[inline]
#[must_use]
pub fn dragon_attack(sq: Square, occupied: Bitboard) -> Bitboard {
    rook_attack(sq, occupied) | king_attack(sq)
}

/// Squares strictly between the pair, empty unless they share a line.
#[inline]
#[must_use]
pub fn between(sq1: Square, sq2: Square) -> Bitboard {
    TABLES.between[sq1.index()][sq2.index()]
}

#[inline]
#[must_use]
pub fn rook_attack_to_edge(sq: Square) -> Bitboard {
    TABLES.rook_to_edge[sq.index()]
}

#[inline]
#[must_use]
pub fn bishop_attack_to_edge(sq: Square) -> Bitboard {
    TABLES.bishop_to_edge[sq.index()]
}

#[inline]
#[must_use]
pub fn lance_attack_to_edge(c: Color, sq: Square) -> Bitboard {
    TABLES.lance_to_edge[c.index()][sq.index()]
}

#[inline]
#[must_use]
pub fn horse_attack_to_edge(sq: Square) -> Bitboard {
    bishop_attack_to_edge(sq) | king_attack(sq)
}

#[inline]
#[must_use]
pub fn dragon_attack_to_edge(sq: Square) -> Bitboard {
    rook_attack_to_edge(sq) | king_attack(sq)
}

/// Squares from which one more gold move by `c` could check a king on `sq`.
#[inline]
#[must_use]
pub fn gold_check_table(c: Color, sq: Square) -> Bitboard {
    TABLES.gold_check[c.index()][sq.index()]
}

#[inline]
#[must_use]
pub fn silver_check_table(c: Color, sq: Square) -> Bitboard {
    TABLES.silver_check[c.index()][sq.index()]
}

#[inline]
#[must_use]
pub fn knight_check_table(c: Color, sq: Square) -> Bitboard {
    TABLES.knight_check[c.index()][sq.index()]
}

#[inline]
#[must_use]
pub fn lance_check_table(c: Color, sq: Square) -> Bitboard {
    TABLES.lance_check[c.index()][sq.index()]
}

/// The 5x5 block centred on the square, clipped to the board.
#[inline]
#[must_use]
pub fn neighbor5x5(sq: Square) -> Bitboard {
    TABLES.neighbor5x5[sq.index()]
}

#[inline]
#[must_use]
pub fn square_relation(sq1: Square, sq2: Square) -> u8 {
    TABLES.relation[sq1.index()][sq2.index()]
}

/// True when `from`, `to` and `ksq` share one line, so that a move from
/// `from` to `to` keeps the piece between attacker and king.
#[inline]
#[must_use]
pub fn is_aligned(from: Square, to: Square, ksq: Square) -> bool {
    let direc = square_relation(from, ksq);
    direc != direction::MISC && direc == square_relation(from, to)
}

/// Attack set of an arbitrary piece type given an occupancy.
#[must_use]
pub fn attacks_from(pt: PieceType, c: Color, sq: Square, occupied: Bitboard) -> Bitboard {
    match pt {
        PieceType::PAWN => pawn_attack(c, sq),
        PieceType::LANCE => lance_attack(c, sq, occupied),
        PieceType::KNIGHT => knight_attack(c, sq),
        PieceType::SILVER => silver_attack(c, sq),
        PieceType::BISHOP => bishop_attack(sq, occupied),
        PieceType::ROOK => rook_attack(sq, occupied),
        PieceType::GOLD
        | PieceType::PRO_PAWN
        | PieceType::PRO_LANCE
        | PieceType::PRO_KNIGHT
        | PieceType::PRO_SILVER => gold_attack(c, sq),
        PieceType::KING => king_attack(sq),
        PieceType::HORSE => horse_attack(sq, occupied),
        PieceType::DRAGON => dragon_attack(sq, occupied),
        _ => Bitboard::EMPTY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::types::{File, Rank};

    fn sq(f: u8, r: u8) -> Square {
        Square::new(File(f), Rank(r))
    }

    #[test]
    fn test_rook_attack_empty_board() {
        let s = sq(4, 4); // 5e
        let att = rook_attack(s, Bitboard::EMPTY);
        assert_eq!(att.count(), 16);
        assert_eq!(att, rook_attack_to_edge(s));
    }

    #[test]
    fn test_rook_attack_blocked() {
        let s = sq(4, 4);
        let blocker = sq(4, 2);
        let occ = Bitboard::from_square(blocker);
        let att = rook_attack(s, occ);
        assert!(att.contains(blocker));
        assert!(!att.contains(sq(4, 1)));
        assert!(!att.contains(sq(4, 0)));
        assert!(att.contains(sq(4, 8)));
        assert!(att.contains(sq(0, 4)));
    }

    #[test]
    fn test_bishop_attack_blocked() {
        let s = sq(4, 4);
        let blocker = sq(6, 6);
        let att = bishop_attack(s, Bitboard::from_square(blocker));
        assert!(att.contains(blocker));
        assert!(!att.contains(sq(7, 7)));
        assert!(att.contains(sq(0, 0)));
    }

    #[test]
    fn test_attack_tables_match_ray_walk() {
        // Cross-check the indexed lookup against a direct ray walk over a
        // scattering of occupancies.
        let occs = [
            Bitboard::EMPTY,
            Bitboard::rank_mask(Rank(2)) | Bitboard::file_mask(File(5)),
            Bitboard::rank_mask(Rank(6)) | Bitboard::from_square(sq(3, 3)),
            Bitboard::ALL,
        ];
        for s in Square::all() {
            for occ in occs {
                let expect_r = {
                    let mut bb = Bitboard::EMPTY;
                    for (df, dr) in [(0i8, -1i8), (0, 1), (-1, 0), (1, 0)] {
                        let mut cur = s;
                        while let Some(next) = cur.offset(df, dr) {
                            bb.set(next);
                            if occ.contains(next) {
                                break;
                            }
                            cur = next;
                        }
                    }
                    bb
                };
                assert_eq!(rook_attack(s, occ), expect_r, "rook at {s} occ mismatch");
            }
        }
    }

    #[test]
    fn test_lance_attack() {
        let s = sq(4, 6); // 5g
        let att = lance_attack(Color::Black, s, Bitboard::EMPTY);
        assert_eq!(att.count(), 6); // ranks f..a
        assert!(att.contains(sq(4, 0)));
        assert!(!att.contains(sq(4, 7)));

        let blocked = lance_attack(Color::Black, s, Bitboard::from_square(sq(4, 3)));
        assert_eq!(blocked.count(), 3);

        let white = lance_attack(Color::White, s, Bitboard::EMPTY);
        assert_eq!(white.count(), 2); // ranks h, i
    }

    #[test]
    fn test_rook_attack_file_matches_lances() {
        for s in Square::all() {
            let occ = Bitboard::rank_mask(Rank(4));
            let both = lance_attack(Color::Black, s, occ) | lance_attack(Color::White, s, occ);
            assert_eq!(rook_attack_file(s, occ), both);
        }
    }

    #[test]
    fn test_step_attacks() {
        // Black pawn on 5e pushes toward rank a.
        assert_eq!(
            pawn_attack(Color::Black, sq(4, 4)),
            Bitboard::from_square(sq(4, 3))
        );
        assert_eq!(
            pawn_attack(Color::White, sq(4, 4)),
            Bitboard::from_square(sq(4, 5))
        );
        // Knight jumps two forward, one sideways.
        let n = knight_attack(Color::Black, sq(4, 4));
        assert_eq!(n.count(), 2);
        assert!(n.contains(sq(3, 2)));
        assert!(n.contains(sq(5, 2)));
        // Edge squares lose out-of-board steps.
        assert!(pawn_attack(Color::Black, sq(4, 0)).is_empty());
        assert_eq!(king_attack(sq(0, 0)).count(), 3);
        assert_eq!(king_attack(sq(4, 4)).count(), 8);
        assert_eq!(gold_attack(Color::Black, sq(4, 4)).count(), 6);
        assert_eq!(silver_attack(Color::Black, sq(4, 4)).count(), 5);
    }

    #[test]
    fn test_between() {
        assert_eq!(between(sq(0, 0), sq(0, 4)).count(), 3);
        assert_eq!(between(sq(0, 0), sq(4, 4)).count(), 3);
        assert!(between(sq(0, 0), sq(1, 4)).is_empty());
        assert!(between(sq(0, 0), sq(0, 1)).is_empty());
    }

    #[test]
    fn test_square_relation() {
        assert_eq!(square_relation(sq(0, 0), sq(0, 5)), direction::FILE);
        assert_eq!(square_relation(sq(0, 0), sq(5, 0)), direction::RANK);
        assert_ne!(square_relation(sq(0, 0), sq(4, 4)) & direction::DIAG, 0);
        assert_eq!(square_relation(sq(0, 0), sq(1, 4)), direction::MISC);
        assert!(is_aligned(sq(2, 2), sq(3, 3), sq(5, 5)));
        assert!(!is_aligned(sq(2, 2), sq(3, 2), sq(5, 5)));
    }

    #[test]
    fn test_neighbor5x5() {
        assert_eq!(neighbor5x5(sq(4, 4)).count(), 25);
        assert_eq!(neighbor5x5(sq(0, 0)).count(), 9);
    }
}
