//! Zobrist hashing for shogi positions.
//!
//! Board keys are summed rather than XORed so hand counts can contribute
//! once per held piece; the turn flag lives in bit 0 and every other key
//! has that bit cleared, so the turn-less key is a plain right shift.

use once_cell::sync::Lazy;
use rand::prelude::*;

use crate::position::types::{Color, HandPiece, PieceType, Square, SQUARE_NB};

pub struct ZobristKeys {
    // board[piece_type][square][color]
    board: [[[u64; 2]; SQUARE_NB]; PieceType::NB],
    hand: [[u64; 2]; HandPiece::NB],
    exclusion: u64,
}

/// The turn flag occupies bit 0 alone.
pub const TURN_KEY: u64 = 1;

impl ZobristKeys {
    fn new() -> Self {
        let mut rng = StdRng::seed_from_u64(20111_128_u64); // fixed seed for reproducibility
        let mut board = [[[0u64; 2]; SQUARE_NB]; PieceType::NB];
        for pt in board.iter_mut() {
            for sq in pt.iter_mut() {
                for key in sq.iter_mut() {
                    *key = rng.gen::<u64>() & !1;
                }
            }
        }
        let mut hand = [[0u64; 2]; HandPiece::NB];
        for hp in hand.iter_mut() {
            for key in hp.iter_mut() {
                *key = rng.gen::<u64>() & !1;
            }
        }
        let exclusion = rng.gen::<u64>() & !1;
        ZobristKeys { board, hand, exclusion }
    }
}

static ZOBRIST: Lazy<ZobristKeys> = Lazy::new(ZobristKeys::new);

/// Key contribution of a piece of `pt` and `c` on `sq`.
#[inline]
#[must_use]
pub fn piece_key(pt: PieceType, sq: Square, c: Color) -> u64 {
    ZOBRIST.board[pt.index()][sq.index()][c.index()]
}

/// Key contribution of one held piece of the given kind.
#[inline]
#[must_use]
pub fn hand_key(hp: HandPiece, c: Color) -> u64 {
    ZOBRIST.hand[hp.index()][c.index()]
}

/// XOR distinguisher for singular-extension exclusion searches.
#[inline]
#[must_use]
pub fn exclusion_key() -> u64 {
    ZOBRIST.exclusion
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_reserve_turn_bit() {
        for pt in PieceType::all() {
            for sq in Square::all() {
                for c in [Color::Black, Color::White] {
                    assert_eq!(piece_key(pt, sq, c) & 1, 0);
                }
            }
        }
        for hp in HandPiece::ALL {
            assert_eq!(hand_key(hp, Color::Black) & 1, 0);
            assert_eq!(hand_key(hp, Color::White) & 1, 0);
        }
        assert_eq!(exclusion_key() & 1, 0);
    }

    #[test]
    fn test_keys_deterministic_and_distinct() {
        let a = piece_key(PieceType::PAWN, Square::from_index(0), Color::Black);
        let b = piece_key(PieceType::PAWN, Square::from_index(0), Color::Black);
        assert_eq!(a, b);
        let c = piece_key(PieceType::PAWN, Square::from_index(1), Color::Black);
        assert_ne!(a, c);
        assert_ne!(a, 0);
    }
}
