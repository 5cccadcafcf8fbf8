//! Per-thread move-ordering statistics: history, counter moves,
//! continuation history and from-to scores. None of these are shared
//! between workers.

use crate::position::{Color, Move, Piece, Square, SQUARE_NB};

const PIECE_NB: usize = Piece::NB;
/// `from` slots include the drop pseudo-sources (81 + piece type).
const FROM_NB: usize = SQUARE_NB + 15;

/// Ceiling on a single update's magnitude; larger bonuses are ignored so
/// the exponential decay keeps every entry bounded.
pub const STAT_MAX: i32 = 324;

fn graded_update(entry: &mut i32, bonus: i32, decay: i32) {
    if bonus.abs() >= STAT_MAX {
        return;
    }
    *entry -= *entry * bonus.abs() / decay;
    *entry += bonus * 32;
}

/// Long-running per-(piece, destination) quiet-move statistic.
pub struct HistoryStats {
    table: Box<[[i32; SQUARE_NB]; PIECE_NB]>,
}

impl HistoryStats {
    #[must_use]
    pub fn new() -> Self {
        HistoryStats {
            table: Box::new([[0; SQUARE_NB]; PIECE_NB]),
        }
    }

    pub fn clear(&mut self) {
        for row in self.table.iter_mut() {
            row.fill(0);
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, pc: Piece, to: Square) -> i32 {
        self.table[pc.index()][to.index()]
    }

    pub fn update(&mut self, pc: Piece, to: Square, bonus: i32) {
        graded_update(&mut self.table[pc.index()][to.index()], bonus, 324);
    }
}

/// The move that last refuted a move by (piece, destination).
pub struct MoveStats {
    table: Box<[[Move; SQUARE_NB]; PIECE_NB]>,
}

impl MoveStats {
    #[must_use]
    pub fn new() -> Self {
        MoveStats {
            table: Box::new([[Move::NONE; SQUARE_NB]; PIECE_NB]),
        }
    }

    pub fn clear(&mut self) {
        for row in self.table.iter_mut() {
            row.fill(Move::NONE);
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, pc: Piece, to: Square) -> Move {
        self.table[pc.index()][to.index()]
    }

    pub fn update(&mut self, pc: Piece, to: Square, mv: Move) {
        self.table[pc.index()][to.index()] = mv;
    }
}

/// History keyed additionally by the preceding move's (piece, square):
/// one full history table per such pair, updated with a slower decay.
pub struct CounterMoveHistoryStats {
    table: Vec<i32>,
}

impl CounterMoveHistoryStats {
    #[must_use]
    pub fn new() -> Self {
        CounterMoveHistoryStats {
            table: vec![0; PIECE_NB * SQUARE_NB * PIECE_NB * SQUARE_NB],
        }
    }

    pub fn clear(&mut self) {
        self.table.fill(0);
    }

    /// Key for the sub-table selected by a played move.
    #[inline]
    #[must_use]
    pub fn key(pc: Piece, to: Square) -> (usize, usize) {
        (pc.index(), to.index())
    }

    #[inline]
    fn index(key: (usize, usize), pc: Piece, to: Square) -> usize {
        ((key.0 * SQUARE_NB + key.1) * PIECE_NB + pc.index()) * SQUARE_NB + to.index()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, key: (usize, usize), pc: Piece, to: Square) -> i32 {
        self.table[Self::index(key, pc, to)]
    }

    pub fn update(&mut self, key: (usize, usize), pc: Piece, to: Square, bonus: i32) {
        graded_update(&mut self.table[Self::index(key, pc, to)], bonus, 936);
    }
}

/// Colour-separated raw from/to statistic; drops index their pseudo-source.
pub struct FromToStats {
    table: Box<[Vec<i32>; Color::NB]>,
}

impl FromToStats {
    #[must_use]
    pub fn new() -> Self {
        FromToStats {
            table: Box::new([
                vec![0; FROM_NB * SQUARE_NB],
                vec![0; FROM_NB * SQUARE_NB],
            ]),
        }
    }

    pub fn clear(&mut self) {
        for t in self.table.iter_mut() {
            t.fill(0);
        }
    }

    #[inline]
    fn index(mv: Move) -> usize {
        mv.from_raw() * SQUARE_NB + mv.to().index()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, c: Color, mv: Move) -> i32 {
        self.table[c.index()][Self::index(mv)]
    }

    pub fn update(&mut self, c: Color, mv: Move, bonus: i32) {
        graded_update(&mut self.table[c.index()][Self::index(mv)], bonus, 324);
    }
}
