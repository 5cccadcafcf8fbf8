//! Incrementally computed KPP/KKP evaluation.
//!
//! The position keeps a 38-slot list of feature indices for every non-king
//! piece, in both orientations. A full evaluation sums KKP over the list
//! and KPP over unordered list pairs from each king's point of view; a
//! differential evaluation reuses the parent node's sum and re-walks only
//! the one or two list slots the last move touched.

pub mod material;

mod hash;
mod list;
mod tables;

pub use hash::EvalHashTable;
pub use list::{
    ChangedPair, EvalDelta, EvalIndex, EvalList, FE_END, FE_HAND_END, LIST_SIZE, SQUARE_HAND_NB,
};
pub use tables::{Evaluator, KKP_FILE_NAME, KPP_FILE_NAME};

use crate::position::types::{Color, Move, PieceType};
use crate::position::Position;

/// Evaluation values are table units; scores reported to the search divide
/// by this.
pub const FV_SCALE: i32 = 32;

/// The three running component pairs of an evaluation:
/// `p[0]` KPP from Black's king, `p[1]` KPP from White's inverted king,
/// `p[2]` KKP plus the K00 base. Each pair is (board term, turn term);
/// the board total is `p[0] - p[1] + p[2]`, the turn total adds all three.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvalSum {
    pub p: [[i32; 2]; 3],
}

impl EvalSum {
    pub const ZERO: EvalSum = EvalSum { p: [[0; 2]; 3] };

    /// Score from `c`'s point of view, feature terms only.
    #[inline]
    #[must_use]
    pub fn sum(self, c: Color) -> i32 {
        let board = self.p[0][0] - self.p[1][0] + self.p[2][0];
        let turn = self.p[0][1] + self.p[1][1] + self.p[2][1];
        (if c.is_black() { board } else { -board }) + turn
    }

    #[inline]
    pub fn add_pair(&mut self, idx: usize, pair: (i32, i32)) {
        self.p[idx][0] += pair.0;
        self.p[idx][1] += pair.1;
    }

    #[inline]
    pub fn sub_pair(&mut self, idx: usize, pair: (i32, i32)) {
        self.p[idx][0] -= pair.0;
        self.p[idx][1] -= pair.1;
    }

    /// Pack into three words for the lockless cache.
    #[inline]
    #[must_use]
    pub fn to_words(self) -> [u64; 3] {
        [
            pack(self.p[0]),
            pack(self.p[1]),
            pack(self.p[2]),
        ]
    }

    #[inline]
    #[must_use]
    pub fn from_words(words: [u64; 3]) -> EvalSum {
        EvalSum {
            p: [unpack(words[0]), unpack(words[1]), unpack(words[2])],
        }
    }
}

#[inline]
fn pack(pair: [i32; 2]) -> u64 {
    (pair[0] as u32 as u64) | ((pair[1] as u32 as u64) << 32)
}

#[inline]
fn unpack(word: u64) -> [i32; 2] {
    [word as u32 as i32, (word >> 32) as u32 as i32]
}

impl std::ops::AddAssign for EvalSum {
    fn add_assign(&mut self, rhs: EvalSum) {
        for i in 0..3 {
            self.p[i][0] += rhs.p[i][0];
            self.p[i][1] += rhs.p[i][1];
        }
    }
}

impl std::ops::SubAssign for EvalSum {
    fn sub_assign(&mut self, rhs: EvalSum) {
        for i in 0..3 {
            self.p[i][0] -= rhs.p[i][0];
            self.p[i][1] -= rhs.p[i][1];
        }
    }
}

/// Full evaluation over the position's current lists.
#[must_use]
pub fn compute_full_sum(pos: &Position, ev: &Evaluator) -> EvalSum {
    let bk = pos.king_square(Color::Black);
    let wk = pos.king_square(Color::White);
    let wk_inv = wk.inverse();
    let list = pos.eval_list();

    let mut sum = EvalSum::ZERO;
    sum.p[2][0] = ev.k00(bk, wk);
    for i in 0..LIST_SIZE {
        let k0 = list.list0[i];
        let k1 = list.list1[i];
        sum.add_pair(2, ev.kkp_pair(bk, wk, k0));
        for j in 0..i {
            sum.add_pair(0, ev.kpp_pair(bk, k0, list.list0[j]));
            sum.add_pair(1, ev.kpp_pair(wk_inv, k1, list.list1[j]));
        }
    }
    sum
}

/// Partial sum for one feature index against the whole list, used by the
/// differential update.
fn doapc(pos: &Position, ev: &Evaluator, index: (EvalIndex, EvalIndex)) -> EvalSum {
    let bk = pos.king_square(Color::Black);
    let wk = pos.king_square(Color::White);
    let wk_inv = wk.inverse();
    let list = pos.eval_list();

    let mut sum = EvalSum::ZERO;
    sum.add_pair(2, ev.kkp_pair(bk, wk, index.0));
    for i in 0..LIST_SIZE {
        sum.add_pair(0, ev.kpp_pair(bk, index.0, list.list0[i]));
        sum.add_pair(1, ev.kpp_pair(wk_inv, index.1, list.list1[i]));
    }
    sum
}

/// Differential evaluation from the parent node's sum. `None` when the
/// last move invalidates the shortcut (king moves shift a whole KPP plane).
#[must_use]
pub fn calc_difference(pos: &mut Position, ev: &Evaluator, prev: EvalSum) -> Option<EvalSum> {
    let last = pos.last_move();
    if last.is_none() || last == Move::NULL {
        return None;
    }
    if !last.is_drop() && last.piece_type_from() == PieceType::KING {
        return None;
    }

    let cl = pos.eval_delta();
    let bk = pos.king_square(Color::Black);
    let wk_inv = pos.king_square(Color::White).inverse();

    let p0 = cl.pair[0];
    let li0 = cl.list_index[0];

    let mut diff = doapc(pos, ev, (p0.new0, p0.new1));
    if cl.len == 1 {
        {
            let list = pos.eval_list_mut();
            list.list0[li0] = p0.old0;
            list.list1[li0] = p0.old1;
        }
        diff -= doapc(pos, ev, (p0.old0, p0.old1));
    } else {
        debug_assert_eq!(cl.len, 2);
        let p1 = cl.pair[1];
        let li1 = cl.list_index[1];

        diff += doapc(pos, ev, (p1.new0, p1.new1));
        // The two fresh slots saw each other once per doapc pass.
        diff.sub_pair(0, ev.kpp_pair(bk, p0.new0, p1.new0));
        diff.sub_pair(1, ev.kpp_pair(wk_inv, p0.new1, p1.new1));

        {
            let list = pos.eval_list_mut();
            list.list0[li1] = p1.old0;
            list.list1[li1] = p1.old1;
            list.list0[li0] = p0.old0;
            list.list1[li0] = p0.old1;
        }
        diff -= doapc(pos, ev, (p0.old0, p0.old1));
        diff -= doapc(pos, ev, (p1.old0, p1.old1));
        diff.add_pair(0, ev.kpp_pair(bk, p0.old0, p1.old0));
        diff.add_pair(1, ev.kpp_pair(wk_inv, p0.old1, p1.old1));

        let list = pos.eval_list_mut();
        list.list0[li1] = p1.new0;
        list.list1[li1] = p1.new1;
    }
    let list = pos.eval_list_mut();
    list.list0[li0] = p0.new0;
    list.list1[li0] = p0.new1;

    let mut sum = prev;
    sum += diff;
    Some(sum)
}

/// Turn a feature sum into the score the search sees: side-to-move
/// perspective, material folded in, divided down to centipawn-like units.
#[inline]
#[must_use]
pub fn score_from_sum(pos: &Position, sum: EvalSum) -> i32 {
    let mat = if pos.turn().is_black() {
        pos.material()
    } else {
        -pos.material()
    };
    (sum.sum(pos.turn()) + mat * FV_SCALE) / FV_SCALE
}

/// Evaluate the position: cache probe, then differential update from the
/// parent sum when possible, then full computation. Returns the score and
/// the raw sum for the caller's stack.
#[must_use]
pub fn evaluate(
    pos: &mut Position,
    ev: &Evaluator,
    cache: &EvalHashTable,
    prev: Option<EvalSum>,
) -> (i32, EvalSum) {
    let key_ex = pos.key_exclude_turn();
    if let Some(sum) = cache.probe(key_ex) {
        return (score_from_sum(pos, sum), sum);
    }

    let sum = prev
        .and_then(|p| calc_difference(pos, ev, p))
        .unwrap_or_else(|| compute_full_sum(pos, ev));
    debug_assert_eq!(sum, compute_full_sum(pos, ev));

    cache.store(key_ex, sum);
    (score_from_sum(pos, sum), sum)
}
