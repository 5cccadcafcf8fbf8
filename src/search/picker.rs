//! Staged move picker.
//!
//! A resumable generator encoded as an explicit stage enum: each
//! `next_move` call yields the next pseudo-legal move in search order
//! (hash move, winning tacticals, killers, countermove, sorted quiets,
//! losing captures; with dedicated ladders for evasions, probcut and
//! quiescence). Legality is the caller's job.

use crate::eval::material::{capture_piece_score, piece_score, promote_piece_score};
use crate::position::movegen::{self, GenType};
use crate::position::{Move, MoveList, Piece, PieceType, Position, Square};
use crate::search::stats::{CounterMoveHistoryStats, FromToStats, HistoryStats};
use crate::tt::DEPTH_QRECAPTURES;

/// Ordering bias that lifts tactical evasions above every history score.
const EVASION_CAPTURE_BONUS: i32 = 1 << 28;

/// Least-valuable-attacker ranks for capture ordering.
const LVA: [i32; PieceType::NB] = [0, 1, 2, 3, 4, 7, 8, 6, 10000, 5, 5, 5, 5, 9, 10];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    MainTt,
    TacticalInit,
    GoodTacticals,
    Killer0,
    Killer1,
    Countermove,
    QuietInit,
    Quiet,
    BadCaptures,
    EvasionTt,
    EvasionsInit,
    AllEvasions,
    ProbcutTt,
    ProbcutInit,
    ProbcutCaptures,
    QsearchTt,
    QCapturesInit,
    QCaptures,
    RecapturesInit,
    Recaptures,
    Exhausted,
}

/// Read-only ordering context, borrowed per call so the caller keeps
/// mutable access to the position between yields.
pub struct PickerContext<'a> {
    pub history: &'a HistoryStats,
    pub from_to: &'a FromToStats,
    pub cont_history: &'a CounterMoveHistoryStats,
    /// Continuation-history keys of the previous, second and fourth
    /// previous plies.
    pub cont_keys: [Option<(usize, usize)>; 3],
}

pub struct MovePicker {
    stage: Stage,
    tt_move: Move,
    killers: [Move; 2],
    counter_move: Move,
    depth: i32,
    threshold: i32,
    recapture_sq: Square,
    moves: MoveList,
    cur: usize,
    end_bad_captures: usize,
}

impl MovePicker {
    /// Main search picker.
    #[must_use]
    pub fn new_main(
        pos: &Position,
        ttm: Move,
        depth: i32,
        killers: [Move; 2],
        counter_move: Move,
    ) -> MovePicker {
        let tt_move = if !ttm.is_none() && pos.move_is_pseudo_legal(ttm, true) {
            ttm
        } else {
            Move::NONE
        };
        let mut stage = if pos.in_check() {
            Stage::EvasionTt
        } else {
            Stage::MainTt
        };
        if tt_move.is_none() {
            stage = advance(stage);
        }
        MovePicker {
            stage,
            tt_move,
            killers,
            counter_move,
            depth,
            threshold: 0,
            recapture_sq: Square::from_index(0),
            moves: MoveList::new(),
            cur: 0,
            end_bad_captures: 0,
        }
    }

    /// Quiescence picker; below the recapture horizon only captures on
    /// `recapture_sq` are yielded.
    #[must_use]
    pub fn new_qsearch(pos: &Position, ttm: Move, depth: i32, recapture_sq: Square) -> MovePicker {
        debug_assert!(depth <= 0);
        let mut picker = MovePicker {
            stage: Stage::Exhausted,
            tt_move: Move::NONE,
            killers: [Move::NONE; 2],
            counter_move: Move::NONE,
            depth,
            threshold: 0,
            recapture_sq,
            moves: MoveList::new(),
            cur: 0,
            end_bad_captures: 0,
        };
        if pos.in_check() {
            picker.stage = Stage::EvasionTt;
        } else if depth > DEPTH_QRECAPTURES {
            picker.stage = Stage::QsearchTt;
        } else {
            picker.stage = Stage::RecapturesInit;
            return picker;
        }
        picker.tt_move = if !ttm.is_none() && pos.move_is_pseudo_legal(ttm, true) {
            ttm
        } else {
            Move::NONE
        };
        if picker.tt_move.is_none() {
            picker.stage = advance(picker.stage);
        }
        picker
    }

    /// Probcut picker: only captures whose exchange clears `threshold`.
    #[must_use]
    pub fn new_probcut(pos: &Position, ttm: Move, threshold: i32) -> MovePicker {
        debug_assert!(!pos.in_check());
        let tt_move = if !ttm.is_none()
            && pos.move_is_pseudo_legal(ttm, true)
            && ttm.is_capture_or_pawn_promotion()
            && pos.see(ttm, 0) > threshold
        {
            ttm
        } else {
            Move::NONE
        };
        let stage = if tt_move.is_none() {
            Stage::ProbcutInit
        } else {
            Stage::ProbcutTt
        };
        MovePicker {
            stage,
            tt_move,
            killers: [Move::NONE; 2],
            counter_move: Move::NONE,
            depth: 0,
            threshold,
            recapture_sq: Square::from_index(0),
            moves: MoveList::new(),
            cur: 0,
            end_bad_captures: 0,
        }
    }

    /// Yield the next move, or `NONE` when done. Yields never repeat the
    /// hash move, killers or countermove.
    pub fn next_move(&mut self, pos: &Position, ctx: &PickerContext<'_>) -> Move {
        loop {
            match self.stage {
                Stage::MainTt | Stage::EvasionTt | Stage::ProbcutTt | Stage::QsearchTt => {
                    self.stage = advance(self.stage);
                    return self.tt_move;
                }

                Stage::TacticalInit => {
                    self.cur = 0;
                    self.end_bad_captures = 0;
                    self.moves.truncate(0);
                    movegen::generate(GenType::CapturePlusPro, pos, &mut self.moves);
                    self.score_captures(pos);
                    self.stage = Stage::GoodTacticals;
                }
                Stage::GoodTacticals => {
                    while self.cur < self.moves.len() {
                        let mv = self.moves.pick_best(self.cur).unwrap_or(Move::NONE);
                        self.cur += 1;
                        if mv == self.tt_move {
                            continue;
                        }
                        if pos.see_sign(mv) >= 0 {
                            return mv;
                        }
                        // Defer losing captures to the very end.
                        let slot = self.end_bad_captures;
                        self.moves.as_mut_slice()[slot].mv = mv;
                        self.end_bad_captures += 1;
                    }
                    self.stage = Stage::Killer0;
                }
                Stage::Killer0 | Stage::Killer1 | Stage::Countermove => {
                    let mv = match self.stage {
                        Stage::Killer0 => self.killers[0],
                        Stage::Killer1 => self.killers[1],
                        _ => self.counter_move,
                    };
                    let already = mv == self.tt_move
                        || (self.stage == Stage::Countermove
                            && (mv == self.killers[0] || mv == self.killers[1]));
                    self.stage = advance(self.stage);
                    if !mv.is_none()
                        && !already
                        && pos.move_is_pseudo_legal(mv, true)
                        && pos.piece_on(mv.to()).is_empty()
                    {
                        return mv;
                    }
                }
                Stage::QuietInit => {
                    self.moves.truncate(self.end_bad_captures);
                    self.cur = self.end_bad_captures;
                    movegen::generate(GenType::NonCaptureMinusPro, pos, &mut self.moves);
                    movegen::generate(GenType::Drop, pos, &mut self.moves);
                    self.score_quiets(pos, ctx);
                    let quiets = &mut self.moves.as_mut_slice()[self.cur..];
                    if self.depth < 3 {
                        // Only the promising quiets are worth ordering at
                        // shallow depth.
                        let positive = partition_positive(quiets);
                        quiets[..positive].sort_by(|a, b| b.score.cmp(&a.score));
                    } else {
                        quiets.sort_by(|a, b| b.score.cmp(&a.score));
                    }
                    self.stage = Stage::Quiet;
                }
                Stage::Quiet => {
                    while self.cur < self.moves.len() {
                        let mv = self.moves.as_slice()[self.cur].mv;
                        self.cur += 1;
                        if mv != self.tt_move
                            && mv != self.killers[0]
                            && mv != self.killers[1]
                            && mv != self.counter_move
                        {
                            return mv;
                        }
                    }
                    self.cur = 0;
                    self.stage = Stage::BadCaptures;
                }
                Stage::BadCaptures => {
                    if self.cur < self.end_bad_captures {
                        let mv = self.moves.as_slice()[self.cur].mv;
                        self.cur += 1;
                        return mv;
                    }
                    self.stage = Stage::Exhausted;
                }

                Stage::EvasionsInit => {
                    self.cur = 0;
                    self.moves.truncate(0);
                    movegen::generate(GenType::Evasion, pos, &mut self.moves);
                    self.score_evasions(pos, ctx);
                    self.stage = Stage::AllEvasions;
                }
                Stage::AllEvasions => {
                    while self.cur < self.moves.len() {
                        let mv = self.moves.pick_best(self.cur).unwrap_or(Move::NONE);
                        self.cur += 1;
                        if mv != self.tt_move {
                            return mv;
                        }
                    }
                    self.stage = Stage::Exhausted;
                }

                Stage::ProbcutInit => {
                    self.cur = 0;
                    self.moves.truncate(0);
                    movegen::generate(GenType::CapturePlusPro, pos, &mut self.moves);
                    self.score_captures(pos);
                    self.stage = Stage::ProbcutCaptures;
                }
                Stage::ProbcutCaptures => {
                    while self.cur < self.moves.len() {
                        let mv = self.moves.pick_best(self.cur).unwrap_or(Move::NONE);
                        self.cur += 1;
                        if mv != self.tt_move && pos.see(mv, 0) > self.threshold {
                            return mv;
                        }
                    }
                    self.stage = Stage::Exhausted;
                }

                Stage::QCapturesInit => {
                    self.cur = 0;
                    self.moves.truncate(0);
                    movegen::generate(GenType::CapturePlusPro, pos, &mut self.moves);
                    self.score_captures(pos);
                    self.stage = Stage::QCaptures;
                }
                Stage::QCaptures => {
                    while self.cur < self.moves.len() {
                        let mv = self.moves.pick_best(self.cur).unwrap_or(Move::NONE);
                        self.cur += 1;
                        if mv != self.tt_move {
                            return mv;
                        }
                    }
                    self.stage = Stage::Exhausted;
                }

                Stage::RecapturesInit => {
                    self.cur = 0;
                    self.moves.truncate(0);
                    movegen::generate_recaptures(pos, self.recapture_sq, &mut self.moves);
                    self.score_captures(pos);
                    self.stage = Stage::Recaptures;
                }
                Stage::Recaptures => {
                    if self.cur < self.moves.len() {
                        let mv = self.moves.pick_best(self.cur).unwrap_or(Move::NONE);
                        self.cur += 1;
                        return mv;
                    }
                    self.stage = Stage::Exhausted;
                }

                Stage::Exhausted => return Move::NONE,
            }
        }
    }

    /// Victim value minus attacker rank.
    fn score_captures(&mut self, pos: &Position) {
        for em in self.moves.as_mut_slice() {
            debug_assert!(!em.mv.is_drop());
            em.score = piece_score(pos.piece_on(em.mv.to()).piece_type())
                - LVA[em.mv.piece_type_from().index()];
        }
    }

    fn score_quiets(&mut self, pos: &Position, ctx: &PickerContext<'_>) {
        let us = pos.turn();
        let from = self.cur;
        for em in &mut self.moves.as_mut_slice()[from..] {
            let moved = moved_piece(pos, em.mv);
            let to = em.mv.to();
            let mut score = ctx.history.get(moved, to);
            for key in ctx.cont_keys.iter().flatten() {
                score += ctx.cont_history.get(*key, moved, to);
            }
            score += ctx.from_to.get(us, em.mv);
            em.score = score;
        }
    }

    /// Captures first by value, quiet evasions by history.
    fn score_evasions(&mut self, pos: &Position, ctx: &PickerContext<'_>) {
        let us = pos.turn();
        for em in self.moves.as_mut_slice() {
            if em.mv.is_capture_or_pawn_promotion() {
                em.score = capture_piece_score(pos.piece_on(em.mv.to()).piece_type())
                    + EVASION_CAPTURE_BONUS;
                if em.mv.is_promotion() {
                    em.score += promote_piece_score(em.mv.piece_type_from());
                }
            } else {
                em.score = ctx.history.get(moved_piece(pos, em.mv), em.mv.to())
                    + ctx.from_to.get(us, em.mv);
            }
        }
    }
}

/// The piece that will sit on the destination (dropped or moved, before
/// promotion).
#[inline]
fn moved_piece(pos: &Position, mv: Move) -> Piece {
    if mv.is_drop() {
        Piece::new(pos.turn(), mv.dropped_piece_type())
    } else {
        pos.piece_on(mv.from_sq())
    }
}

fn advance(stage: Stage) -> Stage {
    match stage {
        Stage::MainTt => Stage::TacticalInit,
        Stage::GoodTacticals => Stage::Killer0,
        Stage::Killer0 => Stage::Killer1,
        Stage::Killer1 => Stage::Countermove,
        Stage::Countermove => Stage::QuietInit,
        Stage::EvasionTt => Stage::EvasionsInit,
        Stage::ProbcutTt => Stage::ProbcutInit,
        Stage::QsearchTt => Stage::QCapturesInit,
        other => other,
    }
}

/// Stable partition of positive-scored entries to the front; returns the
/// boundary.
fn partition_positive(moves: &mut [crate::position::types::ExtMove]) -> usize {
    let mut boundary = 0;
    for i in 0..moves.len() {
        if moves[i].score > 0 {
            moves.swap(boundary, i);
            boundary += 1;
        }
    }
    boundary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::movegen::legal_moves;

    fn empty_ctx<'a>(
        history: &'a HistoryStats,
        from_to: &'a FromToStats,
        cmh: &'a CounterMoveHistoryStats,
    ) -> PickerContext<'a> {
        PickerContext {
            history,
            from_to,
            cont_history: cmh,
            cont_keys: [None; 3],
        }
    }

    #[test]
    fn test_main_picker_yields_each_move_once() {
        let pos = Position::startpos();
        let history = HistoryStats::new();
        let from_to = FromToStats::new();
        let cmh = CounterMoveHistoryStats::new();
        let ctx = empty_ctx(&history, &from_to, &cmh);

        let mut picker = MovePicker::new_main(&pos, Move::NONE, 5, [Move::NONE; 2], Move::NONE);
        let mut seen = Vec::new();
        loop {
            let mv = picker.next_move(&pos, &ctx);
            if mv.is_none() {
                break;
            }
            assert!(!seen.contains(&mv), "{mv} yielded twice");
            seen.push(mv);
        }
        // Start position: all legal moves are quiet, no drops.
        assert_eq!(seen.len(), legal_moves(&pos).len());
    }

    #[test]
    fn test_tt_move_yields_first_and_never_again() {
        let pos = Position::startpos();
        let history = HistoryStats::new();
        let from_to = FromToStats::new();
        let cmh = CounterMoveHistoryStats::new();
        let ctx = empty_ctx(&history, &from_to, &cmh);

        let ttm = pos.move_from_usi("7g7f").unwrap();
        let mut picker = MovePicker::new_main(&pos, ttm, 5, [Move::NONE; 2], Move::NONE);
        let first = picker.next_move(&pos, &ctx);
        assert_eq!(first, ttm);
        loop {
            let mv = picker.next_move(&pos, &ctx);
            if mv.is_none() {
                break;
            }
            assert_ne!(mv, ttm);
        }
    }

    #[test]
    fn test_killer_ordering_before_other_quiets() {
        let pos = Position::startpos();
        let history = HistoryStats::new();
        let from_to = FromToStats::new();
        let cmh = CounterMoveHistoryStats::new();
        let ctx = empty_ctx(&history, &from_to, &cmh);

        let killer = pos.move_from_usi("2g2f").unwrap();
        let mut picker =
            MovePicker::new_main(&pos, Move::NONE, 5, [killer, Move::NONE], Move::NONE);
        let first = picker.next_move(&pos, &ctx);
        assert_eq!(first, killer);
    }

    #[test]
    fn test_evasion_picker_covers_legal_evasions() {
        let pos = Position::from_sfen("4k4/9/9/9/4r4/9/9/9/4K4 b - 1").unwrap();
        assert!(pos.in_check());
        let history = HistoryStats::new();
        let from_to = FromToStats::new();
        let cmh = CounterMoveHistoryStats::new();
        let ctx = empty_ctx(&history, &from_to, &cmh);

        let mut picker = MovePicker::new_qsearch(&pos, Move::NONE, 0, Square::from_index(0));
        let mut yielded = Vec::new();
        loop {
            let mv = picker.next_move(&pos, &ctx);
            if mv.is_none() {
                break;
            }
            yielded.push(mv);
        }
        let pinned = pos.pinned_bb();
        for mv in legal_moves(&pos).iter() {
            let _ = pinned;
            assert!(yielded.contains(&mv), "{mv} missing from evasion picker");
        }
    }
}
