//! The recursive search: principal-variation alpha-beta and quiescence.

use std::sync::atomic::Ordering;

use once_cell::sync::Lazy;

use crate::eval;
use crate::eval::material::PAWN_SCORE;
use crate::position::{CheckInfo, Move, Piece, Repetition, Square};
use crate::search::picker::{MovePicker, PickerContext};
use crate::search::stats::CounterMoveHistoryStats;
use crate::search::threads::Worker;
use crate::search::{
    mate_in, mated_in, score_from_tt, score_to_tt, RepetitionRule, MAX_PLY, SCORE_DRAW,
    SCORE_INFINITE, SCORE_KNOWN_WIN, SCORE_MATED_IN_MAX_PLY, SCORE_MATE_IN_MAX_PLY, SCORE_ZERO,
    TEMPO,
};
use crate::tt::{
    BOUND_EXACT, BOUND_LOWER, BOUND_NONE, BOUND_UPPER, DEPTH_NONE, DEPTH_QCHECKS,
    DEPTH_QNO_CHECKS, SCORE_NONE,
};

const RAZOR_MARGIN: [i32; 4] = [483, 570, 603, 554];

#[inline]
fn futility_margin(depth: i32) -> i32 {
    150 * depth
}

/// Precomputed reduction and move-count tables.
struct SearchTables {
    /// `[pv][improving][depth][move_count]`
    reductions: Vec<i32>,
    /// `[improving][depth]`
    futility_move_counts: [[i32; 16]; 2],
}

static TABLES: Lazy<SearchTables> = Lazy::new(|| {
    let mut reductions = vec![0i32; 2 * 2 * 64 * 64];
    let idx = |pv: usize, imp: usize, d: usize, mc: usize| ((pv * 2 + imp) * 64 + d) * 64 + mc;
    for improving in 0..2 {
        for d in 1..64 {
            for mc in 1..64 {
                let r = (d as f64).ln() * (mc as f64).ln() / 2.0;
                if r < 0.80 {
                    continue;
                }
                let non_pv = r.round() as i32;
                reductions[idx(0, improving, d, mc)] = non_pv;
                reductions[idx(1, improving, d, mc)] = (non_pv - 1).max(0);
                if improving == 0 && non_pv >= 2 {
                    reductions[idx(0, improving, d, mc)] += 1;
                }
            }
        }
    }

    let mut futility_move_counts = [[0i32; 16]; 2];
    for d in 0..16 {
        futility_move_counts[0][d] = (2.4 + 0.773 * (d as f64).powf(1.8)) as i32;
        futility_move_counts[1][d] = (2.9 + 1.045 * (d as f64 + 0.49).powf(1.8)) as i32;
    }
    SearchTables {
        reductions,
        futility_move_counts,
    }
});

#[inline]
fn reduction(pv: bool, improving: bool, depth: i32, move_count: i32) -> i32 {
    let d = depth.min(63) as usize;
    let mc = move_count.min(63) as usize;
    TABLES.reductions[((usize::from(pv) * 2 + usize::from(improving)) * 64 + d) * 64 + mc]
}

#[inline]
fn futility_move_count(improving: bool, depth: i32) -> i32 {
    TABLES.futility_move_counts[usize::from(improving)][depth.clamp(0, 15) as usize]
}

/// The piece standing on the destination after the move, ignoring
/// promotion (the ordering tables key on the pre-promotion piece).
#[inline]
fn moved_piece(pos: &crate::position::Position, mv: Move) -> Piece {
    if mv.is_drop() {
        Piece::new(pos.turn(), mv.dropped_piece_type())
    } else {
        pos.piece_on(mv.from_sq())
    }
}

impl Worker {
    #[inline]
    fn stack(&self, ply: i32) -> &crate::search::StackEntry {
        &self.stack[(ply + 5) as usize]
    }

    #[inline]
    fn stack_mut(&mut self, ply: i32) -> &mut crate::search::StackEntry {
        &mut self.stack[(ply + 5) as usize]
    }

    /// Static evaluation with the incremental chain: reuse this node's sum
    /// when present, otherwise cache probe / differential update / full
    /// computation, remembering the sum on the stack.
    fn evaluate_at(&mut self, ply: i32) -> i32 {
        if let Some(sum) = self.stack(ply).static_eval_raw {
            return eval::score_from_sum(&self.pos, sum);
        }
        let prev = self.stack(ply - 1).static_eval_raw;
        let (score, sum) = eval::evaluate(
            &mut self.pos,
            &self.shared.evaluator,
            &self.shared.eval_hash,
            prev,
        );
        self.stack_mut(ply).static_eval_raw = Some(sum);
        score
    }

    fn picker_ctx(&self, ply: i32) -> PickerContext<'_> {
        PickerContext {
            history: &self.history,
            from_to: &self.from_to,
            cont_history: &self.cont_history,
            cont_keys: [
                self.stack(ply - 1).cont_history_key,
                self.stack(ply - 2).cont_history_key,
                self.stack(ply - 4).cont_history_key,
            ],
        }
    }

    fn update_cm_stats(&mut self, ply: i32, pc: Piece, to: Square, bonus: i32) {
        for offset in [1, 2, 4] {
            if let Some(key) = self.stack(ply - offset).cont_history_key {
                self.cont_history.update(key, pc, to, bonus);
            }
        }
    }

    /// Killer/counter/history bookkeeping on a quiet beta cutoff; every
    /// other searched quiet is penalized.
    fn update_stats(&mut self, ply: i32, mv: Move, quiets: &[Move], bonus: i32) {
        if self.stack(ply).killers[0] != mv {
            let k0 = self.stack(ply).killers[0];
            self.stack_mut(ply).killers = [mv, k0];
        }

        let us = self.pos.turn();
        let pc = moved_piece(&self.pos, mv);
        self.from_to.update(us, mv, bonus);
        self.history.update(pc, mv.to(), bonus);
        self.update_cm_stats(ply, pc, mv.to(), bonus);

        let prev = self.stack(ply - 1).current_move;
        if self.stack(ply - 1).cont_history_key.is_some() && !prev.is_none() && prev != Move::NULL {
            let prev_sq = prev.to();
            let prev_pc = self.pos.piece_on(prev_sq);
            self.counter_moves.update(prev_pc, prev_sq, mv);
        }

        for &quiet in quiets {
            let qpc = moved_piece(&self.pos, quiet);
            self.from_to.update(us, quiet, -bonus);
            self.history.update(qpc, quiet.to(), -bonus);
            self.update_cm_stats(ply, qpc, quiet.to(), -bonus);
        }
    }

    fn draw_score(&self, ply: i32) -> i32 {
        match self.shared.options.repetition_rule {
            RepetitionRule::Standard => SCORE_DRAW,
            RepetitionRule::BanBlackRepetition => {
                if self.pos.turn().is_black() {
                    mated_in(ply)
                } else {
                    mate_in(ply)
                }
            }
            RepetitionRule::BanWhiteRepetition => {
                if self.pos.turn().is_black() {
                    mate_in(ply)
                } else {
                    mated_in(ply)
                }
            }
        }
    }

    /// Main recursive search. `ply` is 0 at the root.
    #[allow(clippy::too_many_lines)]
    pub(crate) fn search(
        &mut self,
        ply: i32,
        mut alpha: i32,
        mut beta: i32,
        depth: i32,
        cut_node: bool,
        pv_node: bool,
    ) -> i32 {
        let root_node = pv_node && ply == 0;

        debug_assert!(-SCORE_INFINITE <= alpha && alpha < beta && beta <= SCORE_INFINITE);
        debug_assert!(pv_node || alpha == beta - 1);
        debug_assert!(depth > 0 && depth < MAX_PLY);

        // step 1: node bookkeeping, time polling.
        if self.comm.reset_calls.swap(false, Ordering::Relaxed) {
            self.calls_cnt = 0;
        }
        self.calls_cnt += 1;
        if self.calls_cnt > 4096 {
            self.calls_cnt = 0;
            self.shared.request_time_check();
            self.shared.check_time();
        }

        if pv_node && self.max_ply < ply {
            self.max_ply = ply;
        }

        if !root_node {
            // step 2: repetition and horizon.
            match self.pos.is_draw(16) {
                Repetition::None => {
                    if self.shared.signals.stop.load(Ordering::Relaxed) || ply >= MAX_PLY {
                        return SCORE_DRAW;
                    }
                }
                Repetition::Draw => return self.draw_score(ply),
                Repetition::Win => return mate_in(ply),
                Repetition::Lose => return mated_in(ply),
                Repetition::Superior => {
                    if ply != 2 {
                        return SCORE_MATE_IN_MAX_PLY;
                    }
                }
                Repetition::Inferior => {
                    if ply != 2 {
                        return SCORE_MATED_IN_MAX_PLY;
                    }
                }
            }

            // step 3: mate distance pruning.
            alpha = alpha.max(mated_in(ply));
            beta = beta.min(mate_in(ply + 1));
            if alpha >= beta {
                return alpha;
            }
        }

        let in_check = self.pos.in_check();
        self.stack_mut(ply).current_move = Move::NONE;
        self.stack_mut(ply).move_count = 0;
        self.stack_mut(ply).cont_history_key = None;
        self.stack_mut(ply + 1).excluded_move = Move::NONE;
        self.stack_mut(ply + 1).skip_early_pruning = false;
        self.stack_mut(ply + 2).killers = [Move::NONE; 2];
        let mut best_move = Move::NONE;
        let mut best_score = -SCORE_INFINITE;

        self.comm.nodes.fetch_add(1, Ordering::Relaxed);

        // step 4: transposition table.
        let excluded_move = self.stack(ply).excluded_move;
        let pos_key = if excluded_move.is_none() {
            self.pos.key()
        } else {
            self.pos.exclusion_key()
        };
        let (tt_hit, mut tt_data, _) = self.shared.tt.probe(pos_key);
        let mut tt_score = if tt_hit {
            score_from_tt(tt_data.score, ply)
        } else {
            SCORE_NONE
        };
        let mut tt_move = if root_node {
            self.root_moves[self.pv_idx].pv[0]
        } else if tt_hit {
            let mv = self.pos.move16_to_move(tt_data.move16);
            if !mv.is_none() && self.pos.move_is_pseudo_legal(mv, true) {
                mv
            } else {
                Move::NONE
            }
        } else {
            Move::NONE
        };

        if !pv_node
            && tt_hit
            && tt_data.depth >= depth
            && tt_score != SCORE_NONE
            && (if tt_score >= beta {
                tt_data.bound & BOUND_LOWER != 0
            } else {
                tt_data.bound & BOUND_UPPER != 0
            })
        {
            self.stack_mut(ply).current_move = tt_move;
            if tt_score >= beta && !tt_move.is_none() {
                let d = depth;
                if !tt_move.is_capture_or_pawn_promotion() {
                    let bonus = d * d + 2 * d - 2;
                    self.update_stats(ply, tt_move, &[], bonus);
                }
                let prev = self.stack(ply - 1).current_move;
                if self.stack(ply - 1).move_count == 1
                    && !prev.is_none()
                    && prev != Move::NULL
                    && !prev.is_capture_or_pawn_promotion()
                {
                    let penalty = d * d + 4 * d + 1;
                    let prev_sq = prev.to();
                    let prev_pc = self.pos.piece_on(prev_sq);
                    self.update_cm_stats(ply - 1, prev_pc, prev_sq, -penalty);
                }
            }
            return tt_score;
        }

        // One-ply mate detector.
        if !root_node && !in_check {
            let mate_move = self.pos.mate_move_in_1ply();
            if !mate_move.is_none() {
                let score = mate_in(ply);
                self.stack_mut(ply).static_eval = score;
                let (_, _, entry) = self.shared.tt.probe(pos_key);
                entry.save(
                    pos_key,
                    score_to_tt(score, ply),
                    BOUND_EXACT,
                    depth,
                    mate_move.to_u16(),
                    score,
                    self.shared.tt.generation(),
                );
                return score;
            }
        }

        // step 5: static evaluation. Always run the evaluator so its
        // incremental chain stays seeded.
        let node_eval = self.evaluate_at(ply);
        let mut eval_score;
        if in_check {
            self.stack_mut(ply).static_eval = SCORE_NONE;
            eval_score = SCORE_NONE;
        } else {
            self.stack_mut(ply).static_eval = node_eval;
            eval_score = node_eval;
            if tt_hit {
                if tt_score != SCORE_NONE
                    && tt_data.bound
                        & (if tt_score > eval_score {
                            BOUND_LOWER
                        } else {
                            BOUND_UPPER
                        })
                        != 0
                {
                    eval_score = tt_score;
                }
            } else {
                if self.stack(ply - 1).current_move == Move::NULL {
                    let parent = self.stack(ply - 1).static_eval;
                    let flipped = -parent + 2 * TEMPO;
                    self.stack_mut(ply).static_eval = flipped;
                    eval_score = flipped;
                }
                let (_, _, entry) = self.shared.tt.probe(pos_key);
                entry.save(
                    pos_key,
                    SCORE_NONE,
                    BOUND_NONE,
                    DEPTH_NONE,
                    Move::NONE.to_u16(),
                    self.stack(ply).static_eval,
                    self.shared.tt.generation(),
                );
            }
        }

        if !in_check && !self.stack(ply).skip_early_pruning {
            // step 6: razoring.
            if !pv_node
                && depth < 4
                && tt_move.is_none()
                && eval_score + RAZOR_MARGIN[depth as usize] <= alpha
            {
                if depth <= 1 {
                    return self.qsearch(ply, alpha, beta, 0, false, false);
                }
                let ralpha = alpha - RAZOR_MARGIN[depth as usize];
                let s = self.qsearch(ply, ralpha, ralpha + 1, 0, false, false);
                if s <= ralpha {
                    return s;
                }
            }

            // step 7: static null move (reverse futility).
            if !root_node
                && depth < 7
                && eval_score - futility_margin(depth) >= beta
                && eval_score < SCORE_KNOWN_WIN
            {
                return eval_score - futility_margin(depth);
            }

            // step 8: null move.
            if !pv_node
                && eval_score >= beta
                && (self.stack(ply).static_eval >= beta - 35 * (depth - 6) || depth >= 13)
            {
                self.stack_mut(ply).current_move = Move::NULL;
                self.stack_mut(ply).cont_history_key = None;

                let r = (823 + 67 * depth) / 256 + ((eval_score - beta) / PAWN_SCORE).min(3);

                self.pos.do_null_move();
                self.shared.tt.prefetch(self.pos.key());
                self.stack_mut(ply + 1).skip_early_pruning = true;
                self.stack_mut(ply + 1).static_eval_raw = self.stack(ply).static_eval_raw;
                let null_score = if depth - r < 1 {
                    -self.qsearch(ply + 1, -beta, -beta + 1, 0, false, false)
                } else {
                    -self.search(ply + 1, -beta, -beta + 1, depth - r, !cut_node, false)
                };
                self.stack_mut(ply + 1).skip_early_pruning = false;
                self.pos.undo_null_move();

                if null_score >= beta {
                    let null_score = if null_score >= SCORE_MATE_IN_MAX_PLY {
                        beta
                    } else {
                        null_score
                    };
                    if depth < 12 && beta.abs() < SCORE_KNOWN_WIN {
                        return null_score;
                    }
                    // Verification search at the same node.
                    self.stack_mut(ply).skip_early_pruning = true;
                    let s = if depth - r < 1 {
                        self.qsearch(ply, beta - 1, beta, 0, false, false)
                    } else {
                        self.search(ply, beta - 1, beta, depth - r, false, false)
                    };
                    self.stack_mut(ply).skip_early_pruning = false;
                    if s >= beta {
                        return null_score;
                    }
                }
            }

            // step 9: probcut.
            if !pv_node && depth >= 5 && beta.abs() < SCORE_MATE_IN_MAX_PLY {
                let rbeta = (beta + 200).min(SCORE_INFINITE);
                let rdepth = depth - 4;
                let threshold = rbeta - self.stack(ply).static_eval;
                let ci = CheckInfo::new(&self.pos);
                let mut picker = MovePicker::new_probcut(&self.pos, tt_move, threshold);
                loop {
                    let ctx = self.picker_ctx(ply);
                    let mv = picker.next_move(&self.pos, &ctx);
                    if mv.is_none() {
                        break;
                    }
                    if !self.pos.pseudo_legal_move_is_legal(mv, ci.pinned, false, false) {
                        continue;
                    }
                    self.stack_mut(ply).current_move = mv;
                    self.stack_mut(ply).cont_history_key =
                        Some(CounterMoveHistoryStats::key(moved_piece(&self.pos, mv), mv.to()));
                    let gives_check = self.pos.move_gives_check(mv, &ci);
                    self.pos.do_move(mv, &ci, gives_check);
                    self.shared.tt.prefetch(self.pos.key());
                    self.stack_mut(ply + 1).static_eval_raw = None;
                    let score = -self.search(ply + 1, -rbeta, -rbeta + 1, rdepth, !cut_node, false);
                    self.pos.undo_move(mv);
                    if score >= rbeta {
                        return score;
                    }
                }
            }

            // step 10: internal iterative deepening.
            if depth >= 6
                && tt_move.is_none()
                && (pv_node || self.stack(ply).static_eval + 256 >= beta)
            {
                let d = (3 * depth / 4 - 2).max(1);
                self.stack_mut(ply).skip_early_pruning = true;
                self.search(ply, alpha, beta, d, cut_node, pv_node);
                self.stack_mut(ply).skip_early_pruning = false;

                let (hit, data, _) = self.shared.tt.probe(pos_key);
                tt_data = data;
                tt_score = if hit { score_from_tt(data.score, ply) } else { SCORE_NONE };
                tt_move = if hit {
                    let mv = self.pos.move16_to_move(data.move16);
                    if !mv.is_none() && self.pos.move_is_pseudo_legal(mv, true) {
                        mv
                    } else {
                        Move::NONE
                    }
                } else {
                    Move::NONE
                };
            }
        }

        // step 11: the move loop.
        let ci = CheckInfo::new(&self.pos);
        let counter_move = {
            let prev = self.stack(ply - 1).current_move;
            if prev.is_none() || prev == Move::NULL {
                Move::NONE
            } else {
                self.counter_moves.get(self.pos.piece_on(prev.to()), prev.to())
            }
        };
        let mut picker = MovePicker::new_main(
            &self.pos,
            tt_move,
            depth,
            self.stack(ply).killers,
            counter_move,
        );

        let improving = {
            let two_back = self.stack(ply - 2).static_eval;
            self.stack(ply).static_eval >= two_back || two_back == SCORE_NONE
        };

        let singular_extension_node = !root_node
            && depth >= 8
            && !tt_move.is_none()
            && tt_score != SCORE_NONE
            && tt_score.abs() < SCORE_KNOWN_WIN
            && excluded_move.is_none()
            && tt_data.bound & BOUND_LOWER != 0
            && tt_data.depth >= depth - 3;

        let mut move_count = 0;
        let mut quiet_count = 0usize;
        let mut quiets_searched = [Move::NONE; 64];
        let us = self.pos.turn();

        loop {
            let mv = {
                let ctx = self.picker_ctx(ply);
                picker.next_move(&self.pos, &ctx)
            };
            if mv.is_none() {
                break;
            }
            if mv == excluded_move {
                continue;
            }

            if root_node
                && !self.root_moves[self.pv_idx..]
                    .iter()
                    .any(|rm| rm.pv[0] == mv)
            {
                continue;
            }

            move_count += 1;
            self.stack_mut(ply).move_count = move_count;

            if pv_node {
                self.stack_mut(ply + 1).pv.clear();
            }

            let capture_or_pawn_promotion = mv.is_capture_or_pawn_promotion();
            let piece_moved = moved_piece(&self.pos, mv);
            let gives_check = self.pos.move_gives_check(mv, &ci);
            let move_count_pruning =
                depth < 16 && move_count >= futility_move_count(improving, depth);

            // step 12: check extension.
            let mut extension = 0;
            if gives_check && !move_count_pruning && self.pos.see_sign(mv) >= SCORE_ZERO {
                extension = 1;
            }

            // Singular extension: is the hash move uniquely best?
            if singular_extension_node
                && mv == tt_move
                && extension == 0
                && self.pos.pseudo_legal_move_is_legal(mv, ci.pinned, false, false)
            {
                let r_beta = tt_score - 2 * depth;
                let d = depth / 2;
                self.stack_mut(ply).excluded_move = mv;
                self.stack_mut(ply).skip_early_pruning = true;
                let score = self.search(ply, r_beta - 1, r_beta, d, cut_node, false);
                self.stack_mut(ply).skip_early_pruning = false;
                self.stack_mut(ply).excluded_move = Move::NONE;

                if score < r_beta {
                    extension = 1;
                }
            }

            let new_depth = depth - 1 + extension;

            // step 13: shallow-depth pruning.
            if !root_node && !in_check && best_score > SCORE_MATED_IN_MAX_PLY {
                if !capture_or_pawn_promotion && !gives_check {
                    if move_count_pruning {
                        continue;
                    }

                    let lmr_depth =
                        (new_depth - reduction(pv_node, improving, depth, move_count)).max(0);

                    // Continuation-history pruning.
                    let k1 = self.stack(ply - 1).cont_history_key;
                    let k2 = self.stack(ply - 2).cont_history_key;
                    let k4 = self.stack(ply - 4).cont_history_key;
                    let cmh_bad = |k: Option<(usize, usize)>| {
                        k.map_or(true, |key| {
                            self.cont_history.get(key, piece_moved, mv.to()) < SCORE_ZERO
                        })
                    };
                    if lmr_depth < 3
                        && cmh_bad(k1)
                        && cmh_bad(k2)
                        && (cmh_bad(k4) || (k1.is_some() && k2.is_some()))
                    {
                        continue;
                    }

                    if lmr_depth < 7
                        && self.stack(ply).static_eval + 256 + 200 * lmr_depth <= alpha
                    {
                        continue;
                    }

                    if lmr_depth < 8 && self.pos.see_sign(mv) < -35 * lmr_depth * lmr_depth {
                        continue;
                    }
                } else if depth < 7 && self.pos.see_sign(mv) < -35 * depth * depth {
                    continue;
                }
            }

            // Root moves were legality-checked up front.
            if !root_node && !self.pos.pseudo_legal_move_is_legal(mv, ci.pinned, false, false) {
                move_count -= 1;
                self.stack_mut(ply).move_count = move_count;
                continue;
            }

            self.stack_mut(ply).current_move = mv;
            self.stack_mut(ply).cont_history_key =
                Some(CounterMoveHistoryStats::key(piece_moved, mv.to()));

            // step 14.
            self.pos.do_move(mv, &ci, gives_check);
            self.shared.tt.prefetch(self.pos.key());
            self.stack_mut(ply + 1).static_eval_raw = None;

            // step 15: late move reductions.
            let mut score;
            let do_full_depth_search;
            if depth >= 3
                && move_count > 1
                && (!capture_or_pawn_promotion || move_count_pruning)
            {
                let mut r = reduction(pv_node, improving, depth, move_count);
                if capture_or_pawn_promotion {
                    r -= if r > 0 { 1 } else { 0 };
                } else {
                    if cut_node {
                        r += 2;
                    }
                    let mut val = self.history.get(piece_moved, mv.to());
                    for key in [
                        self.stack(ply - 1).cont_history_key,
                        self.stack(ply - 2).cont_history_key,
                        self.stack(ply - 4).cont_history_key,
                    ]
                    .iter()
                    .flatten()
                    {
                        val += self.cont_history.get(*key, piece_moved, mv.to());
                    }
                    val += self.from_to.get(us, mv);
                    let r_hist = (val - 8000) / 20000;
                    r = (r - r_hist).max(0);
                }

                let d = (new_depth - r).max(1);
                score = -self.search(ply + 1, -(alpha + 1), -alpha, d, true, false);
                do_full_depth_search = score > alpha && d != new_depth;
            } else {
                score = SCORE_ZERO;
                do_full_depth_search = !pv_node || move_count > 1;
            }

            // step 16: full-depth null-window, then PV re-search.
            if do_full_depth_search {
                score = if new_depth < 1 {
                    -self.qsearch(ply + 1, -(alpha + 1), -alpha, 0, false, gives_check)
                } else {
                    -self.search(ply + 1, -(alpha + 1), -alpha, new_depth, !cut_node, false)
                };
            }

            if pv_node && (move_count == 1 || (score > alpha && (root_node || score < beta))) {
                self.stack_mut(ply + 1).pv.clear();
                score = if new_depth < 1 {
                    -self.qsearch(ply + 1, -beta, -alpha, 0, true, gives_check)
                } else {
                    -self.search(ply + 1, -beta, -alpha, new_depth, false, true)
                };
            }

            // step 17.
            self.pos.undo_move(mv);

            debug_assert!(-SCORE_INFINITE < score && score < SCORE_INFINITE);

            // step 18.
            if self.shared.signals.stop.load(Ordering::Relaxed) {
                return SCORE_ZERO;
            }

            if root_node {
                if let Some(i) = self.root_moves.iter().position(|rm| rm.pv[0] == mv) {
                    if move_count == 1 || score > alpha {
                        let child_pv = self.stack(ply + 1).pv.clone();
                        let rm = &mut self.root_moves[i];
                        rm.score = score;
                        rm.pv.truncate(1);
                        rm.pv.extend(child_pv);
                        if move_count > 1 && self.idx == 0 {
                            self.best_move_changes += 1.0;
                        }
                    } else {
                        self.root_moves[i].score = -SCORE_INFINITE;
                    }
                }
            }

            if score > best_score {
                best_score = score;
                if score > alpha {
                    if pv_node && self.idx == 0 {
                        let easy = self.shared.easy_move_for(self.pos.key());
                        if !easy.is_none() && (easy != mv || move_count > 1) {
                            self.shared.clear_easy_move();
                        }
                    }
                    best_move = mv;

                    if pv_node && !root_node {
                        let child_pv = self.stack(ply + 1).pv.clone();
                        let entry = self.stack_mut(ply);
                        entry.pv.clear();
                        entry.pv.push(mv);
                        entry.pv.extend(child_pv);
                    }

                    if pv_node && score < beta {
                        alpha = score;
                    } else {
                        break; // fail high
                    }
                }
            }

            if !capture_or_pawn_promotion && mv != best_move && quiet_count < 64 {
                quiets_searched[quiet_count] = mv;
                quiet_count += 1;
            }
        }

        // step 20: terminal bookkeeping.
        if move_count == 0 {
            best_score = if excluded_move.is_none() {
                mated_in(ply)
            } else {
                alpha
            };
        } else if !best_move.is_none() {
            let d = depth;
            if !best_move.is_capture_or_pawn_promotion() {
                let bonus = d * d + 2 * d - 2;
                let quiets = quiets_searched[..quiet_count].to_vec();
                self.update_stats(ply, best_move, &quiets, bonus);
            }
            let prev = self.stack(ply - 1).current_move;
            if self.stack(ply - 1).move_count == 1
                && !prev.is_none()
                && prev != Move::NULL
                && prev.is_capture_or_pawn_promotion()
            {
                let penalty = d * d + 4 * d + 1;
                let prev_sq = prev.to();
                let prev_pc = self.pos.piece_on(prev_sq);
                self.update_cm_stats(ply - 1, prev_pc, prev_sq, -penalty);
            }
        } else {
            let prev = self.stack(ply - 1).current_move;
            if depth >= 3
                && !prev.is_none()
                && prev != Move::NULL
                && !prev.is_capture_or_promotion()
            {
                let d = depth;
                let bonus = d * d + 2 * d - 2;
                let prev_sq = prev.to();
                let prev_pc = self.pos.piece_on(prev_sq);
                self.update_cm_stats(ply - 1, prev_pc, prev_sq, bonus);
            }
        }

        let bound = if best_score >= beta {
            BOUND_LOWER
        } else if pv_node && !best_move.is_none() {
            BOUND_EXACT
        } else {
            BOUND_UPPER
        };
        let (_, _, entry) = self.shared.tt.probe(pos_key);
        entry.save(
            pos_key,
            score_to_tt(best_score, ply),
            bound,
            depth,
            best_move.to_u16(),
            self.stack(ply).static_eval,
            self.shared.tt.generation(),
        );

        debug_assert!(-SCORE_INFINITE < best_score && best_score < SCORE_INFINITE);
        best_score
    }

    /// Quiescence: captures (and evasions when in check) to a quiet stand.
    pub(crate) fn qsearch(
        &mut self,
        ply: i32,
        mut alpha: i32,
        beta: i32,
        depth: i32,
        pv_node: bool,
        in_check: bool,
    ) -> i32 {
        debug_assert_eq!(in_check, self.pos.in_check());
        debug_assert!(-SCORE_INFINITE <= alpha && alpha < beta && beta <= SCORE_INFINITE);
        debug_assert!(pv_node || alpha == beta - 1);
        debug_assert!(depth <= 0);

        let old_alpha = alpha;
        if pv_node {
            self.stack_mut(ply).pv.clear();
        }
        self.stack_mut(ply).current_move = Move::NONE;
        let mut best_move = Move::NONE;

        if ply >= MAX_PLY {
            return SCORE_DRAW;
        }

        let tt_depth = if in_check || depth >= DEPTH_QCHECKS {
            DEPTH_QCHECKS
        } else {
            DEPTH_QNO_CHECKS
        };

        let pos_key = self.pos.key();
        let (tt_hit, tt_data, _) = self.shared.tt.probe(pos_key);
        let tt_move = if tt_hit {
            let mv = self.pos.move16_to_move(tt_data.move16);
            if !mv.is_none() && self.pos.move_is_pseudo_legal(mv, true) {
                mv
            } else {
                Move::NONE
            }
        } else {
            Move::NONE
        };
        let tt_score = if tt_hit {
            score_from_tt(tt_data.score, ply)
        } else {
            SCORE_NONE
        };

        if !pv_node
            && tt_hit
            && tt_data.depth >= tt_depth
            && tt_score != SCORE_NONE
            && (if tt_score >= beta {
                tt_data.bound & BOUND_LOWER != 0
            } else {
                tt_data.bound & BOUND_UPPER != 0
            })
        {
            self.stack_mut(ply).current_move = tt_move;
            return tt_score;
        }

        self.comm.nodes.fetch_add(1, Ordering::Relaxed);

        // Evaluate unconditionally so the differential chain stays seeded
        // for the subtree.
        let node_eval = self.evaluate_at(ply);

        let mut best_score;
        let futility_base;
        if in_check {
            self.stack_mut(ply).static_eval = SCORE_NONE;
            best_score = -SCORE_INFINITE;
            futility_base = -SCORE_INFINITE;
        } else {
            let mate_move = self.pos.mate_move_in_1ply();
            if !mate_move.is_none() {
                return mate_in(ply);
            }
            if tt_hit {
                let stored_eval = if tt_data.eval == SCORE_NONE {
                    node_eval
                } else {
                    tt_data.eval
                };
                best_score = stored_eval;
                self.stack_mut(ply).static_eval = stored_eval;
                if tt_score != SCORE_NONE
                    && tt_data.bound
                        & (if tt_score > best_score {
                            BOUND_LOWER
                        } else {
                            BOUND_UPPER
                        })
                        != 0
                {
                    best_score = tt_score;
                }
            } else if self.stack(ply - 1).current_move == Move::NULL {
                let flipped = -self.stack(ply - 1).static_eval + 2 * TEMPO;
                self.stack_mut(ply).static_eval = flipped;
                best_score = flipped;
            } else {
                self.stack_mut(ply).static_eval = node_eval;
                best_score = node_eval;
            }

            // Stand pat.
            if best_score >= beta {
                if !tt_hit {
                    let (_, _, entry) = self.shared.tt.probe(pos_key);
                    entry.save(
                        pos_key,
                        score_to_tt(best_score, ply),
                        BOUND_LOWER,
                        DEPTH_NONE,
                        Move::NONE.to_u16(),
                        self.stack(ply).static_eval,
                        self.shared.tt.generation(),
                    );
                }
                return best_score;
            }

            if pv_node && best_score > alpha {
                alpha = best_score;
            }

            futility_base = best_score + 128;
        }

        let recapture_sq = {
            let prev = self.stack(ply - 1).current_move;
            if prev.is_none() || prev == Move::NULL {
                Square::from_index(0)
            } else {
                prev.to()
            }
        };
        let ci = CheckInfo::new(&self.pos);
        let mut picker = MovePicker::new_qsearch(&self.pos, tt_move, depth, recapture_sq);

        loop {
            let mv = {
                let ctx = self.picker_ctx(ply);
                picker.next_move(&self.pos, &ctx)
            };
            if mv.is_none() {
                break;
            }

            let gives_check = self.pos.move_gives_check(mv, &ci);

            // Futility: the capture cannot lift alpha.
            if !in_check && !gives_check && futility_base > -SCORE_KNOWN_WIN {
                let mut futility_score = futility_base
                    + crate::eval::material::capture_piece_score(
                        self.pos.piece_on(mv.to()).piece_type(),
                    );
                if mv.is_promotion() {
                    futility_score +=
                        crate::eval::material::promote_piece_score(mv.piece_type_from());
                }

                if futility_score <= alpha {
                    best_score = best_score.max(futility_score);
                    continue;
                }

                if futility_base <= alpha && self.pos.see(mv, 0) <= SCORE_ZERO {
                    best_score = best_score.max(futility_base);
                    continue;
                }
            }

            let evasion_prunable = in_check
                && best_score > SCORE_MATED_IN_MAX_PLY
                && !mv.is_capture_or_pawn_promotion();

            if (!in_check || evasion_prunable)
                && !(mv.is_promotion() && mv.piece_type_from() == crate::position::PieceType::PAWN)
                && self.pos.see_sign(mv) < SCORE_ZERO
            {
                continue;
            }

            if !self.pos.pseudo_legal_move_is_legal(mv, ci.pinned, false, false) {
                continue;
            }

            self.stack_mut(ply).current_move = mv;
            self.stack_mut(ply).cont_history_key =
                Some(CounterMoveHistoryStats::key(moved_piece(&self.pos, mv), mv.to()));

            self.pos.do_move(mv, &ci, gives_check);
            self.shared.tt.prefetch(self.pos.key());
            self.stack_mut(ply + 1).static_eval_raw = None;
            let score = -self.qsearch(ply + 1, -beta, -alpha, depth - 1, pv_node, gives_check);
            self.pos.undo_move(mv);

            debug_assert!(-SCORE_INFINITE < score && score < SCORE_INFINITE);

            if score > best_score {
                best_score = score;

                if score > alpha {
                    if pv_node {
                        let child_pv = self.stack(ply + 1).pv.clone();
                        let entry = self.stack_mut(ply);
                        entry.pv.clear();
                        entry.pv.push(mv);
                        entry.pv.extend(child_pv);
                    }
                    if pv_node && score < beta {
                        alpha = score;
                        best_move = mv;
                    } else {
                        // Fail high.
                        let (_, _, entry) = self.shared.tt.probe(pos_key);
                        entry.save(
                            pos_key,
                            score_to_tt(score, ply),
                            BOUND_LOWER,
                            tt_depth,
                            mv.to_u16(),
                            self.stack(ply).static_eval,
                            self.shared.tt.generation(),
                        );
                        return score;
                    }
                }
            }
        }

        if in_check && best_score == -SCORE_INFINITE {
            return mated_in(ply);
        }

        let bound = if pv_node && best_score > old_alpha {
            BOUND_EXACT
        } else {
            BOUND_UPPER
        };
        let (_, _, entry) = self.shared.tt.probe(pos_key);
        entry.save(
            pos_key,
            score_to_tt(best_score, ply),
            bound,
            tt_depth,
            best_move.to_u16(),
            self.stack(ply).static_eval,
            self.shared.tt.generation(),
        );

        debug_assert!(-SCORE_INFINITE < best_score && best_score < SCORE_INFINITE);
        best_score
    }
}
