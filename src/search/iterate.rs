//! Per-worker iterative deepening with aspiration windows, and the main
//! worker's reporting / early-stop heuristics.

use std::sync::atomic::Ordering;

use crate::eval::material::PAWN_SCORE;
use crate::position::{Move, Position};
use crate::search::threads::Worker;
use crate::search::{
    StackEntry, MAX_PLY, SCORE_INFINITE, SCORE_MATE, SCORE_MATE_IN_MAX_PLY,
};

/// Depth-skipping patterns for helper threads: helper `i` sits out the
/// iterations whose row entry is 1, cycling by root depth plus game ply,
/// so helpers spread over depths without any coordination.
const HALF_DENSITY: [&[u8]; 20] = [
    &[0, 1],
    &[1, 0],
    &[0, 0, 1, 1],
    &[0, 1, 1, 0],
    &[1, 1, 0, 0],
    &[1, 0, 0, 1],
    &[0, 0, 0, 1, 1, 1],
    &[0, 0, 1, 1, 1, 0],
    &[0, 1, 1, 1, 0, 0],
    &[1, 1, 1, 0, 0, 0],
    &[1, 1, 0, 0, 0, 1],
    &[1, 0, 0, 0, 1, 1],
    &[0, 0, 0, 0, 1, 1, 1, 1],
    &[0, 0, 0, 1, 1, 1, 1, 0],
    &[0, 0, 1, 1, 1, 1, 0, 0],
    &[0, 1, 1, 1, 1, 0, 0, 0],
    &[1, 1, 1, 1, 0, 0, 0, 0],
    &[1, 1, 1, 0, 0, 0, 0, 1],
    &[1, 1, 0, 0, 0, 0, 1, 1],
    &[1, 0, 0, 0, 0, 1, 1, 1],
];

/// Remembers the predicted reply two plies into a stable PV; when the
/// opponent actually plays it, the next search may move quickly.
pub struct EasyMoveManager {
    stable_count: i32,
    expected_key: u64,
    pv: [Move; 3],
}

impl EasyMoveManager {
    #[must_use]
    pub fn new() -> Self {
        EasyMoveManager {
            stable_count: 0,
            expected_key: 0,
            pv: [Move::NONE; 3],
        }
    }

    pub fn clear(&mut self) {
        self.stable_count = 0;
        self.expected_key = 0;
        self.pv = [Move::NONE; 3];
    }

    #[must_use]
    pub fn get(&self, key: u64) -> Move {
        if self.expected_key == key {
            self.pv[2]
        } else {
            Move::NONE
        }
    }

    #[must_use]
    pub fn stable_count(&self) -> i32 {
        self.stable_count
    }

    /// Track a new 3-move PV head, probing two plies ahead for the key the
    /// easy move will be valid at.
    pub fn update(&mut self, pos: &mut Position, new_pv: &[Move]) {
        debug_assert!(new_pv.len() >= 3);
        self.stable_count = if new_pv[2] == self.pv[2] {
            self.stable_count + 1
        } else {
            0
        };
        if new_pv[..3] != self.pv {
            self.pv = [new_pv[0], new_pv[1], new_pv[2]];
            pos.do_move_simple(new_pv[0]);
            pos.do_move_simple(new_pv[1]);
            self.expected_key = pos.key();
            pos.undo_move(new_pv[1]);
            pos.undo_move(new_pv[0]);
        }
    }
}

impl Default for EasyMoveManager {
    fn default() -> Self {
        EasyMoveManager::new()
    }
}

/// USI score field with optional bound qualifiers.
#[must_use]
pub fn score_to_usi_bounded(score: i32, alpha: i32, beta: i32) -> String {
    let mut s = if score.abs() < SCORE_MATE_IN_MAX_PLY {
        format!("cp {}", score * 100 / PAWN_SCORE)
    } else if score > 0 {
        format!("mate {}", SCORE_MATE - score)
    } else {
        format!("mate {}", -SCORE_MATE - score)
    };
    if score >= beta {
        s.push_str(" lowerbound");
    } else if score <= alpha {
        s.push_str(" upperbound");
    }
    s
}

#[must_use]
pub fn score_to_usi(score: i32) -> String {
    score_to_usi_bounded(score, -SCORE_INFINITE, SCORE_INFINITE)
}

impl Worker {
    /// One full `info` block for the current multipv window.
    pub(crate) fn print_pv(&self, multi_pv: usize, depth: i32, alpha: i32, beta: i32) {
        let elapsed = self.shared.time_manager.elapsed() + 1;
        let nodes = self.shared.nodes_searched();

        for i in (0..multi_pv.min(self.root_moves.len())).rev() {
            let update = i <= self.pv_idx;
            if depth == 1 && !update {
                continue;
            }
            let d = if update { depth } else { depth - 1 };
            let score = if update {
                self.root_moves[i].score
            } else {
                self.root_moves[i].previous_score
            };
            let score_str = if i == self.pv_idx {
                score_to_usi_bounded(score, alpha, beta)
            } else {
                score_to_usi(score)
            };
            let pv: Vec<String> = self.root_moves[i].pv.iter().map(|m| m.to_usi()).collect();
            println!(
                "info depth {} seldepth {} multipv {} score {} nodes {} nps {} time {} pv {}",
                d,
                self.max_ply,
                i + 1,
                score_str,
                nodes,
                nodes * 1000 / elapsed.max(1) as u64,
                elapsed,
                pv.join(" ")
            );
        }
    }

    /// Iterative deepening over the worker's private root move list.
    pub(crate) fn iterative_deepening(&mut self) {
        self.stack = vec![StackEntry::default(); (MAX_PLY + 7) as usize];
        self.completed_depth = 0;
        self.root_depth = 0;
        self.max_ply = 0;
        self.calls_cnt = 0;

        let main_thread = self.idx == 0;
        let mut easy_move = Move::NONE;
        if main_thread {
            easy_move = self.shared.easy_move_for(self.pos.key());
            self.shared.clear_easy_move();
            self.easy_move_played = false;
            self.failed_low = false;
            self.best_move_changes = 0.0;
            self.shared.tt.new_search();
        }

        let random_pick_live = self.shared.options.max_random_score_diff > 0
            && self.pos.game_ply() <= self.shared.options.max_random_score_diff_ply;
        let mut multi_pv = self.shared.options.multi_pv.max(1);
        if random_pick_live {
            multi_pv = multi_pv.max(4);
        }
        multi_pv = multi_pv.min(self.root_moves.len());

        let mut last_info_time: i64 = -1;
        let mut best_score = -SCORE_INFINITE;

        loop {
            self.root_depth += 1;
            if self.root_depth >= MAX_PLY
                || self.shared.signals.stop.load(Ordering::Relaxed)
                || (self.shared.limits.depth != 0 && self.root_depth > self.shared.limits.depth)
            {
                break;
            }

            if !main_thread {
                let row = HALF_DENSITY[(self.idx - 1) % HALF_DENSITY.len()];
                if row[((self.root_depth + self.pos.game_ply()) as usize) % row.len()] == 1 {
                    continue;
                }
            }

            if main_thread {
                self.best_move_changes *= 0.505;
                self.failed_low = false;
            }
            for rm in &mut self.root_moves {
                rm.previous_score = rm.score;
            }

            let mut pv_idx = 0;
            while pv_idx < multi_pv && !self.shared.signals.stop.load(Ordering::Relaxed) {
                self.pv_idx = pv_idx;

                let mut delta = -SCORE_INFINITE;
                let mut alpha = -SCORE_INFINITE;
                let mut beta = SCORE_INFINITE;
                if self.root_depth >= 5 {
                    delta = 18;
                    let prev = self.root_moves[pv_idx].previous_score;
                    alpha = (prev - delta).max(-SCORE_INFINITE);
                    beta = (prev + delta).min(SCORE_INFINITE);
                }

                loop {
                    self.stack[4].static_eval_raw = None; // ss - 1
                    self.stack[5].static_eval_raw = None; // ss
                    best_score =
                        self.search(0, alpha, beta, self.root_depth, false, true);
                    self.root_moves[pv_idx..]
                        .sort_by(|a, b| b.score.cmp(&a.score));

                    if self.shared.signals.stop.load(Ordering::Relaxed) {
                        break;
                    }

                    let elapsed = self.shared.time_manager.elapsed();
                    if main_thread
                        && multi_pv == 1
                        && (best_score <= alpha || best_score >= beta)
                        && elapsed > 3000
                        && (self.root_depth < 10 || last_info_time + 200 < elapsed)
                    {
                        last_info_time = elapsed;
                        self.print_pv(multi_pv, self.root_depth, alpha, beta);
                    }

                    if best_score <= alpha {
                        beta = (alpha + beta) / 2;
                        alpha = (best_score - delta).max(-SCORE_INFINITE);
                        if main_thread {
                            self.failed_low = true;
                            self.shared
                                .signals
                                .stop_on_ponder_hit
                                .store(false, Ordering::Relaxed);
                        }
                    } else if best_score >= beta {
                        alpha = (alpha + beta) / 2;
                        beta = (best_score + delta).min(SCORE_INFINITE);
                    } else {
                        break;
                    }

                    delta += delta / 4 + 5;
                    debug_assert!(alpha >= -SCORE_INFINITE && beta <= SCORE_INFINITE);
                }

                self.root_moves[..=pv_idx].sort_by(|a, b| b.score.cmp(&a.score));

                if main_thread {
                    let elapsed = self.shared.time_manager.elapsed();
                    if self.shared.signals.stop.load(Ordering::Relaxed) {
                        println!(
                            "info nodes {} time {}",
                            self.shared.nodes_searched(),
                            elapsed
                        );
                    } else if (pv_idx + 1 == multi_pv || elapsed > 3000)
                        && (self.root_depth < 10 || last_info_time + 200 < elapsed)
                    {
                        last_info_time = elapsed;
                        self.print_pv(multi_pv, self.root_depth, alpha, beta);
                    }
                }
                pv_idx += 1;
            }

            if !self.shared.signals.stop.load(Ordering::Relaxed) {
                self.completed_depth = self.root_depth;
            }

            if !main_thread {
                continue;
            }

            // Mate-limit stop.
            if self.shared.limits.mate > 0
                && best_score >= SCORE_MATE_IN_MAX_PLY
                && SCORE_MATE - best_score <= 2 * self.shared.limits.mate
            {
                self.shared.signals.stop.store(true, Ordering::Relaxed);
            }

            if self.shared.limits.use_time_management()
                && !self.shared.signals.stop.load(Ordering::Relaxed)
                && !self
                    .shared
                    .signals
                    .stop_on_ponder_hit
                    .load(Ordering::Relaxed)
            {
                let failed_low = i32::from(self.failed_low);
                let score_swing = best_score - self.previous_score;
                let improving_factor =
                    (357 + 119 * failed_low - 6 * score_swing).clamp(229, 715);
                let unstable_pv_factor = 1.0 + self.best_move_changes;

                let elapsed = self.shared.time_manager.elapsed();
                let optimum = self.shared.time_manager.optimum();
                let do_easy_move = self.root_moves[0].pv[0] == easy_move
                    && !easy_move.is_none()
                    && self.best_move_changes < 0.03
                    && elapsed > optimum * 5 / 42;

                if self.root_moves.len() == 1
                    || elapsed as f64
                        > optimum as f64 * unstable_pv_factor * improving_factor as f64 / 628.0
                    || do_easy_move
                {
                    self.easy_move_played = do_easy_move;
                    if self.shared.ponder_active() {
                        self.shared
                            .signals
                            .stop_on_ponder_hit
                            .store(true, Ordering::Relaxed);
                    } else {
                        self.shared.signals.stop.store(true, Ordering::Relaxed);
                    }
                }

                if self.root_moves[0].pv.len() >= 3 {
                    let pv = self.root_moves[0].pv.clone();
                    self.shared.update_easy_move(&mut self.pos, &pv);
                } else {
                    self.shared.clear_easy_move();
                }
            }
        }

        if !main_thread {
            return;
        }

        if self.shared.easy_stable_count() < 6 || self.easy_move_played {
            self.shared.clear_easy_move();
        }

        // Randomized root choice within the configured score margin.
        if random_pick_live && self.root_moves.len() > 1 {
            use rand::Rng;
            let window = multi_pv.min(self.root_moves.len());
            let limit = self.shared.options.max_random_score_diff;
            let mut upper = 1;
            while upper < window {
                if self.root_moves[0].score - self.root_moves[upper].score > limit {
                    break;
                }
                upper += 1;
            }
            let choice = rand::thread_rng().gen_range(0..upper);
            if choice != 0 {
                println!("info string swap multipv 1, {}", choice + 1);
                self.root_moves.swap(0, choice);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_to_usi() {
        assert_eq!(score_to_usi(90), "cp 100");
        assert_eq!(score_to_usi(-45), "cp -50");
        assert_eq!(score_to_usi(SCORE_MATE - 1), "mate 1");
        assert_eq!(score_to_usi(-(SCORE_MATE - 2)), "mate -2");
        assert_eq!(
            score_to_usi_bounded(10, 10, 100),
            "cp 11 upperbound"
        );
        assert_eq!(score_to_usi_bounded(100, 0, 100), "cp 111 lowerbound");
    }

    #[test]
    fn test_easy_move_manager() {
        let mut easy = EasyMoveManager::new();
        let mut pos = Position::startpos();
        let m1 = pos.move_from_usi("7g7f").unwrap();
        let mut pos2 = pos.clone();
        pos2.do_move_simple(m1);
        let m2 = pos2.move_from_usi("3c3d").unwrap();
        pos2.do_move_simple(m2);
        let m3 = pos2.move_from_usi("2g2f").unwrap();
        let expected_key = pos2.key();

        easy.update(&mut pos, &[m1, m2, m3]);
        assert_eq!(easy.get(expected_key), m3);
        assert_eq!(easy.get(expected_key ^ 1), Move::NONE);
        assert_eq!(easy.stable_count(), 0);
        easy.update(&mut pos, &[m1, m2, m3]);
        assert_eq!(easy.stable_count(), 1);
        easy.clear();
        assert_eq!(easy.get(expected_key), Move::NONE);
    }
}
