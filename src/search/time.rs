//! Time budgeting: optimum and maximum thinking time per move.

use std::time::Instant;

use crate::position::Color;
use crate::search::LimitsType;

const MOVE_HORIZON: i32 = 50;
const MAX_RATIO: f64 = 7.09;
const STEAL_RATIO: f64 = 0.35;

/// Options consulted when allocating time; a snapshot of the USI option
/// table at `go`.
#[derive(Clone, Copy, Debug)]
pub struct TimeOptions {
    pub minimum_thinking_time: i64,
    pub move_overhead: i64,
    pub slow_mover_10: i64,
    pub slow_mover_16: i64,
    pub slow_mover_20: i64,
    pub slow_mover: i64,
    pub draw_ply: i32,
    pub ponder: bool,
}

impl Default for TimeOptions {
    fn default() -> Self {
        TimeOptions {
            minimum_thinking_time: 20,
            move_overhead: 30,
            slow_mover_10: 10,
            slow_mover_16: 20,
            slow_mover_20: 40,
            slow_mover: 89,
            draw_ply: 256,
            ponder: false,
        }
    }
}

/// A move's relative weight in the remaining game, by game ply.
fn move_importance(ply: i32) -> f64 {
    const X_SCALE: f64 = 7.64;
    const X_SHIFT: f64 = 58.4;
    const SKEW: f64 = 0.183;
    (1.0 + ((ply as f64 - X_SHIFT) / X_SCALE).exp()).powf(-SKEW) + f64::MIN_POSITIVE
}

fn remaining(
    my_time: i64,
    moves_to_go: i32,
    ply: i32,
    slow_mover: i64,
    maximum: bool,
) -> i64 {
    let t_max_ratio = if maximum { MAX_RATIO } else { 1.0 };
    let t_steal_ratio = if maximum { STEAL_RATIO } else { 0.0 };

    let this_move = move_importance(ply) * slow_mover as f64 / 100.0;
    let mut other_moves = 0.0;
    for i in 1..moves_to_go {
        other_moves += move_importance(ply + 2 * i);
    }

    let ratio1 = (t_max_ratio * this_move) / (t_max_ratio * this_move + other_moves);
    let ratio2 = (this_move + t_steal_ratio * other_moves) / (this_move + other_moves);

    (my_time as f64 * ratio1.min(ratio2)) as i64
}

pub struct TimeManager {
    start_time: Instant,
    optimum: i64,
    maximum: i64,
}

impl TimeManager {
    /// Allocate for one move from the clock, increment, byoyomi and the
    /// game phase. Byoyomi rides the `move_time` path: after game ply 20
    /// it extends both budgets as the original's newer manager does.
    #[must_use]
    pub fn init(
        limits: &LimitsType,
        us: Color,
        game_ply: i32,
        opts: &TimeOptions,
        start_time: Instant,
    ) -> TimeManager {
        let slow_mover = if game_ply < 10 {
            opts.slow_mover_10
        } else if game_ply < 16 {
            opts.slow_mover_16
        } else if game_ply < 20 {
            opts.slow_mover_20
        } else {
            opts.slow_mover
        };

        let my_time = limits.time[us.index()];
        let mut optimum = my_time.max(opts.minimum_thinking_time);
        let mut maximum = optimum;

        // The draw horizon bounds how many moves the clock must last.
        let move_horizon = |ply: i32| MOVE_HORIZON.min(opts.draw_ply - ply);
        let max_mtg = if limits.moves_to_go != 0 {
            limits.moves_to_go.min(move_horizon(game_ply))
        } else {
            move_horizon(game_ply)
        };

        for hyp_mtg in 1..=max_mtg.max(1) {
            let hyp_time = (my_time + limits.inc[us.index()] * (hyp_mtg as i64 - 1)
                - opts.move_overhead * (2 + hyp_mtg.min(40)) as i64)
                .max(0);

            let t1 = opts.minimum_thinking_time
                + remaining(hyp_time, hyp_mtg, game_ply, slow_mover, false);
            let t2 = opts.minimum_thinking_time
                + remaining(hyp_time, hyp_mtg, game_ply, slow_mover, true);

            optimum = optimum.min(t1);
            maximum = maximum.min(t2);
        }

        if opts.ponder {
            optimum += optimum / 4;
        }

        optimum = optimum.max(opts.minimum_thinking_time);
        optimum = optimum.min(maximum);

        if limits.move_time != 0 && game_ply >= 20 {
            if optimum < limits.move_time {
                optimum = my_time.min(limits.move_time);
            }
            if maximum < limits.move_time {
                maximum = my_time.min(limits.move_time);
            }
            optimum += limits.move_time;
            maximum += limits.move_time;
        }

        TimeManager {
            start_time,
            optimum,
            maximum,
        }
    }

    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> i64 {
        self.start_time.elapsed().as_millis() as i64
    }

    #[inline]
    #[must_use]
    pub fn optimum(&self) -> i64 {
        self.optimum
    }

    #[inline]
    #[must_use]
    pub fn maximum(&self) -> i64 {
        self.maximum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budgets_are_ordered_and_bounded() {
        let mut limits = LimitsType::default();
        limits.time = [60_000, 60_000];
        limits.inc = [1_000, 1_000];
        let tm = TimeManager::init(
            &limits,
            Color::Black,
            30,
            &TimeOptions::default(),
            Instant::now(),
        );
        assert!(tm.optimum() <= tm.maximum());
        assert!(tm.optimum() >= TimeOptions::default().minimum_thinking_time);
        assert!(tm.maximum() <= 60_000);
    }

    #[test]
    fn test_short_clock_stays_playable() {
        let mut limits = LimitsType::default();
        limits.time = [1_000, 1_000];
        let tm = TimeManager::init(
            &limits,
            Color::White,
            40,
            &TimeOptions::default(),
            Instant::now(),
        );
        assert!(tm.maximum() <= 1_000);
        assert!(tm.optimum() > 0);
    }

    #[test]
    fn test_byoyomi_extends_budget_after_opening() {
        let mut limits = LimitsType::default();
        limits.time = [0, 0];
        limits.move_time = 3_000;
        let tm = TimeManager::init(
            &limits,
            Color::Black,
            40,
            &TimeOptions::default(),
            Instant::now(),
        );
        assert!(tm.optimum() >= 3_000);
        assert!(tm.maximum() >= 3_000);
    }
}
