//! The USI option table.

use crate::search::{RepetitionRule, SearchOptions, TimeOptions};

fn print_spin(name: &str, default: impl std::fmt::Display, min: i64, max: i64) {
    println!("option name {name} type spin default {default} min {min} max {max}");
}

fn print_check(name: &str, default: bool) {
    println!(
        "option name {name} type check default {}",
        if default { "true" } else { "false" }
    );
}

fn print_string(name: &str, default: &str) {
    let shown = if default.is_empty() { "<empty>" } else { default };
    println!("option name {name} type string default {shown}");
}

fn print_button(name: &str) {
    println!("option name {name} type button");
}

/// Current values of every recognised option.
pub struct UsiOptions {
    pub usi_hash: usize,
    pub threads: usize,
    pub multi_pv: usize,
    pub usi_ponder: bool,
    pub own_book: bool,
    pub book_file: String,
    pub min_book_ply: i32,
    pub max_book_ply: i32,
    pub min_book_score: i32,
    pub best_book_move: bool,
    pub eval_dir: String,
    pub byoyomi_margin: i64,
    pub time_margin: i64,
    pub max_random_score_diff: i32,
    pub max_random_score_diff_ply: i32,
    pub slow_mover_10: i64,
    pub slow_mover_16: i64,
    pub slow_mover_20: i64,
    pub slow_mover_30: i64,
    pub slow_mover_40: i64,
    pub slow_mover: i64,
    pub draw_ply: i32,
    pub move_overhead: i64,
    pub minimum_thinking_time: i64,
    pub engine_name: String,
}

impl Default for UsiOptions {
    fn default() -> Self {
        UsiOptions {
            usi_hash: 256,
            threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
            multi_pv: 1,
            usi_ponder: true,
            own_book: true,
            book_file: "book/book.bin".to_string(),
            min_book_ply: i16::MAX as i32,
            max_book_ply: i16::MAX as i32,
            min_book_score: -180,
            best_book_move: false,
            eval_dir: String::new(),
            byoyomi_margin: 500,
            time_margin: 4500,
            max_random_score_diff: 0,
            max_random_score_diff_ply: i16::MAX as i32,
            slow_mover_10: 10,
            slow_mover_16: 20,
            slow_mover_20: 40,
            slow_mover_30: 40,
            slow_mover_40: 40,
            slow_mover: 89,
            draw_ply: 256,
            move_overhead: 30,
            minimum_thinking_time: 20,
            engine_name: "shogi_engine".to_string(),
        }
    }
}

/// What applying an option asks the engine to do beyond storing it.
pub enum OptionAction {
    None,
    ResizeHash(usize),
    ClearHash,
    SetThreads(usize),
}

impl UsiOptions {
    pub fn print(&self) {
        print_spin("USI_Hash", self.usi_hash, 1, 1024 * 1024);
        print_button("Clear_Hash");
        print_string("Book_File", &self.book_file);
        print_string("Eval_Dir", &self.eval_dir);
        print_check("Best_Book_Move", self.best_book_move);
        print_check("OwnBook", self.own_book);
        print_spin("Min_Book_Ply", self.min_book_ply, 0, i16::MAX as i64);
        print_spin("Max_Book_Ply", self.max_book_ply, 0, i16::MAX as i64);
        print_spin("Min_Book_Score", self.min_book_score, -32601, 32601);
        print_check("USI_Ponder", self.usi_ponder);
        print_spin("Byoyomi_Margin", self.byoyomi_margin, 0, i32::MAX as i64);
        print_spin("Time_Margin", self.time_margin, 0, i32::MAX as i64);
        print_spin("MultiPV", self.multi_pv, 1, 594);
        print_spin("Max_Random_Score_Diff", self.max_random_score_diff, 0, 32000);
        print_spin(
            "Max_Random_Score_Diff_Ply",
            self.max_random_score_diff_ply,
            0,
            i16::MAX as i64,
        );
        print_spin("Slow_Mover_10", self.slow_mover_10, 1, 1000);
        print_spin("Slow_Mover_16", self.slow_mover_16, 1, 1000);
        print_spin("Slow_Mover_20", self.slow_mover_20, 1, 1000);
        print_spin("Slow_Mover_30", self.slow_mover_30, 1, 1000);
        print_spin("Slow_Mover_40", self.slow_mover_40, 1, 1000);
        print_spin("Slow_Mover", self.slow_mover, 1, 1000);
        print_spin("Draw_Ply", self.draw_ply, 1, i32::MAX as i64);
        print_spin("Move_Overhead", self.move_overhead, 0, 5000);
        print_spin(
            "Minimum_Thinking_Time",
            self.minimum_thinking_time,
            0,
            i32::MAX as i64,
        );
        print_spin("Threads", self.threads, 1, 256);
        print_string("Engine_Name", &self.engine_name);
    }

    /// Apply `setoption`. Unknown names and out-of-range values are
    /// reported on stderr and ignored.
    pub fn set(&mut self, name: &str, value: &str) -> OptionAction {
        fn spin<T: std::str::FromStr + PartialOrd>(
            value: &str,
            min: T,
            max: T,
        ) -> Option<T> {
            let v = value.parse::<T>().ok()?;
            if v < min || v > max {
                return None;
            }
            Some(v)
        }
        fn check(value: &str) -> Option<bool> {
            match value {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            }
        }

        let mut action = OptionAction::None;
        let applied = match name {
            "USI_Hash" => spin(value, 1usize, 1024 * 1024).map(|v| {
                self.usi_hash = v;
                action = OptionAction::ResizeHash(v);
            }),
            "Clear_Hash" => {
                action = OptionAction::ClearHash;
                Some(())
            }
            "Threads" => spin(value, 1usize, 256).map(|v| {
                self.threads = v;
                action = OptionAction::SetThreads(v);
            }),
            "MultiPV" => spin(value, 1usize, 594).map(|v| self.multi_pv = v),
            "USI_Ponder" => check(value).map(|v| self.usi_ponder = v),
            "OwnBook" => check(value).map(|v| self.own_book = v),
            "Best_Book_Move" => check(value).map(|v| self.best_book_move = v),
            "Book_File" => {
                self.book_file = value.to_string();
                Some(())
            }
            "Eval_Dir" => {
                self.eval_dir = value.to_string();
                Some(())
            }
            "Min_Book_Ply" => spin(value, 0, i16::MAX as i32).map(|v| self.min_book_ply = v),
            "Max_Book_Ply" => spin(value, 0, i16::MAX as i32).map(|v| self.max_book_ply = v),
            "Min_Book_Score" => spin(value, -32601, 32601).map(|v| self.min_book_score = v),
            "Byoyomi_Margin" => spin(value, 0, i64::MAX).map(|v| self.byoyomi_margin = v),
            "Time_Margin" => spin(value, 0, i64::MAX).map(|v| self.time_margin = v),
            "Max_Random_Score_Diff" => {
                spin(value, 0, 32000).map(|v| self.max_random_score_diff = v)
            }
            "Max_Random_Score_Diff_Ply" => {
                spin(value, 0, i16::MAX as i32).map(|v| self.max_random_score_diff_ply = v)
            }
            "Slow_Mover_10" => spin(value, 1, 1000).map(|v| self.slow_mover_10 = v),
            "Slow_Mover_16" => spin(value, 1, 1000).map(|v| self.slow_mover_16 = v),
            "Slow_Mover_20" => spin(value, 1, 1000).map(|v| self.slow_mover_20 = v),
            "Slow_Mover_30" => spin(value, 1, 1000).map(|v| self.slow_mover_30 = v),
            "Slow_Mover_40" => spin(value, 1, 1000).map(|v| self.slow_mover_40 = v),
            "Slow_Mover" => spin(value, 1, 1000).map(|v| self.slow_mover = v),
            "Draw_Ply" => spin(value, 1, i32::MAX).map(|v| self.draw_ply = v),
            "Move_Overhead" => spin(value, 0, 5000).map(|v| self.move_overhead = v),
            "Minimum_Thinking_Time" => {
                spin(value, 0, i64::MAX).map(|v| self.minimum_thinking_time = v)
            }
            "Engine_Name" => {
                self.engine_name = value.to_string();
                Some(())
            }
            _ => {
                eprintln!("unknown option: {name}");
                Some(())
            }
        };
        if applied.is_none() {
            eprintln!("invalid value for option {name}: {value}");
        }
        action
    }

    #[must_use]
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            multi_pv: self.multi_pv,
            max_random_score_diff: self.max_random_score_diff,
            max_random_score_diff_ply: self.max_random_score_diff_ply,
            repetition_rule: RepetitionRule::Standard,
        }
    }

    #[must_use]
    pub fn time_options(&self) -> TimeOptions {
        TimeOptions {
            minimum_thinking_time: self.minimum_thinking_time,
            move_overhead: self.move_overhead,
            slow_mover_10: self.slow_mover_10,
            slow_mover_16: self.slow_mover_16,
            slow_mover_20: self.slow_mover_20,
            slow_mover: self.slow_mover,
            draw_ply: self.draw_ply,
            ponder: self.usi_ponder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_spin_in_range() {
        let mut opts = UsiOptions::default();
        opts.set("MultiPV", "4");
        assert_eq!(opts.multi_pv, 4);
        opts.set("MultiPV", "0"); // out of range, ignored
        assert_eq!(opts.multi_pv, 4);
    }

    #[test]
    fn test_set_check_and_string() {
        let mut opts = UsiOptions::default();
        opts.set("USI_Ponder", "false");
        assert!(!opts.usi_ponder);
        opts.set("Eval_Dir", "tables/latest");
        assert_eq!(opts.eval_dir, "tables/latest");
    }

    #[test]
    fn test_hash_resize_action() {
        let mut opts = UsiOptions::default();
        match opts.set("USI_Hash", "64") {
            OptionAction::ResizeHash(64) => {}
            _ => panic!("expected resize action"),
        }
    }
}
