//! USI protocol front end: the stdin command loop.
//!
//! Malformed lines are reported on stderr and dropped; only a missing
//! configured evaluation directory or a failed table allocation is fatal.

mod options;

pub use options::{OptionAction, UsiOptions};

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::eval::Evaluator;
use crate::position::{Position, START_SFEN};
use crate::search::{Engine, LimitsType};

/// Rebuild the position from a `position` command. On a bad move the
/// replay stops there and the position keeps the moves played so far.
fn handle_position(pos: &mut Position, tokens: &[&str]) {
    let mut iter = tokens.iter().copied().peekable();

    let parsed = match iter.next() {
        Some("startpos") => Position::from_sfen(START_SFEN),
        Some("sfen") => {
            let mut fields = Vec::new();
            while let Some(tok) = iter.peek() {
                if *tok == "moves" {
                    break;
                }
                fields.push(*tok);
                iter.next();
            }
            Position::from_sfen(&fields.join(" "))
        }
        _ => {
            eprintln!("position: expected 'startpos' or 'sfen'");
            return;
        }
    };

    let mut new_pos = match parsed {
        Ok(p) => p,
        Err(e) => {
            eprintln!("position: {e}");
            return;
        }
    };

    if iter.peek() == Some(&"moves") {
        iter.next();
        for tok in iter {
            match new_pos.move_from_usi(tok) {
                Ok(mv) => new_pos.do_move_simple(mv),
                Err(e) => {
                    eprintln!("position: {e}");
                    break;
                }
            }
        }
    }
    *pos = new_pos;
}

fn handle_go(engine: &Engine, pos: &Position, opts: &UsiOptions, tokens: &[&str]) {
    let start_time = Instant::now();
    let mut limits = LimitsType::default();
    let mut iter = tokens.iter().copied();

    fn next_i64<'a>(it: &mut impl Iterator<Item = &'a str>) -> i64 {
        it.next().and_then(|v| v.parse::<i64>().ok()).unwrap_or(0)
    }

    while let Some(tok) = iter.next() {
        match tok {
            "ponder" => limits.ponder = true,
            "infinite" => limits.infinite = true,
            "btime" => limits.time[0] = next_i64(&mut iter),
            "wtime" => limits.time[1] = next_i64(&mut iter),
            "binc" => limits.inc[0] = next_i64(&mut iter),
            "winc" => limits.inc[1] = next_i64(&mut iter),
            "byoyomi" | "movetime" => limits.move_time = next_i64(&mut iter),
            "mate" => limits.mate = next_i64(&mut iter) as i32,
            "depth" => limits.depth = next_i64(&mut iter) as i32,
            "nodes" => limits.nodes = next_i64(&mut iter) as u64,
            "movestogo" => limits.moves_to_go = next_i64(&mut iter) as i32,
            "searchmoves" => {
                for mv_tok in iter.by_ref() {
                    if let Ok(mv) = pos.move_from_usi(mv_tok) {
                        limits.searchmoves.push(mv);
                    }
                }
            }
            other => eprintln!("go: unknown token '{other}'"),
        }
    }

    // Leave network slack: byoyomi gives back its margin, a main clock
    // gives back the configured total-time margin.
    if limits.move_time != 0 {
        limits.move_time = (limits.move_time - opts.byoyomi_margin).max(0);
    } else if limits.time[pos.turn().index()] != 0 {
        let us = pos.turn().index();
        limits.time[us] = (limits.time[us] - opts.time_margin).max(0);
    }

    if opts.own_book && pos.game_ply() <= opts.max_book_ply {
        // The book probe lives outside this engine; say so once per go.
        log::info!("OwnBook is set but no book backend is attached");
    }

    engine.start_thinking(
        pos,
        limits,
        opts.search_options(),
        opts.time_options(),
        start_time,
    );
}

/// Load (or reload) the evaluation tables per the `Eval_Dir` option. An
/// empty directory selects zero tables; a configured directory that fails
/// to read is fatal.
fn load_evaluator(opts: &UsiOptions) -> Arc<Evaluator> {
    if opts.eval_dir.is_empty() {
        log::warn!("Eval_Dir is empty: using zero evaluation tables (material only)");
        return Arc::new(Evaluator::zeroed());
    }
    match Evaluator::load(Path::new(&opts.eval_dir)) {
        Ok(ev) => Arc::new(ev),
        Err(e) => {
            log::error!("failed to read evaluation tables from {}: {e}", opts.eval_dir);
            eprintln!("failed to read evaluation tables from {}: {e}", opts.eval_dir);
            std::process::exit(1);
        }
    }
}

/// The blocking USI loop over stdin.
pub fn run_usi_loop() {
    let mut opts = UsiOptions::default();
    let mut engine = Engine::new(opts.threads, opts.usi_hash, Arc::new(Evaluator::zeroed()));
    let mut pos = Position::startpos();
    let mut eval_loaded = false;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = tokens.first() else {
            continue;
        };

        match command {
            "usi" => {
                println!("id name {}", opts.engine_name);
                println!("id author shogi_engine developers");
                opts.print();
                println!("usiok");
            }
            "isready" => {
                engine.new_game();
                if !eval_loaded {
                    engine.set_evaluator(load_evaluator(&opts));
                    eval_loaded = true;
                }
                println!("readyok");
            }
            "usinewgame" => {} // isready already prepared everything
            "setoption" => {
                // setoption name <X...> [value <V...>], names may contain
                // spaces.
                let rest = &tokens[1..];
                if rest.first() != Some(&"name") {
                    eprintln!("setoption: missing 'name'");
                    continue;
                }
                let value_at = rest.iter().position(|t| *t == "value");
                let name = rest[1..value_at.unwrap_or(rest.len())].join(" ");
                let value = value_at.map_or(String::new(), |i| rest[i + 1..].join(" "));
                match opts.set(&name, &value) {
                    OptionAction::ResizeHash(mb) => engine.resize_tt(mb),
                    OptionAction::ClearHash => engine.clear_tt(),
                    OptionAction::SetThreads(n) => engine.set_threads(n),
                    OptionAction::None => {}
                }
                if name == "Eval_Dir" {
                    eval_loaded = false;
                }
            }
            "position" => handle_position(&mut pos, &tokens[1..]),
            "go" => handle_go(&engine, &pos, &opts, &tokens[1..]),
            "stop" | "gameover" => engine.stop(),
            "ponderhit" => engine.ponderhit(),
            "quit" => {
                engine.stop();
                engine.wait_for_search_finished();
                break;
            }
            other => eprintln!("unknown command: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Color;

    #[test]
    fn test_handle_position_startpos_and_moves() {
        let mut pos = Position::startpos();
        handle_position(&mut pos, &["startpos", "moves", "7g7f", "3c3d"]);
        assert_eq!(pos.game_ply(), 2);
        assert_eq!(pos.turn(), Color::Black);
    }

    #[test]
    fn test_handle_position_stops_at_bad_move() {
        let mut pos = Position::startpos();
        handle_position(&mut pos, &["startpos", "moves", "7g7f", "9z9z", "3c3d"]);
        // Replay stopped after the first legal move.
        assert_eq!(pos.game_ply(), 1);
    }

    #[test]
    fn test_handle_position_sfen() {
        let mut pos = Position::startpos();
        handle_position(
            &mut pos,
            &["sfen", "4k4/9/9/9/9/9/9/9/4K4", "b", "G", "1"],
        );
        assert_eq!(pos.occupied().count(), 2);
    }

    #[test]
    fn test_handle_position_keeps_old_on_garbage() {
        let mut pos = Position::startpos();
        let key = pos.key();
        handle_position(&mut pos, &["sfen", "garbage"]);
        assert_eq!(pos.key(), key);
    }
}
