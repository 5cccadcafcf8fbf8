//! End-to-end tests over the USI binary.

use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Instant;

use shogi_engine::position::{movegen, Position};

/// Options prepended to every scripted session so concurrent test engines
/// stay small and single-threaded.
const TEST_SETUP: &str = "setoption name Threads value 1\nsetoption name USI_Hash value 16\n";

fn run_engine(input: &str) -> String {
    let exe = env!("CARGO_BIN_EXE_shogi_engine");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn engine binary");

    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(format!("{TEST_SETUP}{input}").as_bytes())
        .unwrap();
    let output = child.wait_with_output().expect("failed to read output");
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn bestmove_of(stdout: &str) -> String {
    let line = stdout
        .lines()
        .find(|l| l.starts_with("bestmove"))
        .unwrap_or_else(|| panic!("no bestmove in output:\n{stdout}"));
    line.split_whitespace().nth(1).expect("empty bestmove").to_string()
}

#[test]
fn usi_handshake_reports_options() {
    let out = run_engine("usi\nquit\n");
    assert!(out.contains("id name"));
    assert!(out.contains("option name USI_Hash type spin"));
    assert!(out.contains("option name Threads type spin"));
    assert!(out.contains("option name Eval_Dir type string"));
    assert!(out.contains("usiok"));
}

#[test]
fn depth_one_search_returns_legal_move() {
    let started = Instant::now();
    let out = run_engine("usi\nisready\nposition startpos\ngo depth 1\nquit\n");
    assert!(out.contains("readyok"));
    assert!(
        out.lines().any(|l| l.starts_with("info depth 1")),
        "missing info depth 1:\n{out}"
    );

    let mv = bestmove_of(&out);
    assert_ne!(mv, "resign");
    let pos = Position::startpos();
    assert!(
        pos.move_from_usi(&mv).is_ok(),
        "bestmove {mv} is not legal at startpos"
    );
    assert!(started.elapsed().as_millis() > 0);
}

#[test]
fn mate_in_one_is_found_and_reported() {
    // Black to move: gold drop on 5b mates the bare king (tokin on 5c
    // guards the drop square).
    let sfen = "4k4/9/4+P4/9/9/9/9/9/4K4 b G 1";
    let out = run_engine(&format!(
        "usi\nisready\nposition sfen {sfen}\ngo depth 2\nquit\n"
    ));
    assert!(
        out.lines().any(|l| l.contains("score mate 1")),
        "expected score mate 1:\n{out}"
    );
    assert_eq!(bestmove_of(&out), "G*5b");
}

#[test]
fn repetition_loop_is_scored_as_draw() {
    // Rook shuffling repeats the start position; the search must accept
    // the draw score rather than an advantage.
    let mut moves = String::new();
    for _ in 0..4 {
        moves.push_str("2h3h 8b7b 3h2h 7b8b ");
    }
    let out = run_engine(&format!(
        "usi\nisready\nposition startpos moves {}\ngo depth 3\nquit\n",
        moves.trim()
    ));
    assert!(out.contains("bestmove"));

    let mut pos = Position::startpos();
    for tok in moves.split_whitespace() {
        let mv = pos.move_from_usi(tok).unwrap();
        pos.do_move_simple(mv);
    }
    assert_eq!(
        pos.is_draw(i32::MAX),
        shogi_engine::position::Repetition::Draw
    );
}

#[test]
fn pawn_drop_mate_square_is_never_chosen() {
    // P*1b would be an illegal drop mate; the engine must pick something
    // else (or nothing mating) and never emit that drop.
    let sfen = "8k/6G2/8G/9/9/9/9/9/4K4 b P 1";
    let out = run_engine(&format!(
        "usi\nisready\nposition sfen {sfen}\ngo depth 3\nquit\n"
    ));
    assert_ne!(bestmove_of(&out), "P*1b");

    let pos = Position::from_sfen(sfen).unwrap();
    let list = movegen::legal_moves(&pos);
    assert!(!list
        .iter()
        .any(|m| m.to_usi() == "P*1b"));
}

#[test]
fn time_control_finishes_within_budget() {
    let started = Instant::now();
    let out = run_engine("usi\nisready\nposition startpos\ngo btime 1000 wtime 1000\nquit\n");
    let elapsed = started.elapsed().as_millis();
    assert!(out.contains("bestmove"));
    // Generous allowance: twice the clock plus process overhead.
    assert!(
        elapsed < 2 * (1000 + 4500),
        "search took {elapsed} ms on a 1 s clock"
    );
}

#[test]
fn stop_command_ends_infinite_search() {
    let exe = env!("CARGO_BIN_EXE_shogi_engine");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn engine binary");

    let stdin = child.stdin.as_mut().unwrap();
    stdin
        .write_all(format!("{TEST_SETUP}usi\nisready\nposition startpos\ngo infinite\n").as_bytes())
        .unwrap();
    stdin.flush().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(300));
    stdin.write_all(b"stop\nquit\n").unwrap();
    stdin.flush().unwrap();

    let output = child.wait_with_output().expect("engine did not exit");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("bestmove"), "no bestmove after stop:\n{stdout}");
}

#[test]
fn malformed_lines_are_ignored() {
    let out = run_engine("usi\nnonsense command\nposition startpos moves 0a0a\nisready\nquit\n");
    assert!(out.contains("usiok"));
    assert!(out.contains("readyok"));
}
