//! Benchmarks for move generation, evaluation and exchange analysis.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use shogi_engine::eval::{compute_full_sum, Evaluator};
use shogi_engine::position::movegen::{self, GenType};
use shogi_engine::position::{MoveList, Position};

const MIDGAME_SFEN: &str =
    "ln1g5/1ks1g2+R1/1pp1ppn2/p2p2p1p/7P1/P1PP1PP1P/1PS1PS3/1KGG5/LN5NL w Bbsp 50";

fn bench_movegen(c: &mut Criterion) {
    let mut group = c.benchmark_group("movegen");

    let start = Position::startpos();
    let mid = Position::from_sfen(MIDGAME_SFEN).expect("midgame sfen parses");

    group.bench_function("legal_startpos", |b| {
        b.iter(|| movegen::legal_moves(black_box(&start)).len())
    });
    group.bench_function("legal_midgame", |b| {
        b.iter(|| movegen::legal_moves(black_box(&mid)).len())
    });
    group.bench_function("staged_midgame", |b| {
        b.iter(|| {
            let mut list = MoveList::new();
            movegen::generate(GenType::CapturePlusPro, black_box(&mid), &mut list);
            movegen::generate(GenType::NonCaptureMinusPro, black_box(&mid), &mut list);
            movegen::generate(GenType::Drop, black_box(&mid), &mut list);
            list.len()
        })
    });
    group.finish();
}

fn bench_make_unmake(c: &mut Criterion) {
    let mut pos = Position::startpos();
    let moves: Vec<_> = {
        let list = movegen::legal_moves(&pos);
        (0..list.len()).filter_map(|i| list.get(i)).collect()
    };
    c.bench_function("make_unmake_startpos", |b| {
        b.iter(|| {
            for &mv in &moves {
                pos.do_move_simple(mv);
                pos.undo_move(mv);
            }
        })
    });
}

fn bench_evaluation(c: &mut Criterion) {
    let ev = Evaluator::zeroed();
    let mid = Position::from_sfen(MIDGAME_SFEN).expect("midgame sfen parses");
    c.bench_function("full_eval_midgame", |b| {
        b.iter(|| compute_full_sum(black_box(&mid), black_box(&ev)))
    });
}

fn bench_see(c: &mut Criterion) {
    let mid = Position::from_sfen(MIDGAME_SFEN).expect("midgame sfen parses");
    let list = movegen::legal_moves(&mid);
    let moves: Vec<_> = (0..list.len()).filter_map(|i| list.get(i)).collect();
    c.bench_function("see_all_moves_midgame", |b| {
        b.iter(|| {
            let mut acc = 0;
            for &mv in &moves {
                acc += mid.see(black_box(mv), 0);
            }
            acc
        })
    });
}

criterion_group!(
    benches,
    bench_movegen,
    bench_make_unmake,
    bench_evaluation,
    bench_see
);
criterion_main!(benches);
