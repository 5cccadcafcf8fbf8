//! The persistent worker pool and the engine context that owns every
//! shared search resource.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::eval::{EvalHashTable, Evaluator};
use crate::position::movegen::legal_moves;
use crate::position::{Move, Position};
use crate::search::iterate::{score_to_usi, EasyMoveManager};
use crate::search::stats::{CounterMoveHistoryStats, FromToStats, HistoryStats, MoveStats};
use crate::search::time::{TimeManager, TimeOptions};
use crate::search::{
    entering_king_win, mated_in, LimitsType, RepetitionRule, RootMove, Signals, StackEntry,
    SCORE_INFINITE,
};
use crate::tt::TranspositionTable;

/// Search-behaviour options snapshotted at `go`.
#[derive(Clone, Copy, Debug)]
pub struct SearchOptions {
    pub multi_pv: usize,
    pub max_random_score_diff: i32,
    pub max_random_score_diff_ply: i32,
    pub repetition_rule: RepetitionRule,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            multi_pv: 1,
            max_random_score_diff: 0,
            max_random_score_diff_ply: 0,
            repetition_rule: RepetitionRule::Standard,
        }
    }
}

/// What a worker hands back when its search ends.
#[derive(Clone, Default)]
pub struct WorkerReport {
    pub completed_depth: i32,
    pub root_moves: Vec<RootMove>,
}

/// One search assignment.
struct Job {
    pos: Position,
    root_moves: Vec<RootMove>,
    shared: Arc<SearchShared>,
}

struct CommState {
    searching: bool,
    exit: bool,
    job: Option<Job>,
}

/// Per-worker mailbox: parking, node counter and result slot.
pub struct WorkerComm {
    state: Mutex<CommState>,
    cond: Condvar,
    pub nodes: AtomicU64,
    pub reset_calls: AtomicBool,
    report: Mutex<Option<WorkerReport>>,
}

impl WorkerComm {
    fn new() -> WorkerComm {
        WorkerComm {
            state: Mutex::new(CommState {
                searching: false,
                exit: false,
                job: None,
            }),
            cond: Condvar::new(),
            nodes: AtomicU64::new(0),
            reset_calls: AtomicBool::new(false),
            report: Mutex::new(None),
        }
    }
}

/// Everything a search shares between workers for one `go`.
pub struct SearchShared {
    pub tt: Arc<TranspositionTable>,
    pub evaluator: Arc<Evaluator>,
    pub eval_hash: Arc<EvalHashTable>,
    pub signals: Signals,
    pub limits: LimitsType,
    pub options: SearchOptions,
    pub time_manager: TimeManager,
    ponder: AtomicBool,
    move_time: AtomicI64,
    comms: Vec<Arc<WorkerComm>>,
    easy: Arc<Mutex<EasyMoveManager>>,
    previous_score: Arc<Mutex<i32>>,
}

impl SearchShared {
    #[must_use]
    pub fn nodes_searched(&self) -> u64 {
        self.comms
            .iter()
            .map(|c| c.nodes.load(Ordering::Relaxed))
            .sum()
    }

    pub fn request_time_check(&self) {
        for comm in &self.comms {
            comm.reset_calls.store(true, Ordering::Relaxed);
        }
    }

    /// Stop on budget or node-limit expiry. Pondering defers entirely to
    /// the UI's `ponderhit`/`stop`.
    pub fn check_time(&self) {
        if self.ponder_active() {
            return;
        }
        let elapsed = self.time_manager.elapsed();
        let move_time = self.move_time.load(Ordering::Relaxed);
        if (self.limits.use_time_management() && elapsed > self.time_manager.maximum() - 10)
            || (move_time != 0 && elapsed >= move_time)
            || (self.limits.nodes != 0 && self.nodes_searched() >= self.limits.nodes)
        {
            self.signals.stop.store(true, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn ponder_active(&self) -> bool {
        self.ponder.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn easy_move_for(&self, key: u64) -> Move {
        self.easy.lock().get(key)
    }

    pub fn clear_easy_move(&self) {
        self.easy.lock().clear();
    }

    #[must_use]
    pub fn easy_stable_count(&self) -> i32 {
        self.easy.lock().stable_count()
    }

    pub fn update_easy_move(&self, pos: &mut Position, pv: &[Move]) {
        self.easy.lock().update(pos, pv);
    }
}

/// Long-lived per-thread state that survives between searches.
struct ThreadState {
    history: HistoryStats,
    counter_moves: MoveStats,
    from_to: FromToStats,
    cont_history: CounterMoveHistoryStats,
}

impl ThreadState {
    fn new() -> ThreadState {
        ThreadState {
            history: HistoryStats::new(),
            counter_moves: MoveStats::new(),
            from_to: FromToStats::new(),
            cont_history: CounterMoveHistoryStats::new(),
        }
    }
}

/// A worker running one search job. Owns its position clone, root move
/// list and ordering tables; everything shared goes through `shared`.
pub struct Worker {
    pub idx: usize,
    pub pos: Position,
    pub root_moves: Vec<RootMove>,
    pub stack: Vec<StackEntry>,
    pub history: HistoryStats,
    pub counter_moves: MoveStats,
    pub from_to: FromToStats,
    pub cont_history: CounterMoveHistoryStats,
    pub pv_idx: usize,
    pub max_ply: i32,
    pub calls_cnt: i32,
    pub root_depth: i32,
    pub completed_depth: i32,
    pub best_move_changes: f64,
    pub failed_low: bool,
    pub easy_move_played: bool,
    pub previous_score: i32,
    pub shared: Arc<SearchShared>,
    pub comm: Arc<WorkerComm>,
}

impl Worker {
    fn from_parts(idx: usize, job: Job, state: ThreadState, comm: Arc<WorkerComm>) -> Worker {
        let previous_score = *job.shared.previous_score.lock();
        Worker {
            idx,
            pos: job.pos,
            root_moves: job.root_moves,
            stack: vec![StackEntry::default(); (crate::search::MAX_PLY + 7) as usize],
            history: state.history,
            counter_moves: state.counter_moves,
            from_to: state.from_to,
            cont_history: state.cont_history,
            pv_idx: 0,
            max_ply: 0,
            calls_cnt: 0,
            root_depth: 0,
            completed_depth: 0,
            best_move_changes: 0.0,
            failed_low: false,
            easy_move_played: false,
            previous_score,
            shared: job.shared,
            comm,
        }
    }

    fn into_state(self) -> (ThreadState, WorkerReport) {
        (
            ThreadState {
                history: self.history,
                counter_moves: self.counter_moves,
                from_to: self.from_to,
                cont_history: self.cont_history,
            },
            WorkerReport {
                completed_depth: self.completed_depth,
                root_moves: self.root_moves,
            },
        )
    }

    fn run(&mut self) {
        if self.idx == 0 {
            self.run_main();
        } else {
            self.iterative_deepening();
        }
    }

    /// Park until the stop signal arrives (pondering / infinite search).
    fn wait_for_stop(&self) {
        let mut st = self.comm.state.lock();
        while !self.shared.signals.stop.load(Ordering::Relaxed) {
            self.comm
                .cond
                .wait_for(&mut st, Duration::from_millis(10));
        }
    }

    /// The main worker: searches, coordinates the stop, aggregates the
    /// helpers and emits `bestmove`.
    fn run_main(&mut self) {
        let mut declared_win = false;
        let mut searched = false;

        if entering_king_win(&self.pos) {
            declared_win = true;
        } else if self.root_moves.is_empty() {
            println!("info depth 0 score {}", score_to_usi(mated_in(0)));
        } else {
            self.iterative_deepening();
            searched = true;
        }

        // In ponder or infinite mode the UI owns the clock: hold the
        // result until stop or ponderhit arrives.
        if !self.shared.signals.stop.load(Ordering::Relaxed)
            && (self.shared.ponder_active() || self.shared.limits.infinite)
        {
            self.shared
                .signals
                .stop_on_ponder_hit
                .store(true, Ordering::Relaxed);
            self.wait_for_stop();
        }

        self.shared.signals.stop.store(true, Ordering::Relaxed);

        // Join the helpers.
        for comm in &self.shared.comms[1..] {
            let mut st = comm.state.lock();
            while st.searching {
                comm.cond.wait(&mut st);
            }
        }

        // Pick the best finished worker.
        let random_pick_live = self.shared.options.max_random_score_diff > 0
            && self.pos.game_ply() <= self.shared.options.max_random_score_diff_ply;
        let mut best: Option<WorkerReport> = None;
        if searched
            && !self.easy_move_played
            && self.shared.options.multi_pv == 1
            && self.shared.limits.depth == 0
            && !random_pick_live
            && !self.root_moves[0].pv[0].is_none()
        {
            let mut best_depth = self.completed_depth;
            let mut best_score = self.root_moves[0].score;
            for comm in &self.shared.comms[1..] {
                let report = comm.report.lock();
                if let Some(rep) = report.as_ref() {
                    let score = rep.root_moves.first().map_or(-SCORE_INFINITE, |r| r.score);
                    if rep.completed_depth > best_depth && score > best_score {
                        best_depth = rep.completed_depth;
                        best_score = score;
                        best = Some(rep.clone());
                    }
                }
            }
        }

        let (final_moves, final_depth, from_helper) = match best {
            Some(rep) => (rep.root_moves, rep.completed_depth, true),
            None => (self.root_moves.clone(), self.completed_depth, false),
        };

        self.previous_score = final_moves.first().map_or(SCORE_INFINITE, |r| r.score);
        *self.shared.previous_score.lock() = self.previous_score;

        if from_helper {
            if let Some(rm) = final_moves.first() {
                let pv: Vec<String> = rm.pv.iter().map(|m| m.to_usi()).collect();
                println!(
                    "info depth {} score {} pv {}",
                    final_depth,
                    score_to_usi(rm.score),
                    pv.join(" ")
                );
            }
        }

        if declared_win {
            println!("bestmove win");
        } else {
            let best_move = final_moves.first().map_or(Move::NONE, |r| r.pv[0]);
            if best_move.is_none() {
                println!("bestmove resign");
            } else {
                let ponder = final_moves
                    .first()
                    .and_then(|r| r.pv.get(1).copied())
                    .or_else(|| self.extract_ponder_from_tt(best_move));
                match ponder {
                    Some(p) if !p.is_none() => {
                        println!("bestmove {} ponder {}", best_move.to_usi(), p.to_usi());
                    }
                    _ => println!("bestmove {}", best_move.to_usi()),
                }
            }
        }
    }

    /// A one-move PV still wants a ponder move: take the reply stored in
    /// the table, when it is legal.
    fn extract_ponder_from_tt(&mut self, best_move: Move) -> Option<Move> {
        self.pos.do_move_simple(best_move);
        let (hit, data, _) = self.shared.tt.probe(self.pos.key());
        let ponder = if hit {
            let mv = self.pos.move16_to_move(data.move16);
            if !mv.is_none() && legal_moves(&self.pos).contains(mv) {
                Some(mv)
            } else {
                None
            }
        } else {
            None
        };
        self.pos.undo_move(best_move);
        ponder
    }
}

fn worker_loop(idx: usize, comm: Arc<WorkerComm>) {
    let mut persist = ThreadState::new();
    loop {
        let job = {
            let mut st = comm.state.lock();
            loop {
                if st.exit {
                    return;
                }
                if st.searching {
                    if let Some(job) = st.job.take() {
                        break job;
                    }
                }
                comm.cond.wait(&mut st);
            }
        };

        comm.nodes.store(0, Ordering::Relaxed);
        let mut worker = Worker::from_parts(idx, job, persist, comm.clone());
        worker.run();
        let (state, report) = worker.into_state();
        persist = state;
        *comm.report.lock() = Some(report);

        {
            let mut st = comm.state.lock();
            st.searching = false;
        }
        comm.cond.notify_all();
    }
}

/// The engine context: worker pool plus every shared table. The design
/// note's answer to the original's process-wide singletons.
pub struct Engine {
    threads: Vec<JoinHandle<()>>,
    comms: Vec<Arc<WorkerComm>>,
    tt: Arc<TranspositionTable>,
    evaluator: Arc<Evaluator>,
    eval_hash: Arc<EvalHashTable>,
    easy: Arc<Mutex<EasyMoveManager>>,
    previous_score: Arc<Mutex<i32>>,
    current: Mutex<Option<Arc<SearchShared>>>,
}

impl Engine {
    #[must_use]
    pub fn new(num_threads: usize, hash_mb: usize, evaluator: Arc<Evaluator>) -> Engine {
        crate::position::attack_tables::init();
        let mut engine = Engine {
            threads: Vec::new(),
            comms: Vec::new(),
            tt: Arc::new(TranspositionTable::new(hash_mb)),
            evaluator,
            eval_hash: Arc::new(EvalHashTable::new()),
            easy: Arc::new(Mutex::new(EasyMoveManager::new())),
            previous_score: Arc::new(Mutex::new(SCORE_INFINITE)),
            current: Mutex::new(None),
        };
        engine.spawn_workers(num_threads.max(1));
        engine
    }

    fn spawn_workers(&mut self, n: usize) {
        for idx in 0..n {
            let comm = Arc::new(WorkerComm::new());
            self.comms.push(comm.clone());
            self.threads.push(std::thread::spawn(move || {
                worker_loop(idx, comm);
            }));
        }
    }

    fn shutdown_workers(&mut self) {
        for comm in &self.comms {
            let mut st = comm.state.lock();
            st.exit = true;
            comm.cond.notify_all();
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        self.comms.clear();
    }

    /// Grow or shrink the pool. Only valid while idle.
    pub fn set_threads(&mut self, n: usize) {
        self.wait_for_search_finished();
        self.shutdown_workers();
        self.spawn_workers(n.max(1));
    }

    /// Replace the transposition table. Only valid while idle.
    pub fn resize_tt(&mut self, mb: usize) {
        self.wait_for_search_finished();
        self.tt = Arc::new(TranspositionTable::new(mb));
    }

    pub fn clear_tt(&self) {
        self.tt.clear();
    }

    pub fn set_evaluator(&mut self, evaluator: Arc<Evaluator>) {
        self.evaluator = evaluator;
    }

    /// `isready`-time reset.
    pub fn new_game(&self) {
        self.tt.clear();
        self.eval_hash.clear();
        *self.previous_score.lock() = SCORE_INFINITE;
    }

    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.comms.len()
    }

    /// Launch a search. Returns immediately; the main worker prints
    /// `bestmove` when the search ends.
    pub fn start_thinking(
        &self,
        pos: &Position,
        limits: LimitsType,
        options: SearchOptions,
        time_options: TimeOptions,
        start_time: Instant,
    ) {
        self.wait_for_search_finished();

        let mut root_moves: Vec<RootMove> = Vec::new();
        for mv in legal_moves(pos).iter() {
            if limits.searchmoves.is_empty() || limits.searchmoves.contains(&mv) {
                root_moves.push(RootMove::new(mv));
            }
        }

        let time_manager = TimeManager::init(
            &limits,
            pos.turn(),
            pos.game_ply(),
            &time_options,
            start_time,
        );

        let shared = Arc::new(SearchShared {
            tt: self.tt.clone(),
            evaluator: self.evaluator.clone(),
            eval_hash: self.eval_hash.clone(),
            signals: Signals::default(),
            ponder: AtomicBool::new(limits.ponder),
            move_time: AtomicI64::new(limits.move_time),
            limits,
            options,
            time_manager,
            comms: self.comms.clone(),
            easy: self.easy.clone(),
            previous_score: self.previous_score.clone(),
        });
        *self.current.lock() = Some(shared.clone());

        for comm in &self.comms {
            *comm.report.lock() = None;
            let mut st = comm.state.lock();
            st.job = Some(Job {
                pos: pos.clone(),
                root_moves: root_moves.clone(),
                shared: shared.clone(),
            });
            st.searching = true;
            comm.cond.notify_all();
        }
    }

    /// `stop` / `gameover` / `quit`: halt and release the main worker.
    pub fn stop(&self) {
        if let Some(shared) = self.current.lock().as_ref() {
            shared.signals.stop.store(true, Ordering::Relaxed);
        }
        if let Some(comm) = self.comms.first() {
            comm.cond.notify_all();
        }
    }

    /// `ponderhit`: the pondered move was played; switch to live timing,
    /// or stop at once when the search already wanted to.
    pub fn ponderhit(&self) {
        let guard = self.current.lock();
        if let Some(shared) = guard.as_ref() {
            if shared.signals.stop_on_ponder_hit.load(Ordering::Relaxed) {
                shared.signals.stop.store(true, Ordering::Relaxed);
                if let Some(comm) = self.comms.first() {
                    comm.cond.notify_all();
                }
            } else {
                shared.ponder.store(false, Ordering::Relaxed);
                let mt = shared.move_time.load(Ordering::Relaxed);
                if mt != 0 {
                    shared
                        .move_time
                        .store(mt + shared.time_manager.elapsed(), Ordering::Relaxed);
                }
            }
        }
    }

    /// Block until every worker has gone idle.
    pub fn wait_for_search_finished(&self) {
        for comm in &self.comms {
            let mut st = comm.state.lock();
            while st.searching {
                comm.cond.wait(&mut st);
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
        self.wait_for_search_finished();
        self.shutdown_workers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_engine() -> Engine {
        Engine::new(1, 16, Arc::new(Evaluator::zeroed()))
    }

    #[test]
    fn test_engine_spins_up_and_down() {
        let mut engine = test_engine();
        assert_eq!(engine.num_threads(), 1);
        engine.set_threads(2);
        assert_eq!(engine.num_threads(), 2);
    }

    #[test]
    fn test_depth_limited_search_completes() {
        let engine = test_engine();
        let pos = Position::startpos();
        let mut limits = LimitsType::default();
        limits.depth = 2;
        engine.start_thinking(
            &pos,
            limits,
            SearchOptions::default(),
            TimeOptions::default(),
            Instant::now(),
        );
        engine.wait_for_search_finished();
        let report = engine.comms[0].report.lock().clone();
        let report = report.expect("main worker must report");
        assert!(report.completed_depth >= 2);
        assert!(!report.root_moves.is_empty());
        assert!(!report.root_moves[0].pv[0].is_none());
    }

    #[test]
    fn test_stop_terminates_infinite_search() {
        let engine = test_engine();
        let pos = Position::startpos();
        let mut limits = LimitsType::default();
        limits.infinite = true;
        engine.start_thinking(
            &pos,
            limits,
            SearchOptions::default(),
            TimeOptions::default(),
            Instant::now(),
        );
        std::thread::sleep(Duration::from_millis(50));
        engine.stop();
        engine.wait_for_search_finished();
    }
}
