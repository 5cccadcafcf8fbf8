//! Lockless shared transposition table.
//!
//! Three entries per cluster. Each entry is one atomic 64-bit data word
//! (move, score, static eval, generation+bound, depth) plus an atomic
//! 16-bit key fragment; readers verify the fragment and the search layer
//! re-validates any stored move, so torn cross-thread writes are harmless.

use std::sync::atomic::{AtomicU16, AtomicU64, AtomicU8, Ordering};

/// One search ply of depth. Depths are plain ply counts.
pub const DEPTH_QCHECKS: i32 = 0;
pub const DEPTH_QNO_CHECKS: i32 = -1;
pub const DEPTH_QRECAPTURES: i32 = -5;
pub const DEPTH_NONE: i32 = -6;

/// Score bound stored in the low two bits of the generation byte.
pub type Bound = u8;
pub const BOUND_NONE: Bound = 0;
pub const BOUND_UPPER: Bound = 1;
pub const BOUND_LOWER: Bound = 2;
pub const BOUND_EXACT: Bound = BOUND_UPPER | BOUND_LOWER;

/// Sentinel for "no score stored".
pub const SCORE_NONE: i32 = 32002;

const CLUSTER_SIZE: usize = 3;

/// Decoded entry contents.
#[derive(Clone, Copy, Debug, Default)]
pub struct TtData {
    pub move16: u16,
    pub score: i32,
    pub eval: i32,
    pub depth: i32,
    pub bound: Bound,
    pub generation: u8,
}

struct Entry {
    data: AtomicU64,
    key16: AtomicU16,
}

impl Entry {
    #[inline]
    fn decode(word: u64) -> TtData {
        TtData {
            move16: word as u16,
            score: (word >> 16) as u16 as i16 as i32,
            eval: (word >> 32) as u16 as i16 as i32,
            bound: ((word >> 48) as u8) & 0x3,
            generation: ((word >> 48) as u8) & 0xfc,
            depth: (word >> 56) as u8 as i8 as i32,
        }
    }

    #[inline]
    fn encode(data: &TtData) -> u64 {
        (data.move16 as u64)
            | (((data.score as i16 as u16) as u64) << 16)
            | (((data.eval as i16 as u16) as u64) << 32)
            | (((data.generation | data.bound) as u64) << 48)
            | (((data.depth as i8 as u8) as u64) << 56)
    }
}

#[repr(align(64))]
struct Cluster {
    entries: [Entry; CLUSTER_SIZE],
}

/// A handle to the probed (or victim) entry; `save` applies the
/// replacement policy against the entry's current contents.
pub struct TtEntryRef<'a> {
    entry: &'a Entry,
}

impl TtEntryRef<'_> {
    /// Store with the usual preference rules: a new position always
    /// overwrites; the same position keeps the older move when the new
    /// one is empty and only deepens score/eval on a clearly better
    /// (deeper by 4, or exact) result.
    pub fn save(
        &self,
        pos_key: u64,
        score: i32,
        bound: Bound,
        depth: i32,
        move16: u16,
        eval: i32,
        generation: u8,
    ) {
        let key16 = (pos_key >> 48) as u16;
        let old_key = self.entry.key16.load(Ordering::Relaxed);
        let mut data = Entry::decode(self.entry.data.load(Ordering::Relaxed));

        if move16 != 0 || key16 != old_key {
            data.move16 = move16;
        }

        if key16 != old_key || depth > data.depth - 4 || bound == BOUND_EXACT {
            data.score = score;
            data.eval = eval;
            data.bound = bound;
            data.generation = generation;
            data.depth = depth;
            self.entry.data.store(Entry::encode(&data), Ordering::Relaxed);
            self.entry.key16.store(key16, Ordering::Relaxed);
        } else {
            // Move-only refresh.
            self.entry.data.store(Entry::encode(&data), Ordering::Relaxed);
        }
    }
}

pub struct TranspositionTable {
    clusters: Vec<Cluster>,
    generation: AtomicU8,
}

impl TranspositionTable {
    /// Allocate with the given size in MiB, rounded down to a power of two
    /// of clusters. Allocation failure is fatal.
    #[must_use]
    pub fn new(mb: usize) -> TranspositionTable {
        let bytes = mb.max(1) * 1024 * 1024;
        let count = (bytes / std::mem::size_of::<Cluster>())
            .next_power_of_two()
            .checked_shr(1)
            .unwrap_or(1)
            .max(1);

        // Zeroed pages straight from the allocator: an all-zero cluster is
        // a valid empty cluster, and untouched pages stay uncommitted.
        let layout = std::alloc::Layout::array::<Cluster>(count)
            .expect("cluster layout fits an allocation");
        let clusters = unsafe {
            let ptr = std::alloc::alloc_zeroed(layout).cast::<Cluster>();
            if ptr.is_null() {
                log::error!("failed to allocate transposition table: {mb} MiB");
                eprintln!("failed to allocate transposition table: {mb} MiB");
                std::process::exit(1);
            }
            Vec::from_raw_parts(ptr, count, count)
        };

        log::info!(
            "transposition table: {} clusters ({} MiB)",
            count,
            count * std::mem::size_of::<Cluster>() >> 20
        );
        TranspositionTable {
            clusters,
            generation: AtomicU8::new(0),
        }
    }

    /// Age out earlier searches. The low two bits carry the bound, so the
    /// generation advances in steps of 4.
    pub fn new_search(&self) {
        self.generation.fetch_add(4, Ordering::Relaxed);
    }

    #[inline]
    #[must_use]
    pub fn generation(&self) -> u8 {
        self.generation.load(Ordering::Relaxed) & 0xfc
    }

    pub fn clear(&self) {
        for cluster in &self.clusters {
            for entry in &cluster.entries {
                entry.data.store(0, Ordering::Relaxed);
                entry.key16.store(0, Ordering::Relaxed);
            }
        }
    }

    /// Find the entry for `key`, or the best replacement victim.
    /// Returns `(found, contents, handle)`.
    #[must_use]
    pub fn probe(&self, key: u64) -> (bool, TtData, TtEntryRef<'_>) {
        let cluster = &self.clusters[(key as usize) & (self.clusters.len() - 1)];
        let key16 = (key >> 48) as u16;
        let generation = self.generation();

        for entry in &cluster.entries {
            let stored = entry.key16.load(Ordering::Relaxed);
            if stored == 0 || stored == key16 {
                let mut data = Entry::decode(entry.data.load(Ordering::Relaxed));
                if stored != 0 && data.generation != generation {
                    // Refresh the generation so the entry survives aging.
                    data.generation = generation;
                    entry.data.store(Entry::encode(&data), Ordering::Relaxed);
                }
                return (stored != 0, data, TtEntryRef { entry });
            }
        }

        // Replace the shallowest, oldest entry.
        let mut victim = &cluster.entries[0];
        let mut victim_value = i32::MAX;
        for entry in &cluster.entries {
            let data = Entry::decode(entry.data.load(Ordering::Relaxed));
            let age = ((259 + generation as i32 - (data.generation | data.bound) as i32)
                & 0xfc)
                * 2;
            let value = data.depth - age;
            if value < victim_value {
                victim_value = value;
                victim = entry;
            }
        }
        (false, TtData::default(), TtEntryRef { entry: victim })
    }

    /// Hint the cluster for `key` into cache ahead of a probe.
    #[inline]
    pub fn prefetch(&self, key: u64) {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            let ptr = &self.clusters[(key as usize) & (self.clusters.len() - 1)] as *const Cluster;
            core::arch::x86_64::_mm_prefetch(ptr.cast::<i8>(), core::arch::x86_64::_MM_HINT_T0);
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            let _ = key;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_miss_then_hit() {
        let tt = TranspositionTable::new(1);
        let key = 0x1234_5678_9abc_def0;

        let (found, _, entry) = tt.probe(key);
        assert!(!found);
        entry.save(key, 42, BOUND_EXACT, 7, 0x1111, 17, tt.generation());

        let (found, data, _) = tt.probe(key);
        assert!(found);
        assert_eq!(data.score, 42);
        assert_eq!(data.eval, 17);
        assert_eq!(data.depth, 7);
        assert_eq!(data.bound, BOUND_EXACT);
        assert_eq!(data.move16, 0x1111);
    }

    #[test]
    fn test_same_key_keeps_move_on_shallow_overwrite() {
        let tt = TranspositionTable::new(1);
        let key = 0xffee_0000_0000_0001;
        let (_, _, entry) = tt.probe(key);
        entry.save(key, 10, BOUND_LOWER, 10, 0xabcd, 0, tt.generation());

        // Shallower save with no move: score stays, move stays.
        let (_, _, entry) = tt.probe(key);
        entry.save(key, -5, BOUND_UPPER, 2, 0, 0, tt.generation());
        let (found, data, _) = tt.probe(key);
        assert!(found);
        assert_eq!(data.move16, 0xabcd);
        assert_eq!(data.score, 10);
        assert_eq!(data.depth, 10);
    }

    #[test]
    fn test_different_key_replaces() {
        let tt = TranspositionTable::new(1);
        let k1 = 0x1111_0000_0000_0042;
        let (_, _, e) = tt.probe(k1);
        e.save(k1, 5, BOUND_EXACT, 3, 7, 0, tt.generation());

        // Same cluster (same low bits), different upper bits.
        let k2 = 0x2222_0000_0000_0042;
        let (found, _, e) = tt.probe(k2);
        assert!(!found);
        e.save(k2, 9, BOUND_EXACT, 4, 8, 0, tt.generation());
        let (found, data, _) = tt.probe(k2);
        assert!(found);
        assert_eq!(data.score, 9);
        // k1 still present in another slot of the cluster.
        let (found, data, _) = tt.probe(k1);
        assert!(found);
        assert_eq!(data.score, 5);
    }

    #[test]
    fn test_negative_depth_round_trip() {
        let tt = TranspositionTable::new(1);
        let key = 0x0f0f_0000_0000_0009;
        let (_, _, e) = tt.probe(key);
        e.save(key, -300, BOUND_UPPER, DEPTH_QNO_CHECKS, 0, -120, tt.generation());
        let (found, data, _) = tt.probe(key);
        assert!(found);
        assert_eq!(data.depth, DEPTH_QNO_CHECKS);
        assert_eq!(data.score, -300);
        assert_eq!(data.eval, -120);
    }

    #[test]
    fn test_clear_and_generation() {
        let tt = TranspositionTable::new(1);
        assert_eq!(tt.generation(), 0);
        tt.new_search();
        assert_eq!(tt.generation(), 4);
        let key = 77;
        let (_, _, e) = tt.probe(key);
        e.save(key, 1, BOUND_EXACT, 1, 1, 1, tt.generation());
        tt.clear();
        let (found, _, _) = tt.probe(key);
        assert!(!found);
    }
}
