//! Shared lockless evaluation cache.
//!
//! Direct-mapped, keyed by the turn-less position key. An entry is four
//! 64-bit words: three payload words and the key XORed with all three, so
//! a reader that XORs them back and compares against the expected key
//! rejects any torn write without locking.

use std::sync::atomic::{AtomicU64, Ordering};

use super::EvalSum;

/// 2^22 entries of 32 bytes.
const EVAL_TABLE_SIZE: usize = 0x40_0000;

pub struct EvalHashTable {
    entries: Vec<[AtomicU64; 4]>,
}

impl EvalHashTable {
    #[must_use]
    pub fn new() -> EvalHashTable {
        // Zeroed allocation: an all-zero entry reads as a miss, and the
        // untouched pages cost nothing until written.
        let layout = std::alloc::Layout::array::<[AtomicU64; 4]>(EVAL_TABLE_SIZE)
            .expect("eval hash layout fits an allocation");
        let entries = unsafe {
            let ptr = std::alloc::alloc_zeroed(layout).cast::<[AtomicU64; 4]>();
            if ptr.is_null() {
                log::error!("failed to allocate evaluation cache");
                eprintln!("failed to allocate evaluation cache");
                std::process::exit(1);
            }
            Vec::from_raw_parts(ptr, EVAL_TABLE_SIZE, EVAL_TABLE_SIZE)
        };
        EvalHashTable { entries }
    }

    pub fn clear(&self) {
        for entry in &self.entries {
            for word in entry {
                word.store(0, Ordering::Relaxed);
            }
        }
    }

    #[inline]
    fn slot(&self, key_excl_turn: u64) -> &[AtomicU64; 4] {
        &self.entries[(key_excl_turn as usize) & (EVAL_TABLE_SIZE - 1)]
    }

    /// Look up the cached sum; `None` on miss or torn entry.
    #[must_use]
    pub fn probe(&self, key_excl_turn: u64) -> Option<EvalSum> {
        let entry = self.slot(key_excl_turn);
        let d0 = entry[0].load(Ordering::Relaxed);
        let d1 = entry[1].load(Ordering::Relaxed);
        let d2 = entry[2].load(Ordering::Relaxed);
        let sealed = entry[3].load(Ordering::Relaxed);
        if sealed ^ d0 ^ d1 ^ d2 == key_excl_turn && (d0 | d1 | d2 | sealed) != 0 {
            Some(EvalSum::from_words([d0, d1, d2]))
        } else {
            None
        }
    }

    pub fn store(&self, key_excl_turn: u64, sum: EvalSum) {
        let entry = self.slot(key_excl_turn);
        let [d0, d1, d2] = sum.to_words();
        entry[0].store(d0, Ordering::Relaxed);
        entry[1].store(d1, Ordering::Relaxed);
        entry[2].store(d2, Ordering::Relaxed);
        entry[3].store(key_excl_turn ^ d0 ^ d1 ^ d2, Ordering::Relaxed);
    }
}

impl Default for EvalHashTable {
    fn default() -> Self {
        EvalHashTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_probe_round_trip() {
        let table = EvalHashTable::new();
        let mut sum = EvalSum::ZERO;
        sum.p[0] = [123, -45];
        sum.p[1] = [-6, 7];
        sum.p[2] = [89, 0];
        let key = 0xdead_beef_cafe_0042;
        table.store(key, sum);
        let got = table.probe(key).expect("stored entry should be found");
        assert_eq!(got.p, sum.p);
    }

    #[test]
    fn test_probe_rejects_other_key() {
        let table = EvalHashTable::new();
        let mut sum = EvalSum::ZERO;
        sum.p[0] = [1, 2];
        table.store(0x1111, sum);
        // Same slot (same low bits), different key: must miss.
        assert!(table.probe(0x1111 + (EVAL_TABLE_SIZE as u64)).is_none());
    }

    #[test]
    fn test_empty_table_misses() {
        let table = EvalHashTable::new();
        assert!(table.probe(0).is_none());
        assert!(table.probe(42).is_none());
    }
}
