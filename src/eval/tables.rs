//! The KPP / KKP / K00 feature tables and their binary file format.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::position::types::Square;

use super::list::{EvalIndex, FE_END};

const SQ_NB: usize = 81;
const FE: usize = FE_END as usize;

const KPP_ELEMS: usize = SQ_NB * FE * FE * 2;
const KKP_ELEMS: usize = SQ_NB * SQ_NB * FE * 2;
const K00_ELEMS: usize = SQ_NB * SQ_NB;

/// Reads and writes go through the OS in slices no larger than this; some
/// platforms' I/O layers reject single transfers beyond 2 GiB.
const IO_CHUNK: usize = 1 << 30;

pub const KPP_FILE_NAME: &str = "KPP_synthesized.bin";
pub const KKP_FILE_NAME: &str = "KKP_synthesized.bin";

/// The trained feature tables. KPP entries are (board, turn) i16 pairs
/// symmetric in the two piece indices; KKP entries are i32 pairs; K00 is a
/// per-king-pair base score.
pub struct Evaluator {
    kpp: Vec<i16>,
    kkp: Vec<i32>,
    k00: Vec<i32>,
}

impl Evaluator {
    /// All-zero tables: evaluation degenerates to material only.
    #[must_use]
    pub fn zeroed() -> Evaluator {
        Evaluator {
            kpp: vec![0; KPP_ELEMS],
            kkp: vec![0; KKP_ELEMS],
            k00: vec![0; K00_ELEMS],
        }
    }

    /// Load the synthesized binaries from a directory. K00 has no file of
    /// its own and stays zero.
    pub fn load(dir: &Path) -> io::Result<Evaluator> {
        let mut ev = Evaluator::zeroed();
        read_raw(&dir.join(KPP_FILE_NAME), as_bytes_mut_i16(&mut ev.kpp))?;
        read_raw(&dir.join(KKP_FILE_NAME), as_bytes_mut_i32(&mut ev.kkp))?;
        log::info!(
            "loaded evaluation tables from {} ({} MiB)",
            dir.display(),
            (ev.kpp.len() * 2 + ev.kkp.len() * 4) >> 20
        );
        Ok(ev)
    }

    /// Dump the tables in the same format.
    pub fn write(&self, dir: &Path) -> io::Result<()> {
        write_raw(&dir.join(KPP_FILE_NAME), as_bytes_i16(&self.kpp))?;
        write_raw(&dir.join(KKP_FILE_NAME), as_bytes_i32(&self.kkp))?;
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn kpp_pair(&self, king: Square, i: EvalIndex, j: EvalIndex) -> (i32, i32) {
        let base = ((king.index() * FE + i as usize) * FE + j as usize) * 2;
        (self.kpp[base] as i32, self.kpp[base + 1] as i32)
    }

    #[inline]
    #[must_use]
    pub fn kkp_pair(&self, bk: Square, wk: Square, i: EvalIndex) -> (i32, i32) {
        let base = ((bk.index() * SQ_NB + wk.index()) * FE + i as usize) * 2;
        (self.kkp[base] as i32, self.kkp[base + 1] as i32)
    }

    #[inline]
    #[must_use]
    pub fn k00(&self, bk: Square, wk: Square) -> i32 {
        self.k00[bk.index() * SQ_NB + wk.index()]
    }

    /// Test hook: poke one KPP pair (both symmetric slots).
    #[cfg(test)]
    pub fn set_kpp(&mut self, king: Square, i: EvalIndex, j: EvalIndex, pair: (i16, i16)) {
        for (a, b) in [(i, j), (j, i)] {
            let base = ((king.index() * FE + a as usize) * FE + b as usize) * 2;
            self.kpp[base] = pair.0;
            self.kpp[base + 1] = pair.1;
        }
    }

    #[cfg(test)]
    pub fn set_kkp(&mut self, bk: Square, wk: Square, i: EvalIndex, pair: (i32, i32)) {
        let base = ((bk.index() * SQ_NB + wk.index()) * FE + i as usize) * 2;
        self.kkp[base] = pair.0;
        self.kkp[base + 1] = pair.1;
    }
}

// The tables are plain integer arrays dumped in host endianness, so file
// transfer is a byte-for-byte copy of the in-memory representation.

fn as_bytes_mut_i16(v: &mut [i16]) -> &mut [u8] {
    unsafe { std::slice::from_raw_parts_mut(v.as_mut_ptr().cast::<u8>(), v.len() * 2) }
}

fn as_bytes_i16(v: &[i16]) -> &[u8] {
    unsafe { std::slice::from_raw_parts(v.as_ptr().cast::<u8>(), v.len() * 2) }
}

fn as_bytes_mut_i32(v: &mut [i32]) -> &mut [u8] {
    unsafe { std::slice::from_raw_parts_mut(v.as_mut_ptr().cast::<u8>(), v.len() * 4) }
}

fn as_bytes_i32(v: &[i32]) -> &[u8] {
    unsafe { std::slice::from_raw_parts(v.as_ptr().cast::<u8>(), v.len() * 4) }
}

fn read_raw(path: &Path, buf: &mut [u8]) -> io::Result<()> {
    let mut file = File::open(path)?;
    for chunk in buf.chunks_mut(IO_CHUNK) {
        file.read_exact(chunk)?;
    }
    Ok(())
}

fn write_raw(path: &Path, buf: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    for chunk in buf.chunks(IO_CHUNK) {
        file.write_all(chunk)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kpp_symmetry_hook() {
        let mut ev = Evaluator::zeroed();
        let k = Square::from_index(40);
        ev.set_kpp(k, 100, 200, (7, -3));
        assert_eq!(ev.kpp_pair(k, 100, 200), (7, -3));
        assert_eq!(ev.kpp_pair(k, 200, 100), (7, -3));
        assert_eq!(ev.kpp_pair(k, 100, 201), (0, 0));
    }

    #[test]
    fn test_kkp_lookup() {
        let mut ev = Evaluator::zeroed();
        let bk = Square::from_index(4);
        let wk = Square::from_index(76);
        ev.set_kkp(bk, wk, 33, (1000, -5));
        assert_eq!(ev.kkp_pair(bk, wk, 33), (1000, -5));
        assert_eq!(ev.kkp_pair(wk, bk, 33), (0, 0));
    }
}
