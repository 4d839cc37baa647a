use crate::error::ChipsError;
use std::io;

// NB. indices are usize everywhere in here; the Address type only matters once
//     an instruction operand has been decoded

/// fixed-size block of byte cells owned by exactly one device. every access
/// is bounds-checked and a failed access never touches the cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellStore {
    cells: Box<[u8]>,
}

/// a copy of a store's cells, taken on run and put back on stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot(Box<[u8]>);

impl CellStore {
    /// zeroed store of `len` cells
    pub fn new(len: usize) -> Self {
        CellStore {
            cells: vec![0u8; len].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// single cell, or None past the end
    pub fn read(&self, index: usize) -> Option<u8> {
        self.cells.get(index).copied()
    }

    /// false (and no change) past the end
    pub fn write(&mut self, index: usize, value: u8) -> bool {
        match self.cells.get_mut(index) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    /// `len` cells starting at `index`; used to fetch a whole instruction
    pub fn read_span(&self, index: usize, len: usize) -> Option<&[u8]> {
        let end = index.checked_add(len)?;
        self.cells.get(index..end)
    }

    /// copy `data` into the store at `offset`; nothing is written unless it
    /// all fits
    pub fn load(&mut self, offset: usize, data: &[u8]) -> Result<(), ChipsError> {
        let len = self.len();
        let end = offset
            .checked_add(data.len())
            .filter(|end| *end <= len)
            .ok_or(ChipsError::OutOfBounds {
                index: offset.saturating_add(data.len()),
                len,
            })?;
        self.cells[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// read an unknown amount of data (a program image, say) into the store
    pub fn load_from(&mut self, reader: &mut impl io::Read, offset: usize) -> Result<(), ChipsError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        self.load(offset, &buf)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.cells.clone())
    }

    /// put back a snapshot taken from this store
    pub fn restore(&mut self, snapshot: &Snapshot) {
        // snapshots only ever come from the same store, so lengths agree
        debug_assert_eq!(snapshot.0.len(), self.cells.len());
        let n = snapshot.0.len().min(self.cells.len());
        self.cells[..n].copy_from_slice(&snapshot.0[..n]);
    }

    /// zero every cell
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_memory_zeroed() {
        let m = CellStore::new(64);
        assert_eq!(m.len(), 64);
        assert_eq!(m.as_slice(), &[0; 64]);
    }

    #[test]
    fn test_write_out_of_bounds() {
        let mut m = CellStore::new(16);
        assert!(!m.write(16, 0xff));
        assert_eq!(m.read(16), None);
        assert_eq!(m.as_slice(), &[0; 16]);
    }

    #[test]
    fn test_read_span() {
        let mut m = CellStore::new(8);
        m.load(0, &[0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
        assert_eq!(m.read_span(2, 3), Some(&[2u8, 3, 4][..]));
        assert_eq!(m.read_span(6, 2), Some(&[6u8, 7][..]));
        assert_eq!(m.read_span(6, 3), None);
        assert_eq!(m.read_span(usize::MAX, 2), None);
    }

    #[test]
    fn test_load_from_reader() -> Result<(), ChipsError> {
        let mut m = CellStore::new(16);
        let mut src: &[u8] = &[0, 1, 2, 3, 4, 5, 6, 7];
        m.load_from(&mut src, 8)?;
        assert_eq!(m.as_slice(), &[0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7]);
        Ok(())
    }

    #[test]
    fn test_load_too_much_leaves_store_alone() {
        let mut m = CellStore::new(8);
        let r = m.load(4, &[1; 8]);
        assert!(matches!(r, Err(ChipsError::OutOfBounds { .. })));
        assert_eq!(m.as_slice(), &[0; 8]);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut m = CellStore::new(4);
        m.write(1, 9);
        let snap = m.snapshot();
        m.write(1, 3);
        m.write(2, 4);
        m.restore(&snap);
        assert_eq!(m.as_slice(), &[0, 9, 0, 0]);
    }

    proptest! {
        #[test]
        fn prop_write_then_read(len in 1usize..300, index in 0usize..400, value: u8) {
            let mut m = CellStore::new(len);
            let before = m.clone();
            let written = m.write(index, value);
            if index < len {
                prop_assert!(written);
                prop_assert_eq!(m.read(index), Some(value));
            } else {
                prop_assert!(!written);
                prop_assert_eq!(m.read(index), None);
                prop_assert_eq!(m, before);
            }
        }
    }
}
