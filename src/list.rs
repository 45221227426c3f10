//! The flat-row boundary between the tree model and a virtualized renderer.
//!
//! The model never hands out its internal nodes for rendering. Instead it
//! emits ordered splice instructions — delete a contiguous row range,
//! insert a new one — and the renderer applies them to whatever flat
//! storage it keeps, without ever re-scanning the tree.

/// A render-ready snapshot of one visible tree row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatEntry<T> {
    /// The caller's data item for this row.
    pub element: T,
    /// Nesting depth; children of the synthetic root are at depth 1.
    pub depth: usize,
    /// Whether this row can be collapsed (always true for rows with children).
    pub collapsible: bool,
    /// Whether this row is currently collapsed.
    pub collapsed: bool,
}

/// Consumer of row-level splice instructions.
///
/// `on_splice(start, delete_count, inserted)` means: in the flat visible
/// sequence, replace the `delete_count` rows starting at `start` with
/// `inserted`. Collapse and expand toggles replace the toggled row itself
/// along with its descendant range, so row snapshots never go stale.
pub trait TreeSink<T> {
    fn on_splice(&mut self, start: usize, delete_count: usize, inserted: Vec<FlatEntry<T>>);
}

/// Reference sink: a plain vector of rows kept in sync purely from splices.
///
/// This is what the demo renderer draws from, and what tests use to check
/// that the splice stream alone reproduces the tree's visible sequence.
#[derive(Debug, Default)]
pub struct RowBuffer<T> {
    rows: Vec<FlatEntry<T>>,
    splices: usize,
}

impl<T> RowBuffer<T> {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            splices: 0,
        }
    }

    /// All currently visible rows, in flat (pre-order) order.
    pub fn rows(&self) -> &[FlatEntry<T>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FlatEntry<T>> {
        self.rows.get(index)
    }

    /// Number of splice instructions received so far.
    pub fn splice_count(&self) -> usize {
        self.splices
    }
}

impl<T> TreeSink<T> for RowBuffer<T> {
    fn on_splice(&mut self, start: usize, delete_count: usize, inserted: Vec<FlatEntry<T>>) {
        debug_assert!(start + delete_count <= self.rows.len());
        self.rows.splice(start..start + delete_count, inserted);
        self.splices += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(element: u32) -> FlatEntry<u32> {
        FlatEntry {
            element,
            depth: 1,
            collapsible: false,
            collapsed: false,
        }
    }

    #[test]
    fn splice_inserts_rows() {
        let mut buf = RowBuffer::new();
        buf.on_splice(0, 0, vec![entry(1), entry(2), entry(3)]);
        let elements: Vec<u32> = buf.rows().iter().map(|r| r.element).collect();
        assert_eq!(elements, vec![1, 2, 3]);
        assert_eq!(buf.splice_count(), 1);
    }

    #[test]
    fn splice_replaces_middle_range() {
        let mut buf = RowBuffer::new();
        buf.on_splice(0, 0, vec![entry(1), entry(2), entry(3), entry(4)]);
        buf.on_splice(1, 2, vec![entry(9)]);
        let elements: Vec<u32> = buf.rows().iter().map(|r| r.element).collect();
        assert_eq!(elements, vec![1, 9, 4]);
    }

    #[test]
    fn splice_deletes_without_insert() {
        let mut buf = RowBuffer::new();
        buf.on_splice(0, 0, vec![entry(1), entry(2)]);
        buf.on_splice(0, 2, Vec::new());
        assert!(buf.is_empty());
        assert_eq!(buf.splice_count(), 2);
    }
}
