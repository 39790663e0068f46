use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSelection {
    indices: BTreeSet<usize>,
    anchor: Option<usize>,
}

impl PageSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_single(&mut self, index: usize) {
        self.indices.clear();
        self.indices.insert(index);
        self.anchor = Some(index);
    }

    /// Shift-click: selects the inclusive range between the anchor and `index`.
    /// The anchor stays put so successive shift-clicks grow or shrink the range.
    pub fn select_range(&mut self, index: usize) {
        let Some(anchor) = self.anchor else {
            self.select_single(index);
            return;
        };
        let (start, end) = (anchor.min(index), anchor.max(index));
        self.indices = (start..=end).collect();
    }

    pub fn toggle(&mut self, index: usize) {
        if !self.indices.remove(&index) {
            self.indices.insert(index);
        }
        self.anchor = Some(index);
    }

    pub fn select_all(&mut self, page_count: usize) {
        self.indices = (0..page_count).collect();
        self.anchor = if page_count > 0 { Some(0) } else { None };
    }

    pub fn clear(&mut self) {
        self.indices.clear();
        self.anchor = None;
    }

    pub fn clamp(&mut self, page_count: usize) {
        self.indices.retain(|&index| index < page_count);
        if self.anchor.is_some_and(|anchor| anchor >= page_count) {
            self.anchor = None;
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    pub fn anchor(&self) -> Option<usize> {
        self.anchor
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    pub fn as_sorted_list(&self) -> Vec<usize> {
        self.iter().collect()
    }
}
