use std::sync::RwLock;

/// Sorted string set behind a reader-writer lock.
///
/// Reads vastly outnumber writes here, so membership is a binary search over
/// a sorted `Vec` rather than a hash set.
#[derive(Debug, Default)]
pub struct RuleSet {
    items: RwLock<Vec<String>>,
}

impl RuleSet {
    pub fn new() -> Self {
        RuleSet::default()
    }

    pub fn has(&self, item: &str) -> bool {
        self.items
            .read()
            .unwrap()
            .binary_search_by(|probe| probe.as_str().cmp(item))
            .is_ok()
    }

    /// Insert `item`, keeping the list sorted. Returns false when it was
    /// already present.
    pub fn insert(&self, item: impl Into<String>) -> bool {
        let item = item.into();
        let mut items = self.items.write().unwrap();
        match items.binary_search(&item) {
            Ok(_) => false,
            Err(pos) => {
                items.insert(pos, item);
                true
            }
        }
    }

    /// Remove `item`. Returns false when it was not present.
    pub fn remove(&self, item: &str) -> bool {
        let mut items = self.items.write().unwrap();
        match items.binary_search_by(|probe| probe.as_str().cmp(item)) {
            Ok(pos) => {
                items.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().unwrap().is_empty()
    }
}
