//! The set of labels currently tracked.

use std::sync::Arc;

use rustc_hash::FxHashSet;

/// Watched block labels. Labels are interned so every tracked position
/// shares one allocation per label.
#[derive(Clone, Debug, Default)]
pub struct WatchList {
    labels: FxHashSet<Arc<str>>,
}

impl WatchList {
    /// Creates an empty watch list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `label` is watched.
    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// The interned copy of `label`, if watched.
    pub fn get(&self, label: &str) -> Option<Arc<str>> {
        self.labels.get(label).cloned()
    }

    /// Number of watched labels.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether nothing is watched.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterate the watched labels in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<str>> {
        self.labels.iter()
    }

    /// Replace the list, returning `(removed, added)` sorted by label.
    pub fn replace<I, S>(&mut self, labels: I) -> (Vec<Arc<str>>, Vec<Arc<str>>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut next: FxHashSet<Arc<str>> = FxHashSet::default();
        for label in labels {
            let label = label.as_ref();
            // Reuse the existing allocation when the label stays.
            let interned = self.labels.get(label).cloned().unwrap_or_else(|| Arc::from(label));
            next.insert(interned);
        }

        let mut removed: Vec<Arc<str>> = self.labels.difference(&next).cloned().collect();
        let mut added: Vec<Arc<str>> = next.difference(&self.labels).cloned().collect();
        removed.sort();
        added.sort();

        self.labels = next;
        (removed, added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_reports_diff() {
        let mut watch = WatchList::new();
        let (removed, added) = watch.replace(["diamond_ore", "iron_ore"]);
        assert!(removed.is_empty());
        assert_eq!(added.len(), 2);

        let (removed, added) = watch.replace(["iron_ore", "gold_ore"]);
        assert_eq!(removed, vec![Arc::<str>::from("diamond_ore")]);
        assert_eq!(added, vec![Arc::<str>::from("gold_ore")]);
        assert!(watch.contains("iron_ore"));
        assert!(!watch.contains("diamond_ore"));
    }

    #[test]
    fn test_same_list_twice_is_empty_diff() {
        let mut watch = WatchList::new();
        watch.replace(["spawner"]);
        let (removed, added) = watch.replace(["spawner"]);
        assert!(removed.is_empty());
        assert!(added.is_empty());
    }

    #[test]
    fn test_interned_label_reused() {
        let mut watch = WatchList::new();
        watch.replace(["ancient_debris"]);
        let before = watch.get("ancient_debris").unwrap();
        watch.replace(["ancient_debris", "emerald_ore"]);
        let after = watch.get("ancient_debris").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_duplicates_collapse() {
        let mut watch = WatchList::new();
        let (_, added) = watch.replace(vec!["a".to_string(), "a".to_string()]);
        assert_eq!(added.len(), 1);
        assert_eq!(watch.len(), 1);
    }
}
