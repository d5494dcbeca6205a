use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Required and collected amount of one item color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafletItem {
    /// Amount required by the leaflet.
    pub total: i64,
    /// Amount collected so far.
    pub collected: i64,
}

impl LeafletItem {
    /// Amount still missing; negative when over-collected.
    #[must_use]
    pub const fn missing(&self) -> i64 {
        self.total - self.collected
    }
}

/// Collection task: item counts per color and a payment on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaflet {
    /// Leaflet id.
    pub id: i64,
    /// Items keyed by color, in wire order.
    pub items: IndexMap<String, LeafletItem>,
    /// Payment on delivery.
    pub payment: i64,
    /// Server-side situation flag (delivered or ready).
    pub situation: bool,
}

impl Leaflet {
    /// Creates an empty leaflet.
    #[must_use]
    pub fn new(id: i64, payment: i64) -> Self {
        Self {
            id,
            items: IndexMap::new(),
            payment,
            situation: false,
        }
    }

    /// Adds or replaces one color.
    #[must_use]
    pub fn with_item(mut self, color: impl Into<String>, total: i64, collected: i64) -> Self {
        self.items
            .insert(color.into(), LeafletItem { total, collected });
        self
    }

    /// True when every item's collected count equals its total.
    /// A leaflet without items is completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.items.values().all(|item| item.collected == item.total)
    }

    /// Required amount of `color`.
    #[must_use]
    pub fn total_of(&self, color: &str) -> Option<i64> {
        self.items.get(color).map(|item| item.total)
    }

    /// Collected amount of `color`.
    #[must_use]
    pub fn collected_of(&self, color: &str) -> Option<i64> {
        self.items.get(color).map(|item| item.collected)
    }

    /// Missing amount of `color`.
    #[must_use]
    pub fn missing_of(&self, color: &str) -> Option<i64> {
        self.items.get(color).map(LeafletItem::missing)
    }

    /// Missing amount per color.
    #[must_use]
    pub fn what_to_collect(&self) -> IndexMap<String, i64> {
        self.items
            .iter()
            .map(|(color, item)| (color.clone(), item.missing()))
            .collect()
    }

    /// True when the leaflet asks for `color`.
    #[must_use]
    pub fn contains_type(&self, color: &str) -> bool {
        self.items.contains_key(color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_leaflet_is_completed() {
        assert!(Leaflet::new(1, 10).is_completed());
    }

    #[test]
    fn completion_requires_every_item() {
        let mut leaflet = Leaflet::new(7, 20)
            .with_item("Red", 2, 2)
            .with_item("Blue", 1, 0);
        assert!(!leaflet.is_completed());
        leaflet.items.insert(
            "Blue".into(),
            LeafletItem {
                total: 1,
                collected: 1,
            },
        );
        assert!(leaflet.is_completed());
    }

    #[test]
    fn counts_by_color() {
        let leaflet = Leaflet::new(3, 5)
            .with_item("Green", 3, 1)
            .with_item("White", 1, 1);
        assert_eq!(leaflet.total_of("Green"), Some(3));
        assert_eq!(leaflet.collected_of("Green"), Some(1));
        assert_eq!(leaflet.missing_of("Green"), Some(2));
        assert_eq!(leaflet.missing_of("Yellow"), None);
        assert!(leaflet.contains_type("White"));
        let todo = leaflet.what_to_collect();
        assert_eq!(todo.get_index(0), Some((&"Green".to_string(), &2)));
        assert_eq!(todo["White"], 0);
    }
}
