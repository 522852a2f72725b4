//! Venue adapters and the exchange registry.

pub mod binance;

use std::collections::HashMap;
use std::sync::Arc;

use crate::ports::exchange::Exchange;

/// Registry of configured venues.
///
/// Preserves config order: withdrawal planning scans venues in the order
/// the operator listed them.
#[derive(Default)]
pub struct ExchangeRegistry {
    venues: Vec<Arc<dyn Exchange>>,
    by_id: HashMap<String, usize>,
}

impl ExchangeRegistry {
    pub fn new(venues: Vec<Arc<dyn Exchange>>) -> Self {
        let by_id = venues
            .iter()
            .enumerate()
            .map(|(i, v)| (v.id().to_string(), i))
            .collect();
        Self { venues, by_id }
    }

    /// Look up a venue by id.
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Exchange>> {
        self.by_id.get(id).map(|&i| &self.venues[i])
    }

    /// All venues, in config order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Exchange>> {
        self.venues.iter()
    }

    /// Configured venue ids, in config order.
    pub fn ids(&self) -> Vec<String> {
        self.venues.iter().map(|v| v.id().to_string()).collect()
    }
}
