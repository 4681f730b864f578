use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::types::{Hash, SwapInfo};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("swap {0} is already ongoing")]
    DuplicateSwap(Hash),
}

#[derive(Default)]
struct Registry {
    ongoing: HashMap<Hash, SwapInfo>,
    completed: HashMap<Hash, SwapInfo>,
}

/// Registry of swaps by offer ID. Swaps own their state; the manager only
/// indexes snapshots for lookup and lifecycle bookkeeping.
pub struct SwapManager {
    registry: Mutex<Registry>,
}

impl SwapManager {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn add_swap(&self, info: &SwapInfo) -> Result<(), ManagerError> {
        let mut registry = self.registry.lock().expect("swap registry lock poisoned");
        if registry.ongoing.contains_key(&info.offer_id) {
            return Err(ManagerError::DuplicateSwap(info.offer_id));
        }
        registry.ongoing.insert(info.offer_id, info.clone());
        Ok(())
    }

    /// Refreshes the indexed snapshot of an ongoing swap.
    pub fn update_ongoing_swap(&self, info: &SwapInfo) {
        let mut registry = self.registry.lock().expect("swap registry lock poisoned");
        if registry.ongoing.contains_key(&info.offer_id) {
            registry.ongoing.insert(info.offer_id, info.clone());
        }
    }

    /// Moves a swap to the completed set. Idempotent.
    pub fn complete_ongoing_swap(&self, info: &SwapInfo) {
        let mut registry = self.registry.lock().expect("swap registry lock poisoned");
        registry.ongoing.remove(&info.offer_id);
        registry.completed.insert(info.offer_id, info.clone());
    }

    pub fn get_ongoing_swap(&self, id: &Hash) -> Option<SwapInfo> {
        self.registry
            .lock()
            .expect("swap registry lock poisoned")
            .ongoing
            .get(id)
            .cloned()
    }

    pub fn get_past_swap(&self, id: &Hash) -> Option<SwapInfo> {
        self.registry
            .lock()
            .expect("swap registry lock poisoned")
            .completed
            .get(id)
            .cloned()
    }

    pub fn ongoing_swap_ids(&self) -> Vec<Hash> {
        self.registry
            .lock()
            .expect("swap registry lock poisoned")
            .ongoing
            .keys()
            .copied()
            .collect()
    }
}

impl Default for SwapManager {
    fn default() -> Self {
        Self::new()
    }
}
