//! Position lookup for monitored entities.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{FieldLinkError, Result};

/// Source of the current (x, y) position of an entity
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// # Errors
    ///
    /// Returns error if no position is known for `entity_id`
    async fn position(&self, entity_id: &str) -> Result<(f64, f64)>;
}

/// Positions fixed in configuration, one per entity
#[derive(Debug, Clone, Default)]
pub struct FixedPosition {
    positions: HashMap<String, (f64, f64)>,
}

impl FixedPosition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity_id: &str, position: (f64, f64)) {
        self.positions.insert(entity_id.to_string(), position);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[async_trait]
impl PositionSource for FixedPosition {
    async fn position(&self, entity_id: &str) -> Result<(f64, f64)> {
        self.positions
            .get(entity_id)
            .copied()
            .ok_or_else(|| FieldLinkError::Position(format!("no fixed position for {}", entity_id)))
    }
}
