//! Long-term memory: durable facts about a user extracted from dialogue.
//!
//! A memory is keyed by `(user, category, key)`. Writing the same key again
//! overwrites the value and importance instead of creating a duplicate, so
//! replaying an extraction is idempotent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Closed set of memory categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    HealthGoal,
    Preference,
    MedicalHistory,
    Lifestyle,
}

impl MemoryCategory {
    pub const ALL: [MemoryCategory; 4] = [
        MemoryCategory::HealthGoal,
        MemoryCategory::Preference,
        MemoryCategory::MedicalHistory,
        MemoryCategory::Lifestyle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::HealthGoal => "health_goal",
            MemoryCategory::Preference => "preference",
            MemoryCategory::MedicalHistory => "medical_history",
            MemoryCategory::Lifestyle => "lifestyle",
        }
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MemoryCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| format!("unknown memory category '{s}'"))
    }
}

/// Importance score, always within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Importance(u8);

impl Importance {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Strict constructor; `None` when out of range.
    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    /// Clamp any integer into range.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Importance {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Importance::new(value).ok_or_else(|| format!("importance {value} outside 1..=5"))
    }
}

impl From<Importance> for u8 {
    fn from(value: Importance) -> Self {
        value.0
    }
}

impl Default for Importance {
    fn default() -> Self {
        Self(3)
    }
}

/// A memory about to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMemory {
    pub category: MemoryCategory,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub importance: Importance,
}

/// A stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: i64,
    pub user_id: i64,
    pub category: MemoryCategory,
    pub key: String,
    pub value: String,
    pub importance: Importance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistent per-user memory.
///
/// Implementations: SQLite and in-memory (`disha-store`).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert, or overwrite value and importance of the existing
    /// `(user, category, key)` row and bump its `updated_at`.
    async fn upsert(
        &self,
        user_id: i64,
        memory: NewMemory,
    ) -> std::result::Result<MemoryRecord, StoreError>;

    /// Up to `k` memories with importance ≥ `min_importance`, ordered by
    /// importance desc, then `updated_at` desc, then id desc.
    async fn top_k(
        &self,
        user_id: i64,
        k: usize,
        min_importance: Importance,
    ) -> std::result::Result<Vec<MemoryRecord>, StoreError>;

    /// Every memory for the user, in the same order as `top_k`.
    async fn list(&self, user_id: i64) -> std::result::Result<Vec<MemoryRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importance_bounds() {
        assert!(Importance::new(0).is_none());
        assert!(Importance::new(6).is_none());
        assert_eq!(Importance::new(5).unwrap().get(), 5);
        assert_eq!(Importance::clamped(42).get(), 5);
        assert_eq!(Importance::clamped(-3).get(), 1);
    }

    #[test]
    fn importance_rejects_out_of_range_json() {
        assert!(serde_json::from_str::<Importance>("9").is_err());
        assert_eq!(serde_json::from_str::<Importance>("4").unwrap().get(), 4);
    }

    #[test]
    fn category_round_trips_through_str() {
        for category in MemoryCategory::ALL {
            assert_eq!(category.as_str().parse::<MemoryCategory>().unwrap(), category);
        }
        assert!("hobby".parse::<MemoryCategory>().is_err());
    }

    #[test]
    fn new_memory_defaults_importance() {
        let mem: NewMemory = serde_json::from_str(
            r#"{"category":"lifestyle","key":"sleep","value":"6 hours"}"#,
        )
        .unwrap();
        assert_eq!(mem.importance.get(), 3);
        assert_eq!(mem.category, MemoryCategory::Lifestyle);
    }
}
