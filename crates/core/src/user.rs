//! Users and their health profile.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, StoreError};

/// Health profile gathered during onboarding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    /// Kilograms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f32>,

    /// Centimetres
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub medical_conditions: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub medications: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allergies: Vec<String>,
}

impl Profile {
    /// Names of required fields that are still empty.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.age.is_none() {
            missing.push("age");
        }
        if self.gender.as_deref().is_none_or(|g| g.trim().is_empty()) {
            missing.push("gender");
        }
        if self.weight_kg.is_none() {
            missing.push("weight_kg");
        }
        if self.height_cm.is_none() {
            missing.push("height_cm");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_required().is_empty()
    }

    /// Range checks on whatever fields are present.
    pub fn validate(&self) -> std::result::Result<(), Error> {
        if let Some(age) = self.age
            && age > 150
        {
            return Err(Error::Validation(format!("age {age} outside 0..=150")));
        }
        if let Some(w) = self.weight_kg
            && !(1.0..=500.0).contains(&w)
        {
            return Err(Error::Validation(format!("weight {w}kg outside 1..=500")));
        }
        if let Some(h) = self.height_cm
            && !(1.0..=300.0).contains(&h)
        {
            return Err(Error::Validation(format!("height {h}cm outside 1..=300")));
        }
        Ok(())
    }
}

/// Onboarding answers. Present fields overwrite, absent ones are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub age: Option<u16>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default, alias = "weight")]
    pub weight_kg: Option<f32>,
    #[serde(default, alias = "height")]
    pub height_cm: Option<f32>,
    #[serde(default)]
    pub medical_conditions: Option<Vec<String>>,
    #[serde(default)]
    pub medications: Option<Vec<String>>,
    #[serde(default)]
    pub allergies: Option<Vec<String>>,
}

impl ProfileUpdate {
    /// Merge into `profile`, returning the result.
    pub fn apply(self, mut profile: Profile) -> Profile {
        if self.full_name.is_some() {
            profile.full_name = self.full_name;
        }
        if self.age.is_some() {
            profile.age = self.age;
        }
        if self.gender.is_some() {
            profile.gender = self.gender;
        }
        if self.weight_kg.is_some() {
            profile.weight_kg = self.weight_kg;
        }
        if self.height_cm.is_some() {
            profile.height_cm = self.height_cm;
        }
        if let Some(conditions) = self.medical_conditions {
            profile.medical_conditions = conditions;
        }
        if let Some(medications) = self.medications {
            profile.medications = medications;
        }
        if let Some(allergies) = self.allergies {
            profile.allergies = allergies;
        }
        profile
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub onboarding_completed: bool,
    #[serde(flatten)]
    pub profile: Profile,
    pub created_at: DateTime<Utc>,
}

/// User identity and profile storage.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the user, creating a fresh onboarding-state user on first contact.
    async fn get_or_create(&self, username: &str) -> std::result::Result<User, StoreError>;

    async fn get(&self, username: &str) -> std::result::Result<Option<User>, StoreError>;

    /// Replace the profile and set the onboarding flag.
    async fn update_profile(
        &self,
        username: &str,
        profile: Profile,
        onboarding_completed: bool,
    ) -> std::result::Result<User, StoreError>;
}
