//! Cat documents and the store interface the dispatcher writes through.
//!
//! The document store itself is a collaborator; [`MemoryCatStore`] is the
//! in-process implementation used by the server binary and the tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

/// GeoJSON point; `coordinates` is `[lng, lat]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    #[serde(rename = "type", default = "point_kind")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

fn point_kind() -> String { "Point".to_string() }

impl Location {
    pub fn point(lng: f64, lat: f64) -> Self { Self { kind: point_kind(), coordinates: [lng, lat] } }
    pub fn lng(&self) -> f64 { self.coordinates[0] }
    pub fn lat(&self) -> f64 { self.coordinates[1] }

    fn validate(&self) -> Result<(), String> {
        if self.kind != "Point" { return Err(format!("unsupported location type: {}", self.kind)); }
        if !(-180.0..=180.0).contains(&self.lng()) { return Err("longitude out of range".into()); }
        if !(-90.0..=90.0).contains(&self.lat()) { return Err("latitude out of range".into()); }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Axis-aligned rectangle given by its top-right and bottom-left corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub top_right: Coordinates,
    pub bottom_left: Coordinates,
}

impl BoundingBox {
    pub fn new(top_right: Coordinates, bottom_left: Coordinates) -> Result<Self, StoreError> {
        if bottom_left.lat > top_right.lat || bottom_left.lng > top_right.lng {
            return Err(StoreError::Invalid("bottomLeft must be south-west of topRight".into()));
        }
        Ok(Self { top_right, bottom_left })
    }

    pub fn contains(&self, loc: &Location) -> bool {
        (self.bottom_left.lng..=self.top_right.lng).contains(&loc.lng())
            && (self.bottom_left.lat..=self.top_right.lat).contains(&loc.lat())
    }
}

/// Owner reference as populated on read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl OwnerRef {
    pub fn new(id: impl Into<String>) -> Self { Self { id: id.into(), user_name: None, email: None } }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cat {
    pub id: String,
    pub cat_name: String,
    pub weight: f64,
    pub birthdate: NaiveDate,
    pub owner: OwnerRef,
    pub location: Location,
}

impl Cat {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.cat_name.trim().is_empty() { return Err(StoreError::Invalid("cat_name must not be empty".into())); }
        if self.weight.is_nan() || self.weight <= 0.0 { return Err(StoreError::Invalid("weight must be positive".into())); }
        self.location.validate().map_err(StoreError::Invalid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatInput {
    pub cat_name: String,
    pub weight: f64,
    pub birthdate: NaiveDate,
    pub location: Location,
    /// Accepted for wire compatibility; always replaced by the caller's id.
    #[serde(default)]
    pub owner: Option<String>,
}

impl CatInput {
    pub fn into_cat(self, owner: OwnerRef) -> Cat {
        Cat {
            id: uuid::Uuid::new_v4().simple().to_string(),
            cat_name: self.cat_name,
            weight: self.weight,
            birthdate: self.birthdate,
            owner,
            location: self.location,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatPatch {
    #[serde(default)]
    pub cat_name: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub birthdate: Option<NaiveDate>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub owner: Option<String>,
}

impl CatPatch {
    /// Same patch with any ownership change removed.
    pub fn without_owner(mut self) -> Self {
        self.owner = None;
        self
    }

    fn apply(&self, cat: &mut Cat) {
        if let Some(v) = &self.cat_name { cat.cat_name = v.clone(); }
        if let Some(v) = self.weight { cat.weight = v; }
        if let Some(v) = self.birthdate { cat.birthdate = v; }
        if let Some(v) = &self.location { cat.location = v.clone(); }
        if let Some(v) = &self.owner { cat.owner = OwnerRef::new(v.clone()); }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CatFilter {
    Owner(String),
    Within(BoundingBox),
}

impl CatFilter {
    fn matches(&self, cat: &Cat) -> bool {
        match self {
            CatFilter::Owner(id) => cat.owner.id == *id,
            CatFilter::Within(bbox) => bbox.contains(&cat.location),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("invalid document: {0}")]
    Invalid(String),
    #[error("duplicate id: {0}")]
    Duplicate(String),
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Invalid(msg) => AppError::user("invalid_input".to_string(), msg),
            other => AppError::internal("store_error".to_string(), other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CatStore: Send + Sync {
    async fn find_all(&self) -> StoreResult<Vec<Cat>>;
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Cat>>;
    async fn find(&self, filter: &CatFilter) -> StoreResult<Vec<Cat>>;
    async fn insert(&self, cat: Cat) -> StoreResult<Cat>;
    /// Apply the whole patch or nothing; `None` when the id is unknown.
    async fn update_by_id(&self, id: &str, patch: &CatPatch) -> StoreResult<Option<Cat>>;
    async fn delete_by_id(&self, id: &str) -> StoreResult<Option<Cat>>;
}

/// Insertion-ordered in-memory store.
#[derive(Debug, Default)]
pub struct MemoryCatStore {
    cats: RwLock<Vec<Cat>>,
}

impl MemoryCatStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl CatStore for MemoryCatStore {
    async fn find_all(&self) -> StoreResult<Vec<Cat>> {
        Ok(self.cats.read().clone())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Cat>> {
        Ok(self.cats.read().iter().find(|c| c.id == id).cloned())
    }

    async fn find(&self, filter: &CatFilter) -> StoreResult<Vec<Cat>> {
        Ok(self.cats.read().iter().filter(|c| filter.matches(c)).cloned().collect())
    }

    async fn insert(&self, cat: Cat) -> StoreResult<Cat> {
        cat.validate()?;
        let mut cats = self.cats.write();
        if cats.iter().any(|c| c.id == cat.id) {
            return Err(StoreError::Duplicate(cat.id));
        }
        cats.push(cat.clone());
        Ok(cat)
    }

    async fn update_by_id(&self, id: &str, patch: &CatPatch) -> StoreResult<Option<Cat>> {
        let mut cats = self.cats.write();
        let Some(slot) = cats.iter_mut().find(|c| c.id == id) else { return Ok(None); };
        let mut next = slot.clone();
        patch.apply(&mut next);
        next.validate()?;
        *slot = next.clone();
        Ok(Some(next))
    }

    async fn delete_by_id(&self, id: &str) -> StoreResult<Option<Cat>> {
        let mut cats = self.cats.write();
        let Some(pos) = cats.iter().position(|c| c.id == id) else { return Ok(None); };
        Ok(Some(cats.remove(pos)))
    }
}
