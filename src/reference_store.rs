//! # ReferenceStore
//!
//! In-memory store of reference embeddings backed by a `hora` ANN index.
//!
//! Each entry is a [`Reference`]: the route (or group) it belongs to, its text and its
//! L2-normalized vector. Lookups go through the ANN index to collect candidate ids;
//! the returned distances are then recomputed exactly as cosine distance from the
//! stored vectors so that thresholds mean the same thing for every index kind.
//!
//! ## Index kinds
//! - [`IndexKind::Flat`]: exact brute-force scan. Right for routers, which hold tens or
//!   hundreds of references.
//! - [`IndexKind::Hnsw`]: HNSW graph for large reference sets; approximate.
//!
//! `hora` has no deletion, so every mutating call rebuilds the index from the id map.
//!
//! ## Quick Example
//! ```
//! use bank_router::reference_store::{IndexKind, ReferenceStore};
//!
//! let mut store = ReferenceStore::new(2, IndexKind::Flat);
//! store.insert("loans", "i want a loan", vec![1.0, 0.0]).unwrap();
//! store.insert("cards", "new credit card", vec![0.0, 1.0]).unwrap();
//! let hits = store.nearest(&[0.9, 0.1], 1).unwrap();
//! assert_eq!(hits[0].route_name, "loans");
//! ```

use hora::core::ann_index::ANNIndex;
use hora::core::metrics::Metric;
use hora::index::bruteforce_idx::BruteForceIndex;
use hora::index::bruteforce_params::BruteForceParams;
use hora::index::hnsw_idx::HNSWIndex;
use hora::index::hnsw_params::HNSWParams;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::embeddings::{cosine_distance, normalize};
use crate::error::{Result, RouterError};

/// Which ANN structure backs the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    #[default]
    Flat,
    Hnsw,
}

/// One stored reference phrase and its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub route_name: String,
    pub text: String,
    pub vector: Vec<f32>,
}

/// A reference returned by a lookup, with its cosine distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceHit {
    pub id: usize,
    pub route_name: String,
    pub text: String,
    pub distance: f32,
}

enum AnnIndex {
    Flat(BruteForceIndex<f32, usize>),
    Hnsw(HNSWIndex<f32, usize>),
}

impl AnnIndex {
    fn new(kind: IndexKind, dimension: usize) -> Self {
        match kind {
            IndexKind::Flat => Self::Flat(BruteForceIndex::new(dimension, &BruteForceParams::default())),
            IndexKind::Hnsw => Self::Hnsw(HNSWIndex::new(dimension, &HNSWParams::default())),
        }
    }

    fn add(&mut self, vector: &[f32], id: usize) -> std::result::Result<(), &'static str> {
        match self {
            Self::Flat(idx) => idx.add(vector, id),
            Self::Hnsw(idx) => idx.add(vector, id),
        }
    }

    fn build(&mut self) -> std::result::Result<(), &'static str> {
        match self {
            Self::Flat(idx) => idx.build(Metric::Euclidean),
            Self::Hnsw(idx) => idx.build(Metric::Euclidean),
        }
    }

    fn search(&self, vector: &[f32], k: usize) -> Vec<usize> {
        match self {
            Self::Flat(idx) => idx.search(vector, k),
            Self::Hnsw(idx) => idx.search(vector, k),
        }
    }
}

/// Reference embeddings grouped by route, searchable by vector.
pub struct ReferenceStore {
    index: AnnIndex,
    kind: IndexKind,
    /// Dimensionality of every stored vector.
    dimension: usize,
    /// Auto-incrementing id for new references.
    current_id: usize,
    id_to_reference: BTreeMap<usize, Reference>,
}

impl ReferenceStore {
    pub fn new(dimension: usize, kind: IndexKind) -> Self {
        Self {
            index: AnnIndex::new(kind, dimension),
            kind,
            dimension,
            current_id: 0,
            id_to_reference: BTreeMap::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.id_to_reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_reference.is_empty()
    }

    /// Insert one reference and rebuild the index.
    ///
    /// An existing entry with the same route and text is replaced.
    ///
    /// # Errors
    /// [`RouterError::DimensionMismatch`] if `vector.len() != dimension`.
    pub fn insert(
        &mut self,
        route_name: impl Into<String>,
        text: impl Into<String>,
        vector: Vec<f32>,
    ) -> Result<usize> {
        let id = self.insert_unindexed(route_name.into(), text.into(), vector)?;
        self.rebuild()?;
        Ok(id)
    }

    /// Insert a batch of `(route, text, vector)` triples with a single rebuild.
    pub fn insert_many<I>(&mut self, references: I) -> Result<Vec<usize>>
    where
        I: IntoIterator<Item = (String, String, Vec<f32>)>,
    {
        let mut ids = Vec::new();
        for (route_name, text, vector) in references {
            ids.push(self.insert_unindexed(route_name, text, vector)?);
        }
        self.rebuild()?;
        Ok(ids)
    }

    fn insert_unindexed(&mut self, route_name: String, text: String, mut vector: Vec<f32>) -> Result<usize> {
        if vector.len() != self.dimension {
            return Err(RouterError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        normalize(&mut vector);

        self.id_to_reference
            .retain(|_, r| !(r.route_name == route_name && r.text == text));

        let id = self.current_id;
        self.id_to_reference.insert(
            id,
            Reference {
                route_name,
                text,
                vector,
            },
        );
        self.current_id += 1;
        Ok(id)
    }

    /// Drop every reference of a route. Returns how many were removed.
    pub fn remove_route(&mut self, route_name: &str) -> Result<usize> {
        let before = self.len();
        self.id_to_reference.retain(|_, r| r.route_name != route_name);
        let removed = before - self.len();
        if removed > 0 {
            self.rebuild()?;
        }
        Ok(removed)
    }

    /// Drop a single reference. Returns `true` if it existed.
    pub fn remove_reference(&mut self, route_name: &str, text: &str) -> Result<bool> {
        let before = self.len();
        self.id_to_reference
            .retain(|_, r| !(r.route_name == route_name && r.text == text));
        let removed = before != self.len();
        if removed {
            self.rebuild()?;
        }
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.id_to_reference.clear();
        self.index = AnnIndex::new(self.kind, self.dimension);
    }

    pub fn get(&self, id: usize) -> Option<&Reference> {
        self.id_to_reference.get(&id)
    }

    /// Reference texts of one route, in insertion order.
    pub fn references(&self, route_name: &str) -> Vec<&Reference> {
        self.id_to_reference
            .values()
            .filter(|r| r.route_name == route_name)
            .collect()
    }

    pub fn route_names(&self) -> BTreeSet<String> {
        self.id_to_reference
            .values()
            .map(|r| r.route_name.clone())
            .collect()
    }

    /// The `k` references closest to `query`, ascending by cosine distance.
    ///
    /// # Errors
    /// [`RouterError::DimensionMismatch`] if the query has the wrong length.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ReferenceHit>> {
        if query.len() != self.dimension {
            return Err(RouterError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut hits: Vec<ReferenceHit> = self
            .index
            .search(&query, k.min(self.len()))
            .into_iter()
            .filter_map(|id| {
                self.id_to_reference.get(&id).map(|r| ReferenceHit {
                    id,
                    route_name: r.route_name.clone(),
                    text: r.text.clone(),
                    distance: cosine_distance(&query, &r.vector),
                })
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        Ok(hits)
    }

    /// Every reference whose distance to `query` is at most `radius`.
    pub fn within(&self, query: &[f32], radius: f32) -> Result<Vec<ReferenceHit>> {
        let mut hits = self.nearest(query, self.len())?;
        hits.retain(|h| h.distance <= radius);
        Ok(hits)
    }

    /// Recreate the ANN index from the id map.
    fn rebuild(&mut self) -> Result<()> {
        let mut index = AnnIndex::new(self.kind, self.dimension);
        for (id, reference) in &self.id_to_reference {
            index.add(&reference.vector, *id).map_err(RouterError::Index)?;
        }
        if !self.id_to_reference.is_empty() {
            index.build().map_err(RouterError::Index)?;
        }
        self.index = index;
        debug!("Rebuilt {:?} index with {} references", self.kind, self.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ReferenceStore {
        let mut store = ReferenceStore::new(3, IndexKind::Flat);
        store
            .insert_many(vec![
                ("loans".into(), "loan a".into(), vec![1.0, 0.0, 0.0]),
                ("loans".into(), "loan b".into(), vec![0.8, 0.6, 0.0]),
                ("cards".into(), "card a".into(), vec![0.0, 1.0, 0.0]),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_nearest_orders_by_distance() {
        let store = store();
        let hits = store.nearest(&[1.0, 0.0, 0.0], 3).unwrap();
        let texts: Vec<_> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["loan a", "loan b", "card a"]);
        assert!(hits[0].distance.abs() < 1e-5);
        assert!((hits[1].distance - 0.2).abs() < 1e-5);
        assert!((hits[2].distance - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_within_radius() {
        let store = store();
        let hits = store.within(&[1.0, 0.0, 0.0], 0.5).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.route_name == "loans"));
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut store = store();
        assert!(matches!(
            store.insert("x", "bad", vec![1.0]),
            Err(RouterError::DimensionMismatch { expected: 3, actual: 1 })
        ));
        assert!(store.nearest(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn test_duplicate_reference_is_replaced() {
        let mut store = store();
        store.insert("loans", "loan a", vec![0.0, 0.0, 1.0]).unwrap();
        assert_eq!(store.len(), 3);
        let refs = store.references("loans");
        let a = refs.iter().find(|r| r.text == "loan a").unwrap();
        assert_eq!(a.vector, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_remove_route_and_reference() {
        let mut store = store();
        assert_eq!(store.remove_route("loans").unwrap(), 2);
        assert_eq!(store.route_names().into_iter().collect::<Vec<_>>(), vec!["cards"]);
        assert!(store.remove_reference("cards", "card a").unwrap());
        assert!(!store.remove_reference("cards", "card a").unwrap());
        assert!(store.is_empty());
        assert!(store.nearest(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_vectors_are_normalized() {
        let mut store = ReferenceStore::new(2, IndexKind::Flat);
        let id = store.insert("r", "t", vec![3.0, 4.0]).unwrap();
        let v = &store.get(id).unwrap().vector;
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_hnsw_index_finds_closest() {
        let mut store = ReferenceStore::new(3, IndexKind::Hnsw);
        store
            .insert_many(vec![
                ("a".into(), "x".into(), vec![1.0, 0.0, 0.0]),
                ("b".into(), "y".into(), vec![0.0, 1.0, 0.0]),
                ("c".into(), "z".into(), vec![0.0, 0.0, 1.0]),
            ])
            .unwrap();
        let hits = store.nearest(&[0.1, 0.9, 0.0], 1).unwrap();
        assert_eq!(hits[0].route_name, "b");
    }
}
