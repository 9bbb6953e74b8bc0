//! Facility spatial index: one ball-tree over every facility with valid
//! coordinates, plus lazily built per-specialty sub-trees.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::corpus::CorpusStore;
use crate::geo::BallTree;
use crate::types::{FacilityId, Specialty};

#[derive(Debug, Clone)]
struct Entry {
    id: FacilityId,
    coords: (f64, f64),
    specialties: Vec<Specialty>,
}

#[derive(Debug)]
struct SubTree {
    /// Positions into `SpatialIndex::entries`.
    members: Vec<usize>,
    tree: BallTree,
}

/// Spatial index over the corpus.
///
/// The full tree is built at load. Specialty sub-trees are built on first
/// use (at most once per specialty, guarded by the cache lock) and shared
/// afterwards without further synchronization.
#[derive(Debug)]
pub struct SpatialIndex {
    entries: Vec<Entry>,
    tree: BallTree,
    subtrees: RwLock<HashMap<Specialty, Arc<SubTree>>>,
}

impl SpatialIndex {
    /// Index every facility with valid coordinates.
    pub fn build(corpus: &CorpusStore) -> Self {
        let entries: Vec<Entry> = corpus
            .all()
            .filter_map(|f| {
                Some(Entry {
                    id: f.id.clone(),
                    coords: f.coords()?,
                    specialties: f.specialties.iter().copied().collect(),
                })
            })
            .collect();
        let tree = BallTree::build(entries.iter().map(|e| e.coords).collect());
        debug!(indexed = entries.len(), "spatial index built");
        Self {
            entries,
            tree,
            subtrees: RwLock::new(HashMap::new()),
        }
    }

    /// Number of indexed facilities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Facilities within `radius_km` of `center`, optionally restricted to a
    /// specialty, sorted by distance ascending.
    pub fn within_radius(
        &self,
        center: (f64, f64),
        radius_km: f64,
        specialty: Option<Specialty>,
    ) -> Vec<(FacilityId, f64)> {
        match specialty {
            None => self
                .tree
                .within_radius(center, radius_km)
                .into_iter()
                .map(|(i, d)| (self.entries[i].id.clone(), d))
                .collect(),
            Some(tag) => {
                let sub = self.subtree(tag);
                sub.tree
                    .within_radius(center, radius_km)
                    .into_iter()
                    .map(|(i, d)| (self.entries[sub.members[i]].id.clone(), d))
                    .collect()
            }
        }
    }

    /// The `k` nearest facilities to `center`, optionally restricted to a
    /// specialty, sorted by distance ascending.
    pub fn nearest(
        &self,
        center: (f64, f64),
        k: usize,
        specialty: Option<Specialty>,
    ) -> Vec<(FacilityId, f64)> {
        match specialty {
            None => self
                .tree
                .nearest(center, k)
                .into_iter()
                .map(|(i, d)| (self.entries[i].id.clone(), d))
                .collect(),
            Some(tag) => {
                let sub = self.subtree(tag);
                sub.tree
                    .nearest(center, k)
                    .into_iter()
                    .map(|(i, d)| (self.entries[sub.members[i]].id.clone(), d))
                    .collect()
            }
        }
    }

    /// Distance to the single nearest facility, if any are indexed.
    pub fn nearest_distance_km(
        &self,
        center: (f64, f64),
        specialty: Option<Specialty>,
    ) -> Option<(FacilityId, f64)> {
        self.nearest(center, 1, specialty).into_iter().next()
    }

    /// How many indexed facilities carry the specialty.
    pub fn specialty_count(&self, specialty: Specialty) -> usize {
        self.subtree(specialty).members.len()
    }

    fn subtree(&self, specialty: Specialty) -> Arc<SubTree> {
        if let Some(sub) = self.subtrees.read().get(&specialty) {
            return Arc::clone(sub);
        }
        let mut cache = self.subtrees.write();
        // Double check: another thread may have built it while we waited.
        if let Some(sub) = cache.get(&specialty) {
            return Arc::clone(sub);
        }
        let members: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.specialties.contains(&specialty))
            .map(|(i, _)| i)
            .collect();
        let tree = BallTree::build(members.iter().map(|&i| self.entries[i].coords).collect());
        debug!(specialty = %specialty, members = members.len(), "specialty sub-tree built");
        let sub = Arc::new(SubTree { members, tree });
        cache.insert(specialty, Arc::clone(&sub));
        sub
    }
}
