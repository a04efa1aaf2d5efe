//! Skin binding resolution
//!
//! Raw influences name bones by key or display name. They can only be turned
//! into node references once every bone node has its final id, so the
//! resolver refuses to run against a registry that is still open.

use std::collections::{BTreeSet, HashMap};

use smallvec::SmallVec;
use tracing::debug;

use i3d_core::{Error, ExportConfig, NodeId, Result, MAX_SKIN_INFLUENCES};
use i3d_scene::{RawInfluence, RawInfluences};

use crate::report::ExportReport;

/// Weight sum tolerance of a resolved binding
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// One resolved influence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Influence {
    pub bone: NodeId,
    pub weight: f64,
}

/// Resolved influences of one vertex, strongest first
pub type SkinBinding = SmallVec<[Influence; MAX_SKIN_INFLUENCES]>;

/// Bone name to node id map, published once ids are assigned
#[derive(Debug, Clone, Default)]
pub struct BoneRegistry {
    by_key: HashMap<String, NodeId>,
    by_name: HashMap<String, NodeId>,
    finalized: bool,
}

impl BoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bone node. Fails once the registry is finalized.
    ///
    /// When two bones share a display name the first (lowest id) keeps it.
    pub fn register(&mut self, key: &str, name: &str, id: NodeId) -> Result<()> {
        if self.finalized {
            return Err(Error::ordering(format!(
                "bone '{}' registered after the bone registry was finalized",
                key
            )));
        }
        self.by_key.insert(key.to_string(), id);
        self.by_name.entry(name.to_string()).or_insert(id);
        Ok(())
    }

    /// Close the registry; no more bones can be added
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Look up a bone by key, then by display name
    pub fn get(&self, bone: &str) -> Option<NodeId> {
        self.by_key
            .get(bone)
            .or_else(|| self.by_name.get(bone))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Turns raw weight lists into bounded, normalized bindings
#[derive(Debug)]
pub struct SkinBindingResolver<'a> {
    registry: &'a BoneRegistry,
    max_influences: usize,
}

impl<'a> SkinBindingResolver<'a> {
    /// Fails with an ordering error when bone ids are not final yet
    pub fn new(registry: &'a BoneRegistry, config: &ExportConfig) -> Result<Self> {
        if !registry.is_finalized() {
            return Err(Error::ordering(
                "skin bindings resolved before bone node ids were finalized",
            ));
        }
        Ok(Self {
            registry,
            max_influences: config.max_skin_influences(),
        })
    }

    /// Resolve one vertex. Unknown bone names are collected into `unknown`.
    ///
    /// Non-positive and non-finite weights are dropped, duplicate bones are
    /// summed, the strongest influences are kept (ties by bone id) and the
    /// result is renormalized to sum to one.
    pub fn resolve_vertex(&self, raw: &[RawInfluence], unknown: &mut BTreeSet<String>) -> SkinBinding {
        let usable = |w: f64| w.is_finite() && w > 0.0;
        // Weights are taken relative to the largest so sums stay finite
        let peak = raw.iter().map(|i| i.weight).filter(|&w| usable(w)).fold(0.0, f64::max);
        let mut influences: SmallVec<[Influence; 8]> = SmallVec::new();
        for influence in raw {
            if !usable(influence.weight) {
                continue;
            }
            let weight = influence.weight / peak;
            let Some(bone) = self.registry.get(&influence.bone) else {
                unknown.insert(influence.bone.clone());
                continue;
            };
            match influences.iter_mut().find(|i| i.bone == bone) {
                Some(existing) => existing.weight += weight,
                None => influences.push(Influence { bone, weight }),
            }
        }

        influences.sort_by(|a, b| b.weight.total_cmp(&a.weight).then(a.bone.cmp(&b.bone)));
        influences.truncate(self.max_influences);

        let total: f64 = influences.iter().map(|i| i.weight).sum();
        influences
            .into_iter()
            .map(|i| Influence {
                bone: i.bone,
                weight: i.weight / total,
            })
            .collect()
    }

    /// Resolve every vertex of a mesh.
    ///
    /// Returns `None` for unskinned meshes and for meshes that reference no
    /// known bone at all.
    pub fn resolve_mesh(
        &self,
        owner: &str,
        weights: &[RawInfluences],
        report: &mut ExportReport,
    ) -> Option<Vec<SkinBinding>> {
        if weights.iter().all(|w| w.is_empty()) {
            return None;
        }

        let mut unknown = BTreeSet::new();
        let mut bindings: Vec<SkinBinding> = weights
            .iter()
            .map(|raw| self.resolve_vertex(raw, &mut unknown))
            .collect();

        if !unknown.is_empty() {
            let names: Vec<&str> = unknown.iter().map(String::as_str).collect();
            report.warn(format!(
                "'{}': influences of unknown bones dropped: {}",
                owner,
                names.join(", ")
            ));
        }

        let Some(fallback) = bindings
            .iter()
            .flat_map(|b| b.iter().map(|i| i.bone))
            .min()
        else {
            report.warn(format!(
                "'{}' references no known bone; exported without skinning",
                owner
            ));
            return None;
        };

        let mut unbound = 0usize;
        for binding in bindings.iter_mut().filter(|b| b.is_empty()) {
            binding.push(Influence {
                bone: fallback,
                weight: 1.0,
            });
            unbound += 1;
        }
        if unbound > 0 {
            report.warn(format!(
                "'{}': {} vertices without influence bound to bone node {}",
                owner, unbound, fallback
            ));
        }

        debug!(owner = %owner, vertices = bindings.len(), "Resolved skin bindings");
        Some(bindings)
    }
}
