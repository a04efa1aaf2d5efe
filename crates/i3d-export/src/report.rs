//! Export report
//!
//! Every export attempt produces a report listing what was written, what was
//! skipped and why. Recoverable problems never abort the export; they end up
//! here instead.

use std::path::PathBuf;

use serde::Serialize;
use tracing::warn;

use i3d_core::{ConflictError, Error, Result};

/// A file reference that could not be resolved in the requested mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathResolutionWarning {
    /// Reference as authored
    pub path: String,
    /// What was written instead
    pub resolved: String,
    pub message: String,
}

/// An object or group left out of the document (fully or partly)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    pub object: String,
    pub reason: String,
}

/// Per-node summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub id: u32,
    /// Index path in `root>child|grandchild` notation
    pub path: String,
    pub name: String,
    pub kind: String,
    pub exported: bool,
}

/// Per-shape statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapeStats {
    pub name: String,
    pub shape_id: u32,
    pub vertices: usize,
    pub triangles: usize,
    pub subsets: usize,
    pub skinned: bool,
    /// UV density per material slot (`None` when no triangle contributed)
    pub uv_density: Vec<Option<f64>>,
}

/// Result of one export
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportReport {
    /// Written `.i3d` document
    pub document: Option<PathBuf>,
    /// Written binary shapes file, in binary mode
    pub shapes_file: Option<PathBuf>,
    pub nodes: Vec<NodeSummary>,
    pub shapes: Vec<ShapeStats>,
    pub animated_nodes: usize,
    pub conflicts: Vec<ConflictError>,
    pub path_warnings: Vec<PathResolutionWarning>,
    pub skipped: Vec<SkippedItem>,
    pub warnings: Vec<String>,
}

impl ExportReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a general warning
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }

    /// Record an object that was left out
    pub fn skip(&mut self, object: impl Into<String>, reason: impl Into<String>) {
        let item = SkippedItem {
            object: object.into(),
            reason: reason.into(),
        };
        warn!(object = %item.object, "Skipped: {}", item.reason);
        self.skipped.push(item);
    }

    /// Record a rejected merge group
    pub fn conflict(&mut self, conflict: ConflictError) {
        warn!("{}", conflict);
        self.conflicts.push(conflict);
    }

    /// Record a path fallback
    pub fn path_warning(&mut self, warning: PathResolutionWarning) {
        warn!(path = %warning.path, resolved = %warning.resolved, "{}", warning.message);
        self.path_warnings.push(warning);
    }

    /// Number of exported nodes
    pub fn exported_node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.exported).count()
    }

    /// True when anything was skipped or fell back
    pub fn has_issues(&self) -> bool {
        !self.conflicts.is_empty()
            || !self.path_warnings.is_empty()
            || !self.skipped.is_empty()
            || !self.warnings.is_empty()
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::internal(format!("report serialization failed: {}", e)))
    }

    /// Multi-line human readable summary
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        if let Some(document) = &self.document {
            lines.push(format!("Document: {}", document.display()));
        }
        if let Some(shapes) = &self.shapes_file {
            lines.push(format!("Shapes:   {}", shapes.display()));
        }
        lines.push(format!(
            "{} nodes, {} shapes, {} animated",
            self.exported_node_count(),
            self.shapes.len(),
            self.animated_nodes
        ));
        for conflict in &self.conflicts {
            lines.push(format!("conflict: {}", conflict));
        }
        for warning in &self.path_warnings {
            lines.push(format!("path: {} -> {} ({})", warning.path, warning.resolved, warning.message));
        }
        for item in &self.skipped {
            lines.push(format!("skipped: {}: {}", item.object, item.reason));
        }
        for warning in &self.warnings {
            lines.push(format!("warning: {}", warning));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report() {
        let report = ExportReport::new();
        assert!(!report.has_issues());
        assert!(report.summary().contains("0 nodes"));
    }

    #[test]
    fn test_summary_lists_issues() {
        let mut report = ExportReport::new();
        report.conflict(ConflictError {
            group: "wheels".into(),
            offending: vec!["WheelR".into()],
            reason: "slot count".into(),
        });
        report.skip("Empty", "mesh has no triangles");
        assert!(report.has_issues());
        let summary = report.summary();
        assert!(summary.contains("wheels"));
        assert!(summary.contains("Empty"));
    }

    #[test]
    fn test_serializes_to_json() {
        let mut report = ExportReport::new();
        report.path_warning(PathResolutionWarning {
            path: "C:/tex/a.dds".into(),
            resolved: "C:/tex/a.dds".into(),
            message: "no install root".into(),
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["path_warnings"][0]["path"], "C:/tex/a.dds");
    }
}
