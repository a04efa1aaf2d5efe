//! Top-level export entry point
//!
//! One call to [`I3dExporter::export`] is one export: the graph is rebuilt
//! from the scene, written into temporary files next to the destination and
//! promoted by rename only when everything succeeded. The shapes subfile is
//! promoted before the document that references it and rolled back, along
//! with any file it replaced, if the document cannot be promoted.

use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, info, warn};

use i3d_core::{Error, ExportConfig, GeometryEncoding, Result};
use i3d_scene::logging::instrument_phase;
use i3d_scene::{log_export_complete, log_export_error, log_export_start, SceneSource, ShaderLibrary};

use crate::builder::SceneGraphBuilder;
use crate::cancel::CancelToken;
use crate::graph::SceneGraph;
use crate::path::PathResolver;
use crate::report::ExportReport;
use crate::writer::{I3dDocumentWriter, WrittenDocument};

/// Extension of the binary geometry subfile
pub const SHAPES_EXTENSION: &str = "shapes";

/// Exports scenes with one immutable configuration
#[derive(Debug)]
pub struct I3dExporter {
    config: ExportConfig,
    library: ShaderLibrary,
    source_dir: Option<PathBuf>,
    cancel: CancelToken,
}

impl I3dExporter {
    /// Fails when the configuration is out of range
    pub fn new(config: ExportConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            library: ShaderLibrary::new(),
            source_dir: None,
            cancel: CancelToken::new(),
        })
    }

    /// Shader templates providing custom parameter defaults
    pub fn with_shader_library(mut self, library: ShaderLibrary) -> Self {
        self.library = library;
        self
    }

    /// Directory relative file references in the scene are authored against
    /// (defaults to the output directory)
    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token the host can use to abort a running export
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Build the normalized graph without writing anything
    pub fn build_graph(&self, scene: &dyn SceneSource, report: &mut ExportReport) -> Result<SceneGraph> {
        instrument_phase("build", || {
            SceneGraphBuilder::new(&self.config, &self.cancel).build(scene, report)
        })
    }

    /// Export into memory; `document_dir` is where the document would live
    pub fn export_to_memory(
        &self,
        scene: &dyn SceneSource,
        document_dir: &Path,
        shapes_file: &str,
    ) -> Result<(WrittenDocument, ExportReport)> {
        let mut report = ExportReport::new();
        let graph = self.build_graph(scene, &mut report)?;
        let source_dir = self.source_dir.as_deref().unwrap_or(document_dir);
        let mut resolver = PathResolver::new(&self.config, document_dir, source_dir);
        let writer = I3dDocumentWriter::new(&self.config, &self.library, &self.cancel);
        let written = instrument_phase("write", || {
            writer.write_document(&graph, &mut resolver, shapes_file, &mut report)
        })?;
        Ok((written, report))
    }

    /// Export to `output` (an `.i3d` path)
    pub fn export(&self, scene: &dyn SceneSource, output: impl AsRef<Path>) -> Result<ExportReport> {
        let start = Instant::now();
        let output = absolute(output.as_ref())?;
        log_export_start!(scene.scene_name(), output);

        match self.export_inner(scene, &output) {
            Ok(report) => {
                log_export_complete!(scene.scene_name(), start.elapsed(), report.exported_node_count());
                Ok(report)
            }
            Err(err) => {
                log_export_error!(scene.scene_name(), err);
                Err(err)
            }
        }
    }

    fn export_inner(&self, scene: &dyn SceneSource, output: &Path) -> Result<ExportReport> {
        let (dir, stem) = match (output.parent(), output.file_stem()) {
            (Some(dir), Some(stem)) => (dir.to_path_buf(), stem.to_string_lossy().into_owned()),
            _ => {
                return Err(Error::invalid_config(format!(
                    "output path '{}' has no file name",
                    output.display()
                )))
            }
        };
        fs::create_dir_all(&dir)?;
        let shapes_name = format!("{}.{}", stem, SHAPES_EXTENSION);
        let shapes_path = dir.join(&shapes_name);

        let mut report = ExportReport::new();
        let graph = self.build_graph(scene, &mut report)?;

        let source_dir = self.source_dir.clone().unwrap_or_else(|| dir.clone());
        let mut resolver = PathResolver::new(&self.config, &dir, &source_dir);
        let writer = I3dDocumentWriter::new(&self.config, &self.library, &self.cancel);
        let plan = writer.plan(&graph, &mut resolver, &mut report)?;

        // Temporary files are removed on drop, so every early return below
        // leaves the destination untouched.
        let shapes_temp = match self.config.geometry_encoding {
            GeometryEncoding::Binary => {
                let temp = instrument_phase("shapes", || {
                    let out = BufWriter::new(NamedTempFile::new_in(&dir)?);
                    let out = writer.write_shapes(&graph, &plan, out)?;
                    out.into_inner().map_err(|e| Error::Io(e.into_error()))
                })?;
                Some(temp)
            }
            GeometryEncoding::Embedded => None,
        };

        let xml = instrument_phase("document", || writer.write_xml(&graph, &plan, Some(&shapes_name)))?;
        let mut document_temp = NamedTempFile::new_in(&dir)?;
        document_temp.write_all(&xml)?;
        document_temp.as_file().sync_all()?;

        self.cancel.check()?;

        match shapes_temp {
            Some(temp) => {
                temp.as_file().sync_all()?;
                let backup = set_aside(&shapes_path, &dir)?;
                if let Err(e) = temp.persist(&shapes_path) {
                    restore(&shapes_path, backup);
                    return Err(Error::Io(e.error));
                }
                if let Err(e) = document_temp.persist(output) {
                    restore(&shapes_path, backup);
                    return Err(Error::Io(e.error));
                }
                debug!(path = %shapes_path.display(), "Shapes file written");
                report.shapes_file = Some(shapes_path);
            }
            None => {
                document_temp.persist(output).map_err(|e| Error::Io(e.error))?;
            }
        }
        info!(path = %output.display(), bytes = xml.len(), "Document written");
        report.document = Some(output.to_path_buf());

        Ok(report)
    }
}

/// Move an existing file to a temporary path in `dir`. The copy is deleted
/// when the returned handle drops.
fn set_aside(path: &Path, dir: &Path) -> Result<Option<TempPath>> {
    if !path.is_file() {
        return Ok(None);
    }
    let backup = NamedTempFile::new_in(dir)?.into_temp_path();
    fs::rename(path, &backup)?;
    Ok(Some(backup))
}

/// Drop a freshly promoted file and put back what it replaced
fn restore(path: &Path, backup: Option<TempPath>) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Could not remove shapes file");
        }
    }
    if let Some(backup) = backup {
        if let Err(e) = backup.persist(path) {
            warn!(path = %path.display(), error = %e.error, "Could not restore previous shapes file");
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
