//! Batch conversion of containers into per-(scene, channel) volumes

use crate::access::CziFileSource;
use crate::assembler::PlaneAssembler;
use crate::backend::{ContainerBackend, ContainerSource};
use crate::calibration::CalibrationResolver;
use crate::config::{ConvertOptions, METADATA_LOG_NAME};
use crate::document::MetadataInterpreter;
use crate::error::{CziError, FailureKind, Result};
use crate::metadata::MetadataNode;
use crate::scene::SceneLocator;
use crate::writer::{TiffVolumeWriter, VolumeRecord, VolumeWriter};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

/// Result of processing one input path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Converted { outputs: Vec<PathBuf> },
    Failed { kind: FailureKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: FileStatus,
}

impl FileOutcome {
    fn from_result(path: PathBuf, result: Result<Vec<PathBuf>>) -> Self {
        let status = match result {
            Ok(outputs) => FileStatus::Converted { outputs },
            Err(err) => FileStatus::Failed {
                kind: err.kind(),
                message: err.to_string(),
            },
        };
        Self { path, status }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, FileStatus::Converted { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.status {
            FileStatus::Failed { kind, .. } => Some(*kind),
            FileStatus::Converted { .. } => None,
        }
    }

    pub fn outputs(&self) -> &[PathBuf] {
        match &self.status {
            FileStatus::Converted { outputs } => outputs,
            FileStatus::Failed { .. } => &[],
        }
    }
}

/// Outcomes of a batch, in input order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn volumes_written(&self) -> usize {
        self.outcomes.iter().map(|o| o.outputs().len()).sum()
    }
}

/// Drives files through interpretation, assembly and writing.
///
/// Within one file, volumes are produced in scene-then-channel order from a
/// single container handle. A failing file never affects another file.
pub struct ConversionDriver<S, W> {
    source: S,
    writer: W,
    options: ConvertOptions,
}

impl ConversionDriver<CziFileSource, TiffVolumeWriter> {
    /// Native CZI reader and TIFF writer
    pub fn native(options: ConvertOptions) -> Self {
        Self::new(CziFileSource, TiffVolumeWriter::new(), options)
    }
}

impl<S: ContainerSource, W: VolumeWriter> ConversionDriver<S, W> {
    pub fn new(source: S, writer: W, options: ConvertOptions) -> Self {
        Self {
            source,
            writer,
            options,
        }
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Convert one container, returning the written volume paths
    pub fn convert_file(&self, path: &Path) -> Result<Vec<PathBuf>> {
        if !path.is_file() {
            return Err(CziError::FileNotFound(path.to_path_buf()));
        }

        let container = self.source.open(path)?;
        let tree = container.metadata()?;

        let out_dir = self.options.output_dir_for(path);
        fs::create_dir_all(&out_dir)?;
        if self.options.write_metadata_log {
            write_metadata_log(&out_dir, &tree);
        }

        let document = MetadataInterpreter::interpret(path, &tree)?;
        let calibration = CalibrationResolver::resolve(&tree)?;
        let scenes = SceneLocator::locate(&container, &document)?;
        info!(
            "{} scene(s) x {} channel(s), depth {}, voxel {}",
            scenes.len(),
            document.channels.len(),
            document.depth,
            calibration
        );

        let assembler = PlaneAssembler::new(self.options.value_scaling);
        let mut outputs = Vec::with_capacity(scenes.len() * document.channels.len());
        for scene in &scenes {
            info!("Scene {} at {}", scene.id, scene.rect);
            for channel in &document.channels {
                let volume =
                    assembler.assemble(&container, scene, channel.index, document.depth)?;
                let record = VolumeRecord {
                    volume: &volume,
                    calibration,
                    scene_id: scene.id,
                    channel_name: &channel.name,
                };
                outputs.push(self.writer.write_volume(&out_dir, &record)?);
            }
        }

        Ok(outputs)
    }

    /// Convert one path and record the outcome instead of failing
    pub fn process(&self, path: &Path) -> FileOutcome {
        let _span = info_span!("file", path = %path.display()).entered();
        info!("Converting {}", path.display());

        let result = self.convert_file(path);
        match &result {
            Ok(outputs) => info!("Wrote {} volume(s)", outputs.len()),
            Err(err) => error!(kind = %err.kind(), "Skipping {}: {}", path.display(), err),
        }
        FileOutcome::from_result(path.to_path_buf(), result)
    }

    /// Convert every path in order, continuing past failures
    pub fn convert_batch<P: AsRef<Path>>(&self, paths: &[P]) -> BatchReport {
        let outcomes = paths.iter().map(|p| self.process(p.as_ref())).collect();
        let report = BatchReport { outcomes };
        info!(
            "Batch finished: {} converted, {} failed",
            report.succeeded(),
            report.failed()
        );
        report
    }
}

impl<S, W> ConversionDriver<S, W>
where
    S: ContainerSource + Send + Sync + 'static,
    W: VolumeWriter + 'static,
{
    /// Convert distinct files concurrently on the blocking pool, at most
    /// `jobs` at a time. Each file gets its own container handle.
    pub async fn convert_batch_parallel(
        self: Arc<Self>,
        paths: Vec<PathBuf>,
        jobs: usize,
    ) -> BatchReport {
        let jobs = jobs.max(1);
        debug!("Converting {} file(s) with {} job(s)", paths.len(), jobs);

        let mut indexed: Vec<(usize, FileOutcome)> = stream::iter(paths.into_iter().enumerate())
            .map(|(index, path)| {
                let driver = Arc::clone(&self);
                async move {
                    let task_path = path.clone();
                    let outcome = tokio::task::spawn_blocking(move || driver.process(&task_path))
                        .await
                        .unwrap_or_else(|e| {
                            error!("Worker for {} failed: {}", path.display(), e);
                            FileOutcome {
                                path,
                                status: FileStatus::Failed {
                                    kind: FailureKind::Other,
                                    message: format!("worker failed: {e}"),
                                },
                            }
                        });
                    (index, outcome)
                }
            })
            .buffer_unordered(jobs)
            .collect()
            .await;

        indexed.sort_by_key(|(index, _)| *index);
        let report = BatchReport {
            outcomes: indexed.into_iter().map(|(_, o)| o).collect(),
        };
        info!(
            "Batch finished: {} converted, {} failed",
            report.succeeded(),
            report.failed()
        );
        report
    }
}

/// Dump the metadata tree for troubleshooting; failures are only logged
fn write_metadata_log(out_dir: &Path, tree: &MetadataNode) {
    let target = out_dir.join(METADATA_LOG_NAME);
    let written = serde_json::to_string_pretty(tree)
        .map_err(CziError::from)
        .and_then(|json| fs::write(&target, json).map_err(CziError::from));
    match written {
        Ok(()) => debug!("Wrote metadata log {}", target.display()),
        Err(err) => warn!("Could not write metadata log {}: {}", target.display(), err),
    }
}
