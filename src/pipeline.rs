// THEORY:
// The `pipeline` module is the top-level API of the engine. It turns a directory
// of per-second frames (one FrameSet) into persisted artifacts and then routes
// each frame's palette into a bucket named after its light direction.
//
// Pass 1, summarization:
//   list frames (sorted by name) -> detect black bars once on the middle frame
//   -> for every frame: crop, reduce to palette and light map grids, compute
//   dominant and average colors, write four artifacts keyed by the frame stem.
// Pass 2, routing:
//   for every light map artifact: downsample to 3x3, classify, copy the matching
//   palette into `<buckets>/<direction>/<set>_<frame>.<ext>`.
//
// Failure scopes are strict. A frame that cannot be read or reduced is logged
// and skipped; the rest of the set carries on. A set whose representative frame
// crops to nothing is abandoned as a whole. A batch never stops because one set
// failed. Artifacts are keyed deterministically, so a rerun skips frames that
// are already done.

use crate::config::{ArtifactFormat, PipelineConfig};
use crate::core_modules::black_bars::detect_black_bars;
use crate::core_modules::color_summary::{average_color, dominant_color};
use crate::core_modules::grid_reducer::{Grid, ReductionMode, reduce_to_grid};
use crate::core_modules::light_direction::{LightGrid, classify_direction, classify_lightmap_file};
use crate::core_modules::utils::image_helper::image_helper;
use crate::error::{PaletteError, Result};
use image::RgbImage;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::black_bars::CropOffsets;
pub use crate::core_modules::light_direction::Direction;
pub use crate::core_modules::pixel::pixel::Pixel;

const FRAME_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// The four artifacts written for every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Dominant,
    Average,
    Palette,
    Lightmap,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Dominant,
        ArtifactKind::Average,
        ArtifactKind::Palette,
        ArtifactKind::Lightmap,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            ArtifactKind::Dominant => "dominant",
            ArtifactKind::Average => "average",
            ArtifactKind::Palette => "palette",
            ArtifactKind::Lightmap => "lightmap",
        }
    }

    /// `<prefix>_<frame_id>.<ext>`
    pub fn file_name(self, frame_id: &str, format: ArtifactFormat) -> String {
        format!("{}_{}.{}", self.prefix(), frame_id, format.extension())
    }

    fn is_artifact_name(name: &str) -> bool {
        Self::ALL
            .iter()
            .any(|kind| name.starts_with(&format!("{}_", kind.prefix())))
    }
}

fn has_frame_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The base identifier of a frame: its file name without the extension.
pub fn frame_id(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| PaletteError::io(dir, source))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| PaletteError::io(dir, source))?;
        paths.push(entry.path());
    }
    paths.sort_by_key(|path| file_name_of(path));
    Ok(paths)
}

/// An ordered sequence of frames sharing one source directory.
#[derive(Debug, Clone)]
pub struct FrameSet {
    pub id: String,
    pub dir: PathBuf,
    /// Frame files sorted lexicographically by name.
    pub frames: Vec<PathBuf>,
}

impl FrameSet {
    /// Lists the frames of `dir`, leaving previously written artifacts out.
    pub fn open(dir: &Path) -> Result<Self> {
        let frames = read_dir_sorted(dir)?
            .into_iter()
            .filter(|path| path.is_file() && has_frame_extension(path))
            .filter(|path| !ArtifactKind::is_artifact_name(&file_name_of(path)))
            .collect();
        Ok(Self {
            id: file_name_of(dir),
            dir: dir.to_path_buf(),
            frames,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The middle element of the sorted listing.
    pub fn representative(&self) -> Option<&Path> {
        self.frames.get(self.frames.len() / 2).map(PathBuf::as_path)
    }

    /// Frames ordered by distance from the representative, nearest first.
    fn representative_candidates(&self) -> Vec<&Path> {
        let middle = self.frames.len() / 2;
        let mut order: Vec<usize> = (0..self.frames.len()).collect();
        order.sort_by_key(|index| (index.abs_diff(middle), *index < middle));
        order.into_iter().map(|index| self.frames[index].as_path()).collect()
    }
}

/// Everything computed for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSummary {
    pub frame_id: String,
    pub crop: CropOffsets,
    pub dominant: Pixel,
    pub average: Pixel,
    pub palette: Grid,
    pub lightmap: Grid,
    /// Light direction of the light map as it will read back once rendered.
    pub direction: Direction,
}

/// The result of running pass 1 on a single frame.
#[derive(Debug)]
pub enum FrameOutcome {
    Summarized(FrameSummary),
    AlreadyPresent,
    Failed(PaletteError),
}

#[derive(Debug, Clone, Default)]
pub struct FrameSetReport {
    pub set_id: String,
    /// The shared crop, absent for an empty set or with per-frame detection.
    pub crop: Option<CropOffsets>,
    pub summarized: Vec<String>,
    pub skipped_existing: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl FrameSetReport {
    pub fn new(set_id: impl Into<String>, crop: Option<CropOffsets>) -> Self {
        Self {
            set_id: set_id.into(),
            crop,
            ..Self::default()
        }
    }

    pub fn record(&mut self, frame_id: String, outcome: FrameOutcome) {
        match outcome {
            FrameOutcome::Summarized(_) => self.summarized.push(frame_id),
            FrameOutcome::AlreadyPresent => self.skipped_existing.push(frame_id),
            FrameOutcome::Failed(err) => self.failed.push((frame_id, err.to_string())),
        }
    }

    pub fn total(&self) -> usize {
        self.summarized.len() + self.skipped_existing.len() + self.failed.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationReport {
    pub set_id: String,
    pub counts: BTreeMap<Direction, usize>,
    /// `(frame_id, direction)` in frame order.
    pub routed: Vec<(String, Direction)>,
    pub failed: Vec<(String, String)>,
}

impl ClassificationReport {
    pub fn new(set_id: impl Into<String>) -> Self {
        Self {
            set_id: set_id.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, frame_id: String, result: Result<Direction>) {
        match result {
            Ok(direction) => {
                *self.counts.entry(direction).or_insert(0) += 1;
                self.routed.push((frame_id, direction));
            }
            Err(err) => self.failed.push((frame_id, err.to_string())),
        }
    }

    pub fn count(&self, direction: Direction) -> usize {
        self.counts.get(&direction).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub sets: Vec<FrameSetReport>,
    pub failed_sets: Vec<(String, String)>,
    pub classification: Vec<ClassificationReport>,
}

/// A light map artifact waiting to be classified.
#[derive(Debug, Clone)]
pub struct LightmapEntry {
    pub frame_id: String,
    pub path: PathBuf,
}

/// The main, top-level struct for the palette engine.
#[derive(Debug, Clone, Default)]
pub struct PalettePipeline {
    config: PipelineConfig,
}

impl PalettePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn artifact_path(&self, dir: &Path, kind: ArtifactKind, frame_id: &str) -> PathBuf {
        dir.join(kind.file_name(frame_id, self.config.artifact_format))
    }

    fn detect(&self, frame: &RgbImage) -> CropOffsets {
        detect_black_bars(
            frame,
            self.config.brightness_threshold,
            self.config.coverage_threshold,
        )
    }

    /// Computes the set-wide crop from the representative frame. An unreadable
    /// representative hands over to its nearest readable neighbor. Returns
    /// `None` for an empty set.
    pub fn detect_set_crop(&self, set: &FrameSet) -> Result<Option<CropOffsets>> {
        for candidate in set.representative_candidates() {
            let frame = match image_helper::load_frame(candidate) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(set = %set.id, frame = %frame_id(candidate), error = %err, "representative frame unreadable, trying a neighbor");
                    continue;
                }
            };
            let crop = self.detect(&frame);
            if crop.remaining_height(frame.height()).is_none() {
                return Err(PaletteError::degenerate(format!(
                    "representative frame {} of set {} is fully black ({crop})",
                    file_name_of(candidate),
                    set.id
                )));
            }
            info!(set = %set.id, frame = %frame_id(candidate), %crop, "detected black bars");
            return Ok(Some(crop));
        }

        if set.is_empty() {
            Ok(None)
        } else {
            Err(PaletteError::degenerate(format!(
                "no readable frame in set {}",
                set.id
            )))
        }
    }

    /// Crops and reduces one frame. Nothing is written.
    pub fn summarize(&self, frame: &RgbImage, crop: CropOffsets, frame_id: &str) -> Result<FrameSummary> {
        let cropped = crop.apply(frame)?;
        let config = &self.config;
        let (rows, cols) = (config.grid_rows, config.grid_cols);

        let lightmap = reduce_to_grid(&cropped, rows, cols, ReductionMode::AverageLuminosity)?;
        let light = LightGrid::from_grid(&lightmap, config.block_width, config.block_height)?;
        Ok(FrameSummary {
            frame_id: frame_id.to_string(),
            crop,
            dominant: dominant_color(&cropped, config.dominant_resize_cap)?,
            average: average_color(&cropped)?,
            palette: reduce_to_grid(&cropped, rows, cols, ReductionMode::AverageColor)?,
            lightmap,
            direction: classify_direction(&light),
        })
    }

    /// Loads a frame from disk and summarizes it with the shared crop, or with
    /// its own crop when per-frame detection is enabled.
    pub fn summarize_frame(&self, path: &Path, shared_crop: Option<CropOffsets>) -> Result<FrameSummary> {
        let frame = image_helper::load_frame(path)?;
        let crop = match shared_crop {
            Some(crop) if !self.config.per_frame_detection => crop,
            _ => self.detect(&frame),
        };
        self.summarize(&frame, crop, &frame_id(path))
    }

    /// Writes the dominant, average, palette and light map artifacts.
    pub fn persist(&self, dir: &Path, summary: &FrameSummary) -> Result<()> {
        let config = &self.config;
        let id = summary.frame_id.as_str();
        let block = config.summary_block_size;

        let artifacts = [
            (ArtifactKind::Dominant, image_helper::solid_block(summary.dominant, block, block)),
            (ArtifactKind::Average, image_helper::solid_block(summary.average, block, block)),
            (
                ArtifactKind::Palette,
                summary.palette.render(config.block_width, config.block_height),
            ),
            (
                ArtifactKind::Lightmap,
                summary.lightmap.render(config.block_width, config.block_height),
            ),
        ];
        for (kind, image) in artifacts {
            image_helper::save(&self.artifact_path(dir, kind, id), &image, config.artifact_format)?;
        }
        Ok(())
    }

    fn artifacts_exist(&self, dir: &Path, frame_id: &str) -> bool {
        ArtifactKind::ALL
            .iter()
            .all(|kind| self.artifact_path(dir, *kind, frame_id).is_file())
    }

    /// Pass 1 for one frame: skip if already done, otherwise summarize and persist.
    /// Failures are logged and returned as an outcome, never propagated.
    pub fn process_frame(&self, set_id: &str, dir: &Path, path: &Path, shared_crop: Option<CropOffsets>) -> FrameOutcome {
        let id = frame_id(path);
        if self.config.skip_existing && self.artifacts_exist(dir, &id) {
            debug!(set = %set_id, frame = %id, "artifacts already present, skipping");
            return FrameOutcome::AlreadyPresent;
        }

        let result = self
            .summarize_frame(path, shared_crop)
            .and_then(|summary| self.persist(dir, &summary).map(|_| summary));
        match result {
            Ok(summary) => {
                debug!(set = %set_id, frame = %id, dominant = %summary.dominant, average = %summary.average, direction = %summary.direction, "processed frame");
                FrameOutcome::Summarized(summary)
            }
            Err(err) => {
                warn!(set = %set_id, frame = %id, error = %err, "skipping frame");
                FrameOutcome::Failed(err)
            }
        }
    }

    /// Crop shared by the set, or `None` when every frame detects its own.
    pub fn prepare_set(&self, set: &FrameSet) -> Result<Option<CropOffsets>> {
        if self.config.per_frame_detection {
            return Ok(None);
        }
        self.detect_set_crop(set)
    }

    /// Pass 1 over a whole FrameSet directory.
    pub fn process_frame_set(&self, dir: &Path) -> Result<FrameSetReport> {
        let set = FrameSet::open(dir)?;
        if set.is_empty() {
            warn!(set = %set.id, dir = %dir.display(), "no frames found, nothing to do");
            return Ok(FrameSetReport::new(set.id, None));
        }

        let crop = self.prepare_set(&set)?;
        let mut report = FrameSetReport::new(set.id.clone(), crop);
        for path in &set.frames {
            let outcome = self.process_frame(&set.id, &set.dir, path, crop);
            report.record(frame_id(path), outcome);
        }

        info!(
            set = %report.set_id,
            summarized = report.summarized.len(),
            skipped = report.skipped_existing.len(),
            failed = report.failed.len(),
            "frame set summarized"
        );
        Ok(report)
    }

    /// Light map artifacts present in a set directory, sorted by frame.
    pub fn list_lightmaps(&self, set_dir: &Path) -> Result<Vec<LightmapEntry>> {
        let prefix = format!("{}_", ArtifactKind::Lightmap.prefix());
        Ok(read_dir_sorted(set_dir)?
            .into_iter()
            .filter(|path| path.is_file() && has_frame_extension(path))
            .filter_map(|path| {
                let stem = frame_id(&path);
                let id = stem.strip_prefix(&prefix)?.to_string();
                Some(LightmapEntry { frame_id: id, path })
            })
            .collect())
    }

    /// Pass 2 for one frame: classify its light map and copy its palette into
    /// `<buckets_root>/<direction>/<set_id>_<frame_id>.<ext>`.
    pub fn route_frame(&self, set_id: &str, set_dir: &Path, entry: &LightmapEntry, buckets_root: &Path) -> Result<Direction> {
        let direction = classify_lightmap_file(&entry.path)?;
        let extension = entry
            .path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.config.artifact_format.extension().to_string());

        let palette = set_dir.join(format!(
            "{}_{}.{}",
            ArtifactKind::Palette.prefix(),
            entry.frame_id,
            extension
        ));
        if !palette.is_file() {
            return Err(PaletteError::io(
                &palette,
                std::io::Error::new(std::io::ErrorKind::NotFound, "palette artifact missing"),
            ));
        }

        let bucket = buckets_root.join(direction.as_str());
        fs::create_dir_all(&bucket).map_err(|source| PaletteError::io(&bucket, source))?;
        let destination = bucket.join(format!("{}_{}.{}", set_id, entry.frame_id, extension));
        fs::copy(&palette, &destination).map_err(|source| PaletteError::io(&destination, source))?;

        if direction == Direction::Undetermined {
            debug!(set = %set_id, frame = %entry.frame_id, "light direction ambiguous");
        }
        Ok(direction)
    }

    /// Pass 2 over a set directory whose light maps already exist.
    pub fn classify_frame_set(&self, set_dir: &Path, buckets_root: &Path) -> Result<ClassificationReport> {
        let set_id = file_name_of(set_dir);
        let mut report = ClassificationReport::new(set_id.clone());
        for entry in self.list_lightmaps(set_dir)? {
            let result = self.route_frame(&set_id, set_dir, &entry, buckets_root);
            if let Err(err) = &result {
                warn!(set = %set_id, frame = %entry.frame_id, error = %err, "could not route palette");
            }
            report.record(entry.frame_id, result);
        }
        info!(set = %set_id, routed = report.routed.len(), failed = report.failed.len(), "frame set classified");
        Ok(report)
    }

    pub fn buckets_root(&self, root: &Path) -> PathBuf {
        root.join(&self.config.buckets_dir)
    }

    /// FrameSet directories under a batch root, sorted, buckets excluded.
    pub fn list_frame_sets(&self, root: &Path) -> Result<Vec<PathBuf>> {
        Ok(read_dir_sorted(root)?
            .into_iter()
            .filter(|path| path.is_dir() && file_name_of(path) != self.config.buckets_dir)
            .collect())
    }

    /// Pass 2 over every FrameSet under `root`.
    pub fn classify_root(&self, root: &Path, buckets_root: &Path) -> Result<Vec<ClassificationReport>> {
        let mut reports = Vec::new();
        for set_dir in self.list_frame_sets(root)? {
            match self.classify_frame_set(&set_dir, buckets_root) {
                Ok(report) => reports.push(report),
                Err(err) => error!(set = %file_name_of(&set_dir), error = %err, "classification failed for set"),
            }
        }
        Ok(reports)
    }

    /// Both passes over every FrameSet under `root`.
    pub fn process_batch(&self, root: &Path) -> Result<BatchReport> {
        let mut batch = BatchReport::default();
        let sets = self.list_frame_sets(root)?;
        if sets.is_empty() {
            warn!(root = %root.display(), "no frame sets found");
            return Ok(batch);
        }

        for set_dir in &sets {
            match self.process_frame_set(set_dir) {
                Ok(report) => batch.sets.push(report),
                Err(err) => {
                    error!(set = %file_name_of(set_dir), error = %err, "abandoning frame set");
                    batch.failed_sets.push((file_name_of(set_dir), err.to_string()));
                }
            }
        }

        let buckets_root = self.buckets_root(root);
        for report in &batch.sets {
            let set_dir = root.join(&report.set_id);
            match self.classify_frame_set(&set_dir, &buckets_root) {
                Ok(classification) => batch.classification.push(classification),
                Err(err) => error!(set = %report.set_id, error = %err, "classification failed for set"),
            }
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_frame(dir: &Path, name: &str, image: &RgbImage) {
        image.save(dir.join(name)).unwrap();
    }

    /// 64x40 frame, top and bottom 4 rows black, bright band in the top third.
    fn letterboxed_frame(tint: u8) -> RgbImage {
        RgbImage::from_fn(64, 40, |_, y| match y {
            0..4 | 36..40 => Rgb([0, 0, 0]),
            4..14 => Rgb([250, 250, tint]),
            _ => Rgb([40, 40, 40]),
        })
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            block_width: 5,
            block_height: 5,
            summary_block_size: 10,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn frame_set_lists_frames_in_name_order_without_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["02.jpg", "00.png", "01.JPEG", "palette_00.png", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let set = FrameSet::open(dir.path()).unwrap();
        let names: Vec<String> = set.frames.iter().map(|p| file_name_of(p)).collect();
        assert_eq!(names, ["00.png", "01.JPEG", "02.jpg"]);
        assert_eq!(set.representative().map(file_name_of), Some("01.JPEG".to_string()));
    }

    #[test]
    fn representative_is_the_middle_element() {
        let set = FrameSet {
            id: "chunk_000".into(),
            dir: PathBuf::from("chunk_000"),
            frames: (0..4).map(|i| PathBuf::from(format!("{i:02}.png"))).collect(),
        };
        assert_eq!(set.representative(), Some(Path::new("02.png")));
        let order: Vec<_> = set.representative_candidates().into_iter().map(file_name_of).collect();
        assert_eq!(order, ["02.png", "03.png", "01.png", "00.png"]);
    }

    #[test]
    fn summarize_uses_the_shared_crop() {
        let pipeline = PalettePipeline::new(config());
        let frame = letterboxed_frame(0);
        let crop = CropOffsets::new(4, 4);
        let summary = pipeline.summarize(&frame, crop, "07").unwrap();
        assert_eq!(summary.palette.cells().len(), 16);
        assert_eq!(summary.lightmap.cells().len(), 16);
        assert_eq!(summary.dominant, Pixel::gray(40));
        // 32 rows after cropping: 10 bright, 22 gray.
        assert_eq!(summary.average.red, ((250 * 10 + 40 * 22) / 32) as u8);
    }

    #[test]
    fn process_frame_set_writes_four_artifacts_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let set_dir = dir.path().join("chunk_000");
        fs::create_dir(&set_dir).unwrap();
        for (i, tint) in [0u8, 80, 160].iter().enumerate() {
            write_frame(&set_dir, &format!("{i:02}.png"), &letterboxed_frame(*tint));
        }

        let pipeline = PalettePipeline::new(config());
        let report = pipeline.process_frame_set(&set_dir).unwrap();
        assert_eq!(report.crop, Some(CropOffsets::new(4, 4)));
        assert_eq!(report.summarized, ["00", "01", "02"]);
        for id in ["00", "01", "02"] {
            for kind in ArtifactKind::ALL {
                assert!(pipeline.artifact_path(&set_dir, kind, id).is_file());
            }
        }
        let palette = image_helper::load_frame(&pipeline.artifact_path(&set_dir, ArtifactKind::Palette, "00")).unwrap();
        assert_eq!(palette.dimensions(), (20, 20));
        let dominant = image_helper::load_frame(&pipeline.artifact_path(&set_dir, ArtifactKind::Dominant, "00")).unwrap();
        assert_eq!(dominant.dimensions(), (10, 10));

        // A rerun finds everything in place and does no work.
        let rerun = pipeline.process_frame_set(&set_dir).unwrap();
        assert!(rerun.summarized.is_empty());
        assert_eq!(rerun.skipped_existing.len(), 3);
    }

    #[test]
    fn corrupt_frame_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "00.png", &letterboxed_frame(0));
        fs::write(dir.path().join("01.png"), b"garbage").unwrap();
        write_frame(dir.path(), "02.png", &letterboxed_frame(0));

        let pipeline = PalettePipeline::new(config());
        let report = pipeline.process_frame_set(dir.path()).unwrap();
        // The corrupt representative hands detection to a neighbor.
        assert_eq!(report.crop, Some(CropOffsets::new(4, 4)));
        assert_eq!(report.summarized, ["00", "02"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "01");
    }

    #[test]
    fn empty_set_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let report = PalettePipeline::default().process_frame_set(dir.path()).unwrap();
        assert_eq!(report.total(), 0);
        assert_eq!(report.crop, None);
    }

    #[test]
    fn black_representative_abandons_the_set() {
        let dir = tempfile::tempdir().unwrap();
        let black = RgbImage::from_pixel(32, 32, Rgb([0, 0, 0]));
        for name in ["00.png", "01.png", "02.png"] {
            write_frame(dir.path(), name, &black);
        }
        let err = PalettePipeline::default().process_frame_set(dir.path()).unwrap_err();
        assert!(matches!(err, PaletteError::DegenerateInput { .. }));
    }

    #[test]
    fn per_frame_detection_crops_each_frame_on_its_own() {
        let pipeline = PalettePipeline::new(PipelineConfig {
            per_frame_detection: true,
            ..config()
        });
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("00.png");
        write_frame(dir.path(), "00.png", &letterboxed_frame(0));
        let summary = pipeline.summarize_frame(&path, Some(CropOffsets::NONE)).unwrap();
        assert_eq!(summary.crop, CropOffsets::new(4, 4));
    }

    #[test]
    fn batch_routes_palettes_into_direction_buckets() {
        let root = tempfile::tempdir().unwrap();
        let set_dir = root.path().join("chunk_001");
        fs::create_dir(&set_dir).unwrap();
        write_frame(&set_dir, "00.png", &letterboxed_frame(250));
        write_frame(&set_dir, "01.png", &RgbImage::from_pixel(40, 40, Rgb([90, 90, 90])));

        let pipeline = PalettePipeline::new(config());
        let batch = pipeline.process_batch(root.path()).unwrap();
        assert_eq!(batch.sets.len(), 1);
        assert!(batch.failed_sets.is_empty());

        let classification = &batch.classification[0];
        assert_eq!(
            classification.routed,
            [
                ("00".to_string(), Direction::Top),
                ("01".to_string(), Direction::Undetermined)
            ]
        );
        let buckets = pipeline.buckets_root(root.path());
        assert!(buckets.join("top").join("chunk_001_00.png").is_file());
        assert!(buckets.join("undetermined").join("chunk_001_01.png").is_file());

        // The buckets directory is never mistaken for a frame set.
        let again = pipeline.process_batch(root.path()).unwrap();
        assert_eq!(again.sets.len(), 1);
    }

    #[test]
    fn missing_palette_is_reported_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let set_dir = dir.path().join("chunk_002");
        fs::create_dir(&set_dir).unwrap();
        let light_map = RgbImage::from_pixel(30, 30, Rgb([0, 0, 0]));
        write_frame(&set_dir, "lightmap_05.png", &light_map);

        let pipeline = PalettePipeline::default();
        let report = pipeline.classify_frame_set(&set_dir, &dir.path().join("buckets")).unwrap();
        assert!(report.routed.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "05");
    }

    #[test]
    fn unwritable_artifact_fails_only_its_frame() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "00.png", &letterboxed_frame(0));
        write_frame(dir.path(), "01.png", &letterboxed_frame(0));
        // A directory squatting on the palette path makes the write fail.
        fs::create_dir(dir.path().join("palette_00.png")).unwrap();

        let pipeline = PalettePipeline::new(config());
        let report = pipeline.process_frame_set(dir.path()).unwrap();
        assert_eq!(report.summarized, ["01"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "00");
        assert!(report.failed[0].1.contains("palette_00.png"));
    }

    #[test]
    fn in_memory_direction_matches_the_routed_one() {
        let root = tempfile::tempdir().unwrap();
        let set_dir = root.path().join("chunk_003");
        fs::create_dir(&set_dir).unwrap();
        write_frame(&set_dir, "00.png", &letterboxed_frame(250));

        let pipeline = PalettePipeline::new(config());
        let summary = pipeline
            .summarize_frame(&set_dir.join("00.png"), Some(CropOffsets::NONE))
            .unwrap();
        pipeline.persist(&set_dir, &summary).unwrap();

        let report = pipeline.classify_frame_set(&set_dir, &pipeline.buckets_root(root.path())).unwrap();
        assert_eq!(report.routed, [("00".to_string(), summary.direction)]);
        assert_eq!(summary.direction, Direction::Top);
    }

    #[test]
    fn classify_root_honors_a_bucket_override() {
        let root = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        for set in ["chunk_000", "chunk_001"] {
            let set_dir = root.path().join(set);
            fs::create_dir(&set_dir).unwrap();
            write_frame(&set_dir, "00.png", &letterboxed_frame(250));
        }
        let pipeline = PalettePipeline::new(config());
        for set in ["chunk_000", "chunk_001"] {
            pipeline.process_frame_set(&root.path().join(set)).unwrap();
        }
        // A stray buckets directory under the root is not a frame set.
        fs::create_dir(pipeline.buckets_root(root.path())).unwrap();

        let reports = pipeline.classify_root(root.path(), elsewhere.path()).unwrap();
        let sets: Vec<&str> = reports.iter().map(|r| r.set_id.as_str()).collect();
        assert_eq!(sets, ["chunk_000", "chunk_001"]);
        assert!(reports.iter().all(|r| r.count(Direction::Top) == 1));
        assert!(elsewhere.path().join("top").join("chunk_000_00.png").is_file());
        assert!(elsewhere.path().join("top").join("chunk_001_00.png").is_file());
        assert!(!pipeline.buckets_root(root.path()).join("top").exists());
    }

    #[test]
    fn jpeg_artifacts_are_classified_and_routed() {
        let root = tempfile::tempdir().unwrap();
        let set_dir = root.path().join("chunk_004");
        fs::create_dir(&set_dir).unwrap();
        let bottom_lit = RgbImage::from_fn(64, 40, |_, y| if y >= 30 { Rgb([250, 250, 250]) } else { Rgb([40, 40, 40]) });
        write_frame(&set_dir, "00.png", &letterboxed_frame(250));
        write_frame(&set_dir, "01.png", &bottom_lit);

        let pipeline = PalettePipeline::new(PipelineConfig {
            artifact_format: ArtifactFormat::Jpeg,
            ..config()
        });
        let batch = pipeline.process_batch(root.path()).unwrap();
        assert!(set_dir.join("lightmap_00.jpg").is_file());

        let classification = &batch.classification[0];
        assert_eq!(
            classification.routed,
            [
                ("00".to_string(), Direction::Top),
                ("01".to_string(), Direction::Bottom)
            ]
        );
        let buckets = pipeline.buckets_root(root.path());
        assert!(buckets.join("top").join("chunk_004_00.jpg").is_file());
        assert!(buckets.join("bottom").join("chunk_004_01.jpg").is_file());
    }
}
