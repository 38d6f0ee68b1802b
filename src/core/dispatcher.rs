//! Maps a validated [`PosterConfig`] onto a renderer call and cleans up the
//! uploads it referenced once the image exists on disk.
//!
//! Per request the flow is `validated -> dispatched -> rendered ->
//! cleaned-up -> returned`. Render failures and a missing output file abort
//! the request; cleanup problems are only logged.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use crate::core::error::{PosterError, PosterResult};
use crate::core::poster::{
    BarConfig, DualConfig, HighlightPoint, HighlightRegion, Orientation, PieConfig,
    PosterCommon, PosterConfig, PosterType, SeriesType, TimeRange, YSeries,
};
use crate::core::uploads::{CleanupReport, UploadManager};

/// Plain key/value form of a highlight, looked up by key in the renderer.
pub type HighlightRecord = Map<String, JsonValue>;

/// Parameters shared by every poster family.
#[derive(Debug, Clone)]
pub struct CommonParams {
    pub title: String,
    pub subtitle: String,
    pub note_value: String,
    pub template_name: String,
    pub date_str: Option<String>,
    pub center_image: Option<String>,
    pub colors_hex: Option<Vec<String>>,
}

impl CommonParams {
    fn new(common: &PosterCommon, colors_hex: &Option<Vec<String>>) -> Self {
        Self {
            title: common.title.clone(),
            subtitle: common.subtitle.clone(),
            note_value: common.note_value.clone(),
            template_name: common.template_name.clone(),
            date_str: common.date_str.clone(),
            center_image: common.center_image.clone(),
            colors_hex: colors_hex.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PieParams {
    pub common: CommonParams,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct BarParams {
    pub common: CommonParams,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub orientation: Orientation,
    pub value_axis_label: String,
    pub label_images: Option<Vec<Option<String>>>,
}

#[derive(Debug, Clone)]
pub struct DualParams {
    pub common: CommonParams,
    pub x_values: Vec<String>,
    pub y_series: YSeries,
    pub ylabel_left: String,
    pub log_left: bool,
    pub include_zero_left: bool,
    pub left_series_type: SeriesType,
    pub right_series: Option<Vec<f64>>,
    pub right_color_hex: String,
    pub ylabel_right: String,
    pub right_series_type: SeriesType,
    pub log_right: bool,
    pub include_zero_right: bool,
    pub highlight_regions: Option<Vec<HighlightRecord>>,
    pub highlight_points: Option<Vec<HighlightRecord>>,
    pub time_range: TimeRange,
}

/// One call into the renderer, selected by poster family.
#[derive(Debug, Clone)]
pub enum RenderJob {
    Pie(PieParams),
    Bar(BarParams),
    Dual(DualParams),
}

impl RenderJob {
    pub fn poster_type(&self) -> PosterType {
        match self {
            RenderJob::Pie(_) => PosterType::Pie,
            RenderJob::Bar(_) => PosterType::Bar,
            RenderJob::Dual(_) => PosterType::Dual,
        }
    }

    pub fn common(&self) -> &CommonParams {
        match self {
            RenderJob::Pie(p) => &p.common,
            RenderJob::Bar(p) => &p.common,
            RenderJob::Dual(p) => &p.common,
        }
    }
}

impl From<&PosterConfig> for RenderJob {
    fn from(config: &PosterConfig) -> Self {
        match config {
            PosterConfig::Pie(c) => RenderJob::Pie(pie_params(c)),
            PosterConfig::Bar(c) => RenderJob::Bar(bar_params(c)),
            PosterConfig::Dual(c) => RenderJob::Dual(dual_params(c)),
        }
    }
}

fn pie_params(c: &PieConfig) -> PieParams {
    PieParams {
        common: CommonParams::new(&c.common, &c.colors_hex),
        labels: c.labels.clone(),
        values: c.values.clone(),
    }
}

fn bar_params(c: &BarConfig) -> BarParams {
    BarParams {
        common: CommonParams::new(&c.common, &c.colors_hex),
        labels: c.labels.clone(),
        values: c.values.clone(),
        orientation: c.orientation,
        value_axis_label: c.value_axis_label.clone(),
        label_images: c.label_images.clone(),
    }
}

fn dual_params(c: &DualConfig) -> DualParams {
    DualParams {
        common: CommonParams::new(&c.common, &c.colors_hex),
        x_values: c.x_values.clone(),
        y_series: c.y_series.clone(),
        ylabel_left: c.ylabel_left.clone(),
        log_left: c.log_left,
        include_zero_left: c.include_zero_left,
        left_series_type: c.left_series_type,
        right_series: c.right_series.clone(),
        right_color_hex: c.right_color_hex.clone(),
        ylabel_right: c.ylabel_right.clone(),
        right_series_type: c.right_series_type,
        log_right: c.log_right,
        include_zero_right: c.include_zero_right,
        highlight_regions: c
            .highlight_regions
            .as_ref()
            .map(|regions| regions.iter().map(region_record).collect()),
        highlight_points: c
            .highlight_points
            .as_ref()
            .map(|points| points.iter().map(point_record).collect()),
        time_range: c.time_range,
    }
}

pub fn region_record(region: &HighlightRegion) -> HighlightRecord {
    let HighlightRegion { start, end, label } = region;
    let mut record = Map::new();
    record.insert("start".into(), JsonValue::from(start.clone()));
    record.insert("end".into(), JsonValue::from(end.clone()));
    record.insert("label".into(), JsonValue::from(label.clone()));
    record
}

pub fn point_record(point: &HighlightPoint) -> HighlightRecord {
    let HighlightPoint {
        x,
        series,
        axis,
        label,
    } = point;
    let mut record = Map::new();
    record.insert("x".into(), JsonValue::from(x.clone()));
    record.insert("series".into(), series.to_json());
    record.insert("axis".into(), JsonValue::from(axis.as_str()));
    record.insert("label".into(), JsonValue::from(label.clone()));
    record
}

/// Draws one poster and returns the path of the image it wrote.
pub trait PosterRenderer: Send + Sync {
    fn render(&self, job: &RenderJob) -> anyhow::Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub path: PathBuf,
    pub cleanup: Option<CleanupReport>,
}

#[derive(Clone)]
pub struct PosterDispatcher {
    renderer: Arc<dyn PosterRenderer>,
    uploads: Arc<UploadManager>,
}

impl PosterDispatcher {
    pub fn new(renderer: Arc<dyn PosterRenderer>, uploads: Arc<UploadManager>) -> Self {
        Self { renderer, uploads }
    }

    /// Renders off the async runtime, as the browser calls block.
    pub async fn render(&self, config: PosterConfig, cleanup: bool) -> PosterResult<RenderOutcome> {
        let dispatcher = self.clone();

        tokio::task::spawn_blocking(move || dispatcher.render_sync(&config, cleanup))
            .await
            .map_err(|e| PosterError::Task(e.to_string()))?
    }

    pub fn render_sync(&self, config: &PosterConfig, cleanup: bool) -> PosterResult<RenderOutcome> {
        let poster_type = config.poster_type();
        let job = RenderJob::from(config);
        tracing::info!(event = "poster_dispatched", poster_type = %poster_type);

        let path = self.renderer.render(&job).map_err(|e| {
            tracing::error!(event = "poster_render_failed", poster_type = %poster_type, error = %e);
            PosterError::Render(e)
        })?;

        if !path.exists() {
            tracing::error!(event = "poster_output_missing", path = %path.display());
            return Err(PosterError::MissingOutput(path));
        }
        tracing::info!(event = "poster_rendered", poster_type = %poster_type, path = %path.display());

        let cleanup = cleanup.then(|| {
            let report = self
                .uploads
                .cleanup_uploads(config.common().center_image.as_deref(), config.label_images());
            tracing::info!(
                event = "poster_uploads_cleaned",
                center_deleted = report.center_deleted,
                label_images_deleted = report.label_images_deleted
            );
            report
        });

        Ok(RenderOutcome { path, cleanup })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::poster::{Axis, SeriesRef};
    use crate::core::uploads::{AssetKind, UploadRoots};
    use parking_lot::Mutex;
    use serde_json::json;
    use tempfile::TempDir;

    struct RecordingRenderer {
        out_dir: PathBuf,
        write_file: bool,
        fail: bool,
        jobs: Mutex<Vec<RenderJob>>,
    }

    impl PosterRenderer for RecordingRenderer {
        fn render(&self, job: &RenderJob) -> anyhow::Result<PathBuf> {
            self.jobs.lock().push(job.clone());
            if self.fail {
                anyhow::bail!("renderer exploded");
            }
            let path = self.out_dir.join(format!("{}.png", job.poster_type()));
            if self.write_file {
                std::fs::write(&path, b"png")?;
            }
            Ok(path)
        }
    }

    fn setup(write_file: bool, fail: bool) -> (TempDir, Arc<RecordingRenderer>, PosterDispatcher) {
        let tmp = TempDir::new().unwrap();
        let uploads = Arc::new(
            UploadManager::new(UploadRoots {
                center_dir: tmp.path().join("center"),
                label_dir: tmp.path().join("labels"),
            })
            .unwrap(),
        );
        let renderer = Arc::new(RecordingRenderer {
            out_dir: tmp.path().to_path_buf(),
            write_file,
            fail,
            jobs: Mutex::new(Vec::new()),
        });
        let dispatcher = PosterDispatcher::new(renderer.clone(), uploads);
        (tmp, renderer, dispatcher)
    }

    #[test]
    fn region_record_keeps_every_field() {
        let region = HighlightRegion {
            start: "2024-01-01".into(),
            end: "2024-01-05".into(),
            label: Some("launch".into()),
        };
        assert_eq!(
            JsonValue::Object(region_record(&region)),
            json!({ "start": "2024-01-01", "end": "2024-01-05", "label": "launch" })
        );
    }

    #[test]
    fn point_record_keeps_every_field() {
        let point = HighlightPoint {
            x: "2024-01-03".into(),
            series: SeriesRef::Key("s1".into()),
            axis: Axis::Right,
            label: None,
        };
        let record = point_record(&point);
        assert_eq!(
            JsonValue::Object(record.clone()),
            json!({ "x": "2024-01-03", "series": "s1", "axis": "right", "label": null })
        );
        // Matches the serialized typed record key for key.
        let typed = serde_json::to_value(&point).unwrap();
        assert_eq!(typed.as_object().unwrap().len(), record.len());
        for key in typed.as_object().unwrap().keys() {
            assert!(record.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn point_record_keeps_index_and_label() {
        let point = HighlightPoint {
            x: "2024-01-04".into(),
            series: SeriesRef::Index(2),
            axis: Axis::Left,
            label: Some("ATH".into()),
        };
        let record = point_record(&point);
        assert_eq!(
            JsonValue::Object(record),
            json!({ "x": "2024-01-04", "series": 2, "axis": "left", "label": "ATH" })
        );
        assert_eq!(
            serde_json::to_value(&point).unwrap(),
            json!({ "x": "2024-01-04", "series": 2, "axis": "left", "label": "ATH" })
        );
    }

    #[tokio::test]
    async fn bar_job_carries_orientation() {
        let (_tmp, renderer, dispatcher) = setup(true, false);
        let cfg = PosterConfig::from_value(&json!({
            "poster_type": "bar",
            "title": "Volume",
            "labels": ["A", "B"],
            "values": [1, 2],
            "orientation": "vertical",
        }))
        .unwrap();

        dispatcher.render(cfg, false).await.unwrap();
        let jobs = renderer.jobs.lock();
        let RenderJob::Bar(bar) = &jobs[0] else {
            panic!("expected bar job");
        };
        assert_eq!(bar.orientation, Orientation::Vertical);
    }

    #[tokio::test]
    async fn dual_job_gets_plain_highlights() {
        let (_tmp, renderer, dispatcher) = setup(true, false);
        let cfg = PosterConfig::from_value(&json!({
            "poster_type": "dual",
            "title": "T",
            "ylabel_left": "L",
            "x_values": ["1", "2"],
            "y_series": { "s": [1, 2] },
            "left_series_type": "area",
            "highlight_regions": [{ "start": "1", "end": "2", "label": "r" }],
        }))
        .unwrap();

        dispatcher.render(cfg, false).await.unwrap();
        let jobs = renderer.jobs.lock();
        let RenderJob::Dual(dual) = &jobs[0] else {
            panic!("expected dual job");
        };
        assert_eq!(dual.left_series_type, SeriesType::Area);
        let regions = dual.highlight_regions.as_ref().unwrap();
        assert_eq!(regions[0].get("label"), Some(&json!("r")));
        assert!(dual.highlight_points.is_none());
    }

    #[tokio::test]
    async fn renderer_failure_is_a_render_error() {
        let (_tmp, _renderer, dispatcher) = setup(false, true);
        let cfg = PosterConfig::Pie(crate::core::defaults::default_pie());
        let err = dispatcher.render(cfg, true).await.unwrap_err();
        assert!(matches!(err, PosterError::Render(_)));
    }

    #[tokio::test]
    async fn missing_output_is_distinct_from_render_error() {
        let (_tmp, _renderer, dispatcher) = setup(false, false);
        let cfg = PosterConfig::Pie(crate::core::defaults::default_pie());
        let err = dispatcher.render(cfg, true).await.unwrap_err();
        assert!(matches!(err, PosterError::MissingOutput(_)));
    }

    #[tokio::test]
    async fn successful_render_cleans_referenced_uploads() {
        let (_tmp, _renderer, dispatcher) = setup(true, false);
        let uploads = dispatcher.uploads.clone();
        let center = uploads
            .ingest(AssetKind::Center, b"c", Some("c.png"))
            .await
            .unwrap();
        let label = uploads
            .ingest(AssetKind::Label, b"l", Some("l.png"))
            .await
            .unwrap();

        let cfg = PosterConfig::from_value(&json!({
            "poster_type": "bar",
            "title": "Volume",
            "labels": ["A", "B"],
            "values": [1, 2],
            "center_image": center.display().to_string(),
            "label_images": [label.display().to_string()],
        }))
        .unwrap();

        let outcome = dispatcher.render(cfg, true).await.unwrap();
        assert!(outcome.path.exists());
        assert_eq!(
            outcome.cleanup,
            Some(CleanupReport {
                center_deleted: true,
                label_images_deleted: 1
            })
        );
        assert!(!center.exists());
        assert!(!label.exists());
    }

    #[tokio::test]
    async fn uploads_survive_when_cleanup_not_requested() {
        let (_tmp, _renderer, dispatcher) = setup(true, false);
        let center = dispatcher
            .uploads
            .ingest(AssetKind::Center, b"c", Some("c.png"))
            .await
            .unwrap();
        let mut pie = crate::core::defaults::default_pie();
        pie.common.center_image = Some(center.display().to_string());

        let outcome = dispatcher.render(PosterConfig::Pie(pie), false).await.unwrap();
        assert!(outcome.cleanup.is_none());
        assert!(center.exists());
    }

    #[tokio::test]
    async fn failed_cleanup_does_not_fail_render() {
        let (_tmp, _renderer, dispatcher) = setup(true, false);
        let stuck = dispatcher.uploads.root(AssetKind::Center).join("stuck");
        std::fs::create_dir_all(&stuck).unwrap();
        let mut pie = crate::core::defaults::default_pie();
        pie.common.center_image = Some(stuck.display().to_string());

        let outcome = dispatcher.render(PosterConfig::Pie(pie), true).await.unwrap();
        assert!(outcome.path.exists());
        assert_eq!(outcome.cleanup, Some(CleanupReport::default()));
        assert!(stuck.is_dir());
    }

    #[tokio::test]
    async fn cleanup_outside_root_does_not_fail_render() {
        let (tmp, _renderer, dispatcher) = setup(true, false);
        let stray = tmp.path().join("stray.png");
        std::fs::write(&stray, b"keep").unwrap();
        let mut pie = crate::core::defaults::default_pie();
        pie.common.center_image = Some(stray.display().to_string());

        let outcome = dispatcher.render(PosterConfig::Pie(pie), true).await.unwrap();
        assert_eq!(outcome.cleanup, Some(CleanupReport::default()));
        assert!(stray.exists());
    }
}
