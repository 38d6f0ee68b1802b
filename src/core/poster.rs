//! Poster configuration variants and their validation.
//!
//! A [`PosterConfig`] is only ever produced by [`PosterConfig::from_value`],
//! which checks, in order: the `poster_type` discriminator, required fields
//! and their types, per-field constraints, cross-field length invariants and
//! finally the lossy `label_images` normalization for bar posters. Each
//! variant reads every field before it checks any value, so a missing or
//! mistyped field is always reported ahead of a blank title or an unknown
//! enum value.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use serde_json::Value as JsonValue;

use crate::core::error::{PosterError, Rule, ValidationError};
use crate::core::fields::{Choice, FieldResult, Fields, parse_choice};

pub const DEFAULT_TEMPLATE_NAME: &str = "main";
pub const DEFAULT_VALUE_AXIS_LABEL: &str = "Volume (USD)";
pub const DEFAULT_RIGHT_COLOR_HEX: &str = "#8C3A3A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PosterType {
    Pie,
    Bar,
    Dual,
}

impl PosterType {
    pub const ALL: [PosterType; 3] = [PosterType::Pie, PosterType::Bar, PosterType::Dual];

    pub fn as_str(&self) -> &'static str {
        match self {
            PosterType::Pie => "pie",
            PosterType::Bar => "bar",
            PosterType::Dual => "dual",
        }
    }
}

impl fmt::Display for PosterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Choice for PosterType {
    const ALLOWED: &'static str = "pie, bar, dual";

    fn parse(value: &str) -> Option<Self> {
        match value {
            "pie" => Some(PosterType::Pie),
            "bar" => Some(PosterType::Bar),
            "dual" => Some(PosterType::Dual),
            _ => None,
        }
    }
}

impl FromStr for PosterType {
    type Err = PosterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <PosterType as Choice>::parse(s.trim())
            .ok_or_else(|| PosterError::UnknownPosterType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Choice for Orientation {
    const ALLOWED: &'static str = "horizontal, vertical";

    fn parse(value: &str) -> Option<Self> {
        match value {
            "horizontal" => Some(Orientation::Horizontal),
            "vertical" => Some(Orientation::Vertical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesType {
    Line,
    Area,
    Bar,
}

impl SeriesType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesType::Line => "line",
            SeriesType::Area => "area",
            SeriesType::Bar => "bar",
        }
    }
}

impl Choice for SeriesType {
    const ALLOWED: &'static str = "line, area, bar";

    fn parse(value: &str) -> Option<Self> {
        match value {
            "line" => Some(SeriesType::Line),
            "area" => Some(SeriesType::Area),
            "bar" => Some(SeriesType::Bar),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Left,
    Right,
}

impl Axis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Left => "left",
            Axis::Right => "right",
        }
    }
}

impl Choice for Axis {
    const ALLOWED: &'static str = "left, right";

    fn parse(value: &str) -> Option<Self> {
        match value {
            "left" => Some(Axis::Left),
            "right" => Some(Axis::Right),
            _ => None,
        }
    }
}

/// Window of the dual chart's x axis, applied by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeRange {
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
    #[serde(rename = "180d")]
    HalfYear,
    #[serde(rename = "1y")]
    Year,
    #[serde(rename = "all")]
    All,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Week => "7d",
            TimeRange::Month => "30d",
            TimeRange::Quarter => "90d",
            TimeRange::HalfYear => "180d",
            TimeRange::Year => "1y",
            TimeRange::All => "all",
        }
    }

    /// Number of days kept, `None` for the whole series.
    pub fn window_days(&self) -> Option<i64> {
        match self {
            TimeRange::Week => Some(7),
            TimeRange::Month => Some(30),
            TimeRange::Quarter => Some(90),
            TimeRange::HalfYear => Some(180),
            TimeRange::Year => Some(365),
            TimeRange::All => None,
        }
    }
}

impl Choice for TimeRange {
    const ALLOWED: &'static str = "7d, 30d, 90d, 180d, 1y, all";

    fn parse(value: &str) -> Option<Self> {
        match value {
            "7d" => Some(TimeRange::Week),
            "30d" => Some(TimeRange::Month),
            "90d" => Some(TimeRange::Quarter),
            "180d" => Some(TimeRange::HalfYear),
            "1y" => Some(TimeRange::Year),
            "all" => Some(TimeRange::All),
            _ => None,
        }
    }
}

/// Fields shared by every poster variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PosterCommon {
    pub title: String,
    pub subtitle: String,
    pub note_value: String,
    pub template_name: String,
    pub date_str: Option<String>,
    pub center_image: Option<String>,
}

impl PosterCommon {
    fn read(fields: &Fields<'_>) -> FieldResult<Self> {
        Ok(Self {
            title: fields.required_str("title")?,
            subtitle: fields.str_or("subtitle", "")?,
            note_value: fields.str_or("note_value", "")?,
            template_name: fields.str_or("template_name", DEFAULT_TEMPLATE_NAME)?,
            date_str: fields.opt_str("date_str")?,
            center_image: fields.opt_str("center_image")?,
        })
    }

    fn check(self, fields: &Fields<'_>) -> FieldResult<Self> {
        Ok(Self {
            title: fields.non_blank("title", self.title)?,
            ..self
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieConfig {
    #[serde(flatten)]
    pub common: PosterCommon,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub colors_hex: Option<Vec<String>>,
}

impl PieConfig {
    fn read(fields: &Fields<'_>) -> FieldResult<Self> {
        let common = PosterCommon::read(fields)?;
        let labels = fields.str_seq("labels")?;
        let values = fields.num_seq("values")?;
        let colors_hex = fields.opt_str_seq("colors_hex")?;

        let common = common.check(fields)?;
        non_empty(fields, "values", &values)?;

        same_length(fields, "labels", labels.len(), "values", values.len())?;

        Ok(Self {
            common,
            labels,
            values,
            colors_hex,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarConfig {
    #[serde(flatten)]
    pub common: PosterCommon,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub colors_hex: Option<Vec<String>>,
    pub orientation: Orientation,
    pub value_axis_label: String,
    pub label_images: Option<Vec<Option<String>>>,
}

impl BarConfig {
    fn read(fields: &Fields<'_>) -> FieldResult<Self> {
        let common = PosterCommon::read(fields)?;
        let labels = fields.str_seq("labels")?;
        let values = fields.num_seq("values")?;
        let colors_hex = fields.opt_str_seq("colors_hex")?;
        let orientation = fields.opt_str("orientation")?;
        let value_axis_label = fields.str_or("value_axis_label", DEFAULT_VALUE_AXIS_LABEL)?;
        let label_images = fields.opt_nullable_str_seq("label_images")?;

        let common = common.check(fields)?;
        let orientation = fields.choice("orientation", orientation, Orientation::Horizontal)?;
        non_empty(fields, "values", &values)?;

        same_length(fields, "labels", labels.len(), "values", values.len())?;

        let label_images = label_images.map(|images| fit_label_images(images, labels.len()));

        Ok(Self {
            common,
            labels,
            values,
            colors_hex,
            orientation,
            value_axis_label,
            label_images,
        })
    }
}

/// Pads with absent entries or truncates so there is exactly one image slot
/// per label. Entries past `len` are dropped.
pub fn fit_label_images(mut images: Vec<Option<String>>, len: usize) -> Vec<Option<String>> {
    images.resize(len, None);
    images
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighlightRegion {
    pub start: String,
    pub end: String,
    pub label: Option<String>,
}

impl HighlightRegion {
    fn read(fields: Fields<'_>) -> FieldResult<Self> {
        Ok(Self {
            start: fields.required_str("start")?,
            end: fields.required_str("end")?,
            label: fields.opt_str("label")?,
        })
    }
}

/// A y-series referenced by its key in `y_series` or by position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SeriesRef {
    Index(u64),
    Key(String),
}

impl Default for SeriesRef {
    fn default() -> Self {
        SeriesRef::Index(0)
    }
}

impl SeriesRef {
    pub fn to_json(&self) -> JsonValue {
        match self {
            SeriesRef::Index(i) => JsonValue::from(*i),
            SeriesRef::Key(k) => JsonValue::from(k.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighlightPoint {
    pub x: String,
    pub series: SeriesRef,
    pub axis: Axis,
    pub label: Option<String>,
}

/// A highlight point whose `axis` has been read but not yet checked.
struct PointDraft {
    x: String,
    series: SeriesRef,
    axis: Option<String>,
    axis_field: String,
    label: Option<String>,
}

impl HighlightPoint {
    fn read(fields: Fields<'_>) -> FieldResult<PointDraft> {
        let series = match fields.raw("series") {
            None => SeriesRef::default(),
            Some(JsonValue::String(key)) => SeriesRef::Key(key.clone()),
            Some(value) => value.as_u64().map(SeriesRef::Index).ok_or_else(|| {
                ValidationError::new(
                    fields.path("series"),
                    Rule::TypeMismatch {
                        expected: "series key or non-negative index",
                    },
                )
            })?,
        };
        Ok(PointDraft {
            x: fields.required_str("x")?,
            series,
            axis: fields.opt_str("axis")?,
            axis_field: fields.path("axis"),
            label: fields.opt_str("label")?,
        })
    }

    fn check(draft: PointDraft) -> FieldResult<Self> {
        Ok(Self {
            x: draft.x,
            series: draft.series,
            axis: parse_choice(draft.axis_field, draft.axis, Axis::Left)?,
            label: draft.label,
        })
    }
}

/// Named y-series in input order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct YSeries(pub Vec<(String, Vec<f64>)>);

impl YSeries {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for YSeries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, values) in &self.0 {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DualConfig {
    #[serde(flatten)]
    pub common: PosterCommon,
    pub x_values: Vec<String>,
    pub y_series: YSeries,
    pub colors_hex: Option<Vec<String>>,

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

    pub highlight_regions: Option<Vec<HighlightRegion>>,
    pub highlight_points: Option<Vec<HighlightPoint>>,

    #[serde(rename = "timeRange")]
    pub time_range: TimeRange,
}

impl DualConfig {
    fn read(fields: &Fields<'_>) -> FieldResult<Self> {
        let common = PosterCommon::read(fields)?;
        let x_values = fields.str_seq("x_values")?;
        let y_series = YSeries(fields.num_seq_map("y_series")?);
        let colors_hex = fields.opt_str_seq("colors_hex")?;

        let ylabel_left = fields.required_str("ylabel_left")?;
        let log_left = fields.bool_or("log_left", false)?;
        let include_zero_left = fields.bool_or("include_zero_left", true)?;
        let left_series_type = fields.opt_str("left_series_type")?;

        let right_series = fields.opt_num_seq("right_series")?;
        let right_color_hex = fields.str_or("right_color_hex", DEFAULT_RIGHT_COLOR_HEX)?;
        let ylabel_right = fields.str_or("ylabel_right", "")?;
        let right_series_type = fields.opt_str("right_series_type")?;
        let log_right = fields.bool_or("log_right", false)?;
        let include_zero_right = fields.bool_or("include_zero_right", true)?;

        let highlight_regions = fields.opt_records("highlight_regions", HighlightRegion::read)?;
        let highlight_points = fields.opt_records("highlight_points", HighlightPoint::read)?;

        let time_range_key = if fields.has("time_range") {
            "time_range"
        } else {
            "timeRange"
        };
        let time_range = fields.opt_str(time_range_key)?;

        let common = common.check(fields)?;
        let left_series_type = fields.choice("left_series_type", left_series_type, SeriesType::Line)?;
        let right_series_type =
            fields.choice("right_series_type", right_series_type, SeriesType::Line)?;
        let time_range = fields.choice(time_range_key, time_range, TimeRange::All)?;
        let highlight_points = highlight_points
            .map(|points| {
                points
                    .into_iter()
                    .map(HighlightPoint::check)
                    .collect::<FieldResult<Vec<_>>>()
            })
            .transpose()?;
        if y_series.is_empty() {
            return Err(ValidationError::new(fields.path("y_series"), Rule::Empty));
        }

        let (first_name, first) = &y_series.0[0];
        let len = first.len();
        for (name, values) in y_series.iter().skip(1) {
            if values.len() != len {
                return Err(ValidationError::new(
                    format!("{}.{}", fields.path("y_series"), name),
                    Rule::LengthMismatch {
                        found: values.len(),
                        expected: len,
                        against: format!("y_series.{}", first_name),
                    },
                ));
            }
        }

        same_length(fields, "x_values", x_values.len(), "y_series", len)?;
        if let Some(right) = &right_series {
            same_length(fields, "right_series", right.len(), "y_series", len)?;
        }

        Ok(Self {
            common,
            x_values,
            y_series,
            colors_hex,
            ylabel_left,
            log_left,
            include_zero_left,
            left_series_type,
            right_series,
            right_color_hex,
            ylabel_right,
            right_series_type,
            log_right,
            include_zero_right,
            highlight_regions,
            highlight_points,
            time_range,
        })
    }
}

/// A validated, normalized poster configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "poster_type", rename_all = "lowercase")]
pub enum PosterConfig {
    Pie(PieConfig),
    Bar(BarConfig),
    Dual(DualConfig),
}

impl PosterConfig {
    /// Validates raw client input into a poster configuration.
    pub fn from_value(raw: &JsonValue) -> Result<Self, ValidationError> {
        let fields = Fields::root(raw)?;

        let tag = match fields.raw("poster_type") {
            None => return Err(ValidationError::new("poster_type", Rule::MissingTag)),
            Some(JsonValue::String(tag)) => tag.as_str(),
            Some(_) => {
                return Err(ValidationError::new(
                    "poster_type",
                    Rule::TypeMismatch { expected: "string" },
                ));
            }
        };
        let poster_type = <PosterType as Choice>::parse(tag)
            .ok_or_else(|| ValidationError::new("poster_type", Rule::UnknownTag(tag.to_string())))?;

        match poster_type {
            PosterType::Pie => PieConfig::read(&fields).map(PosterConfig::Pie),
            PosterType::Bar => BarConfig::read(&fields).map(PosterConfig::Bar),
            PosterType::Dual => DualConfig::read(&fields).map(PosterConfig::Dual),
        }
    }

    pub fn poster_type(&self) -> PosterType {
        match self {
            PosterConfig::Pie(_) => PosterType::Pie,
            PosterConfig::Bar(_) => PosterType::Bar,
            PosterConfig::Dual(_) => PosterType::Dual,
        }
    }

    pub fn common(&self) -> &PosterCommon {
        match self {
            PosterConfig::Pie(c) => &c.common,
            PosterConfig::Bar(c) => &c.common,
            PosterConfig::Dual(c) => &c.common,
        }
    }

    /// Uploaded label images referenced by the config, if any.
    pub fn label_images(&self) -> Option<&[Option<String>]> {
        match self {
            PosterConfig::Bar(c) => c.label_images.as_deref(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

impl TryFrom<&JsonValue> for PosterConfig {
    type Error = ValidationError;

    fn try_from(raw: &JsonValue) -> Result<Self, Self::Error> {
        PosterConfig::from_value(raw)
    }
}

fn non_empty<T>(fields: &Fields<'_>, key: &str, items: &[T]) -> FieldResult<()> {
    if items.is_empty() {
        return Err(ValidationError::new(fields.path(key), Rule::Empty));
    }
    Ok(())
}

fn same_length(
    fields: &Fields<'_>,
    key: &str,
    found: usize,
    against: &str,
    expected: usize,
) -> FieldResult<()> {
    if found != expected {
        return Err(ValidationError::new(
            fields.path(key),
            Rule::LengthMismatch {
                found,
                expected,
                against: against.to_string(),
            },
        ));
    }
    Ok(())
}
