use std::borrow::Cow;
use std::collections::BTreeMap;

use poem_openapi::{
    ApiResponse, Multipart, Object, Union,
    payload::Json,
    registry::{MetaSchemaRef, Registry},
    types::{ParseFromJSON, ParseResult, ToJSON, Type, multipart::Upload},
};
use serde_json::Value as JsonValue;

use super::common::{BadRequestResponse, InternalServerErrorResponse, UnprocessableEntityResponse};

#[derive(Object, Debug)]
pub struct PosterCommonFields {
    /// Poster title, must not be blank
    pub title: String,
    pub subtitle: Option<String>,
    pub note_value: Option<String>,

    /// Background template key, default "main"
    pub template_name: Option<String>,

    /// Footer date override
    pub date_str: Option<String>,

    /// Path returned by the center image upload
    pub center_image: Option<String>,
}

#[derive(Object, Debug)]
pub struct PieRequest {
    #[oai(flatten)]
    pub common: PosterCommonFields,
    pub labels: Vec<String>,

    /// Same length as `labels`, not empty
    pub values: Vec<f64>,
    pub colors_hex: Option<Vec<String>>,
}

#[derive(Object, Debug)]
pub struct BarRequest {
    #[oai(flatten)]
    pub common: PosterCommonFields,
    pub labels: Vec<String>,

    /// Same length as `labels`, not empty
    pub values: Vec<f64>,
    pub colors_hex: Option<Vec<String>>,

    /// `horizontal` (default) or `vertical`
    pub orientation: Option<String>,

    /// Default "Volume (USD)"
    pub value_axis_label: Option<String>,

    /// Paths returned by the label image upload, one slot per label. Padded
    /// with nulls or cut to the number of labels.
    pub label_images: Option<Vec<Option<String>>>,
}

#[derive(Object, Debug)]
pub struct HighlightRegionRequest {
    pub start: String,
    pub end: String,
    pub label: Option<String>,
}

#[derive(Object, Debug)]
pub struct HighlightPointRequest {
    pub x: String,

    /// `y_series` key or index, default 0
    pub series: Option<JsonValue>,

    /// `left` (default) or `right`
    pub axis: Option<String>,
    pub label: Option<String>,
}

#[derive(Object, Debug)]
pub struct DualRequest {
    #[oai(flatten)]
    pub common: PosterCommonFields,

    /// Dates (`YYYY-MM-DD`) or numeric strings
    pub x_values: Vec<String>,

    /// Series name to values. Every series has the length of `x_values`.
    pub y_series: BTreeMap<String, Vec<f64>>,
    pub colors_hex: Option<Vec<String>>,

    pub ylabel_left: String,
    pub log_left: Option<bool>,
    pub include_zero_left: Option<bool>,

    /// `line` (default), `area` or `bar`
    pub left_series_type: Option<String>,

    /// Same length as `x_values`
    pub right_series: Option<Vec<f64>>,
    pub right_color_hex: Option<String>,
    pub ylabel_right: Option<String>,
    pub right_series_type: Option<String>,
    pub log_right: Option<bool>,
    pub include_zero_right: Option<bool>,

    pub highlight_regions: Option<Vec<HighlightRegionRequest>>,
    pub highlight_points: Option<Vec<HighlightPointRequest>>,

    /// `7d`, `30d`, `90d`, `180d`, `1y` or `all` (default)
    #[oai(rename = "timeRange")]
    pub time_range: Option<String>,
}

/// Poster configuration, selected by `poster_type`.
#[derive(Union, Debug)]
#[oai(discriminator_name = "poster_type")]
pub enum PosterRequest {
    #[oai(mapping = "pie")]
    Pie(PieRequest),

    #[oai(mapping = "bar")]
    Bar(BarRequest),

    #[oai(mapping = "dual")]
    Dual(DualRequest),
}

/// Render body as received. Published as [`PosterRequest`] in the API
/// document but kept raw so validation can name the exact field that failed.
#[derive(Debug, Clone)]
pub struct RenderPosterRequest(pub JsonValue);

impl Type for RenderPosterRequest {
    const IS_REQUIRED: bool = true;

    type RawValueType = JsonValue;

    type RawElementValueType = JsonValue;

    fn name() -> Cow<'static, str> {
        PosterRequest::name()
    }

    fn schema_ref() -> MetaSchemaRef {
        PosterRequest::schema_ref()
    }

    fn register(registry: &mut Registry) {
        PosterRequest::register(registry);
    }

    fn as_raw_value(&self) -> Option<&Self::RawValueType> {
        Some(&self.0)
    }

    fn raw_element_iter<'a>(
        &'a self,
    ) -> Box<dyn Iterator<Item = &'a Self::RawElementValueType> + 'a> {
        Box::new(self.as_raw_value().into_iter())
    }
}

impl ParseFromJSON for RenderPosterRequest {
    fn parse_from_json(value: Option<JsonValue>) -> ParseResult<Self> {
        Ok(Self(value.unwrap_or_default()))
    }
}

impl ToJSON for RenderPosterRequest {
    fn to_json(&self) -> Option<JsonValue> {
        Some(self.0.clone())
    }
}

#[derive(Object, Debug)]
pub struct CleanupSummary {
    pub center_deleted: bool,
    pub label_images_deleted: u64,
}

#[derive(Object, Debug)]
pub struct RenderPosterResponse {
    pub ok: bool,

    /// Base64 encoded PNG
    pub image_base64: String,

    /// The validated, normalized configuration that was rendered
    pub config_used: JsonValue,

    /// Present when uploads referenced by the config were cleaned up
    pub cleanup: Option<CleanupSummary>,
}

#[derive(Multipart)]
pub struct CenterImageUpload {
    pub file: Upload,
}

#[derive(Multipart)]
pub struct LabelImagesUpload {
    pub files: Vec<Upload>,
}

#[derive(Object, Debug)]
pub struct UploadPathResponse {
    pub path: String,
}

#[derive(Object, Debug)]
pub struct UploadPathsResponse {
    pub paths: Vec<String>,
}

#[derive(Object, Debug)]
pub struct CleanupRequest {
    pub center_image: Option<String>,
    pub label_images: Option<Vec<Option<String>>>,
}

#[derive(Object, Debug)]
pub struct CleanupResponse {
    pub ok: bool,
    pub center_deleted: bool,
    pub label_images_deleted: u64,
}

#[derive(Object, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub center_upload_root: String,
    pub label_upload_root: String,
}

#[derive(ApiResponse)]
pub enum DefaultPosterResponse {
    #[oai(status = 200)]
    Ok(Json<JsonValue>),

    #[oai(status = 400)]
    BadRequest(Json<BadRequestResponse>),
}

#[derive(ApiResponse)]
pub enum RenderResponse {
    #[oai(status = 200)]
    Ok(Json<RenderPosterResponse>),

    #[oai(status = 422)]
    UnprocessableEntity(Json<UnprocessableEntityResponse>),

    #[oai(status = 500)]
    InternalServerError(Json<InternalServerErrorResponse>),
}

#[derive(ApiResponse)]
pub enum UploadResponse {
    #[oai(status = 200)]
    Ok(Json<UploadPathResponse>),

    #[oai(status = 400)]
    BadRequest(Json<BadRequestResponse>),

    #[oai(status = 500)]
    InternalServerError(Json<InternalServerErrorResponse>),
}

#[derive(ApiResponse)]
pub enum UploadManyResponse {
    #[oai(status = 200)]
    Ok(Json<UploadPathsResponse>),

    #[oai(status = 400)]
    BadRequest(Json<BadRequestResponse>),

    #[oai(status = 500)]
    InternalServerError(Json<InternalServerErrorResponse>),
}
