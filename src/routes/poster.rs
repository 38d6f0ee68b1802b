use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose};
use poem::web::Data;
use poem_openapi::{OpenApi, Tags, param::Query, payload::Json};

use crate::{
    AppState,
    core::{
        defaults::default_config,
        error::{PosterError, UploadError},
        poster::{PosterConfig, PosterType},
        uploads::AssetKind,
    },
    schemas::{
        common::{BadRequestResponse, InternalServerErrorResponse},
        poster::{
            CenterImageUpload, CleanupRequest, CleanupResponse, CleanupSummary,
            DefaultPosterResponse, HealthResponse, LabelImagesUpload, RenderPosterRequest,
            RenderPosterResponse,
            RenderResponse, UploadManyResponse, UploadPathResponse, UploadPathsResponse,
            UploadResponse,
        },
    },
};

#[derive(Tags)]
enum ApiPosterTags {
    Poster,
    Upload,
}

pub struct ApiPoster;

#[OpenApi()]
impl ApiPoster {
    /// Default Config
    ///
    /// Ready-to-render example configuration for one of `pie`, `bar`, `dual`.
    #[oai(path = "/poster/default", method = "get", tag = "ApiPosterTags::Poster")]
    async fn default_poster(&self, poster_type: Query<String>) -> DefaultPosterResponse {
        match poster_type.0.parse::<PosterType>() {
            Ok(poster_type) => DefaultPosterResponse::Ok(Json(default_config(poster_type).to_json())),
            Err(e) => DefaultPosterResponse::BadRequest(Json(BadRequestResponse::new(e.to_string()))),
        }
    }

    /// Render
    ///
    /// Validate a poster configuration, render it and return the PNG as
    /// base64. Uploaded images the config references are deleted afterwards
    /// unless `cleanup=false`.
    ///
    /// # Example Request
    /// ```json
    /// {
    ///   "poster_type": "pie",
    ///   "title": "DEX Volume Share",
    ///   "labels": ["Jupiter", "Raydium", "Orca"],
    ///   "values": [50, 30, 20]
    /// }
    /// ```
    #[oai(path = "/poster/render", method = "post", tag = "ApiPosterTags::Poster")]
    async fn render(
        &self,
        Json(body): Json<RenderPosterRequest>,
        cleanup: Query<Option<bool>>,
        state: Data<&Arc<AppState>>,
    ) -> RenderResponse {
        let config = match PosterConfig::from_value(&body.0) {
            Ok(config) => config,
            Err(e) => {
                tracing::info!(event = "poster_validation_failed", field = %e.field, rule = %e.rule);
                return RenderResponse::UnprocessableEntity(Json((&e).into()));
            }
        };

        tracing::info!(
            "Rendering: poster_type={}, title={}",
            config.poster_type(),
            config.common().title
        );

        let config_used = config.to_json();
        let cleanup = cleanup.0.unwrap_or(state.cleanup_after_render);

        let outcome = match state.dispatcher.render(config, cleanup).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Render error: {}", e);
                return RenderResponse::InternalServerError(Json(InternalServerErrorResponse::new(
                    "route.poster",
                    "render",
                    "Rendering failed",
                    &e.to_string(),
                )));
            }
        };

        let image = match tokio::fs::read(&outcome.path).await {
            Ok(image) => image,
            Err(e) => {
                let err = PosterError::MissingOutput(outcome.path.clone());
                return RenderResponse::InternalServerError(Json(InternalServerErrorResponse::new(
                    "route.poster",
                    "render",
                    &err.to_string(),
                    &e.to_string(),
                )));
            }
        };

        tracing::info!("Render completed successfully, size: {} bytes", image.len());

        RenderResponse::Ok(Json(RenderPosterResponse {
            ok: true,
            image_base64: general_purpose::STANDARD.encode(&image),
            config_used,
            cleanup: outcome.cleanup.map(|report| CleanupSummary {
                center_deleted: report.center_deleted,
                label_images_deleted: report.label_images_deleted as u64,
            }),
        }))
    }

    /// Upload Center Image
    ///
    /// Store one image and return the absolute path to put in `center_image`.
    #[oai(path = "/poster/upload/center-image", method = "post", tag = "ApiPosterTags::Upload")]
    async fn upload_center_image(
        &self,
        upload: CenterImageUpload,
        state: Data<&Arc<AppState>>,
    ) -> UploadResponse {
        let name = upload.file.file_name().map(str::to_string);
        let bytes = match upload.file.into_vec().await {
            Ok(bytes) => bytes,
            Err(e) => {
                return UploadResponse::BadRequest(Json(BadRequestResponse::new(format!(
                    "could not read upload: {}",
                    e
                ))));
            }
        };

        match state
            .uploads
            .ingest(AssetKind::Center, &bytes, name.as_deref())
            .await
        {
            Ok(path) => UploadResponse::Ok(Json(UploadPathResponse {
                path: path.display().to_string(),
            })),
            Err(e) => UploadResponse::InternalServerError(Json(InternalServerErrorResponse::new(
                "route.poster",
                "upload_center_image",
                "Upload failed",
                &e.to_string(),
            ))),
        }
    }

    /// Upload Label Images
    ///
    /// Store several images at once. Paths come back in upload order; parts
    /// without a file name are skipped.
    #[oai(path = "/poster/upload/label-images", method = "post", tag = "ApiPosterTags::Upload")]
    async fn upload_label_images(
        &self,
        upload: LabelImagesUpload,
        state: Data<&Arc<AppState>>,
    ) -> UploadManyResponse {
        let mut files = Vec::with_capacity(upload.files.len());
        for file in upload.files {
            let name = file.file_name().map(str::to_string);
            match file.into_vec().await {
                Ok(bytes) => files.push((name, bytes)),
                Err(e) => {
                    return UploadManyResponse::BadRequest(Json(BadRequestResponse::new(format!(
                        "could not read upload: {}",
                        e
                    ))));
                }
            }
        }

        match state.uploads.ingest_label_batch(files).await {
            Ok(paths) => UploadManyResponse::Ok(Json(UploadPathsResponse {
                paths: paths.iter().map(|p| p.display().to_string()).collect(),
            })),
            Err(UploadError::NoFiles) => UploadManyResponse::BadRequest(Json(BadRequestResponse::new(
                UploadError::NoFiles.to_string(),
            ))),
            Err(e) => UploadManyResponse::InternalServerError(Json(InternalServerErrorResponse::new(
                "route.poster",
                "upload_label_images",
                "Upload failed",
                &e.to_string(),
            ))),
        }
    }

    /// Cleanup Uploads
    ///
    /// Delete uploaded images that a client no longer needs. Paths outside
    /// the upload roots are ignored.
    #[oai(path = "/poster/cleanup", method = "post", tag = "ApiPosterTags::Upload")]
    async fn cleanup(
        &self,
        Json(json): Json<CleanupRequest>,
        state: Data<&Arc<AppState>>,
    ) -> Json<CleanupResponse> {
        let uploads = state.uploads.clone();
        let report = tokio::task::spawn_blocking(move || {
            uploads.cleanup_uploads(json.center_image.as_deref(), json.label_images.as_deref())
        })
        .await;

        match report {
            Ok(report) => Json(CleanupResponse {
                ok: true,
                center_deleted: report.center_deleted,
                label_images_deleted: report.label_images_deleted as u64,
            }),
            Err(e) => {
                tracing::warn!(event = "upload_cleanup_failed", error = %e);
                Json(CleanupResponse {
                    ok: false,
                    center_deleted: false,
                    label_images_deleted: 0,
                })
            }
        }
    }

    #[oai(path = "/health", method = "get")]
    async fn health(&self, state: Data<&Arc<AppState>>) -> Json<HealthResponse> {
        Json(HealthResponse {
            status: "healthy".to_string(),
            center_upload_root: state.uploads.root(AssetKind::Center).display().to_string(),
            label_upload_root: state.uploads.root(AssetKind::Label).display().to_string(),
        })
    }
}
