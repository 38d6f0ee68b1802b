use poem_openapi::Object;

use crate::core::error::ValidationError;

#[derive(Object, Debug)]
pub struct BadRequestResponse {
    pub detail: String,
}

impl BadRequestResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

#[derive(Object, Debug, Clone)]
pub struct ValidateItem {
    pub loc: Vec<String>,
    pub msg: String,
}

#[derive(Object, Debug, Clone)]
pub struct UnprocessableEntityResponse {
    pub detail: Vec<ValidateItem>,
}

impl Default for UnprocessableEntityResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl UnprocessableEntityResponse {
    pub fn new() -> Self {
        Self { detail: vec![] }
    }

    pub fn is_has_error(&self) -> bool {
        !self.detail.is_empty()
    }

    pub fn add_error(&mut self, loc: Vec<String>, msg: String) {
        self.detail.push(ValidateItem { loc, msg });
    }
}

impl From<&ValidationError> for UnprocessableEntityResponse {
    fn from(err: &ValidationError) -> Self {
        let mut resp = Self::new();
        resp.add_error(
            vec!["body".to_string(), err.field.clone()],
            err.rule.to_string(),
        );
        resp
    }
}

#[derive(Object, Debug)]
pub struct InternalServerErrorResponse {
    pub detail: String,
}

impl InternalServerErrorResponse {
    pub fn new(filepath: &str, function: &str, identifier: &str, err: &str) -> Self {
        let msg = format!(
            "error: on {}::{} iden: {} error: {}",
            filepath, function, identifier, err
        );
        tracing::error!("{}", msg);
        Self {
            detail: msg.to_string(),
        }
    }
}
