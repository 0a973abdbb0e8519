use axum::extract::{Multipart, multipart::MultipartError};
use thiserror::Error;
use tracing::debug;

use tracelink_core::{
    ArchitectureModelType, InputArtifact, InputKind, JobError, Submission, TraceLinkType,
};

use crate::infra::errors::AppError;

const PROJECT_NAME_FIELD: &str = "projectName";
const MODEL_TYPE_FIELD: &str = "architectureModelType";

#[derive(Debug, Error)]
pub enum SubmissionFormError {
    #[error("projectName is required")]
    MissingProjectName,

    #[error("Field {0} was sent more than once")]
    DuplicateField(String),

    #[error("Field {field} is not valid UTF-8")]
    NotUtf8 { field: String },

    #[error(transparent)]
    Invalid(#[from] JobError),

    #[error(transparent)]
    Multipart(#[from] MultipartError),
}

impl From<SubmissionFormError> for AppError {
    fn from(err: SubmissionFormError) -> Self {
        match err {
            SubmissionFormError::Invalid(err) => err.into(),
            SubmissionFormError::Multipart(err) => err.into(),
            other => AppError::bad_request(other.to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct SubmissionForm {
    project_name: Option<String>,
    model_type: Option<ArchitectureModelType>,
    text: Option<InputArtifact>,
    model: Option<InputArtifact>,
    code: Option<InputArtifact>,
}

impl SubmissionForm {
    fn input_slot(&mut self, kind: InputKind) -> &mut Option<InputArtifact> {
        match kind {
            InputKind::Text => &mut self.text,
            InputKind::Model => &mut self.model,
            InputKind::Code => &mut self.code,
        }
    }

    fn into_submission(
        self,
        trace_link_type: TraceLinkType,
    ) -> Result<Submission, SubmissionFormError> {
        let project_name = self
            .project_name
            .ok_or(SubmissionFormError::MissingProjectName)?;

        let mut submission = Submission::new(project_name, trace_link_type);
        if let Some(model_type) = self.model_type {
            submission = submission.with_model_type(model_type);
        }
        if let Some(text) = self.text {
            submission = submission.with_text(text);
        }
        if let Some(model) = self.model {
            submission = submission.with_model(model);
        }
        if let Some(code) = self.code {
            submission = submission.with_code(code);
        }
        Ok(submission)
    }
}

fn input_kind_for(field: &str) -> Option<InputKind> {
    [InputKind::Text, InputKind::Model, InputKind::Code]
        .into_iter()
        .find(|kind| kind.field_name() == field)
}

fn text_value(field: &str, bytes: &[u8]) -> Result<String, SubmissionFormError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| SubmissionFormError::NotUtf8 {
            field: field.to_string(),
        })
}

/// Reads a `multipart/form-data` submission for `trace_link_type`.
///
/// Unknown fields are skipped. Missing or empty inputs are left for
/// [`Submission`] validation to report.
pub async fn read_submission(
    trace_link_type: TraceLinkType,
    mut multipart: Multipart,
) -> Result<Submission, SubmissionFormError> {
    let mut form = SubmissionForm::default();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;

        if name == PROJECT_NAME_FIELD {
            if form.project_name.is_some() {
                return Err(SubmissionFormError::DuplicateField(name));
            }
            form.project_name = Some(text_value(&name, &bytes)?);
        } else if name == MODEL_TYPE_FIELD {
            if form.model_type.is_some() {
                return Err(SubmissionFormError::DuplicateField(name));
            }
            form.model_type = Some(text_value(&name, &bytes)?.parse()?);
        } else if let Some(kind) = input_kind_for(&name) {
            let slot = form.input_slot(kind);
            if slot.is_some() {
                return Err(SubmissionFormError::DuplicateField(name));
            }
            *slot = Some(InputArtifact::new(file_name, bytes.to_vec()));
        } else {
            debug!(field = %name, "ignoring unknown multipart field");
        }
    }

    form.into_submission(trace_link_type)
}
