//! Trace-link recovery variants and the submissions that target them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{JobError, Result};
use crate::fingerprint::{Fingerprint, FingerprintGenerator};
use crate::pipeline::PipelineJob;

/// The kind of trace links a pipeline run recovers.
///
/// Each variant consumes a fixed subset of the uploaded artifacts, in a
/// fixed order. That order is what gets fingerprinted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceLinkType {
    /// Documentation to architecture model
    SadSam,
    /// Documentation to code
    SadCode,
    /// Architecture model to code
    SamCode,
    /// Documentation to code, via the architecture model
    SadSamCode,
}

/// One uploaded artifact slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Text,
    Model,
    Code,
}

impl InputKind {
    /// Multipart field name the artifact is uploaded under.
    pub fn field_name(&self) -> &'static str {
        match self {
            InputKind::Text => "inputText",
            InputKind::Model => "inputArchitectureModel",
            InputKind::Code => "inputCode",
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputKind::Text => "text",
            InputKind::Model => "model",
            InputKind::Code => "code",
        })
    }
}

impl TraceLinkType {
    pub const ALL: [TraceLinkType; 4] = [
        TraceLinkType::SadSam,
        TraceLinkType::SadCode,
        TraceLinkType::SamCode,
        TraceLinkType::SadSamCode,
    ];

    /// URL slug, also used as the variant tag when fingerprinting.
    pub fn slug(&self) -> &'static str {
        match self {
            TraceLinkType::SadSam => "sad-sam",
            TraceLinkType::SadCode => "sad-code",
            TraceLinkType::SamCode => "sam-code",
            TraceLinkType::SadSamCode => "sad-sam-code",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.slug() == slug)
    }

    /// Required inputs in canonical order.
    pub fn required_inputs(&self) -> &'static [InputKind] {
        match self {
            TraceLinkType::SadSam => &[InputKind::Text, InputKind::Model],
            TraceLinkType::SadCode => &[InputKind::Text, InputKind::Code],
            TraceLinkType::SamCode => &[InputKind::Model, InputKind::Code],
            TraceLinkType::SadSamCode => &[InputKind::Text, InputKind::Model, InputKind::Code],
        }
    }

    pub fn uses_model(&self) -> bool {
        self.required_inputs().contains(&InputKind::Model)
    }
}

impl fmt::Display for TraceLinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for TraceLinkType {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_slug(s)
            .ok_or_else(|| JobError::InvalidSubmission(format!("Unknown trace link type: {s}")))
    }
}

/// Format of an uploaded architecture model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArchitectureModelType {
    Pcm,
    Uml,
}

impl ArchitectureModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchitectureModelType::Pcm => "PCM",
            ArchitectureModelType::Uml => "UML",
        }
    }
}

impl fmt::Display for ArchitectureModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchitectureModelType {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PCM" => Ok(ArchitectureModelType::Pcm),
            "UML" => Ok(ArchitectureModelType::Uml),
            _ => Err(JobError::InvalidSubmission(format!(
                "Invalid architecture model type: {s}"
            ))),
        }
    }
}

/// A trace-link type together with the model format it was run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineVariant {
    pub trace_link_type: TraceLinkType,
    pub model_type: Option<ArchitectureModelType>,
}

impl PipelineVariant {
    pub fn new(trace_link_type: TraceLinkType, model_type: Option<ArchitectureModelType>) -> Self {
        Self {
            trace_link_type,
            model_type,
        }
    }

    /// Stable tag such as `sad-sam-code+pcm` or `sad-code`.
    pub fn tag(&self) -> String {
        match self.model_type {
            Some(model) => format!(
                "{}+{}",
                self.trace_link_type.slug(),
                model.as_str().to_ascii_lowercase()
            ),
            None => self.trace_link_type.slug().to_string(),
        }
    }
}

impl fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

/// An uploaded artifact. The file name is kept for the pipeline's benefit
/// only; identity is derived from the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct InputArtifact {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl InputArtifact {
    pub fn new(file_name: Option<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name,
            bytes: bytes.into(),
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(None, bytes)
    }
}

impl fmt::Debug for InputArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputArtifact")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A request to run a pipeline, as received from a client.
#[derive(Debug, Clone)]
pub struct Submission {
    pub project_name: String,
    pub trace_link_type: TraceLinkType,
    pub model_type: Option<ArchitectureModelType>,
    pub text: Option<InputArtifact>,
    pub model: Option<InputArtifact>,
    pub code: Option<InputArtifact>,
}

impl Submission {
    pub fn new(project_name: impl Into<String>, trace_link_type: TraceLinkType) -> Self {
        Self {
            project_name: project_name.into(),
            trace_link_type,
            model_type: None,
            text: None,
            model: None,
            code: None,
        }
    }

    pub fn with_model_type(mut self, model_type: ArchitectureModelType) -> Self {
        self.model_type = Some(model_type);
        self
    }

    pub fn with_text(mut self, artifact: InputArtifact) -> Self {
        self.text = Some(artifact);
        self
    }

    pub fn with_model(mut self, artifact: InputArtifact) -> Self {
        self.model = Some(artifact);
        self
    }

    pub fn with_code(mut self, artifact: InputArtifact) -> Self {
        self.code = Some(artifact);
        self
    }

    fn input(&self, kind: InputKind) -> Option<&InputArtifact> {
        match kind {
            InputKind::Text => self.text.as_ref(),
            InputKind::Model => self.model.as_ref(),
            InputKind::Code => self.code.as_ref(),
        }
    }

    /// Resolves the pipeline variant, rejecting a missing model type when
    /// the trace-link type needs one. A model type supplied to a variant
    /// without a model is dropped.
    pub fn pipeline_variant(&self) -> Result<PipelineVariant> {
        if self.trace_link_type.uses_model() {
            let model_type = self.model_type.ok_or_else(|| {
                JobError::InvalidSubmission(format!(
                    "architectureModelType is required for {}",
                    self.trace_link_type
                ))
            })?;
            Ok(PipelineVariant::new(self.trace_link_type, Some(model_type)))
        } else {
            Ok(PipelineVariant::new(self.trace_link_type, None))
        }
    }

    /// Required inputs in canonical order, or `InvalidSubmission` naming the
    /// first missing or empty one.
    pub fn canonical_inputs(&self) -> Result<Vec<(InputKind, &InputArtifact)>> {
        self.trace_link_type
            .required_inputs()
            .iter()
            .map(|kind| match self.input(*kind) {
                Some(artifact) if !artifact.bytes.is_empty() => Ok((*kind, artifact)),
                Some(_) => Err(JobError::InvalidSubmission(format!(
                    "{} must not be empty",
                    kind.field_name()
                ))),
                None => Err(JobError::InvalidSubmission(format!(
                    "{} is required for {}",
                    kind.field_name(),
                    self.trace_link_type
                ))),
            })
            .collect()
    }

    fn validated_project_name(&self) -> Result<&str> {
        let name = self.project_name.trim();
        if name.is_empty() {
            return Err(JobError::InvalidSubmission(
                "projectName must not be blank".to_string(),
            ));
        }
        Ok(name)
    }

    pub fn fingerprint(&self) -> Result<Fingerprint> {
        let project_name = self.validated_project_name()?;
        let variant = self.pipeline_variant()?;
        let inputs = self.canonical_inputs()?;
        let payloads: Vec<&[u8]> = inputs.iter().map(|(_, a)| a.bytes.as_slice()).collect();
        Ok(FingerprintGenerator::compute(project_name, &variant, &payloads))
    }

    /// Validates the submission and turns it into the unit of work handed to
    /// a pipeline runner.
    pub fn into_job(self) -> Result<PipelineJob> {
        let fingerprint = self.fingerprint()?;
        let variant = self.pipeline_variant()?;
        let project_name = self.validated_project_name()?.to_string();
        let kinds: Vec<InputKind> = self.canonical_inputs()?.into_iter().map(|(k, _)| k).collect();

        let Submission {
            mut text,
            mut model,
            mut code,
            ..
        } = self;

        let mut inputs = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let slot = match kind {
                InputKind::Text => text.take(),
                InputKind::Model => model.take(),
                InputKind::Code => code.take(),
            };
            let artifact = slot.ok_or_else(|| {
                JobError::Internal(format!("{kind} input vanished during validation"))
            })?;
            inputs.push((kind, artifact));
        }

        Ok(PipelineJob {
            fingerprint,
            project_name,
            variant,
            inputs,
        })
    }
}
