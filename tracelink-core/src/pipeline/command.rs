use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::{PipelineJob, PipelineRunner};
use crate::error::AnalysisFailure;
use crate::job::TraceLinkPayload;
use crate::variant::InputKind;

const STDERR_EXCERPT_BYTES: usize = 2048;
const MAX_FILE_NAME_LEN: usize = 100;
/// Read when the program prints nothing on stdout.
const OUTPUT_FILE_NAME: &str = "trace-links.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRunnerConfig {
    pub program: PathBuf,
    /// Argument template. Supported placeholders: `{project}`, `{variant}`,
    /// `{model_type}`, `{text}`, `{model}`, `{code}`, `{output_dir}`.
    pub args: Vec<String>,
    /// Parent for per-run scratch directories. Defaults to the system temp dir.
    pub work_dir: Option<PathBuf>,
}

/// Runs an external executable per job. Inputs are materialized into a
/// scratch directory that is removed when the run ends.
#[derive(Debug, Clone)]
pub struct CommandPipelineRunner {
    config: CommandRunnerConfig,
}

impl CommandPipelineRunner {
    pub fn new(config: CommandRunnerConfig) -> Self {
        Self { config }
    }

    fn scratch_dir(&self) -> io::Result<TempDir> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("tracelink-");
            builder
        };
        match &self.config.work_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
    }

    fn expand_args(&self, job: &PipelineJob, paths: &InputPaths, output_dir: &Path) -> Vec<String> {
        let model_type = job
            .variant
            .model_type
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{project}", &job.project_name)
                    .replace("{variant}", job.variant.trace_link_type.slug())
                    .replace("{model_type}", &model_type)
                    .replace("{text}", &display_opt(paths.text.as_deref()))
                    .replace("{model}", &display_opt(paths.model.as_deref()))
                    .replace("{code}", &display_opt(paths.code.as_deref()))
                    .replace("{output_dir}", &output_dir.display().to_string())
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct InputPaths {
    text: Option<PathBuf>,
    model: Option<PathBuf>,
    code: Option<PathBuf>,
}

fn display_opt(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string()).unwrap_or_default()
}

impl PipelineRunner for CommandPipelineRunner {
    fn run(&self, job: &PipelineJob) -> Result<TraceLinkPayload, AnalysisFailure> {
        let scratch = self
            .scratch_dir()
            .map_err(|e| AnalysisFailure::new(format!("Failed to create scratch directory: {e}")))?;

        let mut paths = InputPaths::default();
        for (kind, artifact) in &job.inputs {
            let dir = scratch.path().join(kind.to_string());
            let file_name = sanitize_file_name(artifact.file_name.as_deref(), *kind);
            let path = dir.join(file_name);
            fs::create_dir_all(&dir)
                .and_then(|_| fs::write(&path, &artifact.bytes))
                .map_err(|e| AnalysisFailure::new(format!("Failed to stage {kind} input: {e}")))?;
            match kind {
                InputKind::Text => paths.text = Some(path),
                InputKind::Model => paths.model = Some(path),
                InputKind::Code => paths.code = Some(path),
            }
        }

        let output_dir = scratch.path().join("output");
        fs::create_dir_all(&output_dir)
            .map_err(|e| AnalysisFailure::new(format!("Failed to create output directory: {e}")))?;

        let args = self.expand_args(job, &paths, &output_dir);
        info!(
            fingerprint = %job.fingerprint,
            variant = %job.variant,
            program = %self.config.program.display(),
            "Starting pipeline process"
        );
        debug!(?args, "Pipeline arguments");

        let output = Command::new(&self.config.program)
            .args(&args)
            .current_dir(scratch.path())
            .output()
            .map_err(|e| {
                AnalysisFailure::new(format!(
                    "Failed to start {}: {e}",
                    self.config.program.display()
                ))
            })?;

        if !output.status.success() {
            let excerpt = stderr_excerpt(&output.stderr);
            warn!(fingerprint = %job.fingerprint, status = %output.status, "Pipeline process failed");
            return Err(AnalysisFailure::new(format!(
                "Pipeline exited with {}: {excerpt}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let raw = if stdout.trim().is_empty() {
            fs::read_to_string(output_dir.join(OUTPUT_FILE_NAME)).map_err(|e| {
                AnalysisFailure::new(format!(
                    "Pipeline produced no output on stdout or in {OUTPUT_FILE_NAME}: {e}"
                ))
            })?
        } else {
            stdout.into_owned()
        };

        serde_json::from_str(&raw).map_err(|e| {
            AnalysisFailure::new(format!(
                "Pipeline output is not valid JSON: {e}; stderr: {}",
                stderr_excerpt(&output.stderr)
            ))
        })
    }
}

/// Reduces an uploaded file name to a safe single path component.
fn sanitize_file_name(name: Option<&str>, kind: InputKind) -> String {
    let base = name
        .and_then(|n| n.rsplit(['/', '\\']).next())
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let cleaned: String = cleaned.chars().take(MAX_FILE_NAME_LEN).collect();

    if cleaned.is_empty() {
        format!("{kind}.input")
    } else {
        cleaned
    }
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_EXCERPT_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::variant::{InputArtifact, Submission, TraceLinkType};

    fn job(text: &[u8]) -> PipelineJob {
        Submission::new("X", TraceLinkType::SadCode)
            .with_text(InputArtifact::new(Some("../../docs/readme.txt".into()), text.to_vec()))
            .with_code(InputArtifact::from_bytes(b"class A{}".to_vec()))
            .into_job()
            .unwrap()
    }

    fn sh(script: &str, extra: &[&str], work_dir: &Path) -> CommandPipelineRunner {
        let mut args = vec!["-c".to_string(), script.to_string()];
        args.extend(extra.iter().map(|s| s.to_string()));
        CommandPipelineRunner::new(CommandRunnerConfig {
            program: PathBuf::from("sh"),
            args,
            work_dir: Some(work_dir.to_path_buf()),
        })
    }

    #[test]
    fn parses_stdout_as_trace_links() {
        let work = TempDir::new().unwrap();
        let runner = sh("cat \"$0\"", &["{text}"], work.path());

        let payload = runner.run(&job(br#"[{"sentence":1,"codeElement":"A"}]"#)).unwrap();
        assert_eq!(payload[0]["codeElement"], "A");
    }

    #[test]
    fn falls_back_to_output_file() {
        let work = TempDir::new().unwrap();
        let runner = sh("echo '{\"links\":[]}' > \"$0/trace-links.json\"", &["{output_dir}"], work.path());

        let payload = runner.run(&job(b"doc")).unwrap();
        assert!(payload["links"].is_array());
    }

    #[test]
    fn expands_placeholders() {
        let work = TempDir::new().unwrap();
        let runner = sh(
            "printf '[\"%s\",\"%s\",\"%s\"]' \"$0\" \"$1\" \"$(basename \"$2\")\"",
            &["{project}", "{variant}", "{text}"],
            work.path(),
        );

        let payload = runner.run(&job(b"doc")).unwrap();
        assert_eq!(payload, serde_json::json!(["X", "sad-code", "readme.txt"]));
    }

    #[test]
    fn non_zero_exit_reports_stderr() {
        let work = TempDir::new().unwrap();
        let runner = sh("echo 'model parse error' >&2; exit 3", &[], work.path());

        let failure = runner.run(&job(b"doc")).unwrap_err();
        assert!(failure.message.contains("model parse error"), "{}", failure.message);
    }

    #[test]
    fn invalid_json_is_an_analysis_failure() {
        let work = TempDir::new().unwrap();
        let runner = sh("echo not-json", &[], work.path());

        let failure = runner.run(&job(b"doc")).unwrap_err();
        assert!(failure.message.contains("not valid JSON"));
    }

    #[test]
    fn missing_program_is_an_analysis_failure() {
        let runner = CommandPipelineRunner::new(CommandRunnerConfig {
            program: PathBuf::from("/nonexistent/tlr-pipeline"),
            args: Vec::new(),
            work_dir: None,
        });

        let failure = runner.run(&job(b"doc")).unwrap_err();
        assert!(failure.message.contains("Failed to start"));
    }

    #[test]
    fn scratch_directory_is_removed() {
        let work = TempDir::new().unwrap();
        let runner = sh("echo '[]'", &[], work.path());
        runner.run(&job(b"doc")).unwrap();
        assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name(Some("../../etc/passwd"), InputKind::Text), "passwd");
        assert_eq!(sanitize_file_name(Some("C:\\docs\\my doc.txt"), InputKind::Text), "my_doc.txt");
        assert_eq!(sanitize_file_name(Some("..."), InputKind::Model), "model.input");
        assert_eq!(sanitize_file_name(None, InputKind::Code), "code.input");
    }
}
