//! Conversion jobs backed by external tools.
//!
//! Every request becomes one [`ConversionJob`] that owns two uniquely named
//! files in the staging directory. The files are removed when the job ends,
//! whatever the outcome; the janitor catches anything a crash leaves behind.

use crate::metrics::{CLEANUP_FAILURES, record_conversion};
use crate::runner::{RunError, ToolInvocation, ToolRunner};
use bytes::Bytes;
use docket_core::config::ToolsConfig;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionOperation {
    NormalizePdf,
    WordToPdf,
}

impl ConversionOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversionOperation::NormalizePdf => "normalize_pdf",
            ConversionOperation::WordToPdf => "word_to_pdf",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Received,
    Spawned,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Received => "received",
            JobStatus::Spawned => "spawned",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

/// A single tool run and the staged files it owns.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub id: Uuid,
    pub operation: ConversionOperation,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub tool: PathBuf,
    pub arguments: Vec<OsString>,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    pub stderr: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error(transparent)]
    Tool(#[from] RunError),

    #[error("output integrity check failed: {0}")]
    OutputIntegrity(String),

    #[error("failed to stage conversion files: {0}")]
    Staging(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Partial,
    Error,
}

/// Aggregated result of both tool probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ghostscript_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub libreoffice_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ghostscript_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub libreoffice_error: Option<String>,
}

/// Runs conversion jobs against the configured tools.
#[derive(Clone)]
pub struct Converter {
    runner: Arc<dyn ToolRunner>,
    tools: ToolsConfig,
    staging_dir: PathBuf,
}

impl Converter {
    pub fn new(runner: Arc<dyn ToolRunner>, tools: ToolsConfig, staging_dir: PathBuf) -> Self {
        Self {
            runner,
            tools,
            staging_dir,
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub async fn ensure_staging_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.staging_dir).await
    }

    /// Rewrite a PDF with all fonts embedded at prepress quality.
    pub async fn normalize_pdf(&self, input: Bytes) -> Result<Bytes, ConvertError> {
        let prefix = staged_prefix();
        let input_path = self.staging_dir.join(format!("{prefix}-source.pdf"));
        let output_path = self.staging_dir.join(format!("{prefix}-normalized.pdf"));

        let mut output_arg = OsString::from("-sOutputFile=");
        output_arg.push(&output_path);
        let arguments: Vec<OsString> = [
            "-dNOPAUSE",
            "-dBATCH",
            "-sDEVICE=pdfwrite",
            "-dEmbedAllFonts=true",
            "-dSubsetFonts=false",
            "-dPDFSETTINGS=/prepress",
            "-dCompatibilityLevel=1.4",
        ]
        .into_iter()
        .map(OsString::from)
        .chain([output_arg, input_path.clone().into_os_string()])
        .collect();

        let job = self.new_job(
            ConversionOperation::NormalizePdf,
            input_path,
            output_path,
            self.tools.ghostscript_path.clone(),
            arguments,
        );
        self.run_job(job, input).await
    }

    /// Convert a `.doc` or `.docx` document to PDF.
    ///
    /// `source_name` only selects the staged extension; the client's file
    /// name never reaches the filesystem.
    pub async fn convert_word_to_pdf(
        &self,
        input: Bytes,
        source_name: &str,
    ) -> Result<Bytes, ConvertError> {
        let extension = if source_name.to_ascii_lowercase().ends_with(".doc") {
            "doc"
        } else {
            "docx"
        };
        let stem = format!("{}-source", staged_prefix());
        let input_path = self.staging_dir.join(format!("{stem}.{extension}"));
        // LibreOffice names its output after the input stem.
        let output_path = self.staging_dir.join(format!("{stem}.pdf"));

        let arguments: Vec<OsString> = vec![
            "--headless".into(),
            "--convert-to".into(),
            "pdf".into(),
            "--outdir".into(),
            self.staging_dir.clone().into_os_string(),
            input_path.clone().into_os_string(),
        ];

        let job = self.new_job(
            ConversionOperation::WordToPdf,
            input_path,
            output_path,
            self.tools.libreoffice_path.clone(),
            arguments,
        );
        self.run_job(job, input).await
    }

    /// Probe both tools concurrently with a bounded `--version` call.
    pub async fn health(&self) -> HealthReport {
        let (ghostscript, libreoffice) = tokio::join!(
            self.probe(&self.tools.ghostscript_path),
            self.probe(&self.tools.libreoffice_path),
        );

        let status = match (&ghostscript, &libreoffice) {
            (Ok(_), Ok(_)) => HealthStatus::Ok,
            (Err(_), Err(_)) => HealthStatus::Error,
            _ => HealthStatus::Partial,
        };

        let (ghostscript_version, ghostscript_error) = split(ghostscript);
        let (libreoffice_version, libreoffice_error) = split(libreoffice);

        HealthReport {
            status,
            ghostscript_version,
            libreoffice_version,
            ghostscript_error,
            libreoffice_error,
        }
    }

    async fn probe(&self, program: &Path) -> Result<String, String> {
        let invocation = ToolInvocation::new(program)
            .arg("--version")
            .with_timeout(Some(self.tools.health_timeout()));
        match self.runner.run(invocation).await {
            Ok(output) => Ok(output
                .stdout
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or("unknown")
                .to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    fn new_job(
        &self,
        operation: ConversionOperation,
        input_path: PathBuf,
        output_path: PathBuf,
        tool: PathBuf,
        arguments: Vec<OsString>,
    ) -> ConversionJob {
        ConversionJob {
            id: Uuid::new_v4(),
            operation,
            input_path,
            output_path,
            tool,
            arguments,
            status: JobStatus::Received,
            exit_code: None,
            stderr: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    async fn run_job(&self, mut job: ConversionJob, input: Bytes) -> Result<Bytes, ConvertError> {
        let started = Instant::now();
        let result = self.execute(&mut job, &input).await;
        job.status = if result.is_ok() {
            JobStatus::Succeeded
        } else {
            JobStatus::Failed
        };

        remove_staged(&job.input_path).await;
        remove_staged(&job.output_path).await;

        let elapsed = started.elapsed();
        record_conversion(
            job.operation.as_str(),
            job.status.as_str(),
            elapsed.as_secs_f64(),
        );

        match &result {
            Ok(bytes) => tracing::info!(
                job_id = %job.id,
                operation = job.operation.as_str(),
                input_bytes = input.len(),
                output_bytes = bytes.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Conversion succeeded"
            ),
            Err(e) => tracing::warn!(
                job_id = %job.id,
                operation = job.operation.as_str(),
                exit_code = ?job.exit_code,
                error = %e,
                "Conversion failed"
            ),
        }

        result
    }

    async fn execute(&self, job: &mut ConversionJob, input: &[u8]) -> Result<Bytes, ConvertError> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        tokio::fs::write(&job.input_path, input).await?;

        let invocation = ToolInvocation {
            program: job.tool.clone(),
            args: job.arguments.clone(),
            timeout: self.tools.conversion_timeout(),
        };

        job.status = JobStatus::Spawned;
        match self.runner.run(invocation).await {
            Ok(output) => {
                job.exit_code = Some(output.exit_code);
                if !output.stderr.trim().is_empty() {
                    job.stderr = Some(output.stderr);
                }
            }
            Err(e) => {
                if let RunError::ExecutionFailed {
                    exit_code, stderr, ..
                } = &e
                {
                    job.exit_code = *exit_code;
                    job.stderr = Some(stderr.clone());
                }
                return Err(e.into());
            }
        }

        let output = match tokio::fs::read(&job.output_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConvertError::OutputIntegrity(format!(
                    "{} produced no output file",
                    job.tool.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let minimum = self.tools.min_output_bytes;
        if (output.len() as u64) < minimum {
            return Err(ConvertError::OutputIntegrity(format!(
                "output is {} bytes, expected at least {minimum}",
                output.len()
            )));
        }

        Ok(Bytes::from(output))
    }
}

fn split(result: Result<String, String>) -> (Option<String>, Option<String>) {
    match result {
        Ok(version) => (Some(version), None),
        Err(error) => (None, Some(error)),
    }
}

/// `<unix-millis>-<uuid>`, unique per job.
fn staged_prefix() -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    format!("{millis}-{}", Uuid::new_v4().simple())
}

async fn remove_staged(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            CLEANUP_FAILURES.inc();
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged file");
        }
    }
}
