//! Conversion pipeline.
//!
//! Runs one request from source bytes to a persisted output file:
//!
//! ```text
//! destination check -> parse -> preview -> serialize -> persist
//! ```
//!
//! Output is staged in a temporary file beside the destination and only
//! renamed into place once serialization succeeded, so a failed or cancelled
//! conversion never leaves a partial file behind.

pub mod progress;
pub mod writer;

#[cfg(test)]
pub mod tests;

use self::progress::{ProgressReporter, STAGE_READING, writing_stage};
use self::writer::{OutputWriter, writer_for};

use crate::config::ConverterConfig;
use crate::dataset::TabularDataset;
use crate::error::{ConvertError, Result};
use crate::models::{ConversionRequest, ConversionSummary, OutputFormat};
use crate::sav::{DatasetReader, SavReader};

use polars::prelude::DataFrame;
use std::fs;
use std::io::ErrorKind as IoErrorKind;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Converts SPSS system files into CSV or XLSX
#[derive(Clone)]
pub struct Converter {
    config: ConverterConfig,
    reader: Arc<dyn DatasetReader>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Converter {
    /// Create a converter reading `.sav` files with the configured options
    pub fn new(config: ConverterConfig) -> Self {
        let reader = Arc::new(SavReader::new(config.read.clone()));
        Self { config, reader }
    }

    /// Replace the dataset reader
    pub fn with_reader(mut self, reader: Arc<dyn DatasetReader>) -> Self {
        self.reader = reader;
        self
    }

    /// Run one conversion. Cancellation is observed between steps only.
    pub async fn convert(
        &self,
        request: ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<ConversionSummary> {
        let start = Instant::now();
        let destination = self.plan(&request)?;
        let format = request.format;
        let overwrite = request.overwrite;
        let progress = ProgressReporter::new(self.config.show_progress);

        // Step 1: refuse an occupied destination before doing any work
        check_destination(&destination, overwrite, format)?;
        ensure_active(cancel)?;

        // Step 2: parse
        progress.stage(STAGE_READING);
        let reader = Arc::clone(&self.reader);
        let source = request.source;
        let dataset = task::spawn_blocking(move || read_dataset(reader.as_ref(), &source))
            .await
            .map_err(task_failure)??;
        ensure_active(cancel)?;

        // Step 3: preview
        let preview = self.preview(&dataset);

        // Step 4: serialize into a staged file
        progress.stage(writing_stage(format));
        let writer = writer_for(format, &self.config, &request.output_name, &destination);
        let staged_destination = destination.clone();
        let (dataset, staged) = task::spawn_blocking(move || {
            let staged = write_staged(writer.as_ref(), &dataset, &staged_destination);
            (dataset, staged)
        })
        .await
        .map_err(task_failure)?;
        let staged = staged?;
        ensure_active(cancel)?;

        // Step 5: move into place
        let bytes_written = persist(staged, &destination, overwrite, format)?;
        progress.finish();

        Ok(summarize(destination, format, &dataset, bytes_written, preview, start))
    }

    /// Run one conversion on the calling thread
    pub fn convert_blocking(&self, request: ConversionRequest) -> Result<ConversionSummary> {
        let start = Instant::now();
        let destination = self.plan(&request)?;
        let format = request.format;
        let progress = ProgressReporter::new(self.config.show_progress);

        check_destination(&destination, request.overwrite, format)?;

        progress.stage(STAGE_READING);
        let dataset = read_dataset(self.reader.as_ref(), &request.source)?;
        let preview = self.preview(&dataset);

        progress.stage(writing_stage(format));
        let writer = writer_for(format, &self.config, &request.output_name, &destination);
        let staged = write_staged(writer.as_ref(), &dataset, &destination)?;
        let bytes_written = persist(staged, &destination, request.overwrite, format)?;
        progress.finish();

        Ok(summarize(destination, format, &dataset, bytes_written, preview, start))
    }

    /// Validate the configuration and request, returning the destination path
    fn plan(&self, request: &ConversionRequest) -> Result<PathBuf> {
        self.config.validate()?;
        request.validate()?;

        let destination = request.destination();
        info!(
            "Converting {} bytes to {} at {}",
            request.source.len(),
            request.format,
            destination.display()
        );
        Ok(destination)
    }

    fn preview(&self, dataset: &TabularDataset) -> Option<DataFrame> {
        self.config
            .show_preview
            .then(|| dataset.preview(self.config.preview_rows))
    }
}

/// Read a whole input file into memory
pub async fn load_source(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ConvertError::input(path, e))?;
    debug!("Loaded {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ConvertError::interrupted("conversion cancelled by user"));
    }
    Ok(())
}

fn check_destination(destination: &Path, overwrite: bool, format: OutputFormat) -> Result<()> {
    if overwrite {
        return Ok(());
    }
    let exists = destination
        .try_exists()
        .map_err(|e| ConvertError::write(format, destination, e))?;
    if exists {
        return Err(ConvertError::destination_exists(destination));
    }
    Ok(())
}

/// Run `step`, reporting a panic inside it as an internal error
fn isolate<T>(what: &str, step: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(step)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            Err(ConvertError::internal(format!("{} panicked: {}", what, message)))
        }
    }
}

fn task_failure(e: task::JoinError) -> ConvertError {
    error!("Blocking task failed: {}", e);
    ConvertError::internal(format!("blocking task failed: {}", e))
}

fn read_dataset(reader: &dyn DatasetReader, source: &[u8]) -> Result<TabularDataset> {
    isolate("dataset reader", || reader.read(source)).inspect_err(|e| error!("{}", e))
}

fn write_staged(
    writer: &dyn OutputWriter,
    dataset: &TabularDataset,
    destination: &Path,
) -> Result<NamedTempFile> {
    isolate("output writer", || serialize(writer, dataset, destination))
        .inspect_err(|e| error!("{}", e))
}

fn summarize(
    destination: PathBuf,
    format: OutputFormat,
    dataset: &TabularDataset,
    bytes_written: u64,
    preview: Option<DataFrame>,
    start: Instant,
) -> ConversionSummary {
    let summary = ConversionSummary {
        destination,
        format,
        rows: dataset.row_count(),
        columns: dataset.column_count(),
        bytes_written,
        preview,
        elapsed: start.elapsed(),
    };
    info!(
        "Wrote {} rows x {} columns ({} bytes) in {:?}",
        summary.rows, summary.columns, summary.bytes_written, summary.elapsed
    );
    summary
}

/// Directory that will hold the staged file and the destination
fn staging_dir(destination: &Path) -> PathBuf {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Write the dataset into a temporary file next to the destination
fn serialize(
    writer: &dyn OutputWriter,
    dataset: &TabularDataset,
    destination: &Path,
) -> Result<NamedTempFile> {
    let format = writer.format();
    let file_name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let prefix = format!(".{}.", file_name);
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(".tmp");
    // Same mode as a freshly created file once the umask applies
    #[cfg(unix)]
    builder.permissions(fs::Permissions::from_mode(0o666));

    let mut staged = builder
        .tempfile_in(staging_dir(destination))
        .map_err(|e| ConvertError::write(format, destination, e))?;
    debug!("Staging output in {}", staged.path().display());

    writer.write(dataset, staged.as_file_mut())?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| ConvertError::write(format, destination, e))?;
    Ok(staged)
}

/// Rename the staged file onto the destination, returning its size
fn persist(
    staged: NamedTempFile,
    destination: &Path,
    overwrite: bool,
    format: OutputFormat,
) -> Result<u64> {
    let persisted = if overwrite {
        // A replaced file keeps its permissions
        if let Ok(existing) = fs::metadata(destination) {
            staged
                .as_file()
                .set_permissions(existing.permissions())
                .map_err(|e| ConvertError::write(format, destination, e))?;
        }
        staged.persist(destination)
    } else {
        staged.persist_noclobber(destination)
    };

    // A failed persist hands the temporary file back; dropping it removes it
    let file = match persisted {
        Ok(file) => file,
        Err(e) if !overwrite && e.error.kind() == IoErrorKind::AlreadyExists => {
            return Err(ConvertError::destination_exists(destination));
        }
        Err(e) => return Err(ConvertError::write(format, destination, e.error)),
    };

    let size = file
        .metadata()
        .map_err(|e| ConvertError::write(format, destination, e))?
        .len();
    Ok(size)
}
