//! Streaming flatten API: progress events followed by the result.
//!
//! Flattening a long scan takes a while. [`flatten_stream`] yields a
//! [`FlattenEvent::Progress`] per page as it is embedded, then exactly one
//! [`FlattenEvent::Finished`] or [`FlattenEvent::Failed`]. The stream carries
//! progress in place of `config.progress_callback`, which is not called.

use crate::api::flatten_source;
use crate::config::UnlockConfig;
use crate::engine::pdfium::PdfiumEngine;
use crate::engine::PdfEngine;
use crate::error::UnlockError;
use crate::output::UnlockOutput;
use crate::pipeline::input;
use crate::progress::{ChannelProgressCallback, ProgressCallback, ProgressEvent, ProgressTracker};
use crate::workspace::SourceFile;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::info;

#[derive(Debug, Clone)]
pub enum FlattenEvent {
    Progress(ProgressEvent),
    Finished(UnlockOutput),
    Failed(String),
}

/// A boxed stream of flatten events.
pub type FlattenStream = Pin<Box<dyn Stream<Item = FlattenEvent> + Send>>;

/// Flatten a PDF file, streaming progress as pages complete.
///
/// # Returns
/// - `Ok(FlattenStream)` once the input has been read
/// - `Err(UnlockError)` if the file cannot be read or is not a PDF
pub async fn flatten_stream(input: impl AsRef<Path>, config: &UnlockConfig) -> Result<FlattenStream, UnlockError> {
    let file = input::load_source_file(input.as_ref()).await?;
    info!("Starting streaming flatten: {}", file.name);
    Ok(stream_with_engine(file, config, PdfiumEngine::bind))
}

/// Flatten `file` on a blocking worker using the engine returned by `bind`.
///
/// Must be called from within a tokio runtime.
pub fn stream_with_engine<E, F>(file: SourceFile, config: &UnlockConfig, bind: F) -> FlattenStream
where
    E: PdfEngine + 'static,
    F: FnOnce() -> Result<E, UnlockError> + Send + 'static,
{
    let (callback, rx) = ChannelProgressCallback::channel();
    let config = config.clone();
    let handle = tokio::task::spawn_blocking(move || {
        let engine = bind()?;
        // The tracker owns the only sender; dropping it ends the progress half.
        let tracker = ProgressTracker::new(Some(Arc::new(callback) as ProgressCallback));
        flatten_source(&engine, &tracker, file, &config)
    });

    let result = stream::once(async move {
        match handle.await {
            Ok(Ok(output)) => FlattenEvent::Finished(output),
            Ok(Err(e)) => FlattenEvent::Failed(e.to_string()),
            Err(e) => FlattenEvent::Failed(format!("flatten worker panicked: {e}")),
        }
    });

    Box::pin(
        UnboundedReceiverStream::new(rx)
            .map(FlattenEvent::Progress)
            .chain(result),
    )
}
