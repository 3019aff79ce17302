use crate::data::{Archive, archive_key};
use crate::error::Result;
use crate::source::MessageStream;
use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use trawl_scanner::{Item, Message};

/// Consumer of the messages of a run, in order.
pub trait Sink {
    fn write(&mut self, message: &Message) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Sink for JsonLinesSink<W> {
    fn write(&mut self, message: &Message) -> Result<()> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Options for one extraction run
pub struct ExtractOptions {
    /// Prefix of archive entries, usually the subcommand.
    pub category: String,
    /// Items already recorded here are not written again.
    pub archive: Option<Archive>,
    pub show_progress_bars: bool,
}

/// Callback for each item written
pub type ExtractProgressCallback = Arc<dyn Fn(&Item) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub category: String,
    pub directories: usize,
    pub written: usize,
    /// Items skipped because an earlier run recorded them.
    pub archived: usize,
    pub elapsed_secs: f64,
}

/// Drains `stream` into `sink`.
///
/// Whatever was written before an error stays written; the error is returned after the sink
/// is flushed.
pub async fn execute_extraction(
    mut stream: MessageStream,
    sink: &mut dyn Sink,
    options: ExtractOptions,
    progress_callback: Option<ExtractProgressCallback>,
) -> Result<RunSummary> {
    let ExtractOptions {
        category,
        archive,
        show_progress_bars,
    } = options;

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Starting {} run...", category));
        Some(pb)
    } else {
        None
    };

    let started = Instant::now();
    let mut summary = RunSummary {
        category: category.clone(),
        ..RunSummary::default()
    };

    let outcome = loop {
        let message = match stream.try_next().await {
            Ok(Some(message)) => message,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };

        let written = match handle_message(
            &message,
            sink,
            &category,
            archive.as_ref(),
            &mut summary,
        ) {
            Ok(written) => written,
            Err(e) => break Err(e),
        };

        if written && let Message::Url(item) = &message {
            if let Some(pb) = &progress_bar {
                pb.set_message(format!("{} items, at {}", summary.written, item.node));
                pb.tick();
            }
            if let Some(callback) = &progress_callback {
                callback(item);
            }
        }
    };

    summary.elapsed_secs = started.elapsed().as_secs_f64();
    if let Some(pb) = progress_bar {
        pb.finish_and_clear();
    }
    sink.flush()?;

    match outcome {
        Ok(()) => {
            info!(
                "{} run finished: {} items written, {} already archived",
                category, summary.written, summary.archived
            );
            Ok(summary)
        }
        Err(e) => {
            info!(
                "{} run aborted after {} items written",
                category, summary.written
            );
            Err(e)
        }
    }
}

fn handle_message(
    message: &Message,
    sink: &mut dyn Sink,
    category: &str,
    archive: Option<&Archive>,
    summary: &mut RunSummary,
) -> Result<bool> {
    match message {
        Message::Directory { .. } => {
            sink.write(message)?;
            summary.directories += 1;
            Ok(false)
        }
        Message::Url(item) => {
            let key = archive_key(category, item);
            if let Some(archive) = archive
                && let Some(recorded_at) = archive.recorded_at(&key)?
            {
                debug!("Skipping {}, archived at {}", key, recorded_at);
                summary.archived += 1;
                return Ok(false);
            }

            sink.write(message)?;
            summary.written += 1;
            if let Some(archive) = archive {
                archive.record(&key)?;
            }
            Ok(true)
        }
    }
}
