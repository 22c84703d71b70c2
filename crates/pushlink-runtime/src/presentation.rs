//! Showing notifications to the operator
//!
//! The dispatcher turns a [`NotificationMessage`](pushlink_core::NotificationMessage)
//! into a [`Presentation`] and hands it to a [`PresentationSink`]. Sinks here
//! are deliberately thin: log it, run a program, or both.

use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use pushlink_core::config::DispatchConfig;
use pushlink_core::{PeerIdentifier, PresentationError};
use tempfile::TempPath;
use tokio::process::Command;
use tracing::{debug, info};

// ----------------------------------------------------------------------------
// Presentation
// ----------------------------------------------------------------------------

/// A notification ready to display
#[derive(Debug)]
pub struct Presentation {
    pub title: String,
    pub body: String,
    pub image: Option<RenderedImage>,
    /// Phone that sent it
    pub peer: PeerIdentifier,
}

/// Displays notifications
#[async_trait]
pub trait PresentationSink: Send + Sync {
    async fn present(&self, presentation: &Presentation) -> Result<(), PresentationError>;
}

// ----------------------------------------------------------------------------
// Images
// ----------------------------------------------------------------------------

/// Image formats recognised by their magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
    Bmp,
}

impl ImageFormat {
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else if bytes.starts_with(b"BM") && bytes.len() >= 26 {
            Some(ImageFormat::Bmp)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
            ImageFormat::Bmp => "bmp",
        }
    }
}

/// Image bytes written to a temporary file for the desktop to pick up.
/// The file is removed when this value is dropped.
#[derive(Debug)]
pub struct RenderedImage {
    path: TempPath,
    format: ImageFormat,
}

impl RenderedImage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PresentationError> {
        let format = ImageFormat::detect(bytes).ok_or(PresentationError::UnsupportedImage(bytes.len()))?;

        let suffix = format!(".{}", format.extension());
        let mut file = tempfile::Builder::new()
            .prefix("pushlink-")
            .suffix(&suffix)
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;

        Ok(Self {
            path: file.into_temp_path(),
            format,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }
}

// ----------------------------------------------------------------------------
// Templates
// ----------------------------------------------------------------------------

/// Expand `{name}` placeholders in one left-to-right pass.
///
/// Substituted text is never scanned again, so a title containing `{body}`
/// stays literal. Unknown placeholders are kept as written.
pub fn expand_placeholders<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let candidate = &rest[open..];

        let replaced = candidate.find('}').and_then(|close| {
            lookup(&candidate[1..close]).map(|value| (value, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &candidate[close + 1..];
            }
            None => {
                out.push('{');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Title or body format with `{title}` and `{body}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template(String);

impl Template {
    pub fn new(format: impl Into<String>) -> Self {
        Self(format.into())
    }

    pub fn render(&self, title: &str, body: &str) -> String {
        expand_placeholders(&self.0, |name| match name {
            "title" => Some(title),
            "body" => Some(body),
            _ => None,
        })
    }
}

// ----------------------------------------------------------------------------
// Sinks
// ----------------------------------------------------------------------------

/// Writes every notification to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl PresentationSink for LogSink {
    async fn present(&self, presentation: &Presentation) -> Result<(), PresentationError> {
        info!(
            peer = %presentation.peer,
            title = %presentation.title,
            body = %presentation.body,
            image = ?presentation.image.as_ref().map(|i| i.path().display().to_string()),
            "Notification received"
        );
        Ok(())
    }
}

/// Runs a program per notification.
///
/// Arguments are passed directly, without a shell; `{title}`, `{body}` and
/// `{image}` (the image path, empty when there is none) are expanded inside
/// each argument.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    /// `None` when the command line is empty
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn expanded_args(&self, presentation: &Presentation) -> Vec<String> {
        let image = presentation
            .image
            .as_ref()
            .map(|i| i.path().to_string_lossy().into_owned())
            .unwrap_or_default();

        self.args
            .iter()
            .map(|arg| {
                expand_placeholders(arg, |name| match name {
                    "title" => Some(presentation.title.as_str()),
                    "body" => Some(presentation.body.as_str()),
                    "image" => Some(image.as_str()),
                    _ => None,
                })
            })
            .collect()
    }
}

#[async_trait]
impl PresentationSink for CommandSink {
    async fn present(&self, presentation: &Presentation) -> Result<(), PresentationError> {
        let args = self.expanded_args(presentation);
        debug!(program = %self.program, ?args, "Running notification command");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PresentationError::Sink(format!("cannot run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PresentationError::Sink(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Presents through several sinks in order. Every sink runs even when an
/// earlier one fails; the failures are reported together.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn PresentationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn PresentationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl PresentationSink for FanoutSink {
    async fn present(&self, presentation: &Presentation) -> Result<(), PresentationError> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.present(presentation).await {
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PresentationError::Sink(failures.join("; ")))
        }
    }
}

/// Sink described by the dispatch configuration: the log, plus the
/// configured command if any
pub fn sink_from_config(config: &DispatchConfig) -> Arc<dyn PresentationSink> {
    let mut sink = FanoutSink::new().with(Arc::new(LogSink));
    if let Some(command) = config.command.as_deref().and_then(CommandSink::new) {
        sink = sink.with(Arc::new(command));
    }
    Arc::new(sink)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
