//! Stack-trace extraction from attached errors.
//!
//! Two capabilities are recognized on an error value:
//! - [`WithStacktrace`] carries a ready-made [`Stacktrace`], used verbatim
//! - [`TracedError`] (anywhere in the `source()` chain) carries generic
//!   [`TraceFrame`]s which are converted frame by frame
//!
//! Anything else yields no stack trace.

use crate::domain::LogLevel;
use crate::packet::{Exception, Frame, Stacktrace};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StacktraceConfig {
    pub enable: bool,
    /// Minimum severity for which traces are attached.
    pub level: LogLevel,
    /// Leading frames dropped from every converted trace.
    pub skip: usize,
    /// Lines of source context captured around each frame.
    pub context: usize,
    pub in_app_prefixes: Vec<String>,
    pub send_exception_type: bool,
    pub switch_exception_type_and_message: bool,
}

impl Default for StacktraceConfig {
    fn default() -> Self {
        Self {
            enable: false,
            level: LogLevel::Error,
            skip: 0,
            context: 0,
            in_app_prefixes: Vec::new(),
            send_exception_type: true,
            switch_exception_type_and_message: false,
        }
    }
}

/// One generic trace frame, innermost call first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub function: String,
    pub file: String,
    pub line: u32,
}

/// Error wrapper that records the call stack at construction.
pub struct TracedError {
    inner: Box<dyn Error + Send + Sync + 'static>,
    frames: Vec<TraceFrame>,
}

impl TracedError {
    pub fn new<E>(err: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::with_frames(err, capture_frames())
    }

    pub fn with_frames<E>(err: E, frames: Vec<TraceFrame>) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self {
            inner: err.into(),
            frames,
        }
    }

    pub fn frames(&self) -> &[TraceFrame] {
        &self.frames
    }
}

impl fmt::Debug for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedError")
            .field("inner", &self.inner)
            .field("frames", &self.frames.len())
            .finish()
    }
}

impl fmt::Display for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl Error for TracedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

/// Error wrapper carrying a provider-formatted stack trace.
#[derive(Debug)]
pub struct WithStacktrace {
    inner: Box<dyn Error + Send + Sync + 'static>,
    stacktrace: Stacktrace,
}

impl WithStacktrace {
    pub fn new<E>(err: E, stacktrace: Stacktrace) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self {
            inner: err.into(),
            stacktrace,
        }
    }

    pub fn stacktrace(&self) -> &Stacktrace {
        &self.stacktrace
    }
}

impl fmt::Display for WithStacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl Error for WithStacktrace {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

// Frames of the caller of `capture_frames`, innermost first.
fn capture_frames() -> Vec<TraceFrame> {
    let backtrace = backtrace::Backtrace::new();
    let mut frames: Vec<TraceFrame> = backtrace
        .frames()
        .iter()
        .flat_map(|frame| frame.symbols())
        .map(|symbol| TraceFrame {
            function: symbol
                .name()
                .map(|name| format!("{name:#}"))
                .unwrap_or_default(),
            file: symbol
                .filename()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            line: symbol.lineno().unwrap_or_default(),
        })
        .collect();

    if let Some(own) = frames
        .iter()
        .position(|f| f.function.ends_with("::capture_frames"))
    {
        frames.drain(..=own);
    }
    frames
}

#[derive(Debug, Clone, Default)]
pub struct StacktraceExtractor {
    config: StacktraceConfig,
}

impl StacktraceExtractor {
    pub fn new(config: StacktraceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StacktraceConfig {
        &self.config
    }

    pub fn extract(&self, err: &(dyn Error + 'static)) -> Option<Stacktrace> {
        if let Some(provided) = err.downcast_ref::<WithStacktrace>() {
            return Some(provided.stacktrace.clone());
        }

        chain(err)
            .find_map(|e| e.downcast_ref::<TracedError>())
            .map(|traced| self.convert(traced.frames()))
    }

    /// Call stack of the current thread.
    pub fn capture_current(&self) -> Stacktrace {
        self.convert(&capture_frames())
    }

    /// Converts generic frames, keeping their order.
    pub fn convert(&self, frames: &[TraceFrame]) -> Stacktrace {
        let frames = frames
            .iter()
            .skip(self.config.skip)
            .map(|f| self.convert_frame(f))
            .collect();
        Stacktrace { frames }
    }

    fn convert_frame(&self, trace: &TraceFrame) -> Frame {
        let (module, function) = match trace.function.rsplit_once("::") {
            Some((module, function)) => (module.to_string(), function.to_string()),
            None => (String::new(), trace.function.clone()),
        };
        let filename = Path::new(&trace.file)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| trace.file.clone());
        let in_app = self
            .config
            .in_app_prefixes
            .iter()
            .any(|prefix| trace.function.starts_with(prefix.as_str()));

        let mut frame = Frame {
            filename,
            function,
            module,
            lineno: trace.line,
            abs_path: trace.file.clone(),
            in_app,
            ..Default::default()
        };
        if self.config.context > 0 {
            add_source_context(&mut frame, self.config.context);
        }
        frame
    }

    /// Exception summary for the root cause of `err`.
    pub fn exception(&self, err: &(dyn Error + 'static), stacktrace: Option<Stacktrace>) -> Exception {
        let root = chain(err).last().unwrap_or(err);
        let mut exception = Exception {
            ty: type_name_of(root),
            value: root.to_string(),
            module: String::new(),
            stacktrace,
        };
        if !self.config.send_exception_type {
            exception.ty.clear();
        }
        if self.config.switch_exception_type_and_message {
            std::mem::swap(&mut exception.ty, &mut exception.value);
        }
        exception
    }
}

/// `err` followed by its `source()` chain.
pub fn chain<'a>(err: &'a (dyn Error + 'static)) -> impl Iterator<Item = &'a (dyn Error + 'static)> {
    std::iter::successors(Some(err), |e: &&'a (dyn Error + 'static)| (*e).source())
}

// Leading identifier of the Debug rendering, e.g. `ParseIntError`.
fn type_name_of(err: &(dyn Error + 'static)) -> String {
    let debug = format!("{err:?}");
    let end = debug
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
        .unwrap_or(debug.len());
    debug[..end].trim_end_matches(':').to_string()
}

fn add_source_context(frame: &mut Frame, context: usize) {
    if frame.lineno == 0 {
        return;
    }
    let Ok(source) = std::fs::read_to_string(&frame.abs_path) else {
        return;
    };
    let lines: Vec<&str> = source.lines().collect();
    let index = frame.lineno as usize - 1;
    let Some(line) = lines.get(index) else {
        return;
    };

    frame.context_line = Some((*line).to_string());
    frame.pre_context = lines[index.saturating_sub(context)..index]
        .iter()
        .map(|l| (*l).to_string())
        .collect();
    frame.post_context = lines[index + 1..lines.len().min(index + 1 + context)]
        .iter()
        .map(|l| (*l).to_string())
        .collect();
}
