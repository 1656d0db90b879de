//! JUnit XML report parsing.
//!
//! Layout as written by Gradle and Surefire:
//!
//! ```text
//! <testsuite name="..." tests="N" failures="F" errors="E">
//!   <testcase classname="..." name="..." time="...">
//!     <failure message="...">stack trace</failure>   <!-- only on failure -->
//!   </testcase>
//! </testsuite>
//! ```

use anyhow::{Context, Result, bail};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::schema::ValidationCheck;

/// Failure details longer than this are cut off.
pub const MAX_DETAILS_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Marker {
    Failure,
    Error,
}

#[derive(Debug, Default)]
struct OpenCase {
    check_name: String,
    skipped: bool,
    failure: Option<String>,
    error: Option<String>,
}

impl OpenCase {
    fn start(e: &BytesStart<'_>) -> Result<Self> {
        let class_name = attribute(e, "classname")?.unwrap_or_default();
        let name = attribute(e, "name")?.unwrap_or_default();
        Ok(Self {
            check_name: format!("{}.{}", class_name, name),
            ..Self::default()
        })
    }

    fn record(&mut self, marker: Marker, message: String) {
        let slot = match marker {
            Marker::Failure => &mut self.failure,
            Marker::Error => &mut self.error,
        };
        if slot.is_none() {
            *slot = Some(message);
        }
    }

    fn finish(self) -> ValidationCheck {
        if self.skipped {
            return ValidationCheck::new(self.check_name, true, "SKIPPED");
        }
        match self.failure.or(self.error) {
            Some(message) => ValidationCheck::new(self.check_name, false, truncate(&message)),
            None => ValidationCheck::new(self.check_name, true, "PASSED"),
        }
    }
}

fn truncate(message: &str) -> String {
    message.chars().take(MAX_DETAILS_CHARS).collect()
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    match e.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn marker_of(e: &BytesStart<'_>) -> Option<Marker> {
    match e.local_name().as_ref() {
        b"failure" => Some(Marker::Failure),
        b"error" => Some(Marker::Error),
        _ => None,
    }
}

/// Parse one report document into one check per `<testcase>`.
pub fn parse_report(xml: &str) -> Result<Vec<ValidationCheck>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut checks = Vec::new();
    let mut case: Option<OpenCase> = None;
    // Marker whose body text is being collected because it had no message attribute
    let mut capture: Option<(Marker, String)> = None;
    let mut depth: usize = 0;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                if e.local_name().as_ref() == b"testcase" {
                    case = Some(OpenCase::start(&e)?);
                } else if let Some(open) = case.as_mut() {
                    if e.local_name().as_ref() == b"skipped" {
                        open.skipped = true;
                    } else if let Some(marker) = marker_of(&e) {
                        match attribute(&e, "message")? {
                            Some(message) => open.record(marker, message),
                            None => capture = Some((marker, String::new())),
                        }
                    }
                }
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"testcase" {
                    checks.push(OpenCase::start(&e)?.finish());
                } else if let Some(open) = case.as_mut() {
                    if e.local_name().as_ref() == b"skipped" {
                        open.skipped = true;
                    } else if let Some(marker) = marker_of(&e) {
                        let message = attribute(&e, "message")?.unwrap_or_default();
                        open.record(marker, message);
                    }
                }
            }
            Event::Text(t) => {
                if let Some((_, body)) = capture.as_mut() {
                    body.push_str(&t.unescape()?);
                }
            }
            Event::CData(t) => {
                if let Some((_, body)) = capture.as_mut() {
                    body.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::End(e) => {
                depth = depth
                    .checked_sub(1)
                    .context("closing tag without matching opening tag")?;
                let name = e.local_name();
                if name.as_ref() == b"testcase" {
                    if let Some(open) = case.take() {
                        checks.push(open.finish());
                    }
                } else if matches!(name.as_ref(), b"failure" | b"error")
                    && let Some((marker, body)) = capture.take()
                    && let Some(open) = case.as_mut()
                {
                    open.record(marker, body);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        bail!("report ended with {} unclosed element(s)", depth);
    }
    Ok(checks)
}

pub fn parse_report_file(path: &Path) -> Result<Vec<ValidationCheck>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read report {}", path.display()))?;
    parse_report(&content).with_context(|| format!("Malformed report {}", path.display()))
}

/// Parse every `*.xml` report in `dir`, in sorted file order.
///
/// A file that fails to parse contributes no checks; its siblings are still
/// read. A missing directory yields no checks.
pub fn parse_report_dir(dir: &Path) -> Vec<ValidationCheck> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "report directory absent");
        return Vec::new();
    }

    let pattern = format!(
        "{}/*.xml",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let mut files: Vec<PathBuf> = match glob::glob(&pattern) {
        Ok(paths) => paths.filter_map(|p| p.ok()).collect(),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "invalid report pattern");
            return Vec::new();
        }
    };
    files.sort();

    let mut checks = Vec::new();
    for file in files {
        match parse_report_file(&file) {
            Ok(parsed) => checks.extend(parsed),
            Err(e) => warn!(file = %file.display(), error = %format!("{:#}", e), "skipping report"),
        }
    }
    checks
}
