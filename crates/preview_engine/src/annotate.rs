use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

use preview_core::LINE_NUMBER_ATTRIBUTE;
use preview_logging::preview_debug;
use thiserror::Error;

use crate::decode::{decode_text, DecodeError};

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("could not decode document: {0}")]
    Decode(#[from] DecodeError),
    #[error("failed to launch annotator {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("annotator io error: {0}")]
    Io(#[from] io::Error),
    #[error("annotator exited with {status}: {stderr}")]
    Remote { status: String, stderr: String },
}

/// The document-to-annotated-markup transform.
///
/// Only ever driven from the parse worker thread. Calls may block for as long
/// as the transform takes; there is no timeout and no retry.
pub trait Annotator: Send {
    fn connect(&mut self) -> Result<(), AnnotateError> {
        Ok(())
    }

    fn annotate(&mut self, raw: &[u8]) -> Result<Vec<u8>, AnnotateError>;

    fn shutdown(&mut self) {}
}

/// In-process annotator that tags every start tag with its source line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineNumberAnnotator;

impl Annotator for LineNumberAnnotator {
    fn annotate(&mut self, raw: &[u8]) -> Result<Vec<u8>, AnnotateError> {
        let decoded = decode_text(raw, None)?;
        Ok(annotate_line_numbers(&decoded.text))
    }
}

/// Inserts `data-lnum="N"` into each start tag, N being the 1-based line of its `<`.
pub fn annotate_line_numbers(markup: &str) -> Vec<u8> {
    let bytes = markup.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() + bytes.len() / 4);
    let mut line: u32 = 1;
    let mut raw_text_end: Option<Vec<u8>> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\n' {
            line += 1;
            out.push(b);
            i += 1;
            continue;
        }
        if b != b'<' {
            out.push(b);
            i += 1;
            continue;
        }

        if let Some(end_tag) = raw_text_end.as_deref() {
            if starts_with_ignore_case(&bytes[i..], end_tag) {
                raw_text_end = None;
            }
            out.push(b);
            i += 1;
            continue;
        }

        if bytes[i..].starts_with(b"<!--") {
            // `<!-->` and `<!--->` are complete empty comments.
            let end = if bytes[i + 4..].starts_with(b">") {
                i + 5
            } else if bytes[i + 4..].starts_with(b"->") {
                i + 6
            } else {
                find(&bytes[i + 4..], b"-->").map_or(bytes.len(), |p| i + 4 + p + 3)
            };
            line += count_newlines(&bytes[i..end]);
            out.extend_from_slice(&bytes[i..end]);
            i = end;
            continue;
        }

        if !bytes.get(i + 1).is_some_and(u8::is_ascii_alphabetic) {
            out.push(b);
            i += 1;
            continue;
        }

        let name_end = i
            + 1
            + bytes[i + 1..]
                .iter()
                .position(|&c| !(c.is_ascii_alphanumeric() || matches!(c, b'-' | b':' | b'_')))
                .unwrap_or(bytes.len() - i - 1);
        let name = &bytes[i + 1..name_end];
        out.extend_from_slice(&bytes[i..name_end]);
        out.extend_from_slice(format!(" {LINE_NUMBER_ATTRIBUTE}=\"{line}\"").as_bytes());

        let tag_end = find_tag_end(&bytes[name_end..]).map_or(bytes.len(), |p| name_end + p + 1);
        let rest = &bytes[name_end..tag_end];
        line += count_newlines(rest);
        out.extend_from_slice(rest);
        i = tag_end;

        let self_closing = rest.ends_with(b"/>");
        if !self_closing
            && (name.eq_ignore_ascii_case(b"script") || name.eq_ignore_ascii_case(b"style"))
        {
            let mut end_tag = b"</".to_vec();
            end_tag.extend(name.iter().map(u8::to_ascii_lowercase));
            raw_text_end = Some(end_tag);
        }
    }
    out
}

/// Offset of the `>` closing a start tag, skipping quoted attribute values.
fn find_tag_end(bytes: &[u8]) -> Option<usize> {
    let mut quote = None;
    for (idx, &b) in bytes.iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(idx),
            None => {}
        }
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn starts_with_ignore_case(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn count_newlines(bytes: &[u8]) -> u32 {
    bytes.iter().filter(|&&b| b == b'\n').count() as u32
}

/// Out-of-process annotator: one child process per call, markup on stdin,
/// annotated markup on stdout.
#[derive(Debug, Clone)]
pub struct ProcessAnnotator {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessAnnotator {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Annotator for ProcessAnnotator {
    fn annotate(&mut self, raw: &[u8]) -> Result<Vec<u8>, AnnotateError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| AnnotateError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Feed stdin from a helper thread so a chatty child cannot deadlock us.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = raw.to_vec();
            thread::spawn(move || stdin.write_all(&input))
        });
        let output = child.wait_with_output()?;
        let written = match writer.map(|handle| handle.join()) {
            None | Some(Ok(Ok(()))) => Ok(()),
            Some(Ok(Err(err))) => Err(err),
            Some(Err(_)) => Err(io::Error::other("annotator stdin writer panicked")),
        };

        // A failed child may close stdin early; its exit status is the real error.
        if !output.status.success() {
            return Err(AnnotateError::Remote {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written?;
        preview_debug!(
            "Annotator {:?} returned {} bytes",
            self.program,
            output.stdout.len()
        );
        Ok(output.stdout)
    }
}
