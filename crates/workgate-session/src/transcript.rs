//! Append-only snippet transcript.

use std::{
    borrow::Cow,
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Line that introduces each snippet section.
pub const SNIPPET_MARKER: &str = "//@@ snippet";

/// Snippet lines starting with this prefix are stored with one extra `@`.
const ESCAPE_PREFIX: &str = "//@@";

/// Durable, append-only record of every submitted snippet.
///
/// Each snippet is stored after a [`SNIPPET_MARKER`] line. A snippet line that
/// begins with `//@@` gains one extra `@` on disk, so no stored line can be
/// mistaken for a marker; [`parse`] strips it again. The file is never
/// rewritten in place.
#[derive(Debug)]
pub struct Transcript {
    path: PathBuf,
    file: File,
}

impl Transcript {
    /// Open (creating if missing) the transcript and return its prior snippets.
    ///
    /// # Errors
    /// Returns error if the file or its parent directory cannot be created or read.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<(Self, Vec<String>)> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let existing = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err),
        };

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        // Keep the next marker on a line of its own.
        if !existing.is_empty() && !existing.ends_with('\n') {
            file.write_all(b"\n")?;
        }

        Ok((Self { path, file }, parse(&existing)))
    }

    /// Path of the transcript file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one snippet and flush it to disk.
    ///
    /// # Errors
    /// Returns error if the write fails.
    pub fn append(&mut self, snippet: &str) -> io::Result<()> {
        let section = format!("{SNIPPET_MARKER}\n{}\n", escape(snippet));
        self.file.write_all(section.as_bytes())?;
        self.file.flush()?;
        self.file.sync_data()
    }
}

fn escape(snippet: &str) -> String {
    snippet
        .split('\n')
        .map(|line| match line.strip_prefix(ESCAPE_PREFIX) {
            Some(rest) => format!("{ESCAPE_PREFIX}@{rest}"),
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescape(line: &str) -> Cow<'_, str> {
    match line.strip_prefix(ESCAPE_PREFIX).and_then(|rest| rest.strip_prefix('@')) {
        Some(rest) => Cow::Owned(format!("{ESCAPE_PREFIX}{rest}")),
        None => Cow::Borrowed(line),
    }
}

/// Split transcript text into snippets, in submission order.
///
/// Text before the first marker (hand-written setup code) counts as one
/// snippet when it is not blank.
#[must_use]
pub fn parse(text: &str) -> Vec<String> {
    let mut snippets = Vec::new();
    let mut current: Option<Vec<Cow<'_, str>>> = None;
    let mut preamble: Vec<Cow<'_, str>> = Vec::new();

    for line in text.lines() {
        if line.trim_end() == SNIPPET_MARKER {
            if let Some(lines) = current.take() {
                snippets.push(lines.join("\n"));
            }
            current = Some(Vec::new());
        } else if let Some(lines) = current.as_mut() {
            lines.push(unescape(line));
        } else {
            preamble.push(unescape(line));
        }
    }
    if let Some(lines) = current {
        snippets.push(lines.join("\n"));
    }

    let preamble = preamble.join("\n");
    if !preamble.trim().is_empty() {
        snippets.insert(0, preamble);
    }
    snippets
}
