use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::LockResultExt;

use super::span::SnapshotSpan;

/// Monotonically increasing buffer ID so snapshots of different buffers never compare equal
static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// A single replacement that turned one snapshot into the next.
///
/// `old_len` bytes starting at `position` were replaced by `new_len` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChange {
    pub position: usize,
    pub old_len: usize,
    pub new_len: usize,
}

impl TextChange {
    pub fn old_end(&self) -> usize {
        self.position + self.old_len
    }

    pub fn new_end(&self) -> usize {
        self.position + self.new_len
    }

    /// Net change in length
    pub fn delta(&self) -> isize {
        self.new_len as isize - self.old_len as isize
    }
}

struct Version {
    buffer_id: u64,
    number: u64,
    text: Arc<str>,
    line_starts: Vec<usize>,
    /// Set exactly once, when the buffer moves past this version
    next: OnceLock<(TextChange, Arc<Version>)>,
}

impl Version {
    fn new(buffer_id: u64, number: u64, text: Arc<str>) -> Self {
        let line_starts = compute_line_starts(&text);
        Self {
            buffer_id,
            number,
            text,
            line_starts,
            next: OnceLock::new(),
        }
    }
}

/// Compute the byte offset of the start of every line. Lines end at `\n`.
fn compute_line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    starts.extend(
        text.bytes()
            .enumerate()
            .filter(|(_, b)| *b == b'\n')
            .map(|(i, _)| i + 1),
    );
    starts
}

/// An immutable view of a buffer's content at one version.
///
/// Cloning is cheap. Two snapshots are equal iff they are the same version of
/// the same buffer.
#[derive(Clone)]
pub struct Snapshot {
    version: Arc<Version>,
}

impl Snapshot {
    pub fn version(&self) -> u64 {
        self.version.number
    }

    pub fn text(&self) -> &str {
        &self.version.text
    }

    pub fn len(&self) -> usize {
        self.version.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.version.text.is_empty()
    }

    /// Whether both snapshots belong to the same buffer
    pub fn same_buffer(&self, other: &Snapshot) -> bool {
        self.version.buffer_id == other.version.buffer_id
    }

    /// Number of lines; an empty snapshot still has one (empty) line
    pub fn line_count(&self) -> usize {
        self.version.line_starts.len()
    }

    pub fn last_line_number(&self) -> usize {
        self.line_count() - 1
    }

    /// Byte offset of the start of `line`, clamped to the last line
    pub fn line_start(&self, line: usize) -> usize {
        let line = line.min(self.last_line_number());
        self.version.line_starts[line]
    }

    /// Byte offset of the end of `line`, excluding its line break
    pub fn line_end(&self, line: usize) -> usize {
        let end = self.line_end_including_break(line);
        if end > self.line_start(line) && self.text().as_bytes()[end - 1] == b'\n' {
            end - 1
        } else {
            end
        }
    }

    /// Byte offset of the end of `line`, including its line break
    pub fn line_end_including_break(&self, line: usize) -> usize {
        let line = line.min(self.last_line_number());
        self.version
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.len())
    }

    /// Line containing the byte offset `position`
    pub fn line_number(&self, position: usize) -> usize {
        match self.version.line_starts.binary_search(&position) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        }
    }

    /// The whole snapshot as a span
    pub fn extent(&self) -> SnapshotSpan {
        SnapshotSpan::new(self.clone(), 0, self.len())
    }

    /// Text of a single line, without its line break
    pub fn line_text(&self, line: usize) -> &str {
        &self.text()[self.line_start(line)..self.line_end(line)]
    }

    /// The changes needed to move from this snapshot to `target`.
    ///
    /// Returns `None` when `target` belongs to another buffer or is older than
    /// this snapshot. Returns an empty list when they are the same snapshot.
    pub fn changes_to(&self, target: &Snapshot) -> Option<Vec<TextChange>> {
        if !self.same_buffer(target) || target.version() < self.version() {
            return None;
        }

        let mut changes = Vec::new();
        let mut current = Arc::clone(&self.version);
        while current.number < target.version() {
            let (change, next) = current.next.get()?;
            changes.push(*change);
            current = Arc::clone(next);
        }
        Some(changes)
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.same_buffer(other) && self.version() == other.version()
    }
}

impl Eq for Snapshot {}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("buffer", &self.version.buffer_id)
            .field("version", &self.version.number)
            .field("len", &self.len())
            .finish()
    }
}

/// Mutable text buffer producing a new [`Snapshot`] per edit.
///
/// The handle is cheaply cloneable and can be shared between a tag source and
/// the code that edits the text.
#[derive(Clone)]
pub struct TextBuffer {
    current: Arc<Mutex<Snapshot>>,
}

impl TextBuffer {
    pub fn new(text: &str) -> Self {
        let buffer_id = NEXT_BUFFER_ID.fetch_add(1, Ordering::SeqCst);
        let version = Version::new(buffer_id, 0, Arc::from(text));
        Self {
            current: Arc::new(Mutex::new(Snapshot {
                version: Arc::new(version),
            })),
        }
    }

    pub fn current_snapshot(&self) -> Snapshot {
        self.current
            .lock()
            .recover_poison("TextBuffer::current_snapshot")
            .clone()
    }

    /// Replace `old_len` bytes at `position` with `new_text`.
    ///
    /// Positions are clamped to the buffer and moved back to the nearest char
    /// boundary so an edit never splits a UTF-8 sequence.
    pub fn replace(&self, position: usize, old_len: usize, new_text: &str) -> Snapshot {
        let mut current = self.current.lock().recover_poison("TextBuffer::replace");
        let old = Arc::clone(&current.version);

        let start = floor_char_boundary(&old.text, position.min(old.text.len()));
        let end = floor_char_boundary(&old.text, (position + old_len).min(old.text.len())).max(start);

        let mut text = String::with_capacity(old.text.len() - (end - start) + new_text.len());
        text.push_str(&old.text[..start]);
        text.push_str(new_text);
        text.push_str(&old.text[end..]);

        let change = TextChange {
            position: start,
            old_len: end - start,
            new_len: new_text.len(),
        };
        let next = Arc::new(Version::new(old.buffer_id, old.number + 1, Arc::from(text)));
        if old.next.set((change, Arc::clone(&next))).is_err() {
            log::warn!(
                target: "async_tagger::text",
                "Version {} already had a successor; history fork ignored",
                old.number
            );
        }

        *current = Snapshot { version: next };
        current.clone()
    }

    pub fn insert(&self, position: usize, text: &str) -> Snapshot {
        self.replace(position, 0, text)
    }

    pub fn delete(&self, position: usize, len: usize) -> Snapshot {
        self.replace(position, len, "")
    }

    /// Replace the entire content
    pub fn set_text(&self, text: &str) -> Snapshot {
        let len = self.current_snapshot().len();
        self.replace(0, len, text)
    }
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

impl fmt::Debug for TextBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextBuffer")
            .field("current", &self.current_snapshot())
            .finish()
    }
}
