//! Buffer events and the undo arena.
//!
//! Every edit is described by a [`BufferEvent`]. The bytes an event needs to
//! be replayed or inverted (inserted text, deleted text, replacement text)
//! live in the buffer's [`UndoArena`], an append-only byte store, and events
//! reference them through [`StringRef`] slices. Arena slices never move, so
//! a `StringRef` stays valid for the lifetime of its buffer.

/// A `(offset, length)` slice into a buffer's undo arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StringRef {
    pub offset: usize,
    pub length: usize,
}

impl StringRef {
    pub const EMPTY: StringRef = StringRef {
        offset: 0,
        length: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Append-only byte store backing event payloads.
///
/// Grows monotonically until the owning buffer is closed; nothing is ever
/// freed or relocated.
#[derive(Debug, Default)]
pub struct UndoArena {
    bytes: Vec<u8>,
}

impl UndoArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Append `bytes` and return a stable reference to them.
    pub fn store(&mut self, bytes: &[u8]) -> StringRef {
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(bytes);
        StringRef {
            offset,
            length: bytes.len(),
        }
    }

    pub fn resolve(&self, r: StringRef) -> &[u8] {
        if r.length == 0 {
            return &[];
        }
        &self.bytes[r.offset..r.offset + r.length]
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

/// A `(line, column)` coordinate. Both components are zero-based; columns
/// count bytes from the line start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// The `(line, column)` span an event covered, stamped from the line index
/// as it was before the event was applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextRange {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Insert {
        text: StringRef,
    },
    Delete {
        count: usize,
        deleted: StringRef,
    },
    Replace {
        overwritten: StringRef,
        replacement: StringRef,
    },
    Save {
        file_name: StringRef,
    },
    Close,
    Indexed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferEvent {
    /// Byte offset the event applies at. Zero for non-edit events.
    pub position: usize,
    /// Stamped during application, before the text mutates.
    pub range: TextRange,
    pub kind: EventKind,
}

impl BufferEvent {
    pub fn new(position: usize, kind: EventKind) -> Self {
        Self {
            position,
            range: TextRange::default(),
            kind,
        }
    }

    /// The event that undoes this one. Only edits have an inverse; payload
    /// references are swapped, never copied, so the inverse shares the same
    /// arena slices.
    pub fn inverted(&self) -> Option<BufferEvent> {
        let kind = match self.kind {
            EventKind::Insert { text } => EventKind::Delete {
                count: text.length,
                deleted: text,
            },
            EventKind::Delete { deleted, .. } => EventKind::Insert { text: deleted },
            EventKind::Replace {
                overwritten,
                replacement,
            } => EventKind::Replace {
                overwritten: replacement,
                replacement: overwritten,
            },
            EventKind::Save { .. } | EventKind::Close | EventKind::Indexed => return None,
        };
        Some(BufferEvent::new(self.position, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_slices_are_stable() {
        let mut arena = UndoArena::new();
        let a = arena.store(b"hello");
        let b = arena.store(b"world");
        assert_eq!(arena.resolve(a), b"hello");
        assert_eq!(arena.resolve(b), b"world");
        assert_eq!(b.offset, 5);
    }

    #[test]
    fn insert_inverts_to_delete_and_back() {
        let mut arena = UndoArena::new();
        let text = arena.store(b"abc");
        let insert = BufferEvent::new(4, EventKind::Insert { text });
        let inverse = insert.inverted().unwrap();
        assert_eq!(
            inverse.kind,
            EventKind::Delete {
                count: 3,
                deleted: text
            }
        );
        assert_eq!(inverse.inverted().unwrap().kind, insert.kind);
    }

    #[test]
    fn replace_inverts_by_swapping_payloads() {
        let mut arena = UndoArena::new();
        let old = arena.store(b"old");
        let new = arena.store(b"new");
        let replace = BufferEvent::new(0, EventKind::Replace {
            overwritten: old,
            replacement: new,
        });
        assert_eq!(
            replace.inverted().unwrap().kind,
            EventKind::Replace {
                overwritten: new,
                replacement: old
            }
        );
    }

    #[test]
    fn non_edit_events_have_no_inverse() {
        assert!(BufferEvent::new(0, EventKind::Indexed).inverted().is_none());
        assert!(BufferEvent::new(0, EventKind::Close).inverted().is_none());
    }
}
