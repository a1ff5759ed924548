//! String interning for file names.
//!
//! File names only exist at the I/O boundary; everything past the loader
//! works on dense `FileId`s so per-file data lives in plain vectors.

use rustc_hash::FxHashMap;

/// Interned file ID (u32 keeps step records and hash keys compact).
pub type FileId = u32;

/// Map from file names to dense integer ids, assigned in interning order.
///
/// Names are resolved back through `Instance::name`, which owns them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileIdInterner {
    to_int: FxHashMap<String, FileId>,
}

impl FileIdInterner {
    /// Create a new interner with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            to_int: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Intern a name, returning its id and whether it was newly added.
    pub fn intern(&mut self, name: &str) -> (FileId, bool) {
        if let Some(&id) = self.to_int.get(name) {
            return (id, false);
        }
        let id = self.to_int.len() as FileId;
        self.to_int.insert(name.to_string(), id);
        (id, true)
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<FileId> {
        self.to_int.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_dense_and_stable() {
        let mut interner = FileIdInterner::with_capacity(4);

        let (a, new_a) = interner.intern("c0");
        let (b, new_b) = interner.intern("c1");
        let (again, new_again) = interner.intern("c0");

        assert_eq!((a, b), (0, 1));
        assert!(new_a && new_b);
        assert_eq!(again, a);
        assert!(!new_again);

        assert_eq!(interner.intern("c2"), (2, true));
        assert_eq!(interner.get("c1"), Some(b));
        assert_eq!(interner.get("missing"), None);
    }
}
