use std::fs::File;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};

use crate::core::Result;

/// A read-only view of a whole data file.
pub struct MappedFile {
    map: Option<Mmap>,
}

impl MappedFile {
    /// Map `path`, or `None` if it does not exist.
    pub fn open(path: &Path) -> Result<Option<Self>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let len = file.metadata()?.len() as usize;
        // Zero length maps are rejected on some platforms.
        if len == 0 {
            return Ok(Some(Self { map: None }));
        }
        // SAFETY: single-writer discipline; nothing truncates the file while mapped.
        let map = unsafe { MmapOptions::new().len(len).map(&file)? };
        Ok(Some(Self { map: Some(map) }))
    }

    pub fn as_slice(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn range(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        self.as_slice().get(offset..end)
    }
}
