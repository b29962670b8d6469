//! In-memory group of consecutive pages, serialized as one block.
//!
//! The page texts travel concatenated in the block payload; the shape
//! (page count + per-page byte lengths, big-endian) rides as the block's
//! raw trailer so the split points survive compression and encryption:
//!
//! ```text
//! shape = [ count: u16 | len_1: u32 | len_2: u32 | ... ]
//! ```

use byteorder::{BigEndian, ReadBytesExt};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct PageContainer {
    capacity: u16,
    pages: Vec<String>,
}

impl PageContainer {
    pub fn new(capacity: u16) -> Self {
        PageContainer {
            capacity,
            pages: Vec::with_capacity(capacity as usize),
        }
    }

    /// Append one page. Fails when the container already holds `capacity`
    /// pages; the caller is expected to flush and retry.
    pub fn add(&mut self, page: &str) -> Result<(), ContainerError> {
        if self.pages.len() >= self.capacity as usize {
            return Err(ContainerError::Full {
                capacity: self.capacity,
            });
        }
        self.pages.push(page.to_owned());
        Ok(())
    }

    /// Serialize to `(data, shape)`. The data is every page concatenated;
    /// the shape lists the byte length of each. A page too long for the
    /// shape's u32 length field is an error, never a wrapped length.
    pub fn dump(&self) -> Result<(Vec<u8>, Vec<u8>), ContainerError> {
        let mut data = Vec::new();
        let mut shape = Vec::with_capacity(2 + 4 * self.pages.len());
        shape.extend_from_slice(&(self.pages.len() as u16).to_be_bytes());
        for page in &self.pages {
            data.extend_from_slice(page.as_bytes());
            shape.extend_from_slice(&shape_len(page.len())?.to_be_bytes());
        }
        Ok((data, shape))
    }

    /// Rebuild from a decoded block. Replaces the current contents and
    /// adopts the stored page count as the capacity.
    pub fn load(&mut self, data: &[u8], shape: &[u8]) -> Result<(), ContainerError> {
        let mut reader = shape;
        let count = reader
            .read_u16::<BigEndian>()
            .map_err(|_| ContainerError::MalformedShape("missing page count".into()))?;
        self.capacity = count;
        self.pages.clear();
        let mut offset = 0usize;
        for n in 1..=count {
            let len = reader.read_u32::<BigEndian>().map_err(|_| {
                ContainerError::MalformedShape(format!("missing length of page {n}"))
            })? as usize;
            let end = offset.checked_add(len).filter(|&e| e <= data.len()).ok_or_else(|| {
                ContainerError::MalformedShape(format!(
                    "page {n} overruns the container data ({} bytes)",
                    data.len()
                ))
            })?;
            self.pages.push(std::str::from_utf8(&data[offset..end])?.to_owned());
            offset = end;
        }
        Ok(())
    }

    /// Fetch a page by its 1-based position. 0 and past-the-end are `None`.
    pub fn get_page(&self, n: usize) -> Option<&str> {
        if n == 0 {
            return None;
        }
        self.pages.get(n - 1).map(String::as_str)
    }

    /// Drop all pages, keeping the configured capacity.
    pub fn clear(&mut self) {
        self.pages.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.pages.iter()
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// A page's byte length as the shape records it.
fn shape_len(len: usize) -> Result<u32, ContainerError> {
    u32::try_from(len).map_err(|_| ContainerError::Oversize { len })
}

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Page container is full ({capacity} pages)")]
    Full { capacity: u16 },
    #[error("Page of {len} bytes does not fit the shape's u32 length field")]
    Oversize { len: usize },
    #[error("Malformed container shape: {0}")]
    MalformedShape(String),
    #[error("Page text is not valid UTF-8")]
    InvalidText(#[from] std::str::Utf8Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn capacity_is_enforced() {
        let mut container = PageContainer::new(2);
        container.add("uno").unwrap();
        container.add("dos").unwrap();
        let err = container.add("tres").unwrap_err();
        assert!(matches!(err, ContainerError::Full { capacity: 2 }));

        container.clear();
        container.add("tres").unwrap();
        assert_eq!(container.len(), 1);
        assert_eq!(container.capacity(), 2);
    }

    #[test]
    fn pages_are_one_based() {
        let mut container = PageContainer::new(3);
        container.add("primera").unwrap();
        container.add("segunda").unwrap();
        assert_eq!(container.get_page(0), None);
        assert_eq!(container.get_page(1), Some("primera"));
        assert_eq!(container.get_page(2), Some("segunda"));
        assert_eq!(container.get_page(3), None);
    }

    #[test]
    fn dump_splits_data_and_shape() {
        let mut container = PageContainer::new(4);
        container.add("abc").unwrap();
        container.add("").unwrap();
        container.add("de").unwrap();
        let (data, shape) = container.dump().unwrap();
        assert_eq!(data, b"abcde");
        assert_eq!(
            shape,
            [0u8, 3, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 2]
        );
    }

    #[test]
    fn four_gib_pages_are_refused() {
        assert_eq!(shape_len(4096).unwrap(), 4096);
        assert_eq!(shape_len(u32::MAX as usize).unwrap(), u32::MAX);

        let err = shape_len((u32::MAX as u64 + 1) as usize).unwrap_err();
        assert!(matches!(err, ContainerError::Oversize { .. }));
    }

    #[test]
    fn load_adopts_stored_count_as_capacity() {
        let mut container = PageContainer::new(10);
        container.add("x").unwrap();
        container.add("y").unwrap();
        let (data, shape) = container.dump().unwrap();

        let mut restored = PageContainer::new(1);
        restored.load(&data, &shape).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.capacity(), 2);
        assert_eq!(restored.get_page(2), Some("y"));
    }

    #[test]
    fn malformed_shapes_are_rejected() {
        let mut container = PageContainer::new(1);

        let err = container.load(b"", &[]).unwrap_err();
        assert!(matches!(err, ContainerError::MalformedShape(_)));

        // count says two pages, only one length present
        let err = container.load(b"abc", &[0, 2, 0, 0, 0, 3]).unwrap_err();
        assert!(matches!(err, ContainerError::MalformedShape(_)));

        // length points past the data
        let err = container.load(b"abc", &[0, 1, 0, 0, 0, 9]).unwrap_err();
        assert!(matches!(err, ContainerError::MalformedShape(_)));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut container = PageContainer::new(1);
        let err = container
            .load(&[0xFF, 0xFE], &[0, 1, 0, 0, 0, 2])
            .unwrap_err();
        assert!(matches!(err, ContainerError::InvalidText(_)));
    }

    proptest! {
        #[test]
        fn dump_load_roundtrip(pages in proptest::collection::vec(".*", 0..12)) {
            let mut container = PageContainer::new(12);
            for page in &pages {
                container.add(page).unwrap();
            }
            let (data, shape) = container.dump().unwrap();

            let mut restored = PageContainer::new(1);
            restored.load(&data, &shape).unwrap();
            prop_assert_eq!(restored.len(), pages.len());
            for (i, page) in pages.iter().enumerate() {
                prop_assert_eq!(restored.get_page(i + 1), Some(page.as_str()));
            }
        }
    }
}
