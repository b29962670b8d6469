//! Read path: open a store and pull pages back out.
//!
//! Logical page `n` (1-based) of a report with `k` pages per container
//! lives in container `(n-1)/k`, at position `n - container*k` inside it.
//! Every [`Report`] owns its own file handle and a single-slot container
//! cache, so sequential page reads decode each block once and independent
//! reports never fight over a shared seek position.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::block::read_block_at;
use crate::container::PageContainer;
use crate::crypto::CipherSuite;
use crate::database::{validate_header, DatabaseError};
use crate::index::{Index, ReportEntry};
use crate::metadata::Metadata;

/// Characters of context kept on each side of a match snippet.
const SNIPPET_CONTEXT: usize = 15;

/// One substring hit inside a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    pub report: u32,
    pub page: u64,
    /// Byte offset of the match inside the page text.
    pub offset: usize,
    /// Bounded context with the match bracketed as `-[...]-`, newlines
    /// stripped.
    pub snippet: String,
}

// ── Store-level view ─────────────────────────────────────────────────────────

/// Read-only view over every report in a store.
pub struct Reports {
    path: PathBuf,
    cipher: CipherSuite,
    entries: Vec<ReportEntry>,
}

impl Reports {
    /// Open a store and its side-file indexes for reading.
    pub fn open<P: AsRef<Path>>(path: P, passphrase: Option<&str>) -> Result<Self, DatabaseError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        validate_header(&mut file)?;
        let index = Index::read(&path)?;
        Ok(Reports {
            path,
            cipher: CipherSuite::new(0, passphrase)?,
            entries: index.iter().cloned().collect(),
        })
    }

    pub(crate) fn from_entries(
        path: PathBuf,
        cipher: CipherSuite,
        entries: Vec<ReportEntry>,
    ) -> Self {
        Reports {
            path,
            cipher,
            entries,
        }
    }

    /// Index entries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Open one report by id. Unknown ids are `None`, not an error.
    pub fn get_report(&self, id: u32) -> Result<Option<Report>, DatabaseError> {
        match self.entries.iter().find(|e| e.id == id) {
            Some(entry) => Ok(Some(Report::open(&self.path, entry, self.cipher.clone())?)),
            None => Ok(None),
        }
    }

    /// Search every report, or just the ids in `reports`, for a substring.
    /// Matches come back in report order, then page order.
    pub fn find_text(
        &self,
        text: &str,
        reports: Option<&[u32]>,
    ) -> Result<Vec<TextMatch>, DatabaseError> {
        let mut matches = Vec::new();
        if text.is_empty() {
            return Ok(matches);
        }
        for entry in &self.entries {
            if let Some(ids) = reports {
                if !ids.contains(&entry.id) {
                    continue;
                }
            }
            let mut report = Report::open(&self.path, entry, self.cipher.clone())?;
            report.find_text_into(text, &mut matches)?;
        }
        Ok(matches)
    }
}

// ── Single report ────────────────────────────────────────────────────────────

pub struct Report {
    file: File,
    cipher: CipherSuite,
    id: u32,
    name: String,
    metadata: Metadata,
    pages_per_container: u16,
    containers: Vec<u64>,
    total_pages: u64,
    container: PageContainer,
    cached: Option<usize>,
}

impl Report {
    /// Costs two block reads: the last container (which fixes the total
    /// page count and primes the cache) and the metadata block.
    pub(crate) fn open(
        path: &Path,
        entry: &ReportEntry,
        mut cipher: CipherSuite,
    ) -> Result<Self, DatabaseError> {
        let mut file = File::open(path)?;
        let mut container = PageContainer::new(entry.pages_per_container);
        let mut cached = None;
        let mut total_pages = 0u64;
        if !entry.containers.is_empty() {
            let last = entry.containers.len() - 1;
            let block = read_block_at(&mut file, entry.containers[last], &mut cipher)?;
            container.load(&block.data, &block.trailer)?;
            total_pages =
                last as u64 * entry.pages_per_container as u64 + container.len() as u64;
            cached = Some(last);
        }
        let block = read_block_at(&mut file, entry.metadata_offset, &mut cipher)?;
        let metadata = Metadata::load(&block.data)?;

        Ok(Report {
            file,
            cipher,
            id: entry.id,
            name: entry.name.clone(),
            metadata,
            pages_per_container: entry.pages_per_container,
            containers: entry.containers.clone(),
            total_pages,
            container,
            cached,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn total_pages(&self) -> u64 {
        self.total_pages
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Fetch page `n` (1-based). 0 and past-the-end are `None`. Repeated
    /// reads inside one container decode its block only once.
    pub fn get_page(&mut self, n: u64) -> Result<Option<String>, DatabaseError> {
        if n == 0 || n > self.total_pages {
            return Ok(None);
        }
        let per_container = self.pages_per_container as u64;
        let index = ((n - 1) / per_container) as usize;
        if self.cached != Some(index) {
            let offset = match self.containers.get(index) {
                Some(&offset) => offset,
                None => return Ok(None),
            };
            let block = read_block_at(&mut self.file, offset, &mut self.cipher)?;
            self.container.load(&block.data, &block.trailer)?;
            self.cached = Some(index);
        }
        let relative = (n - index as u64 * per_container) as usize;
        Ok(self.container.get_page(relative).map(str::to_owned))
    }

    /// All occurrences of `text` across every page of this report.
    pub fn find_text(&mut self, text: &str) -> Result<Vec<TextMatch>, DatabaseError> {
        let mut matches = Vec::new();
        self.find_text_into(text, &mut matches)?;
        Ok(matches)
    }

    pub(crate) fn find_text_into(
        &mut self,
        text: &str,
        matches: &mut Vec<TextMatch>,
    ) -> Result<(), DatabaseError> {
        if text.is_empty() {
            return Ok(());
        }
        for n in 1..=self.total_pages {
            if let Some(page) = self.get_page(n)? {
                scan_page(self.id, n, &page, text, matches);
            }
        }
        Ok(())
    }
}

// ── Matching ─────────────────────────────────────────────────────────────────

/// Collect every occurrence of `text` in one page. The scan resumes one
/// character past each match start, so overlapping occurrences are all
/// reported.
fn scan_page(report: u32, page_number: u64, page: &str, text: &str, matches: &mut Vec<TextMatch>) {
    if text.is_empty() {
        return;
    }
    let mut pos = 0usize;
    while let Some(found) = page[pos..].find(text) {
        let offset = pos + found;
        matches.push(TextMatch {
            report,
            page: page_number,
            offset,
            snippet: snippet(page, offset, text.len()),
        });
        let step = page[offset..].chars().next().map_or(1, char::len_utf8);
        pos = offset + step;
    }
}

fn snippet(page: &str, offset: usize, match_len: usize) -> String {
    let before: usize = page[..offset]
        .chars()
        .rev()
        .take(SNIPPET_CONTEXT)
        .map(char::len_utf8)
        .sum();
    let start = offset - before;
    let end = offset + match_len;
    let after: usize = page[end..]
        .chars()
        .take(SNIPPET_CONTEXT)
        .map(char::len_utf8)
        .sum();

    let mut out = String::with_capacity(before + match_len + after + 4);
    out.push_str(&page[start..offset]);
    out.push_str("-[");
    out.push_str(&page[offset..end]);
    out.push_str("]-");
    out.push_str(&page[end..end + after]);
    out.replace('\n', "")
}
