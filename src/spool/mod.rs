//! Readers for mainframe print spools.
//!
//! Two input shapes are supported. FCFC output ("host reprint") is plain
//! line-oriented text whose first column carries a printer control channel,
//! with `1` meaning skip to a new sheet. Fixed-length output has no line
//! terminators at all: every `record_len` bytes are one line, padded with
//! blanks, and a page starts when a record opens with the new-page code.
//!
//! Both readers iterate whole pages, keep the control column in the text,
//! and decode bytes as Latin-1, the usual encoding of these listings.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// Decode Latin-1 bytes, which map one to one onto the first 256 code points.
fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

// ── FCFC / host reprint ─────────────────────────────────────────────────────

/// Page iterator over an FCFC spool.
pub struct HostReprintReader<R: BufRead> {
    input: R,
    page: String,
    done: bool,
}

impl HostReprintReader<BufReader<File>> {
    /// Open a spool file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> HostReprintReader<R> {
    pub fn new(input: R) -> Self {
        HostReprintReader {
            input,
            page: String::new(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for HostReprintReader<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<io::Result<String>> {
        if self.done {
            return None;
        }
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match self.input.read_until(b'\n', &mut raw) {
                Ok(0) => {
                    self.done = true;
                    if self.page.is_empty() {
                        return None;
                    }
                    return Some(Ok(std::mem::take(&mut self.page)));
                }
                Ok(_) => {
                    let line = latin1_to_string(&raw);
                    if line.starts_with('1') && !self.page.is_empty() {
                        let full = std::mem::replace(&mut self.page, line);
                        return Some(Ok(full));
                    }
                    self.page.push_str(&line);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

// ── Fixed record length ─────────────────────────────────────────────────────

/// Page iterator over a fixed-record-length spool.
///
/// A short final record is processed like any other, so a file that is not
/// an exact multiple of `record_len` still yields its last lines.
pub struct FixedLengthReader<R: Read> {
    input: R,
    record_len: usize,
    newpage_code: String,
    page: String,
    done: bool,
}

impl FixedLengthReader<BufReader<File>> {
    /// Open a spool file from disk.
    pub fn open<P: AsRef<Path>>(
        path: P,
        record_len: usize,
        newpage_code: &str,
    ) -> io::Result<Self> {
        Ok(Self::new(
            BufReader::new(File::open(path)?),
            record_len,
            newpage_code,
        ))
    }
}

impl<R: Read> FixedLengthReader<R> {
    pub fn new(input: R, record_len: usize, newpage_code: &str) -> Self {
        FixedLengthReader {
            input,
            record_len: record_len.max(1),
            newpage_code: newpage_code.to_owned(),
            page: String::new(),
            done: false,
        }
    }

    /// Fill `buf` with the next record, tolerating short reads.
    fn read_record(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.input.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> Iterator for FixedLengthReader<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<io::Result<String>> {
        if self.done {
            return None;
        }
        let mut raw = vec![0u8; self.record_len];
        loop {
            let filled = match self.read_record(&mut raw) {
                Ok(0) => {
                    self.done = true;
                    if self.page.is_empty() {
                        return None;
                    }
                    return Some(Ok(std::mem::take(&mut self.page)));
                }
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            let mut line = latin1_to_string(&raw[..filled]);
            line.truncate(line.trim_end().len());
            line.push('\n');
            if !self.newpage_code.is_empty()
                && line.starts_with(&self.newpage_code)
                && !self.page.is_empty()
            {
                let full = std::mem::replace(&mut self.page, line);
                return Some(Ok(full));
            }
            self.page.push_str(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect_pages<I: Iterator<Item = io::Result<String>>>(iter: I) -> Vec<String> {
        iter.map(|p| p.expect("spool read failed")).collect()
    }

    #[test]
    fn host_reprint_splits_on_channel_one() {
        let spool = b"1LISTADO UNO\n detalle a\n1LISTADO DOS\n detalle b\n";
        let pages = collect_pages(HostReprintReader::new(Cursor::new(&spool[..])));
        assert_eq!(
            pages,
            vec![
                "1LISTADO UNO\n detalle a\n".to_owned(),
                "1LISTADO DOS\n detalle b\n".to_owned(),
            ]
        );
    }

    #[test]
    fn host_reprint_keeps_leading_lines_before_first_break() {
        let spool = b" encabezado\n1LISTADO\n cuerpo\n";
        let pages = collect_pages(HostReprintReader::new(Cursor::new(&spool[..])));
        assert_eq!(pages[0], " encabezado\n");
        assert_eq!(pages[1], "1LISTADO\n cuerpo\n");
    }

    #[test]
    fn host_reprint_decodes_latin1() {
        let spool = b"1ma\xf1ana\n";
        let pages = collect_pages(HostReprintReader::new(Cursor::new(&spool[..])));
        assert_eq!(pages, vec!["1mañana\n".to_owned()]);
    }

    #[test]
    fn host_reprint_empty_input_yields_nothing() {
        let pages = collect_pages(HostReprintReader::new(Cursor::new(&b""[..])));
        assert!(pages.is_empty());
    }

    #[test]
    fn fixed_length_splits_and_trims_padding() {
        // record_len 8, blank padded, no line terminators in the input
        let spool = b"1UNO    detalle 1DOS    fin";
        let pages = collect_pages(FixedLengthReader::new(Cursor::new(&spool[..]), 8, "1"));
        assert_eq!(
            pages,
            vec![
                "1UNO\ndetalle\n".to_owned(),
                // the short final record still becomes a line
                "1DOS\nfin\n".to_owned(),
            ]
        );
    }

    #[test]
    fn fixed_length_honours_multibyte_newpage_code() {
        let spool = b"**UNO   cuerpo  **DOS   ";
        let pages = collect_pages(FixedLengthReader::new(Cursor::new(&spool[..]), 8, "**"));
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0], "**UNO\ncuerpo\n");
        assert_eq!(pages[1], "**DOS\n");
    }
}
