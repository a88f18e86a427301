use std::io::BufRead;

use crate::error::Result;

/// Splits a line-oriented source into header-prefixed buffers of at most
/// `max_bytes` encoded bytes.
///
/// Every emitted chunk starts with the source's header line, so each chunk is
/// independently parseable. The cap is a target rather than a hard ceiling: a
/// single header+row pair larger than `max_bytes` is still emitted as its own
/// chunk. Stateless apart from the reader position, so separate files can be
/// split concurrently.
pub struct ChunkSplitter<R: BufRead> {
    lines: std::io::Lines<R>,
    header: Option<Vec<u8>>,
    pending: Option<Vec<u8>>,
    max_bytes: usize,
    done: bool,
}

impl<R: BufRead> ChunkSplitter<R> {
    pub fn new(reader: R, max_bytes: usize) -> Self {
        Self {
            lines: reader.lines(),
            header: None,
            pending: None,
            max_bytes,
            done: false,
        }
    }

    fn encoded(line: String) -> Vec<u8> {
        let mut bytes = line.into_bytes();
        bytes.push(b'\n');
        bytes
    }
}

impl<R: BufRead> Iterator for ChunkSplitter<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.header.is_none() {
            match self.lines.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
                Some(Ok(line)) => self.header = Some(Self::encoded(line)),
            }
        }
        let header = self.header.as_ref().unwrap().clone();

        let mut chunk = header.clone();
        if let Some(carried) = self.pending.take() {
            chunk.extend_from_slice(&carried);
        }

        for line in self.lines.by_ref() {
            let encoded = match line {
                Ok(line) => Self::encoded(line),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };
            // Inclusion test uses encoded byte length, not character count.
            if chunk.len() + encoded.len() > self.max_bytes && chunk.len() > header.len() {
                self.pending = Some(encoded);
                return Some(Ok(chunk));
            }
            chunk.extend_from_slice(&encoded);
        }

        self.done = true;
        // A trailing chunk holding only the header carries no rows.
        if chunk.len() > header.len() {
            Some(Ok(chunk))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn split(input: &str, max_bytes: usize) -> Vec<Vec<u8>> {
        ChunkSplitter::new(Cursor::new(input.to_string()), max_bytes)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn round_trip_reassembles_original_rows() {
        let input = "id,name\n1,alpha\n2,beta\n3,gamma\n4,delta\n";
        let chunks = split(input, 24);
        assert!(chunks.len() > 1);

        let header = "id,name\n";
        let mut rows = String::new();
        for chunk in &chunks {
            let text = std::str::from_utf8(chunk).unwrap();
            assert!(text.starts_with(header));
            rows.push_str(&text[header.len()..]);
        }
        assert_eq!(rows, "1,alpha\n2,beta\n3,gamma\n4,delta\n");
    }

    #[test]
    fn chunks_respect_the_byte_cap() {
        let input = "id,name\n1,alpha\n2,beta\n3,gamma\n4,delta\n";
        for chunk in split(input, 24) {
            assert!(chunk.len() <= 24, "chunk of {} bytes over cap", chunk.len());
        }
    }

    #[test]
    fn header_only_input_yields_no_chunks() {
        assert!(split("id,name\n", 1024).is_empty());
        assert!(split("", 1024).is_empty());
    }

    #[test]
    fn single_oversized_row_still_becomes_a_chunk() {
        let wide = "x".repeat(100);
        let input = format!("id,name\n1,{wide}\n2,b\n");
        let chunks = split(&input, 16);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].len() > 16);
        assert!(std::str::from_utf8(&chunks[0]).unwrap().contains(&wide));
    }

    #[test]
    fn inclusion_test_counts_encoded_bytes_not_chars() {
        // Four 3-byte codepoints per row: 12 encoded bytes for 4 chars.
        let input = "h\n€€€€\n€€€€\n";
        let chunks = split(input, 16);
        // Header (2) + one row (13) fits; adding the second row would not.
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn every_chunk_is_reprefixed_with_the_header() {
        let input = "col_a,col_b\n1,2\n3,4\n5,6\n7,8\n";
        for chunk in split(input, 20) {
            assert!(chunk.starts_with(b"col_a,col_b\n"));
        }
    }
}
