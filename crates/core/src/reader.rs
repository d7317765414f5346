use std::io::{BufRead, BufReader, Read};
use std::time::Instant;

use crate::error::Result;
use crate::model::DEFAULT_MAX_LINE_LENGTH;

/// Default cadence for progress callbacks (spec.md §4.1 C1).
pub const DEFAULT_PROGRESS_EVERY: u64 = 1000;

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessingStats {
    pub total_lines: u64,
    pub total_bytes: u64,
    pub elapsed_ms: u64,
    pub lines_per_second: f64,
}

/// C1 Stream Reader: two-pass line iteration over a file that never loads
/// the whole thing into memory. Pass one counts lines (for progress
/// denominators); pass two hands each `(line, 1-based line_number)` to a
/// caller-supplied handler, truncating anything past `max_line_length` and
/// firing a progress callback every `progress_every` lines.
pub struct StreamReader {
    /// Cap on a decoded line, in bytes (lines come from `from_utf8_lossy`
    /// of arbitrary input bytes, so truncation must land on a char
    /// boundary rather than an exact byte count — see `floor_char_boundary`).
    max_line_length: usize,
    progress_every: u64,
}

impl StreamReader {
    pub fn new() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }

    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    pub fn with_progress_every(mut self, every: u64) -> Self {
        self.progress_every = every.max(1);
        self
    }

    /// Pass one: counts total lines without retaining their content.
    pub fn count_lines(&self, reader: impl Read + 'static) -> Result<u64> {
        let mut reader = strip_bom(BufReader::new(reader))?;
        let mut count = 0u64;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf)?;
            if n == 0 {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Pass two: streams lines to `on_line`. `resume_from_line` skips
    /// already-processed lines (1-based, inclusive of the given value
    /// having already run) — used only by retry paths; normal ingestion
    /// passes 0. `on_error` is consulted when `on_line` itself returns an
    /// `Err`: if present, the error is logged and iteration continues;
    /// otherwise it propagates and aborts the read.
    pub fn for_each_line<F, E>(
        &self,
        reader: impl Read + 'static,
        resume_from_line: u64,
        mut on_line: F,
        mut on_progress: impl FnMut(u64, u64),
        total_lines: u64,
        mut on_error: Option<E>,
    ) -> Result<ProcessingStats>
    where
        F: FnMut(&str, u64) -> std::result::Result<(), String>,
        E: FnMut(u64, &str),
    {
        let started = Instant::now();
        let mut reader = strip_bom(BufReader::new(reader))?;
        let mut line_number = 0u64;
        let mut total_bytes = 0u64;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf)?;
            if n == 0 {
                break;
            }
            line_number += 1;
            total_bytes += n as u64;

            if line_number <= resume_from_line {
                continue;
            }

            while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
                buf.pop();
            }
            let mut line = String::from_utf8_lossy(&buf).into_owned();
            if line.len() > self.max_line_length {
                tracing::warn!(line_number, len = line.len(), max = self.max_line_length, "truncating oversized line");
                let cut = floor_char_boundary(&line, self.max_line_length);
                line.truncate(cut);
            }

            if let Err(e) = on_line(&line, line_number) {
                match on_error.as_mut() {
                    Some(handler) => handler(line_number, &e),
                    None => return Err(crate::error::Error::Internal(e)),
                }
            }

            if line_number % self.progress_every == 0 {
                on_progress(line_number, total_lines);
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let lines_per_second = if elapsed_ms > 0 {
            line_number as f64 / (elapsed_ms as f64 / 1000.0)
        } else {
            line_number as f64
        };

        Ok(ProcessingStats {
            total_lines: line_number,
            total_bytes,
            elapsed_ms,
            lines_per_second,
        })
    }
}

impl Default for StreamReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Nearest byte index `<= idx` that lands on a UTF-8 char boundary of `s`.
/// `String::truncate` panics on a non-boundary index, which `max_line_length`
/// can be when it falls inside a multi-byte char.
fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Detects and strips a UTF-8/UTF-16 BOM, defaulting to UTF-8 when absent
/// (spec.md §4.1). UTF-16 content is transcoded to UTF-8 so downstream
/// parsing only ever sees UTF-8 bytes.
fn strip_bom<R: BufRead + 'static>(mut reader: R) -> Result<Box<dyn BufRead>> {
    let buf = reader.fill_buf()?;
    if buf.starts_with(&[0xEF, 0xBB, 0xBF]) {
        reader.consume(3);
        return Ok(Box::new(reader));
    }
    if buf.starts_with(&[0xFE, 0xFF]) {
        reader.consume(2);
        return Ok(Box::new(transcode_utf16(reader, true)?));
    }
    if buf.starts_with(&[0xFF, 0xFE]) {
        reader.consume(2);
        return Ok(Box::new(transcode_utf16(reader, false)?));
    }
    Ok(Box::new(reader))
}

fn transcode_utf16<R: BufRead>(mut reader: R, big_endian: bool) -> Result<BufReader<std::io::Cursor<Vec<u8>>>> {
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| if big_endian { u16::from_be_bytes([c[0], c[1]]) } else { u16::from_le_bytes([c[0], c[1]]) })
        .collect();
    let text = String::from_utf16_lossy(&units);
    Ok(BufReader::new(std::io::Cursor::new(text.into_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn counts_and_streams_lines() {
        let data = "line one\nline two\nline three\n";
        let reader = StreamReader::new();
        let total = reader.count_lines(Cursor::new(data)).unwrap();
        assert_eq!(total, 3);

        let mut seen = Vec::new();
        let stats = reader
            .for_each_line(
                Cursor::new(data),
                0,
                |line, n| {
                    seen.push((n, line.to_string()));
                    Ok(())
                },
                |_, _| {},
                total,
                None::<fn(u64, &str)>,
            )
            .unwrap();
        assert_eq!(seen, vec![(1, "line one".to_string()), (2, "line two".to_string()), (3, "line three".to_string())]);
        assert_eq!(stats.total_lines, 3);
    }

    #[test]
    fn strips_utf8_bom() {
        let mut data = vec![0xEF, 0xBB, 0xBF];
        data.extend_from_slice(b"hello\n");
        let reader = StreamReader::new();
        let mut seen = String::new();
        reader
            .for_each_line(
                Cursor::new(data),
                0,
                |line, _| {
                    seen = line.to_string();
                    Ok(())
                },
                |_, _| {},
                1,
                None::<fn(u64, &str)>,
            )
            .unwrap();
        assert_eq!(seen, "hello");
    }

    #[test]
    fn truncates_oversized_lines() {
        let long_line = "a".repeat(50);
        let data = format!("{long_line}\n");
        let reader = StreamReader::new().with_max_line_length(10);
        let mut seen_len = 0;
        reader
            .for_each_line(
                Cursor::new(data),
                0,
                |line, _| {
                    seen_len = line.len();
                    Ok(())
                },
                |_, _| {},
                1,
                None::<fn(u64, &str)>,
            )
            .unwrap();
        assert_eq!(seen_len, 10);
    }

    #[test]
    fn truncates_without_splitting_a_multibyte_char() {
        let long_line = format!("{}€", "a".repeat(9));
        let data = format!("{long_line}\n");
        let reader = StreamReader::new().with_max_line_length(10);
        let mut seen = String::new();
        reader
            .for_each_line(
                Cursor::new(data),
                0,
                |line, _| {
                    seen = line.to_string();
                    Ok(())
                },
                |_, _| {},
                1,
                None::<fn(u64, &str)>,
            )
            .unwrap();
        assert_eq!(seen, "a".repeat(9));
    }

    #[test]
    fn error_handler_allows_continue_on_error() {
        let data = "ok\nbad\nok2\n";
        let reader = StreamReader::new();
        let mut errors = Vec::new();
        let mut ok_count = 0;
        reader
            .for_each_line(
                Cursor::new(data),
                0,
                |line, _| if line == "bad" { Err("boom".to_string()) } else {
                    ok_count += 1;
                    Ok(())
                },
                |_, _| {},
                3,
                Some(|n: u64, e: &str| errors.push((n, e.to_string()))),
            )
            .unwrap();
        assert_eq!(ok_count, 2);
        assert_eq!(errors, vec![(2, "boom".to_string())]);
    }

    #[test]
    fn resume_from_line_skips_already_processed() {
        let data = "one\ntwo\nthree\n";
        let reader = StreamReader::new();
        let mut seen = Vec::new();
        reader
            .for_each_line(
                Cursor::new(data),
                1,
                |line, n| {
                    seen.push((n, line.to_string()));
                    Ok(())
                },
                |_, _| {},
                3,
                None::<fn(u64, &str)>,
            )
            .unwrap();
        assert_eq!(seen, vec![(2, "two".to_string()), (3, "three".to_string())]);
    }
}
