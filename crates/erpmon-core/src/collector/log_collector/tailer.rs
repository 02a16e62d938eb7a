//! Reads the tail of an append-only log file.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Bytes read per step while scanning backwards for line starts.
const CHUNK_SIZE: usize = 64 * 1024;

/// Returns the last `n` lines of the file at `path`, oldest first.
///
/// Only the tail of the file is read. Invalid UTF-8 is replaced rather than
/// rejected, and line terminators (`\n` or `\r\n`) are stripped.
pub fn read_last_lines(path: &Path, n: usize) -> io::Result<Vec<String>> {
    let mut file = File::open(path)?;
    if n == 0 {
        return Ok(Vec::new());
    }

    let len = file.metadata()?.len();
    let start = tail_offset(&mut file, len, n)?;
    file.seek(SeekFrom::Start(start))?;

    let mut reader = BufReader::new(file);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(n.min(4096));
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        if tail.len() == n {
            tail.pop_front();
        }
        tail.push_back(String::from_utf8_lossy(&buf).into_owned());
    }

    Ok(tail.into())
}

/// Offset of the first byte of the last `n` lines of a file of `len` bytes.
///
/// A newline in the final byte terminates the last line and does not start
/// a new one.
fn tail_offset<R: Read + Seek>(file: &mut R, len: u64, n: usize) -> io::Result<u64> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut pos = len;
    let mut newlines = 0;

    while pos > 0 {
        let size = (CHUNK_SIZE as u64).min(pos);
        pos -= size;
        file.seek(SeekFrom::Start(pos))?;
        let chunk = &mut chunk[..size as usize];
        file.read_exact(chunk)?;

        for (i, byte) in chunk.iter().enumerate().rev() {
            let offset = pos + i as u64;
            if *byte != b'\n' || offset + 1 == len {
                continue;
            }
            newlines += 1;
            if newlines == n {
                return Ok(offset + 1);
            }
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_lines(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_reads_last_n_lines() {
        let file = write_lines(&["one", "two", "three", "four"]);
        let lines = read_last_lines(file.path(), 2).unwrap();
        assert_eq!(lines, vec!["three", "four"]);
    }

    #[test]
    fn test_short_file_returns_everything() {
        let file = write_lines(&["one", "two"]);
        let lines = read_last_lines(file.path(), 500).unwrap();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn test_crlf_and_missing_final_newline() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"first\r\nsecond").unwrap();
        file.flush().unwrap();

        let lines = read_last_lines(file.path(), 10).unwrap();
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"caf\xe9\n").unwrap();
        file.flush().unwrap();

        let lines = read_last_lines(file.path(), 10).unwrap();
        assert_eq!(lines, vec!["caf\u{fffd}"]);
    }

    #[test]
    fn test_missing_file_errors() {
        let err = read_last_lines(Path::new("/nonexistent/odoo.log"), 10).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_tail_offset_points_at_line_start() {
        let mut data = io::Cursor::new(b"a\nbb\nccc\n".to_vec());
        assert_eq!(tail_offset(&mut data, 9, 1).unwrap(), 5);
        assert_eq!(tail_offset(&mut data, 9, 2).unwrap(), 2);
        assert_eq!(tail_offset(&mut data, 9, 3).unwrap(), 0);
        assert_eq!(tail_offset(&mut data, 9, 10).unwrap(), 0);

        let mut unterminated = io::Cursor::new(b"a\nbb".to_vec());
        assert_eq!(tail_offset(&mut unterminated, 4, 1).unwrap(), 2);
    }

    #[test]
    fn test_tail_spanning_several_chunks() {
        let lines: Vec<String> = (0..20_000).map(|i| format!("line {:05}", i)).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let file = write_lines(&refs);
        assert!(file.as_file().metadata().unwrap().len() > 2 * CHUNK_SIZE as u64);

        let tail = read_last_lines(file.path(), 3).unwrap();
        assert_eq!(tail, vec!["line 19997", "line 19998", "line 19999"]);

        let tail = read_last_lines(file.path(), 15_000).unwrap();
        assert_eq!(tail.len(), 15_000);
        assert_eq!(tail[0], "line 05000");
    }
}
