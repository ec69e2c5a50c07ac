//! Line processing over traversals.
//!
//! Each delivered file is opened and fed to the callback one line at a time,
//! files in traversal order. `\n`, `\r\n` and a lone `\r` all end a line and are
//! stripped. Bytes that are not valid UTF-8 are replaced with U+FFFD rather than
//! failing the traversal. The reader is dropped before the next file is opened,
//! whether the file was read to the end or processing failed.

use super::visit::{walk_children, walk_tree};
use crate::error::{FixtureError, Result};
use crate::storage::types::{ClusterPath, StorageService};

use std::io::{BufRead, BufReader};
use std::ops::ControlFlow;

/// Reads the next line into `line` without its terminator. Returns false at end
/// of stream.
fn next_line<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> std::io::Result<bool> {
    line.clear();
    let mut read_any = false;

    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(read_any);
        }
        read_any = true;

        match available.iter().position(|b| *b == b'\n' || *b == b'\r') {
            Some(end) => {
                let terminator = available[end];
                line.extend_from_slice(&available[..end]);
                reader.consume(end + 1);
                // `\r\n` is a single terminator.
                if terminator == b'\r' && reader.fill_buf()?.first() == Some(&b'\n') {
                    reader.consume(1);
                }
                return Ok(true);
            }
            None => {
                let len = available.len();
                line.extend_from_slice(available);
                reader.consume(len);
            }
        }
    }
}

fn read_lines<F>(
    storage: &dyn StorageService,
    path: &ClusterPath,
    on_line: &mut F,
) -> Result<ControlFlow<()>>
where
    F: FnMut(&str) -> anyhow::Result<ControlFlow<()>>,
{
    let stream = storage
        .open(path)
        .map_err(|e| FixtureError::processing(path, e))?;
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();

    let mut count = 0usize;
    while next_line(&mut reader, &mut line).map_err(|e| FixtureError::processing(path, e))? {
        count += 1;
        let text = String::from_utf8_lossy(&line);
        if on_line(&text)
            .map_err(|e| FixtureError::processing(path, e))?
            .is_break()
        {
            tracing::debug!("Line processing stopped in {} after {} lines", path, count);
            return Ok(ControlFlow::Break(()));
        }
    }

    tracing::trace!("Processed {} lines from {}", count, path);
    Ok(ControlFlow::Continue(()))
}

/// Feeds every line of every visible immediate child of `root` to `on_line`.
///
/// Children are taken in listing order, so lines of one file never interleave
/// with another's. A visible subdirectory cannot be read and fails with
/// `Processing`.
pub fn process_data<F>(
    storage: &dyn StorageService,
    root: &ClusterPath,
    mut on_line: F,
) -> Result<ControlFlow<()>>
where
    F: FnMut(&str) -> anyhow::Result<ControlFlow<()>>,
{
    walk_children(storage, root, |entry| {
        read_lines(storage, &entry.path, &mut on_line)
    })
}

/// Feeds every line of every visible file at or below `root` to `on_line`,
/// depth-first in listing order.
pub fn process_data_recursive<F>(
    storage: &dyn StorageService,
    root: &ClusterPath,
    mut on_line: F,
) -> Result<ControlFlow<()>>
where
    F: FnMut(&str) -> anyhow::Result<ControlFlow<()>>,
{
    walk_tree(storage, root, |entry| {
        read_lines(storage, &entry.path, &mut on_line)
    })
}
