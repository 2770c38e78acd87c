use log::debug;
use serde::{Deserialize, Serialize};

/// One file reported by a `DIR` listing.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    /// File name without the controller path.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// Parse every file line of a `DIR` reply. Lines carrying a single argument
/// are the echo and the end marker, lines with more carry `<path>,<size>`.
/// Anything that does not parse is skipped.
///
/// * `text`: the complete reply, lines separated by CRLF.
pub fn parse_directory(text: &str) -> Vec<FileEntry> {
    text.split("\r\n").filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<FileEntry> {
    let fields: Vec<&str> = line.split(',').collect();
    let argc: u32 = fields.get(6)?.trim().parse().ok()?;
    if argc == 1 {
        return None;
    }
    let path = fields.get(7)?;
    let size = fields.get(8)?.split('*').next()?.trim();
    match size.parse() {
        Ok(size) => Some(FileEntry {
            name: path.rsplit('\\').next()?.to_string(),
            size,
        }),
        Err(_) => {
            debug!("skipping listing line {line:?}");
            None
        }
    }
}

/// Names of the entries whose name contains `marker`, in listing order.
pub fn names_containing<'a>(entries: &'a [FileEntry], marker: &str) -> Vec<&'a str> {
    entries
        .iter()
        .filter(|e| e.name.contains(marker))
        .map(|e| e.name.as_str())
        .collect()
}
