use crate::messages::thetis::sentence::BULK_TALKER;

/// Bytes at the end of every bulk block that are not file data: `*`, the
/// two checksum characters and the line ending.
pub const TRAILER_LEN: usize = 5;

/// Comma delimited header fields between the talker and the payload.
const HEADER_FIELDS: usize = 6;

/// What a block read during an offload turned out to be.
#[derive(Debug, PartialEq, Eq)]
pub enum BulkBlock<'a> {
    /// File data to append, header and trailer removed.
    Data(&'a [u8]),
    /// The controller reported the end of the file.
    Finished,
    /// Nothing arrived.
    Empty,
    /// Something arrived that was neither data nor an end marker.
    Unrecognised,
}

/// Slice the payload out of a `$PWETB` block: everything after the sixth
/// comma following the last `$PWETB,`, minus the trailer.
///
/// * `block`: raw bytes read from the controller.
pub fn extract_payload(block: &[u8]) -> Option<&[u8]> {
    let header = format!("${BULK_TALKER},");
    let start = rfind(block, header.as_bytes())? + header.len();
    let mut rest = &block[start..];
    for _ in 0..HEADER_FIELDS {
        let comma = rest.iter().position(|&b| b == b',')?;
        rest = &rest[comma + 1..];
    }
    Some(&rest[..rest.len().saturating_sub(TRAILER_LEN)])
}

/// Decide what a block is. A bulk header wins over an end marker, because
/// file contents may well contain the letters `ACK`.
pub fn classify(block: &[u8]) -> BulkBlock<'_> {
    if block.is_empty() {
        return BulkBlock::Empty;
    }
    if let Some(payload) = extract_payload(block) {
        return BulkBlock::Data(payload);
    }
    if contains(block, b"DONE") || contains(block, b"ACK") {
        BulkBlock::Finished
    } else {
        BulkBlock::Unrecognised
    }
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;

    fn block(payload: &[u8]) -> Vec<u8> {
        let mut bytes = b"$PWETB,PC,,,,GET,512,".to_vec();
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(b"*3C\r\n");
        bytes
    }

    #[test]
    fn test_extract_payload_strips_header_and_trailer() {
        let bytes = block(b"\x00\x01binary,with,commas\xff");
        assert_eq!(
            extract_payload(&bytes),
            Some(&b"\x00\x01binary,with,commas\xff"[..])
        );
    }

    #[test]
    fn test_extract_payload_uses_last_header() {
        let mut bytes = b"stale $PWETB,".to_vec();
        bytes.extend(block(b"fresh"));
        assert_eq!(extract_payload(&bytes), Some(&b"fresh"[..]));
    }

    #[test]
    fn test_extract_payload_from_fixture() {
        let bytes = fs::read(crate::test_file_path!("/tests/fixtures/bulk_block.bin")).unwrap();
        let payload = extract_payload(&bytes).unwrap();
        assert_eq!(payload, b"0123456789ABCDEF");
    }

    #[test]
    fn test_extract_payload_short_block_is_empty() {
        assert_eq!(extract_payload(b"$PWETB,PC,,,,GET,0,*3"), Some(&b""[..]));
    }

    #[rstest]
    #[case(b"$PWETA,PC,,,,GET,1,DONE*00\r\n", BulkBlock::Finished)]
    #[case(b"$PWETA,PC,,,,ACK*05\r\n", BulkBlock::Finished)]
    #[case(b"", BulkBlock::Empty)]
    #[case(b"\r\n", BulkBlock::Unrecognised)]
    fn test_classify_control_blocks(#[case] bytes: &[u8], #[case] expected: BulkBlock) {
        assert_eq!(classify(bytes), expected);
    }

    #[test]
    fn test_classify_prefers_data_over_end_marker() {
        let bytes = block(b"ACKNOWLEDGED DONE");
        assert_eq!(classify(&bytes), BulkBlock::Data(b"ACKNOWLEDGED DONE"));
    }
}
