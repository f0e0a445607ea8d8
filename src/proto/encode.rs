//! Chunked transfer-coding encoding of outgoing body writes (C4).

/// Encodes one write as a chunk, per §4.4:
/// - non-empty `data` emits `<hex-len>\r\n<data>\r\n`, plus the terminal
///   `0\r\n\r\n` if `finished`;
/// - empty `data` with `finished` emits only the terminal chunk;
/// - empty `data` without `finished` emits nothing.
pub(crate) fn encode_chunk(data: &[u8], finished: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 32);
    if !data.is_empty() {
        out.extend(format!("{:x}\r\n", data.len()).into_bytes());
        out.extend_from_slice(data);
        out.extend_from_slice(b"\r\n");
    }
    if finished {
        out.extend_from_slice(b"0\r\n\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_not_finished() {
        assert_eq!(encode_chunk(b"hello", false), b"5\r\nhello\r\n");
    }

    #[test]
    fn non_empty_finished_appends_terminal_chunk() {
        assert_eq!(encode_chunk(b"hi", true), b"2\r\nhi\r\n0\r\n\r\n");
    }

    #[test]
    fn empty_finished_is_just_terminal_chunk() {
        assert_eq!(encode_chunk(b"", true), b"0\r\n\r\n");
    }

    #[test]
    fn empty_not_finished_emits_nothing() {
        assert_eq!(encode_chunk(b"", false), b"");
    }
}
