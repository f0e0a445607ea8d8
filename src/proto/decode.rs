//! Chunked transfer-coding decoding, driven incrementally over the shared
//! connection buffer (part of C2).

use crate::proto::parse::parse_chunk_length_line;

/// States per §4.2: `EXPECT_LENGTH → DRAIN_DATA → EXPECT_CRLF → either
/// EXPECT_LENGTH (more chunks) or AT_LAST → EXPECT_FINAL_CRLF → DONE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ExpectLength,
    DrainData,
    ExpectCrlf,
    ExpectFinalCrlf,
    Done,
}

/// Bytes produced by one decode step.
pub(crate) enum Step {
    /// `consumed` bytes were removed from the head of the buffer;
    /// `data` (possibly empty) is body content to append to the Reader.
    Produced { consumed: usize, data: Vec<u8> },
    /// Not enough bytes yet to make progress.
    NeedMore,
    /// The terminal `0\r\n\r\n` (and any discarded trailers) were
    /// consumed; the body is complete.
    End { consumed: usize },
    /// A chunk-length line, its hex value, or a CRLF separator was
    /// malformed.
    Malformed,
    /// An unterminated chunk-length line grew past the configured cap.
    TooLarge,
}

pub(crate) struct ChunkedDecoder {
    state: State,
    remaining_in_chunk: u64,
    max_initial_size: usize,
}

impl ChunkedDecoder {
    pub(crate) fn new(max_initial_size: usize) -> ChunkedDecoder {
        ChunkedDecoder {
            state: State::ExpectLength,
            remaining_in_chunk: 0,
            max_initial_size,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Attempts to make one step of progress against `buf`, which holds
    /// whatever of the connection buffer hasn't yet been consumed. Chunk
    /// extensions and trailers are dropped, never surfaced.
    pub(crate) fn step(&mut self, buf: &[u8]) -> Step {
        match self.state {
            State::ExpectLength => self.step_expect_length(buf),
            State::DrainData => self.step_drain_data(buf),
            State::ExpectCrlf => self.step_expect_crlf(buf),
            State::ExpectFinalCrlf => self.step_expect_final_crlf(buf),
            State::Done => Step::End { consumed: 0 },
        }
    }

    fn step_expect_length(&mut self, buf: &[u8]) -> Step {
        let line_end = match find_crlf(buf) {
            Some(idx) => idx,
            None => {
                return if buf.len() > self.max_initial_size {
                    Step::TooLarge
                } else {
                    Step::NeedMore
                };
            }
        };
        let line = &buf[..line_end];
        let len = match parse_chunk_length_line(line) {
            Ok(len) => len,
            Err(()) => return Step::Malformed,
        };
        let consumed = line_end + 2;
        self.remaining_in_chunk = len;
        self.state = if len == 0 {
            State::ExpectFinalCrlf
        } else {
            State::DrainData
        };
        Step::Produced {
            consumed,
            data: Vec::new(),
        }
    }

    fn step_drain_data(&mut self, buf: &[u8]) -> Step {
        if buf.is_empty() {
            return Step::NeedMore;
        }
        let take = (self.remaining_in_chunk as usize).min(buf.len());
        self.remaining_in_chunk -= take as u64;
        if self.remaining_in_chunk == 0 {
            self.state = State::ExpectCrlf;
        }
        Step::Produced {
            consumed: take,
            data: buf[..take].to_vec(),
        }
    }

    fn step_expect_crlf(&mut self, buf: &[u8]) -> Step {
        if buf.len() < 2 {
            return Step::NeedMore;
        }
        if &buf[..2] != b"\r\n" {
            return Step::Malformed;
        }
        self.state = State::ExpectLength;
        Step::Produced {
            consumed: 2,
            data: Vec::new(),
        }
    }

    fn step_expect_final_crlf(&mut self, buf: &[u8]) -> Step {
        // Trailer headers, if any, precede the final blank line; since
        // trailers are always discarded we only need to locate the blank
        // line that terminates them.
        match find_double_crlf_or_bare_crlf(buf) {
            Some(consumed) => {
                self.state = State::Done;
                Step::End { consumed }
            }
            None => {
                if buf.len() > self.max_initial_size {
                    Step::TooLarge
                } else {
                    Step::NeedMore
                }
            }
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// After the terminal `0\r\n`, either a bare `\r\n` (no trailers) or a
/// trailer block ending in `\r\n\r\n` terminates the body. Returns how many
/// bytes to consume in either case.
fn find_double_crlf_or_bare_crlf(buf: &[u8]) -> Option<usize> {
    if buf.starts_with(b"\r\n") {
        return Some(2);
    }
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<u8> {
        let mut decoder = ChunkedDecoder::new(65536);
        let mut out = Vec::new();
        let mut offset = 0;
        loop {
            match decoder.step(&input[offset..]) {
                Step::Produced { consumed, data } => {
                    offset += consumed;
                    out.extend(data);
                }
                Step::End { consumed } => {
                    offset += consumed;
                    break;
                }
                Step::NeedMore => panic!("ran out of input before completion"),
                Step::Malformed => panic!("malformed chunk stream"),
                Step::TooLarge => panic!("too large"),
            }
        }
        assert_eq!(offset, input.len());
        out
    }

    #[test]
    fn decodes_two_chunks() {
        let input = b"5\r\n12345\r\n4\r\n6789\r\n0\r\n\r\n";
        assert_eq!(decode_all(input), b"123456789");
    }

    #[test]
    fn decodes_empty_body() {
        let input = b"0\r\n\r\n";
        assert_eq!(decode_all(input), b"");
    }

    #[test]
    fn discards_chunk_extension() {
        let input = b"5;foo=bar\r\n12345\r\n0\r\n\r\n";
        assert_eq!(decode_all(input), b"12345");
    }

    #[test]
    fn rejects_bad_hex_length() {
        let mut decoder = ChunkedDecoder::new(65536);
        assert!(matches!(decoder.step(b"zz\r\n"), Step::Malformed));
    }
}
