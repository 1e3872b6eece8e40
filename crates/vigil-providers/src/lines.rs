use core::mem;
use core::result::Result as CoreResult;

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt as _};
use vigil_core::{Error, Result};

/// Largest number of bytes buffered while waiting for a line terminator.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits a chunked byte stream into lines.
///
/// Lines may span chunk boundaries. `\r\n` and `\n` both terminate a line,
/// and a trailing line without a terminator is still yielded. A transport
/// error, or more than [`MAX_LINE_BYTES`] without a terminator, is yielded
/// once and ends the stream.
pub(crate) fn lines<S, B, E>(bytes: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = CoreResult<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<Error> + Send + 'static,
{
    lines_with_limit(bytes, MAX_LINE_BYTES)
}

fn lines_with_limit<S, B, E>(bytes: S, max_line: usize) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = CoreResult<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<Error> + Send + 'static,
{
    let state = LineBuffer {
        bytes: bytes.boxed(),
        pending: Vec::new(),
        scanned: 0,
        max_line,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.take_line() {
                return Some((Ok(line), state));
            }
            if state.finished {
                return None;
            }
            if state.pending.len() > state.max_line {
                state.finished = true;
                state.pending.clear();
                let error = Error::InvalidResponse(format!(
                    "line exceeds {} bytes without a terminator",
                    state.max_line
                ));
                return Some((Err(error), state));
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.pending.extend_from_slice(chunk.as_ref()),
                Some(Err(error)) => {
                    state.finished = true;
                    state.pending.clear();
                    return Some((Err(error.into()), state));
                }
                None => {
                    state.finished = true;
                    if !state.pending.is_empty() {
                        let tail = mem::take(&mut state.pending);
                        return Some((Ok(decode(&tail)), state));
                    }
                }
            }
        }
    })
    .boxed()
}

struct LineBuffer<B, E> {
    bytes: BoxStream<'static, CoreResult<B, E>>,
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no `\n`.
    scanned: usize,
    max_line: usize,
    finished: bool,
}

impl<B, E> LineBuffer<B, E> {
    fn take_line(&mut self) -> Option<String> {
        let Some(offset) = self
            .pending
            .iter()
            .skip(self.scanned)
            .position(|byte| *byte == b'\n')
        else {
            self.scanned = self.pending.len();
            return None;
        };
        let newline = self.scanned + offset;
        self.scanned = 0;
        let line: Vec<u8> = self.pending.drain(..=newline).collect();
        let body = line.strip_suffix(b"\n").unwrap_or(line.as_slice());
        let body = body.strip_suffix(b"\r").unwrap_or(body);
        Some(decode(body))
    }
}

fn decode(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(raw: &'static [u8]) -> CoreResult<&'static [u8], Error> {
        Ok(raw)
    }

    async fn collect(chunks: Vec<CoreResult<&'static [u8], Error>>) -> Vec<Result<String>> {
        lines(stream::iter(chunks)).collect().await
    }

    fn texts(items: Vec<Result<String>>) -> Vec<String> {
        items.into_iter().map_while(CoreResult::ok).collect()
    }

    #[tokio::test]
    async fn test_lines_across_chunk_boundaries() {
        let items = collect(vec![
            chunk(b"data: one\nda"),
            chunk(b"ta: two\r\n"),
            chunk(b"\n"),
        ])
        .await;
        assert_eq!(texts(items), ["data: one", "data: two", ""]);
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let items = collect(vec![
            chunk(b"{\"done\":false}\n{\"done\":"),
            chunk(b"true}"),
        ])
        .await;
        assert_eq!(texts(items), ["{\"done\":false}", "{\"done\":true}"]);
    }

    #[tokio::test]
    async fn test_error_ends_stream() {
        let items = collect(vec![
            chunk(b"first\n"),
            Err(Error::Provider("reset".to_owned())),
            chunk(b"never\n"),
        ])
        .await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(Error::Provider(_))));
    }

    #[tokio::test]
    async fn test_unterminated_line_over_limit_ends_stream() {
        let chunks = vec![chunk(b"ok\nabcd"), chunk(b"efgh"), chunk(b"ijkl\nnever\n")];
        let items: Vec<Result<String>> = lines_with_limit(stream::iter(chunks), 6).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().ok(), Some("ok"));
        assert!(matches!(items[1], Err(Error::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_line_at_limit_is_kept() {
        let chunks = vec![chunk(b"abc"), chunk(b"def"), chunk(b"\nxy\n")];
        let items: Vec<Result<String>> = lines_with_limit(stream::iter(chunks), 6).collect().await;
        assert_eq!(texts(items), ["abcdef", "xy"]);
    }

    #[tokio::test]
    async fn test_many_small_chunks_before_newline() {
        let mut chunks: Vec<CoreResult<&'static [u8], Error>> =
            (0..64).map(|_| chunk(b"x")).collect();
        chunks.push(chunk(b"\ny\n"));
        let items = collect(chunks).await;
        assert_eq!(texts(items), ["x".repeat(64), "y".to_owned()]);
    }

    #[tokio::test]
    async fn test_multibyte_split_is_reassembled() {
        let word: &'static [u8] = "h\u{e9}llo\n".as_bytes();
        let (head, tail) = word.split_at(2);
        let items = collect(vec![chunk(head), chunk(tail)]).await;
        assert_eq!(texts(items), ["h\u{e9}llo"]);
    }
}
