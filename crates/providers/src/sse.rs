//! SSE decoding for provider run streams.
//!
//! The assistants stream names every event (`event: thread.message.delta`)
//! and carries a JSON body on the `data:` line, so blocks are kept whole
//! rather than reduced to their data payloads.
//!
//! The buffer holds raw bytes: a chunk boundary may fall inside a line or
//! inside a multi-byte UTF-8 sequence, and neither is decoded until the
//! enclosing block is complete.

use crate::util::from_reqwest;
use fr_domain::error::Result;
use fr_domain::stream::BoxStream;

use crate::traits::RunEvent;

/// One complete SSE block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseBlock {
    pub event: Option<String>,
    pub data: String,
}

/// Append a chunk to the buffer, dropping carriage returns so `\r\n`
/// framing splits the same way as `\n`.
pub(crate) fn push_chunk(buffer: &mut Vec<u8>, chunk: &[u8]) {
    buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));
}

/// Pull every complete block (terminated by a blank line) out of the
/// buffer.  A trailing partial block stays for the next call.
pub(crate) fn drain_blocks(buffer: &mut Vec<u8>) -> Vec<SseBlock> {
    let mut blocks = Vec::new();

    while let Some(pos) = buffer.windows(2).position(|w| w == b"\n\n") {
        let raw: Vec<u8> = buffer.drain(..pos + 2).collect();
        let text = String::from_utf8_lossy(&raw[..pos]);

        let mut event = None;
        let mut data_lines: Vec<&str> = Vec::new();
        for line in text.lines() {
            if let Some(name) = line.strip_prefix("event:") {
                event = Some(name.trim().to_string());
            } else if let Some(data) = line.strip_prefix("data:") {
                data_lines.push(data.strip_prefix(' ').unwrap_or(data));
            }
        }

        if event.is_some() || !data_lines.is_empty() {
            blocks.push(SseBlock {
                event,
                data: data_lines.join("\n"),
            });
        }
    }

    blocks
}

/// Build a [`BoxStream`] of run events from an SSE `reqwest::Response` and
/// a provider-specific parser.
///
/// The parser is `FnMut` so it can keep state across blocks (e.g. which
/// text parts and tool calls it has already announced).  Any partial block
/// left when the body closes is flushed through the parser.
pub(crate) fn sse_response_stream<F>(
    response: reqwest::Response,
    mut parse_block: F,
) -> BoxStream<'static, Result<RunEvent>>
where
    F: FnMut(&SseBlock) -> Vec<Result<RunEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    push_chunk(&mut buffer, &bytes);
                    for block in drain_blocks(&mut buffer) {
                        for event in parse_block(&block) {
                            yield event;
                        }
                    }
                }
                Ok(None) => {
                    if !buffer.iter().all(u8::is_ascii_whitespace) {
                        buffer.extend_from_slice(b"\n\n");
                        for block in drain_blocks(&mut buffer) {
                            for event in parse_block(&block) {
                                yield event;
                            }
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    break;
                }
            }
        }
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
