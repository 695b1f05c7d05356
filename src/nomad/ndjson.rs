//! Newline-delimited JSON decoding for the event stream body.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use super::{Events, NomadError};

struct LineDecoder<S> {
    chunks: S,
    buffer: Vec<u8>,
    exhausted: bool,
}

impl<S> LineDecoder<S> {
    fn next_line(&mut self) -> Option<Vec<u8>> {
        let newline = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
        line.pop();
        Some(line)
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

/// Turn a chunked response body into a stream of event batches.
///
/// Chunks may split or join lines arbitrarily. A line that does not decode
/// yields an `Err` item and decoding resumes at the next line; a transport
/// error is passed through the same way. The stream ends when the body does.
pub fn decode_event_batches<S, E>(chunks: S) -> impl Stream<Item = Result<Events, NomadError>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<NomadError>,
{
    let decoder = LineDecoder {
        chunks,
        buffer: Vec::new(),
        exhausted: false,
    };

    stream::unfold(decoder, |mut decoder| async move {
        loop {
            if let Some(line) = decoder.next_line() {
                if is_blank(&line) {
                    continue;
                }
                let batch = serde_json::from_slice::<Events>(&line).map_err(NomadError::from);
                return Some((batch, decoder));
            }

            if decoder.exhausted {
                if is_blank(&decoder.buffer) {
                    return None;
                }
                let tail = std::mem::take(&mut decoder.buffer);
                let batch = serde_json::from_slice::<Events>(&tail).map_err(NomadError::from);
                return Some((batch, decoder));
            }

            match decoder.chunks.next().await {
                Some(Ok(bytes)) => decoder.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => return Some((Err(e.into()), decoder)),
                None => decoder.exhausted = true,
            }
        }
    })
}
