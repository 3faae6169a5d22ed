// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Newline-delimited JSON framing over a byte stream.

use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tally_core::TallyError;

use crate::client::transport_error;

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

struct Framer {
    inner: ByteStream,
    buf: Vec<u8>,
    eof: bool,
}

impl Framer {
    fn take_line(&mut self) -> Option<String> {
        loop {
            let pos = self.buf.iter().position(|b| *b == b'\n')?;
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    fn take_rest(&mut self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.buf).trim().to_string();
        self.buf.clear();
        (!text.is_empty()).then_some(text)
    }
}

/// Splits `response` into non-empty lines. A trailing line without a newline
/// is yielded when the body ends.
pub fn lines(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<String, TallyError>> + Send>> {
    let framer = Framer {
        inner: Box::pin(response.bytes_stream()),
        buf: Vec::new(),
        eof: false,
    };
    Box::pin(stream::unfold(framer, |mut f| async move {
        loop {
            if let Some(line) = f.take_line() {
                return Some((Ok(line), f));
            }
            if f.eof {
                return f.take_rest().map(|line| (Ok(line), f));
            }
            match f.inner.next().await {
                Some(Ok(bytes)) => f.buf.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    f.eof = true;
                    f.buf.clear();
                    return Some((Err(transport_error(e)), f));
                }
                None => f.eof = true,
            }
        }
    }))
}
