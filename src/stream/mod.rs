//! Streaming element decoder.
//!
//! [`Stream`] iterates over every occurrence of one element type in a
//! document without materializing a tree; this is the intended path for
//! multi-gigabyte feeds where only the repeating record matters. A
//! producer thread owns the incremental tokenizer; each matching subtree
//! is assembled, decoded into the caller's type through serde, and handed
//! across a rendezvous channel, so memory stays bounded by one subtree.
//!
//! Per-element decode failures are skipped (a single bad record should
//! not abort a bulk ingestion); structural tokenizer errors terminate the
//! stream. Values arrive in document order. The iterator is not
//! restartable.
//!
//! # Cancellation
//!
//! [`CancelToken`] is a cloneable handle: signal it from anywhere and the
//! producer stops before its next token read, while the consumer observes
//! it between channel polls. Dropping the iterator hangs up the channel,
//! which aborts any in-flight send, so the producer thread never leaks,
//! even when iteration is abandoned halfway.
//!
//! ```
//! use serde::Deserialize;
//! use xmlmap::Stream;
//!
//! #[derive(Deserialize)]
//! struct Order {
//!     id: i64,
//!     total: f64,
//! }
//!
//! let xml = "<orders><Order><id>1</id><total>50.5</total></Order></orders>";
//! let stream: Stream<Order> = Stream::new(xml.as_bytes(), "Order");
//! let orders: Vec<Order> = stream.iter().collect();
//! assert_eq!(orders[0].id, 1);
//! ```

use std::io::Read;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::map::{from_value, is_metadata_key, Value};
use crate::parser::input::{Token, Tokenizer};
use crate::parser::{Assembler, Options};

/// How often the consumer re-checks the cancellation token while waiting
/// on the channel.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A cloneable cancellation handle for a running stream.
///
/// Compose timeouts by signalling the token from a timer; the stream
/// itself enforces none.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an unsignalled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once [`CancelToken::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// A lazy, typed iterator over one repeating element of a document.
pub struct Stream<T> {
    reader: Box<dyn Read + Send>,
    tag: String,
    options: Options,
    _target: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned + Send + 'static> Stream<T> {
    /// Creates a stream over `reader` yielding one `T` per `<tag>` element.
    pub fn new<R: Read + Send + 'static>(reader: R, tag: &str) -> Self {
        Self::with_options(reader, tag, Options::default())
    }

    /// Creates a stream with parse options (e.g. `legacy_charsets`).
    pub fn with_options<R: Read + Send + 'static>(reader: R, tag: &str, options: Options) -> Self {
        Self {
            reader: Box::new(reader),
            tag: tag.to_string(),
            options,
            _target: PhantomData,
        }
    }

    /// Starts the producer and returns the consuming iterator.
    #[must_use]
    pub fn iter(self) -> StreamIter<T> {
        self.iter_with_cancel(CancelToken::new())
    }

    /// Starts the producer with an external cancellation token.
    #[must_use]
    pub fn iter_with_cancel(self, token: CancelToken) -> StreamIter<T> {
        // Rendezvous: the producer stays at most one decoded element
        // ahead of the consumer.
        let (tx, rx) = sync_channel::<T>(0);
        let producer_token = token.clone();
        let handle = std::thread::spawn(move || {
            produce(self.reader, &self.tag, &self.options, &tx, &producer_token);
        });
        StreamIter {
            rx: Some(rx),
            token,
            handle: Some(handle),
        }
    }
}

fn produce<T: DeserializeOwned>(
    reader: Box<dyn Read + Send>,
    tag: &str,
    options: &Options,
    tx: &SyncSender<T>,
    token: &CancelToken,
) {
    let mut tokenizer = Tokenizer::new(reader, options.lenient, options.legacy_charsets);
    loop {
        if token.is_cancelled() {
            tracing::debug!(tag, "stream cancelled");
            return;
        }
        match tokenizer.next_token() {
            Ok(Token::Eof) => return,
            Ok(start @ Token::StartElement { .. }) => {
                let matches = matches!(
                    &start,
                    Token::StartElement { name, .. } if name.local == tag
                );
                if !matches {
                    continue;
                }
                let value = match decode_subtree(&mut tokenizer, options, start) {
                    Ok(v) => v,
                    Err(err) => {
                        tracing::debug!(tag, error = %err, "stream terminated by structural error");
                        return;
                    }
                };
                match from_value::<T>(&value) {
                    Ok(item) => {
                        // The send blocks until the consumer takes the
                        // item; a hang-up means iteration was abandoned.
                        if tx.send(item).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        tracing::debug!(tag, error = %err, "skipping undecodable element");
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(tag, error = %err, "stream terminated by token error");
                return;
            }
        }
    }
}

/// Assembles the element whose start token was just consumed into a
/// [`Value`], using the same tree-building rules as the full parser.
fn decode_subtree<R: Read>(
    tokenizer: &mut Tokenizer<R>,
    options: &Options,
    start: Token,
) -> Result<Value> {
    let mut assembler = Assembler::new(options);
    assembler.apply(start)?;
    while assembler.depth() > 0 {
        match tokenizer.next_token()? {
            Token::Eof => {
                return Err(Error::syntax(
                    "unexpected end of input inside streamed element",
                    tokenizer.line(),
                    1,
                ));
            }
            token => assembler.apply(token)?,
        }
    }
    let root = assembler.finish();
    let value = root
        .iter()
        .find(|(key, _)| !is_metadata_key(key))
        .map(|(_, v)| v.clone())
        .unwrap_or(Value::Null);
    Ok(value)
}

/// The consuming side of a [`Stream`].
///
/// Dropping the iterator cancels the stream and joins the producer.
pub struct StreamIter<T> {
    rx: Option<Receiver<T>>,
    token: CancelToken,
    handle: Option<JoinHandle<()>>,
}

impl<T> StreamIter<T> {
    /// The cancellation token driving this iteration.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Hangs up the channel (unblocking any in-flight send) and joins
    /// the producer thread.
    fn shutdown(&mut self) {
        self.rx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl<T> Iterator for StreamIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            if self.token.is_cancelled() {
                self.shutdown();
                return None;
            }
            let rx = self.rx.as_ref()?;
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(item) => return Some(item),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.shutdown();
                    return None;
                }
            }
        }
    }
}

impl<T> Drop for StreamIter<T> {
    fn drop(&mut self) {
        self.token.cancel();
        self.shutdown();
    }
}
