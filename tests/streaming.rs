//! Streaming decoder integration: document-order delivery, cancellation
//! liveness, and producer shutdown on abandoned iteration.

#![allow(clippy::unwrap_used)]

use std::io::Read;
use std::time::{Duration, Instant};

use serde::Deserialize;
use xmlmap::{CancelToken, Options, Stream};

#[derive(Debug, Deserialize, PartialEq)]
struct Order {
    id: i64,
    total: f64,
}

#[test]
fn test_stream_decodes_typed_records() {
    let xml = "<orders>\
        <Order><id>1</id><total>50.5</total></Order>\
        <Order><id>2</id><total>100.0</total></Order>\
        </orders>";
    let stream: Stream<Order> = Stream::new(xml.as_bytes(), "Order");
    let orders: Vec<Order> = stream.iter().collect();
    assert_eq!(
        orders,
        vec![
            Order { id: 1, total: 50.5 },
            Order { id: 2, total: 100.0 },
        ]
    );
}

#[test]
fn test_cancel_after_first_item() {
    // Cancelling after the first item leaves the second undelivered
    // and closes the iterator.
    let xml = "<orders>\
        <Order><id>1</id><total>50.5</total></Order>\
        <Order><id>2</id><total>100.0</total></Order>\
        </orders>";
    let token = CancelToken::new();
    let stream: Stream<Order> = Stream::new(xml.as_bytes(), "Order");
    let mut iter = stream.iter_with_cancel(token.clone());

    assert_eq!(iter.next().unwrap().id, 1);
    token.cancel();
    assert!(iter.next().is_none());
    assert!(iter.next().is_none());
}

/// A reader that produces matching records forever, to prove cancellation
/// liveness does not depend on end-of-stream.
struct EndlessOrders {
    cursor: std::io::Cursor<Vec<u8>>,
}

impl EndlessOrders {
    fn new() -> Self {
        let body = "<orders><Order><id>1</id><total>2.0</total></Order>".to_string();
        Self {
            cursor: std::io::Cursor::new(body.into_bytes()),
        }
    }
}

impl Read for EndlessOrders {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        let n = self.cursor.read(out)?;
        if n > 0 {
            return Ok(n);
        }
        self.cursor.set_position(8); // rewind past "<orders>"
        self.cursor.read(out)
    }
}

#[test]
fn test_cancellation_liveness_on_infinite_input() {
    let token = CancelToken::new();
    let stream: Stream<Order> = Stream::new(EndlessOrders::new(), "Order");
    let mut iter = stream.iter_with_cancel(token.clone());

    assert!(iter.next().is_some());
    token.cancel();

    let start = Instant::now();
    assert!(iter.next().is_none());
    // The iterator must close promptly, not after draining the input.
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_drop_terminates_producer() {
    let stream: Stream<Order> = Stream::new(EndlessOrders::new(), "Order");
    let mut iter = stream.iter();
    assert!(iter.next().is_some());
    let start = Instant::now();
    drop(iter);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_bad_records_skipped_good_ones_flow() {
    let xml = "<batch>\
        <Order><id>1</id><total>1.0</total></Order>\
        <Order><id>broken</id><total>x</total></Order>\
        <Order><id>3</id><total>3.0</total></Order>\
        <noise>between</noise>\
        <Order><id>4</id><total>4.0</total></Order>\
        </batch>";
    let stream: Stream<Order> = Stream::new(xml.as_bytes(), "Order");
    let ids: Vec<i64> = stream.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![1, 3, 4]);
}

#[test]
fn test_nested_matching_tag_uses_whole_subtree() {
    #[derive(Deserialize)]
    struct Entry {
        name: String,
    }
    // The matching element sits at depth 2; its subtree decodes whole.
    let xml = "<feed><page><Entry><name>a</name></Entry></page>\
               <page><Entry><name>b</name></Entry></page></feed>";
    let stream: Stream<Entry> = Stream::new(xml.as_bytes(), "Entry");
    let names: Vec<String> = stream.iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_stream_legacy_charset_option() {
    #[derive(Deserialize)]
    struct Row {
        city: String,
    }
    let mut xml = Vec::new();
    xml.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"windows-1252\"?>");
    xml.extend_from_slice(b"<rows><Row><city>Bogot\xE1</city></Row></rows>");
    let stream: Stream<Row> = Stream::with_options(
        std::io::Cursor::new(xml),
        "Row",
        Options::default().legacy_charsets(true),
    );
    let rows: Vec<Row> = stream.iter().collect();
    assert_eq!(rows[0].city, "Bogotá");
}
