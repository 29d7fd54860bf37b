use super::*;
use crate::testing::sample_record;

#[test]
fn append_preserves_arrival_order() {
    let mut buf = RecordBuffer::new();
    buf.append(sample_record(1));
    buf.append(sample_record(2));
    buf.append(sample_record(3));

    let ports: Vec<u16> = buf.drain().iter().map(|r| r.source_port).collect();
    assert_eq!(ports, vec![1, 2, 3]);
}

#[test]
fn drain_leaves_buffer_empty() {
    let mut buf = RecordBuffer::new();
    buf.append(sample_record(1));
    buf.append(sample_record(2));
    assert_eq!(buf.len(), 2);

    let batch = buf.drain();
    assert_eq!(batch.len(), 2);
    assert!(buf.is_empty());
    assert_eq!(buf.len(), 0);
}

#[test]
fn drain_on_empty_returns_empty_batch() {
    let mut buf = RecordBuffer::new();
    assert!(buf.drain().is_empty());
    assert!(buf.is_empty());
}

#[test]
fn appends_after_drain_start_a_fresh_batch() {
    let mut buf = RecordBuffer::new();
    buf.append(sample_record(1));
    let first = buf.drain();

    buf.append(sample_record(2));
    let second = buf.drain();

    assert_eq!(first[0].source_port, 1);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].source_port, 2);
}

#[test]
fn is_empty_tracks_contents() {
    let mut buf = RecordBuffer::new();
    assert!(buf.is_empty());
    buf.append(sample_record(7));
    assert!(!buf.is_empty());
}
