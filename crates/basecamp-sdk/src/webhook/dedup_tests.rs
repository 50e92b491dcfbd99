//! Tests for the dedup window.

use super::*;

#[test]
fn test_recorded_id_is_seen() {
    let window = DedupWindow::new(10);

    assert!(!window.seen("1"));
    window.record("1");
    assert!(window.seen("1"));
    assert!(!window.seen("2"));
}

#[test]
fn test_oldest_id_is_evicted_first() {
    // Arrange
    let window = DedupWindow::new(3);

    // Act
    for id in ["1", "2", "3", "4"] {
        window.record(id);
    }

    // Assert
    assert!(!window.seen("1"), "oldest entry should be evicted");
    assert!(window.seen("2"));
    assert!(window.seen("3"));
    assert!(window.seen("4"));
    assert_eq!(window.len(), 3);
}

#[test]
fn test_re_recording_does_not_refresh_position() {
    let window = DedupWindow::new(2);

    window.record("a");
    window.record("b");
    window.record("a");
    window.record("c");

    assert!(!window.seen("a"));
    assert!(window.seen("b"));
    assert!(window.seen("c"));
}

#[test]
fn test_zero_capacity_disables_dedup() {
    let window = DedupWindow::new(0);

    window.record("1");

    assert!(!window.is_enabled());
    assert!(!window.seen("1"));
    assert!(window.is_empty());
}

#[test]
fn test_empty_id_is_never_recorded() {
    let window = DedupWindow::new(10);

    window.record("");

    assert!(!window.seen(""));
    assert!(window.is_empty());
}

#[test]
fn test_default_capacity() {
    let window = DedupWindow::default();
    assert_eq!(window.capacity(), DEFAULT_DEDUP_WINDOW_SIZE);
}

#[test]
fn test_window_never_exceeds_capacity() {
    let window = DedupWindow::new(100);

    for i in 0..1000 {
        window.record(&i.to_string());
    }

    assert_eq!(window.len(), 100);
    assert!(window.seen("999"));
    assert!(window.seen("900"));
    assert!(!window.seen("899"));
}
