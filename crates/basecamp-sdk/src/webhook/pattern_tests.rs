//! Tests for event kind patterns.

use super::*;

#[test]
fn test_star_matches_everything() {
    let pattern = KindPattern::parse("*");

    assert_eq!(pattern, KindPattern::Any);
    assert!(pattern.matches("todo_created"));
    assert!(pattern.matches(""));
}

#[test]
fn test_prefix_pattern() {
    let pattern = KindPattern::parse("todo_*");

    assert!(pattern.matches("todo_created"));
    assert!(pattern.matches("todo_completed"));
    assert!(!pattern.matches("todolist_created"));
    assert!(!pattern.matches("message_created"));
}

#[test]
fn test_suffix_pattern() {
    let pattern = KindPattern::parse("*_created");

    assert!(pattern.matches("todo_created"));
    assert!(pattern.matches("question_answer_created"));
    assert!(!pattern.matches("todo_completed"));
}

#[test]
fn test_exact_pattern() {
    let pattern = KindPattern::parse("todo_created");

    assert!(pattern.matches("todo_created"));
    assert!(!pattern.matches("todo_created_again"));
    assert!(!pattern.matches("todo"));
}

#[test]
fn test_inner_star_is_literal() {
    let pattern = KindPattern::parse("todo_*_created");

    assert_eq!(pattern, KindPattern::Exact("todo_*_created".to_string()));
    assert!(!pattern.matches("todo_list_created"));
    assert!(pattern.matches("todo_*_created"));
}

#[test]
fn test_tiers_order_exact_then_glob_then_any() {
    assert!(KindPattern::parse("todo_created").tier() < KindPattern::parse("todo_*").tier());
    assert_eq!(
        KindPattern::parse("todo_*").tier(),
        KindPattern::parse("*_created").tier()
    );
    assert!(KindPattern::parse("*_created").tier() < KindPattern::Any.tier());
}

#[test]
fn test_display_round_trips_pattern_text() {
    for raw in ["*", "todo_*", "*_created", "todo_created"] {
        assert_eq!(KindPattern::parse(raw).to_string(), raw);
    }
}
