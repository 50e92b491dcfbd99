//! Tests for Link-header parsing and the origin guard.

use super::*;

fn url(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}

// ============================================================================
// Link Header Tests
// ============================================================================

mod link_header_tests {
    use super::*;

    #[test]
    fn test_missing_header_has_no_links() {
        let links = parse_link_header(None);
        assert_eq!(links, Links::default());
        assert!(!links.has_next());
    }

    #[test]
    fn test_all_relations_are_extracted() {
        let header = concat!(
            r#"<https://3.basecampapi.com/1/p.json?page=3>; rel="next", "#,
            r#"<https://3.basecampapi.com/1/p.json?page=1>; rel="prev", "#,
            r#"<https://3.basecampapi.com/1/p.json?page=1>; rel="first", "#,
            r#"<https://3.basecampapi.com/1/p.json?page=9>; rel="last""#,
        );

        let links = parse_link_header(Some(header));

        assert_eq!(links.next.as_deref(), Some("https://3.basecampapi.com/1/p.json?page=3"));
        assert_eq!(links.prev.as_deref(), Some("https://3.basecampapi.com/1/p.json?page=1"));
        assert_eq!(links.first.as_deref(), Some("https://3.basecampapi.com/1/p.json?page=1"));
        assert_eq!(links.last.as_deref(), Some("https://3.basecampapi.com/1/p.json?page=9"));
    }

    #[test]
    fn test_relative_target_is_kept_verbatim() {
        let links = parse_link_header(Some(r#"</1/p.json?page=2>; rel="next""#));
        assert_eq!(links.next.as_deref(), Some("/1/p.json?page=2"));
    }

    #[test]
    fn test_unquoted_and_mixed_case_rel() {
        let links = parse_link_header(Some("<https://a.example/2>; REL=Next"));
        assert_eq!(links.next.as_deref(), Some("https://a.example/2"));
    }

    #[test]
    fn test_multiple_relations_on_one_link() {
        let links = parse_link_header(Some(r#"<https://a.example/9>; rel="next last""#));
        assert_eq!(links.next.as_deref(), Some("https://a.example/9"));
        assert_eq!(links.last.as_deref(), Some("https://a.example/9"));
    }

    #[test]
    fn test_extra_params_are_ignored() {
        let links =
            parse_link_header(Some(r#"<https://a.example/2>; title="page two"; rel="next""#));
        assert_eq!(links.next.as_deref(), Some("https://a.example/2"));
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let links = parse_link_header(Some(
            r#"https://no-brackets.example; rel="next", <https://a.example/2>; rel="prev""#,
        ));
        assert!(links.next.is_none());
        assert_eq!(links.prev.as_deref(), Some("https://a.example/2"));
    }
}

// ============================================================================
// Origin Guard Tests
// ============================================================================

mod origin_guard_tests {
    use super::*;

    #[test]
    fn test_same_origin_link_is_accepted() {
        let first = url("https://3.basecampapi.com/999/projects.json");
        let guard = OriginGuard::new(&first).unwrap();

        let next = guard
            .next_page(&first, "https://3.basecampapi.com:443/999/projects.json?page=2")
            .unwrap();

        assert_eq!(next.query(), Some("page=2"));
    }

    #[test]
    fn test_cross_origin_link_is_rejected() {
        // Arrange
        let first = url("https://3.basecampapi.com/999/projects.json");
        let guard = OriginGuard::new(&first).unwrap();

        // Act
        let err = guard
            .next_page(&first, "https://evil.example/999/projects.json?page=2")
            .unwrap_err();

        // Assert
        assert!(matches!(err, SecurityPolicyError::CrossOriginLink { .. }));
        assert!(err.to_string().contains("different origin"));
    }

    #[test]
    fn test_scheme_downgrade_is_rejected() {
        let first = url("https://3.basecampapi.com/999/projects.json");
        let guard = OriginGuard::new(&first).unwrap();

        let result = guard.next_page(&first, "http://3.basecampapi.com/999/projects.json?page=2");

        assert!(result.is_err());
    }

    #[test]
    fn test_port_change_is_rejected() {
        let first = url("https://3.basecampapi.com/999/projects.json");
        let guard = OriginGuard::new(&first).unwrap();

        let result = guard.next_page(&first, "https://3.basecampapi.com:8443/999/projects.json");

        assert!(result.is_err());
    }

    #[test]
    fn test_protocol_relative_link_to_other_host_is_rejected() {
        let first = url("https://3.basecampapi.com/999/projects.json");
        let guard = OriginGuard::new(&first).unwrap();

        let result = guard.next_page(&first, "//evil.example/steal");

        assert!(result.is_err());
    }

    #[test]
    fn test_relative_link_resolves_against_current_page() {
        // Arrange: the second page lives under a different path than the first
        let first = url("https://3.basecampapi.com/999/projects.json");
        let guard = OriginGuard::new(&first).unwrap();
        let second = url("https://3.basecampapi.com/999/archive/projects.json?page=2");

        // Act
        let third = guard.next_page(&second, "projects.json?page=3").unwrap();

        // Assert
        assert_eq!(
            third.as_str(),
            "https://3.basecampapi.com/999/archive/projects.json?page=3"
        );
    }

    #[test]
    fn test_allowed_origin_is_accepted() {
        let first = url("https://3.basecampapi.com/999/projects.json");
        let guard = OriginGuard::new(&first)
            .unwrap()
            .allow_origin(Origin::parse("https://storage.3.basecamp.com").unwrap());

        let next = guard.next_page(&first, "https://storage.3.basecamp.com/999/blobs?page=2");

        assert!(next.is_ok());
        assert!(guard.next_page(&first, "https://evil.example/").is_err());
    }

    #[test]
    fn test_url_without_host_cannot_anchor_a_guard() {
        let result = OriginGuard::new(&url("data:text/plain,hello"));
        assert!(matches!(result, Err(SecurityPolicyError::InvalidUrl { .. })));
    }
}
