use super::*;

#[test]
fn test_verifier_and_challenge_are_url_safe() {
    let pkce = Pkce::generate();

    for value in [pkce.verifier(), pkce.challenge()] {
        assert_eq!(value.len(), 43);
        assert!(value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
    assert_eq!(pkce.challenge_method(), "S256");
}

#[test]
fn test_challenge_matches_rfc7636_example() {
    // Appendix B of RFC 7636
    let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");

    assert_eq!(pkce.challenge(), "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
}

#[test]
fn test_generated_verifiers_differ() {
    assert_ne!(Pkce::generate().verifier(), Pkce::generate().verifier());
}

#[test]
fn test_state_is_22_url_safe_chars() {
    let state = generate_state();

    assert_eq!(state.len(), 22);
    assert!(!state.contains('='));
    assert_ne!(state, generate_state());
}

#[test]
fn test_debug_hides_verifier() {
    let pkce = Pkce::from_verifier("my-verifier-value");
    assert!(!format!("{:?}", pkce).contains("my-verifier-value"));
}
