use spotledger::error::LedgerError;

#[test]
fn error_constructors_group_1() {
    assert!(matches!(
        LedgerError::malformed_timestamp("x", "y"),
        LedgerError::MalformedTimestamp { .. }
    ));
    assert!(matches!(LedgerError::auth("x"), LedgerError::Auth { .. }));
    assert!(matches!(
        LedgerError::transient("x"),
        LedgerError::Transient { .. }
    ));
    assert!(matches!(
        LedgerError::api(500, "x"),
        LedgerError::Api { status: 500, .. }
    ));
}

#[test]
fn error_constructors_group_2() {
    assert!(matches!(
        LedgerError::cache_corruption(2024, "x"),
        LedgerError::CacheCorruption { year: 2024, .. }
    ));
    assert!(matches!(
        LedgerError::price_unavailable("x"),
        LedgerError::PriceUnavailable { .. }
    ));
    assert!(matches!(LedgerError::config("x"), LedgerError::Config { .. }));
    assert!(matches!(LedgerError::io("x"), LedgerError::Io { .. }));
    assert!(matches!(
        LedgerError::serialization("x"),
        LedgerError::Serialization { .. }
    ));
}

#[test]
fn exhausted_keeps_last_error() {
    let err = LedgerError::fetch_exhausted(5, LedgerError::transient("HTTP 504"));
    match err {
        LedgerError::FetchExhausted { attempts, last } => {
            assert_eq!(attempts, 5);
            assert!(last.is_transient());
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn reconciliation_exposes_source() {
    use std::error::Error;
    let err = LedgerError::reconciliation(2024, LedgerError::auth("expired"));
    let source = err.source().map(|s| s.to_string()).unwrap_or_default();
    assert!(source.contains("Authentication error"));
    assert!(err.is_auth());
}

#[test]
fn display_messages() {
    let e = LedgerError::validation("field", "bad");
    let s = format!("{}", e);
    assert!(s.contains("Validation error"));

    let e = LedgerError::reconciliation(2023, LedgerError::transient("connection reset"));
    assert_eq!(
        format!("{}", e),
        "Reconciliation failed for 2023: Transient error: connection reset"
    );
}
