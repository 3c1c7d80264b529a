use super::*;

#[test]
fn test_structured_kinds() {
    let classifier = ErrorClassifier::new();

    let c = classifier.classify(&OracleFailure::Timeout { elapsed_ms: 10_000 }, None);
    assert_eq!(c.error_type, ErrorType::Timeout);
    assert_eq!(c.severity, Severity::Medium);
    assert_eq!(c.suggested_action, SuggestedAction::Retry);
    assert_eq!(c.wait_time_ms, 2000);

    let c = classifier.classify(
        &OracleFailure::QueueFull { queue_depth: Some(90), retry_after_ms: Some(7500) },
        None,
    );
    assert_eq!(c.error_type, ErrorType::QueueFull);
    assert_eq!(c.suggested_action, SuggestedAction::SwitchAccount);
    assert_eq!(c.wait_time_ms, 7500);

    let c = classifier.classify(&OracleFailure::OracleOffline { reason: "paused".into() }, None);
    assert!(c.is_critical());
}

#[test]
fn test_text_patterns() {
    let classifier = ErrorClassifier::new();
    let cases = [
        ("Transaction was not confirmed in 30.00 seconds: timed out", ErrorType::Timeout),
        ("Error: 429 Too Many Requests", ErrorType::QueueFull),
        ("oracle queue is paused", ErrorType::OracleOffline),
        ("AnchorError: VrfAccountInvalid", ErrorType::AccountInvalid),
        ("TypeError: fetch failed", ErrorType::Network),
        ("Blockhash not found", ErrorType::Network),
        ("custom program error: 0x1771", ErrorType::Unknown),
    ];
    for (text, expected) in cases {
        let c = classifier.classify(&OracleFailure::other(text), None);
        assert_eq!(c.error_type, expected, "{text}");
    }
}

#[test]
fn test_user_abort_short_circuits() {
    let classifier = ErrorClassifier::new();
    for error in [
        OracleFailure::UserRejected,
        OracleFailure::InsufficientFunds { message: "need 0.1 SOL".into() },
        OracleFailure::other("WalletSignTransactionError: User rejected the request."),
        OracleFailure::other("Wallet not authorized"),
    ] {
        let c = classifier.classify(&error, Some("alpha"));
        assert!(!c.is_retryable, "{error}");
        assert_eq!(c.suggested_action, SuggestedAction::Abort);
        assert_eq!(c.severity, Severity::High);
        assert!(c.should_abort());
    }
}

#[test]
fn test_escalates_after_three_failures() {
    let classifier = ErrorClassifier::new();
    let error = OracleFailure::Timeout { elapsed_ms: 10_000 };

    assert_eq!(classifier.classify(&error, Some("alpha")).severity, Severity::Medium);
    assert_eq!(classifier.classify(&error, Some("alpha")).severity, Severity::Medium);
    let third = classifier.classify(&error, Some("alpha"));
    assert_eq!(third.severity, Severity::Critical);
    assert_eq!(third.suggested_action, SuggestedAction::SwitchAccount);
    assert_eq!(classifier.failure_count("alpha"), 3);
    assert_eq!(classifier.failure_count("beta"), 0);
}

#[test]
fn test_clear_resets_escalation() {
    let classifier = ErrorClassifier::new();
    let error = OracleFailure::other("socket hang up");
    for _ in 0..3 {
        classifier.classify(&error, Some("alpha"));
    }
    classifier.clear_account_failures("alpha");

    assert_eq!(classifier.failure_count("alpha"), 0);
    assert_eq!(classifier.classify(&error, Some("alpha")).severity, Severity::Medium);
}

#[tokio::test(start_paused = true)]
async fn test_failure_counts_expire() {
    let classifier = ErrorClassifier::new();
    let error = OracleFailure::other("socket hang up");
    classifier.classify(&error, Some("alpha"));
    classifier.classify(&error, Some("alpha"));

    tokio::time::advance(Duration::from_secs(601)).await;
    assert_eq!(classifier.failure_count("alpha"), 0);
    assert_eq!(classifier.classify(&error, Some("alpha")).severity, Severity::Medium);
    assert_eq!(classifier.failure_count("alpha"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_network_health_doubles_wait_for_thirty_seconds() {
    let classifier = ErrorClassifier::new();
    let error = OracleFailure::Timeout { elapsed_ms: 1 };

    classifier.report_network_health(false);
    let c = classifier.classify(&error, None);
    assert_eq!(c.wait_time_ms, 4000);
    assert!(c.message.ends_with("(network degraded)"));

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(!classifier.network_unhealthy());
    assert_eq!(classifier.classify(&error, None).wait_time_ms, 2000);

    classifier.report_network_health(true);
    assert_eq!(classifier.classify(&error, None).wait_time_ms, 2000);
}

#[test]
fn test_recommended_wait_time() {
    let classifier = ErrorClassifier::new();
    let timeout = OracleFailure::Timeout { elapsed_ms: 1 };
    assert_eq!(classifier.recommended_wait_time(&timeout, 1), 2000);
    assert_eq!(classifier.recommended_wait_time(&timeout, 3), 8000);
    assert_eq!(classifier.recommended_wait_time(&timeout, 10), 30_000);
}

#[test]
fn test_requires_emergency_fallback() {
    let classifier = ErrorClassifier::new();
    let timeout = OracleFailure::Timeout { elapsed_ms: 1 };
    let unknown = OracleFailure::other("???");
    let offline = OracleFailure::OracleOffline { reason: "down".into() };

    assert!(!classifier.requires_emergency_fallback(&timeout, 1));
    assert!(classifier.requires_emergency_fallback(&timeout, 2));
    assert!(!classifier.requires_emergency_fallback(&unknown, 2));
    assert!(classifier.requires_emergency_fallback(&unknown, 3));
    assert!(classifier.requires_emergency_fallback(&offline, 0));
}
