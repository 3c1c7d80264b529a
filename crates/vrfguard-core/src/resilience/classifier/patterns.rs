//! Base classification: structured failure kinds first, then text patterns.

use regex::Regex;
use std::sync::OnceLock;
use vrfguard_types::{ErrorClassification, ErrorType, OracleFailure, Severity, SuggestedAction};

pub(super) const TIMEOUT_WAIT_MS: u64 = 2000;
pub(super) const QUEUE_FULL_WAIT_MS: u64 = 5000;
pub(super) const OFFLINE_WAIT_MS: u64 = 30_000;
pub(super) const NETWORK_WAIT_MS: u64 = 3000;
pub(super) const UNKNOWN_WAIT_MS: u64 = 1000;

static USER_ABORT_REGEX: OnceLock<Regex> = OnceLock::new();
static TIMEOUT_REGEX: OnceLock<Regex> = OnceLock::new();
static QUEUE_FULL_REGEX: OnceLock<Regex> = OnceLock::new();
static OFFLINE_REGEX: OnceLock<Regex> = OnceLock::new();
static ACCOUNT_INVALID_REGEX: OnceLock<Regex> = OnceLock::new();
static NETWORK_REGEX: OnceLock<Regex> = OnceLock::new();

fn pattern(cell: &'static OnceLock<Regex>, source: &str) -> Option<&'static Regex> {
    if let Some(re) = cell.get() {
        return Some(re);
    }
    match Regex::new(source) {
        Ok(re) => Some(cell.get_or_init(|| re)),
        Err(e) => {
            tracing::error!("invalid classifier pattern {}: {}", source, e);
            None
        },
    }
}

fn user_abort_regex() -> Option<&'static Regex> {
    pattern(
        &USER_ABORT_REGEX,
        r"(?i)user rejected|rejected the request|denied (the )?transaction|insufficient (funds|lamports|balance)|wallet not connected|not authori[sz]ed|unauthori[sz]ed|signature verification failed",
    )
}

fn timeout_regex() -> Option<&'static Regex> {
    pattern(
        &TIMEOUT_REGEX,
        r"(?i)time[ds]?[\s_-]?out|deadline exceeded|took too long|block ?height exceeded|vrf ?timeout",
    )
}

fn queue_full_regex() -> Option<&'static Regex> {
    pattern(
        &QUEUE_FULL_REGEX,
        r"(?i)queue (is )?full|queue capacity|too many requests|rate[\s_-]?limit|\b429\b",
    )
}

fn offline_regex() -> Option<&'static Regex> {
    pattern(
        &OFFLINE_REGEX,
        r"(?i)(oracle|queue|service) (is )?(offline|unavailable|inactive|paused|down)|\b503\b",
    )
}

fn account_invalid_regex() -> Option<&'static Regex> {
    pattern(
        &ACCOUNT_INVALID_REGEX,
        r"(?i)account (not found|does not exist|is invalid)|invalid (oracle |vrf )?account|vrf ?account ?invalid|owner mismatch|account ?not ?initiali[sz]ed",
    )
}

fn network_regex() -> Option<&'static Regex> {
    pattern(
        &NETWORK_REGEX,
        r"(?i)network|connection (refused|reset|closed)|econn|fetch failed|failed to fetch|socket hang up|dns|blockhash not found|stale|\b50[24]\b",
    )
}

fn matches(re: Option<&'static Regex>, text: &str) -> bool {
    re.is_some_and(|re| re.is_match(text))
}

fn build(
    error_type: ErrorType,
    severity: Severity,
    is_retryable: bool,
    suggested_action: SuggestedAction,
    wait_time_ms: u64,
    message: String,
) -> ErrorClassification {
    ErrorClassification { error_type, severity, is_retryable, suggested_action, wait_time_ms, message }
}

fn timeout(message: String) -> ErrorClassification {
    build(ErrorType::Timeout, Severity::Medium, true, SuggestedAction::Retry, TIMEOUT_WAIT_MS, message)
}

fn queue_full(retry_after_ms: Option<u64>, message: String) -> ErrorClassification {
    let wait = retry_after_ms.unwrap_or(QUEUE_FULL_WAIT_MS);
    build(ErrorType::QueueFull, Severity::High, true, SuggestedAction::SwitchAccount, wait, message)
}

fn offline(message: String) -> ErrorClassification {
    build(
        ErrorType::OracleOffline,
        Severity::Critical,
        true,
        SuggestedAction::SwitchAccount,
        OFFLINE_WAIT_MS,
        message,
    )
}

fn account_invalid(message: String) -> ErrorClassification {
    build(
        ErrorType::AccountInvalid,
        Severity::Critical,
        true,
        SuggestedAction::SwitchAccount,
        0,
        message,
    )
}

fn network(message: String) -> ErrorClassification {
    build(ErrorType::Network, Severity::Medium, true, SuggestedAction::Retry, NETWORK_WAIT_MS, message)
}

fn user_abort(message: String) -> ErrorClassification {
    build(ErrorType::Unknown, Severity::High, false, SuggestedAction::Abort, 0, message)
}

fn unknown(message: String) -> ErrorClassification {
    build(ErrorType::Unknown, Severity::Medium, true, SuggestedAction::Retry, UNKNOWN_WAIT_MS, message)
}

/// Classification without account history or ambient network state.
pub(crate) fn base_classification(error: &OracleFailure) -> ErrorClassification {
    let message = error.to_string();
    match error {
        OracleFailure::Timeout { .. } => timeout(message),
        OracleFailure::QueueFull { retry_after_ms, .. } => queue_full(*retry_after_ms, message),
        OracleFailure::OracleOffline { .. } => offline(message),
        OracleFailure::AccountInvalid { .. } => account_invalid(message),
        OracleFailure::UserRejected | OracleFailure::InsufficientFunds { .. } => user_abort(message),
        OracleFailure::OnChain { .. } | OracleFailure::Other { .. } => classify_text(message),
    }
}

fn classify_text(message: String) -> ErrorClassification {
    let text = message.as_str();
    if matches(user_abort_regex(), text) {
        user_abort(message)
    } else if matches(timeout_regex(), text) {
        timeout(message)
    } else if matches(queue_full_regex(), text) {
        queue_full(None, message)
    } else if matches(offline_regex(), text) {
        offline(message)
    } else if matches(account_invalid_regex(), text) {
        account_invalid(message)
    } else if matches(network_regex(), text) {
        network(message)
    } else {
        unknown(message)
    }
}
