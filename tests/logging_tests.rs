use spotledger::logging::{LogContext, StructuredLogger, get_logger, parse_log_level};
use tracing::Level;

#[test]
fn parse_log_level_accepts_common_spellings() {
    assert_eq!(parse_log_level("trace").unwrap(), Level::TRACE);
    assert_eq!(parse_log_level("Warning").unwrap(), Level::WARN);
    assert_eq!(parse_log_level("ERROR").unwrap(), Level::ERROR);
    let err = parse_log_level("loud").unwrap_err();
    assert!(format!("{}", err).contains("Invalid log level"));
}

#[test]
fn loggers_without_subscriber_do_not_panic() {
    let logger = get_logger("reconcile").for_year(2024);
    logger.info("info");
    logger.warn("warn");
    logger.error("error");
    logger.debug("debug");
    logger.trace("trace");

    let custom = StructuredLogger::new(
        LogContext::new("cache").with_field("blob", "ledger-2024.json".to_string()),
    );
    custom.info("custom context");
}
