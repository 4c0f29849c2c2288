use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber from the configured log level.
///
/// `DISABLED` installs nothing. Python-style level names (`WARNING`,
/// `CRITICAL`) are accepted for config compatibility and mapped onto
/// tracing's vocabulary; anything unparseable falls back to `INFO`.
pub fn init_tracing(log_level: &str) {
    let Some(directive) = level_directive(log_level) else {
        return;
    };

    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("INFO"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn level_directive(log_level: &str) -> Option<&'static str> {
    match log_level.to_uppercase().as_str() {
        "DISABLED" => None,
        "TRACE" => Some("TRACE"),
        "DEBUG" => Some("DEBUG"),
        "WARN" | "WARNING" => Some("WARN"),
        "ERROR" | "CRITICAL" => Some("ERROR"),
        _ => Some("INFO"),
    }
}

/// Log a completed request with token usage and latency.
pub fn log_request_complete(
    ingress: &'static str,
    model: &str,
    prompt_tokens: u64,
    completion_tokens: u64,
    start_time: std::time::Instant,
) {
    let elapsed_ms = start_time.elapsed().as_millis();
    tracing::info!(
        ingress,
        model,
        prompt_tokens,
        completion_tokens,
        elapsed_ms,
        "request complete"
    );
}

#[cfg(test)]
mod tests {
    use super::level_directive;

    #[test]
    fn test_level_directive_mapping() {
        assert_eq!(level_directive("disabled"), None);
        assert_eq!(level_directive("WARNING"), Some("WARN"));
        assert_eq!(level_directive("CRITICAL"), Some("ERROR"));
        assert_eq!(level_directive("DEBUG"), Some("DEBUG"));
        assert_eq!(level_directive("bogus"), Some("INFO"));
    }
}
