use tracing_subscriber::EnvFilter;

const QUIET_TARGETS: &[&str] = &["reqwest=warn", "hyper=warn", "hyper_util=warn", "teloxide=warn"];

pub fn setup_logger() {
    // RUST_LOG wins over the built-in defaults when present.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        QUIET_TARGETS
            .iter()
            .filter_map(|directive| directive.parse().ok())
            .fold(EnvFilter::new("info"), |filter, directive| {
                filter.add_directive(directive)
            })
    });

    tracing_subscriber::fmt()
        // .with_file(true)
        // .with_line_number(true)
        .with_target(true)
        .with_level(true)
        .with_ansi(true)
        .compact()
        .with_env_filter(filter)
        .init();
}
