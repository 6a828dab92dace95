// Logging setup for corral
//
// Runtime diagnostics are emitted through `tracing` from every worker, timer
// and dedicated thread. Nothing is printed unless the application installs a
// subscriber, either its own or one of the presets below.
//
// # Usage Examples
//
// ```rust,no_run
// use corral::logging;
//
// // INFO level, human-readable console output
// logging::init(logging::LogConfig::default());
//
// // or one of the presets
// logging::init_development();
// ```
//
// Targets follow module paths, so worker chatter can be tuned separately:
//
// ```text
// RUST_LOG=corral=info,corral::worker=trace
// ```

use std::io;
use std::sync::Once;

use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::registry::{LookupSpan, Registry};
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Configuration for the corral logging presets
///
/// # Examples
///
/// ```rust
/// use corral::logging::LogConfig;
/// use tracing::Level;
///
/// let config = LogConfig {
///     level: Level::DEBUG,
///     json_format: true,
///     target_filters: Some("corral=debug,corral::worker=trace".to_string()),
///     ..Default::default()
/// };
/// assert!(config.show_time);
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

// Initialization guard to ensure we only initialize once
static INIT: Once = Once::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env().add_directive(config.level.into());
    if let Some(filters) = &config.target_filters {
        for directive in filters.split(',') {
            if let Ok(directive) = directive.trim().parse() {
                filter = filter.add_directive(directive);
            }
        }
    }
    filter
}

fn fmt_layer<S>(config: &LogConfig, ansi: bool, writer: BoxMakeWriter) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let layer = fmt::layer()
        .with_ansi(ansi)
        .with_file(config.show_file_line)
        .with_line_number(config.show_file_line)
        .with_thread_names(config.show_thread_info)
        .with_thread_ids(config.show_thread_info)
        .with_writer(writer);

    match (config.json_format, config.show_time) {
        (true, true) => layer.json().flatten_event(true).boxed(),
        (true, false) => layer.json().flatten_event(true).without_time().boxed(),
        (false, true) => layer.boxed(),
        (false, false) => layer.without_time().boxed(),
    }
}

fn install(filter: EnvFilter, layers: Vec<BoxedLayer>) {
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::registry().with(layers).with(filter);
        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Error setting global tracing subscriber: {}", err);
        }
    });
}

/// Install the global subscriber for `config`.
///
/// Safe to call more than once; only the first successful installation
/// (from any of the `init*` functions) takes effect.
pub fn init(config: LogConfig) {
    let console = fmt_layer(
        &config,
        atty::is(atty::Stream::Stdout),
        BoxMakeWriter::new(io::stdout),
    );
    install(env_filter(&config), vec![console]);
}

/// Append-mode file writer, creating the file if needed.
pub fn file_writer(path: &str) -> io::Result<Box<dyn io::Write + Send + Sync + 'static>> {
    use std::fs::OpenOptions;

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Box::new(file))
}

/// Log to the console as configured and, in plain text, to `log_file`.
///
/// Fails if the file cannot be opened; nothing is installed in that case.
pub fn init_with_file(config: LogConfig, log_file: &str) -> io::Result<()> {
    // surface open errors here rather than on every write
    file_writer(log_file)?;

    let console = fmt_layer(
        &config,
        atty::is(atty::Stream::Stdout),
        BoxMakeWriter::new(io::stdout),
    );
    let path = log_file.to_string();
    let file_config = LogConfig {
        json_format: false,
        show_file_line: true,
        show_thread_info: true,
        ..config.clone()
    };
    let file = fmt_layer(
        &file_config,
        false,
        BoxMakeWriter::new(move || match file_writer(&path) {
            Ok(writer) => writer,
            Err(_) => Box::new(io::stderr()),
        }),
    );
    install(env_filter(&config), vec![console, file]);
    Ok(())
}

/// DEBUG everywhere, TRACE for worker threads, colored console output.
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        json_format: false,
        show_file_line: true,
        show_thread_info: true,
        show_time: true,
        target_filters: Some("corral=debug,corral::worker=trace".to_string()),
    });
}

/// INFO level JSON lines without source locations.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    });
}

/// WARN level, compact output captured by the libtest harness.
///
/// ```rust
/// corral::logging::init_for_tests();
/// // a second call is a no-op
/// corral::logging::init_for_tests();
/// ```
pub fn init_for_tests() {
    let config = LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    };
    let layer = fmt_layer(&config, false, BoxMakeWriter::new(fmt::TestWriter::new()));
    install(env_filter(&config), vec![layer]);
}

/// Span entered around one execution of a work item.
///
/// # Examples
///
/// ```rust
/// let span = corral::work_span!(corral::WorkId::Seq(7));
/// let _guard = span.enter();
///
/// let span = corral::work_span!("nightly", attempt = 2);
/// ```
#[macro_export]
macro_rules! work_span {
    ($id:expr) => {
        $crate::logging::debug_span!("work", id = %$id)
    };
    ($id:expr, $($fields:tt)*) => {
        $crate::logging::debug_span!("work", id = %$id, $($fields)*)
    };
}

/// Span covering the lifetime of one worker thread.
#[macro_export]
macro_rules! worker_span {
    ($pool:expr, $worker:expr) => {
        $crate::logging::debug_span!("worker", pool = $pool, worker = $worker)
    };
}

/// The current tracing dispatcher, for threads that should share the caller's configuration.
#[inline]
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}

// Re-export the most commonly used tracing macros for convenience
pub use tracing::{debug, debug_span, error, info, trace, warn};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_filters_are_parsed() {
        let config = LogConfig {
            target_filters: Some("corral=debug, corral::worker=trace".into()),
            ..Default::default()
        };
        let filter = env_filter(&config).to_string();
        assert!(filter.contains("corral::worker=trace"));
    }

    #[test]
    fn test_init_is_idempotent() {
        init_for_tests();
        init_for_tests();
        init(LogConfig::default());
        tracing::warn!("still logging after repeated init");
    }
}
