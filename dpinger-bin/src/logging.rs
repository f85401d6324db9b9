//! console + per-category rolling file logging (C9)

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter, Targets},
    fmt,
    prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

use dpinger_config::LogConfig;

/// keeps the non-blocking writers alive for the lifetime of the process;
/// dropping a guard flushes and stops its worker thread.
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

fn file_layer<S>(
    dir: &str,
    category: &str,
) -> (
    impl tracing_subscriber::Layer<S> + Send + Sync + 'static,
    WorkerGuard,
)
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let appender = tracing_appender::rolling::daily(dir, format!("dpinger.{category}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    (fmt::layer().with_writer(non_blocking).with_ansi(false), guard)
}

/// initializes the console layer and one rolling file layer per category.
///
/// Grounded on `dora_core::config::trace::Config::parse`'s `EnvFilter` +
/// `tracing_subscriber::registry()` construction, extended with
/// `tracing-appender` daily rolling writers instead of a single stdout layer.
/// `regular` carries everything at info+, `error` is level-filtered,
/// `panic` catches the dedicated `"panic"` target used when the ICMP
/// reader recovers a caught panic, `updates` catches reconciler/prober
/// activity, `debug` is gated on `log.debug`, and `rest` is the catch-all.
pub fn init(config: &LogConfig) -> Result<LogGuards> {
    let console_level = if config.debug { "debug" } else { "info" };
    let console_filter = EnvFilter::try_new(console_level)
        .or_else(|_| EnvFilter::try_new("info"))?
        .add_directive("hyper=off".parse()?);

    let mut guards = Vec::with_capacity(6);

    let (regular, guard) = file_layer(&config.dir, "regular");
    guards.push(guard);
    let regular = regular.with_filter(LevelFilter::INFO);

    let (error, guard) = file_layer(&config.dir, "error");
    guards.push(guard);
    let error = error.with_filter(LevelFilter::ERROR);

    let (panic, guard) = file_layer(&config.dir, "panic");
    guards.push(guard);
    let panic = panic.with_filter(Targets::new().with_target("panic", LevelFilter::TRACE));

    let (updates, guard) = file_layer(&config.dir, "updates");
    guards.push(guard);
    let updates = updates.with_filter(
        Targets::new()
            .with_target("dpinger_inventory::reconciler", LevelFilter::TRACE)
            .with_target("dpinger_inventory::prober", LevelFilter::TRACE),
    );

    let (rest, guard) = file_layer(&config.dir, "rest");
    guards.push(guard);

    let registry = tracing_subscriber::registry()
        .with(console_filter)
        .with(fmt::layer())
        .with(regular)
        .with(error)
        .with(panic)
        .with(updates)
        .with(rest);

    if config.debug {
        let (debug, guard) = file_layer(&config.dir, "debug");
        guards.push(guard);
        registry.with(debug.with_filter(LevelFilter::DEBUG)).init();
    } else {
        registry.init();
    }

    Ok(LogGuards { _guards: guards })
}
