use eyre::Result;
use slog::Drain;
use slog_atomic::{AtomicSwitch, AtomicSwitchCtrl};
use slog_term::{CompactFormat, TermDecorator};
use std::io;
use std::sync::Mutex;
use time::OffsetDateTime;

use slog::*;

use crate::helpers::datetime::Timezone;

pub struct Logger {
    log_level: Mutex<u8>,
    logger: slog::Logger,
    ctrl: AtomicSwitchCtrl,
}

fn new_drain(level: Level) -> Fuse<Mutex<Fuse<LevelFilter<CompactFormat<TermDecorator>>>>> {
    // Logs go to stderr, stdout is reserved for the tx hash and block number
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::CompactFormat::new(decorator)
        .use_custom_timestamp(|w: &mut dyn io::Write| {
            write!(
                w,
                "{}",
                OffsetDateTime::now_utc()
                    .to_localtime()
                    .to_formatted_string()
            )
        })
        .build()
        .filter_level(level)
        .fuse();
    // Uncomment for async logging
    //let drain = slog_async::Async::new(drain).build().fuse();
    Mutex::new(drain).fuse()
}

/// 0: critical, 1: error, 2: warning, 3: info, 4: debug, 5: trace
pub fn level_from(log_level: u8) -> Level {
    match log_level {
        0 => Level::Critical,
        1 => Level::Error,
        2 => Level::Warning,
        3 => Level::Info,
        4 => Level::Debug,
        5 => Level::Trace,
        // Default to info
        _ => Level::Info,
    }
}

fn drain_from_log_level(log_level: u8) -> AtomicSwitch {
    AtomicSwitch::new(new_drain(level_from(log_level)))
}

impl Logger {
    pub fn new(log_level: u8) -> Self {
        // init AtomicSwitch
        let drain = drain_from_log_level(log_level);
        let logger = slog::Logger::root(
            drain.clone(),
            slog::o!("version" => env!("CARGO_PKG_VERSION")),
        );
        Logger {
            log_level: Mutex::new(log_level),
            logger,
            ctrl: drain.ctrl(),
        }
    }

    /// Route the `log` macros through our slog drain
    pub fn set_global(&self) -> Result<&Self> {
        // slog_stdlog uses the logger from slog_scope, so set a logger there
        let guard = slog_scope::set_global_logger(self.logger.clone());
        // https://github.com/slog-rs/slog/issues/249
        guard.cancel_reset();
        // Let everything through, the drain does the filtering
        slog_stdlog::init_with_level(log::Level::Trace)?;
        Ok(self)
    }

    pub fn log_level(&self) -> u8 {
        self.log_level.lock().map(|ll| *ll).unwrap_or(3)
    }

    pub fn set_log_level(&self, log_level: u8) -> &Self {
        self.ctrl.set(drain_from_log_level(log_level));
        if let Ok(mut ll) = self.log_level.lock() {
            *ll = log_level;
        }
        self
    }
}
