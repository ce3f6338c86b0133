//! Logging facilities.

use atty::Stream;
use colored::{Color, ColoredString, Colorize};
use log::error;
use serde_json::json;

use crate::event::{Event, EventData, EventId};

/// Applies the color to the string if stderr (log) goes to console.
pub fn get_colored(s: &str, color: Color) -> ColoredString {
    if atty::is(Stream::Stderr) {
        s.color(color)
    } else {
        s.normal()
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_with_ctx {
    ($level:ident, $label:expr, $color:ident, $ctx:expr, $format:literal $($arg:tt)*) => (
        log::$level!(
            target: $ctx.name(),
            concat!("[{:.3} {} {}] ", $format),
            $ctx.time(),
            $crate::log::get_colored($label, $crate::colored::Color::$color),
            $ctx.name()
            $($arg)*
        )
    );
}

/// Logs a message at the info level, prefixed with the simulation time and the component name.
///
/// The first argument is anything with `name()` and `time()`, usually a [`SimulationContext`](crate::SimulationContext):
///
/// ```rust
/// log_info!(self.ctx, "server {} is waking up", self.index);
/// ```
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_ctx!(info, "INFO ", Green, $ctx, $($arg)+));
}

/// Logs a message at the debug level.
///
/// See [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_ctx!(debug, "DEBUG", Blue, $ctx, $($arg)+));
}

/// Logs a message at the trace level.
///
/// See [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_trace {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_ctx!(trace, "TRACE", Cyan, $ctx, $($arg)+));
}

/// Logs a message at the warn level.
///
/// See [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_ctx!(warn, "WARN ", Yellow, $ctx, $($arg)+));
}

/// Logs a message at the error level.
///
/// See [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_ctx!(error, "ERROR", Red, $ctx, $($arg)+));
}

/// Logs an event whose destination has no registered handler.
pub(crate) fn log_undelivered_event<E: EventData>(event: &Event<E>) {
    error!(
        target: "simulation",
        "[{:.3} {} simulation] Undelivered event: {}",
        event.time,
        crate::log::get_colored("ERROR", colored::Color::Red),
        json!({"id": event.id, "data": event.data, "src": event.src, "dest": event.dest})
    );
}

/// Logs an event that cannot be scheduled.
pub(crate) fn log_incorrect_event<E: EventData>(event: &Event<E>, msg: &str) {
    error!(
        target: "simulation",
        "[{:.3} {} simulation] Incorrect event ({}): {}",
        event.time,
        crate::log::get_colored("ERROR", colored::Color::Red),
        msg,
        json!({"id": event.id, "data": event.data, "src": event.src, "dest": event.dest})
    );
}

/// Logs an attempt to cancel an event that already fired or was canceled before.
pub(crate) fn log_missing_cancel(time: f64, id: EventId) {
    error!(
        target: "simulation",
        "[{:.3} {} simulation] Cannot cancel event {}: it is not pending",
        time,
        crate::log::get_colored("ERROR", colored::Color::Red),
        id
    );
}
