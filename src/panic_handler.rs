use log::error;
use std::panic;

/// Pretty backtraces on stderr, plus a log record of every panic.
///
/// The process is not terminated here: render workers catch page panics and
/// turn them into faults, so only panics on the UI thread end the program.
pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let thread = std::thread::current();
        error!(
            "panic in thread '{}': {panic_info}",
            thread.name().unwrap_or("<unnamed>")
        );
        log::logger().flush();

        default_hook(panic_info);
    }));
}
