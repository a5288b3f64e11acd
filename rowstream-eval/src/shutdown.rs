//! A process-wide shutdown flag set by `SIGINT`/`SIGTERM`/`SIGHUP` and
//! polled cooperatively between batches, with `SIGPIPE` restored to its
//! default action.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::flag;

/// A clonable handle to the shutdown flag.
#[derive(Clone)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    /// Installs signal handlers for `SIGINT`, `SIGTERM`, and `SIGHUP`
    /// that set the returned flag, and resets `SIGPIPE` to its default
    /// action so a closed downstream pipe kills the process instead of
    /// raising an ignored signal mid-write.
    pub fn install() -> std::io::Result<Shutdown> {
        let flag_value = Arc::new(AtomicBool::new(false));
        flag::register(SIGINT, flag_value.clone())?;
        flag::register(SIGTERM, flag_value.clone())?;
        flag::register(SIGHUP, flag_value.clone())?;
        #[cfg(unix)]
        unsafe {
            signal_hook::low_level::register(signal_hook::consts::SIGPIPE, || {
                signal_hook::low_level::emulate_default_handler(signal_hook::consts::SIGPIPE).ok();
            })?;
        }
        Ok(Shutdown(flag_value))
    }

    /// `true` once a shutdown signal has been received.
    pub fn requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unset() {
        let flag = Shutdown(Arc::new(AtomicBool::new(false)));
        assert!(!flag.requested());
    }
}
