//! Operation progress reporting.
//!
//! Operations pre-size a tick budget, tick once per unit of work, and close
//! with an explicit final tick. The callback doubles as the cancellation
//! channel: returning [`Cancelled`] stops the running operation before its
//! next transport call.

use crate::error::{Error, Result};

/// Lowest value the progress callback observes.
pub const MIN_PROGRESS: u32 = 0;
/// Value the counter reaches when an operation completes.
pub const MAX_PROGRESS: u32 = 1_000_000;

/// Returned by a progress callback to stop the current operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Callback invoked on every progress tick with the current counter.
pub type ProgressCallback = Box<dyn FnMut(u32) -> std::result::Result<(), Cancelled> + Send>;

/// Progress state carried by a session.
///
/// The counter is monotone within an operation and is clamped at
/// [`MAX_PROGRESS`], so a phase whose tick budget was an estimate cannot
/// overshoot.
#[derive(Default)]
pub(crate) struct Progress {
    callback: Option<ProgressCallback>,
    increment: u32,
    counter: u32,
}

impl Progress {
    pub(crate) fn set_callback(&mut self, callback: Option<ProgressCallback>) {
        self.callback = callback;
    }

    pub(crate) fn take_callback(&mut self) -> Option<ProgressCallback> {
        self.callback.take()
    }

    /// Sizes the increment so `count` ticks reach [`MAX_PROGRESS`], resets
    /// the counter and reports the starting value.
    pub(crate) fn set_max_count(&mut self, count: usize) -> Result<()> {
        self.increment = MAX_PROGRESS / count.max(1) as u32;
        self.counter = 0;
        self.report()
    }

    /// One unit of work: advances the counter and notifies the callback.
    pub(crate) fn tick(&mut self) -> Result<()> {
        self.counter = self.counter.saturating_add(self.increment).min(MAX_PROGRESS);
        self.report()
    }

    /// Forces the counter to [`MAX_PROGRESS`] at the end of a phase. The
    /// callback result is ignored; there is nothing left to cancel.
    pub(crate) fn finish(&mut self) {
        self.counter = MAX_PROGRESS;
        if let Some(callback) = &mut self.callback {
            let _ = callback(MAX_PROGRESS);
        }
    }

    fn report(&mut self) -> Result<()> {
        match &mut self.callback {
            Some(callback) => callback(self.counter).map_err(|_| Error::Cancelled),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording() -> (Progress, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut progress = Progress::default();
        progress.set_callback(Some(Box::new(move |counter| {
            sink.lock().unwrap().push(counter);
            Ok(())
        })));
        (progress, seen)
    }

    #[test]
    fn counter_is_monotone_and_finishes_at_max() {
        let (mut progress, seen) = recording();
        progress.set_max_count(4).unwrap();
        for _ in 0..4 {
            progress.tick().unwrap();
        }
        progress.finish();

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
        assert_eq!(*seen.last().unwrap(), MAX_PROGRESS);
    }

    #[test]
    fn overshooting_the_budget_clamps_at_max() {
        let (mut progress, seen) = recording();
        progress.set_max_count(2).unwrap();
        for _ in 0..5 {
            progress.tick().unwrap();
        }
        assert_eq!(*seen.lock().unwrap().last().unwrap(), MAX_PROGRESS);
    }

    #[test]
    fn callback_error_cancels() {
        let mut progress = Progress::default();
        let mut remaining = 2;
        progress.set_callback(Some(Box::new(move |_| {
            if remaining == 0 {
                return Err(Cancelled);
            }
            remaining -= 1;
            Ok(())
        })));
        progress.set_max_count(10).unwrap();
        assert!(progress.tick().is_ok());
        assert!(matches!(progress.tick(), Err(Error::Cancelled)));
    }

    #[test]
    fn no_callback_means_no_op() {
        let mut progress = Progress::default();
        progress.set_max_count(3).unwrap();
        assert!(progress.tick().is_ok());
        progress.finish();
    }
}
