use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Cloneable stop signal shared between the controller and its worker tasks.
///
/// Workers poll `is_stopped` between pulls and use `wait_timeout` as an
/// interruptible backoff, so stopping never waits for a sleep to elapse.
#[derive(Debug)]
pub struct StopSignal {
    shared: Arc<SharedState>,
}

#[derive(Debug)]
struct SharedState {
    stopped: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl StopSignal {
    pub fn new() -> StopSignal {
        StopSignal {
            shared: Arc::new(SharedState {
                stopped: AtomicBool::new(false),
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            }),
        }
    }

    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Relaxed);

        // Lock briefly to synchronize with any thread about to wait
        let _guard = self.shared.mutex.lock().unwrap();
        self.shared.condvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Relaxed)
    }

    /// Sleep up to `timeout`, waking early on `stop`. Returns whether the
    /// signal fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.shared.mutex.lock().unwrap();
        if self.is_stopped() {
            return true;
        }
        let (_guard, _result) = self.shared.condvar.wait_timeout(guard, timeout).unwrap();
        self.is_stopped()
    }
}

impl Clone for StopSignal {
    fn clone(&self) -> StopSignal {
        StopSignal {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_stop_is_visible_across_clones() {
        let signal = StopSignal::new();
        let clone = signal.clone();

        assert!(!clone.is_stopped());
        signal.stop();
        assert!(clone.is_stopped());
    }

    #[test]
    fn test_wait_timeout_elapses() {
        let signal = StopSignal::new();
        let fired = signal.wait_timeout(Duration::from_millis(10));
        assert!(!fired);
    }

    #[test]
    fn test_stop_wakes_waiter() {
        let signal = StopSignal::new();
        let waiter = signal.clone();

        let handle = thread::spawn(move || {
            let start = Instant::now();
            let fired = waiter.wait_timeout(Duration::from_secs(5));
            (fired, start.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        signal.stop();

        let (fired, elapsed) = handle.join().unwrap();
        assert!(fired);
        assert!(elapsed < Duration::from_secs(5));
    }
}
