use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A small, blocking counting semaphore bounding concurrently running jobs.
pub(crate) struct Semaphore {
    permits: Mutex<usize>,
    cv: Condvar,
}

/// Returns its permit when dropped, including when the job panics or errors.
pub(crate) struct Permit<'a> {
    sem: &'a Semaphore,
}

impl Semaphore {
    /// `permits` must be greater than zero or `acquire` never returns.
    pub(crate) fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            cv: Condvar::new(),
        }
    }

    /// Acquire one permit, blocking until available.
    ///
    /// Also returns the time spent waiting (zero if no wait was required).
    pub(crate) fn acquire(&self) -> (Permit<'_>, Duration) {
        let start = Instant::now();
        let mut waited = false;
        let mut g = self.permits.lock().expect("semaphore mutex poisoned");
        while *g == 0 {
            waited = true;
            g = self.cv.wait(g).expect("semaphore mutex poisoned");
        }
        *g -= 1;
        let waited = if waited { start.elapsed() } else { Duration::ZERO };
        (Permit { sem: self }, waited)
    }

    fn release(&self) {
        let mut g = self.permits.lock().expect("semaphore mutex poisoned");
        *g += 1;
        self.cv.notify_one();
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.sem.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_a_permit_releases_it() {
        let sem = Semaphore::new(1);
        let (first, waited) = sem.acquire();
        assert_eq!(waited, Duration::ZERO);
        drop(first);
        let (_second, waited) = sem.acquire();
        assert_eq!(waited, Duration::ZERO);
    }

    #[test]
    fn acquire_blocks_until_a_permit_is_returned() {
        let sem = Semaphore::new(1);
        std::thread::scope(|s| {
            let (held, _) = sem.acquire();
            s.spawn(|| {
                let (_p, waited) = sem.acquire();
                assert!(waited > Duration::ZERO);
            });
            std::thread::sleep(Duration::from_millis(20));
            drop(held);
        });
    }
}
