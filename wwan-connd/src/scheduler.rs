use std::time::Duration;
use tokio::time::Instant;

/// A repeating timer that only advances when polled.
///
/// Nothing runs in the background: the owner asks for [`RepeatingTask::deadline`],
/// sleeps until then and calls [`RepeatingTask::poll_tick`]. Tests drive it with
/// explicit instants.
#[derive(Debug, Clone)]
pub struct RepeatingTask {
    period: Duration,
    next: Option<Instant>,
}

impl RepeatingTask {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next: None,
        }
    }

    /// (Re)arms the task, first tick one period from `now`.
    pub fn start(&mut self, now: Instant) {
        self.next = Some(now + self.period);
    }

    pub fn cancel(&mut self) {
        self.next = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next
    }

    /// `true` if a tick is due at `now`. Missed ticks collapse into one.
    pub fn poll_tick(&mut self, now: Instant) -> bool {
        let Some(mut next) = self.next else {
            return false;
        };

        if now < next {
            return false;
        }

        while next <= now {
            next += self.period;
        }

        self.next = Some(next);

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_secs(5);

    #[test]
    fn inactive_until_started() {
        let mut task = RepeatingTask::new(PERIOD);

        assert_eq!(task.deadline(), None);
        assert!(!task.poll_tick(Instant::now() + PERIOD * 10));
    }

    #[test]
    fn ticks_once_per_period() {
        let t0 = Instant::now();
        let mut task = RepeatingTask::new(PERIOD);
        task.start(t0);

        assert!(!task.poll_tick(t0 + PERIOD - Duration::from_millis(1)));
        assert!(task.poll_tick(t0 + PERIOD));
        assert!(!task.poll_tick(t0 + PERIOD));
        assert_eq!(task.deadline(), Some(t0 + PERIOD * 2));
        assert!(task.poll_tick(t0 + PERIOD * 2));
    }

    #[test]
    fn missed_ticks_collapse() {
        let t0 = Instant::now();
        let mut task = RepeatingTask::new(PERIOD);
        task.start(t0);

        assert!(task.poll_tick(t0 + PERIOD * 3 + Duration::from_secs(1)));
        assert_eq!(task.deadline(), Some(t0 + PERIOD * 4));
        assert!(!task.poll_tick(t0 + PERIOD * 3 + Duration::from_secs(2)));
    }

    #[test]
    fn cancel_stops_ticking() {
        let t0 = Instant::now();
        let mut task = RepeatingTask::new(PERIOD);
        task.start(t0);
        task.cancel();

        assert_eq!(task.deadline(), None);
        assert!(!task.poll_tick(t0 + PERIOD * 100));
    }

    #[test]
    fn restart_rearms_from_now() {
        let t0 = Instant::now();
        let mut task = RepeatingTask::new(PERIOD);
        task.start(t0);
        assert!(task.poll_tick(t0 + PERIOD));

        task.start(t0 + PERIOD);

        assert!(!task.poll_tick(t0 + PERIOD));
        assert_eq!(task.deadline(), Some(t0 + PERIOD * 2));
    }
}
