// Trailing-edge throttle for per-device brightness commands.
//
// Time is passed in explicitly so the session loop and tests share one
// clock (tokio's, which can be paused).

use std::collections::HashMap;

use tokio::time::{Duration, Instant};

use crate::config::CoalescePolicy;
use crate::model::DeviceId;

/// Decision for one offered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Send immediately.
    SendNow,
    /// Held until the device's window closes. `replaced` is the sequence
    /// of the earlier hold it displaced, which will never be sent.
    Held { replaced: Option<u64> },
}

/// A held command whose window has closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueCommand {
    pub id: DeviceId,
    pub value: i32,
    pub sequence: u64,
}

#[derive(Debug)]
struct Window {
    closes_at: Instant,
    held: Option<(i32, u64)>,
}

#[derive(Debug)]
pub struct Coalescer {
    window: Duration,
    windows: HashMap<DeviceId, Window>,
}

impl Coalescer {
    pub fn new(policy: CoalescePolicy) -> Self {
        Self {
            window: policy.window,
            windows: HashMap::new(),
        }
    }

    pub fn offer(&mut self, id: &DeviceId, value: i32, sequence: u64, now: Instant) -> Offer {
        if self.window.is_zero() {
            return Offer::SendNow;
        }
        match self.windows.get_mut(id) {
            Some(window) if now < window.closes_at => {
                let replaced = window.held.replace((value, sequence)).map(|(_, seq)| seq);
                Offer::Held { replaced }
            }
            _ => {
                self.windows.insert(
                    id.clone(),
                    Window {
                        closes_at: now + self.window,
                        held: None,
                    },
                );
                Offer::SendNow
            }
        }
    }

    /// Earliest instant at which a held command becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.windows
            .values()
            .filter(|w| w.held.is_some())
            .map(|w| w.closes_at)
            .min()
    }

    /// Take every held command whose window closed by `now`.
    ///
    /// Sending a trailing command opens a fresh window for its device;
    /// expired windows with nothing held are dropped.
    pub fn flush_due(&mut self, now: Instant) -> Vec<DueCommand> {
        let mut due = Vec::new();
        let window = self.window;
        self.windows.retain(|id, w| {
            if now < w.closes_at {
                return true;
            }
            match w.held.take() {
                Some((value, sequence)) => {
                    due.push(DueCommand {
                        id: id.clone(),
                        value,
                        sequence,
                    });
                    w.closes_at = now + window;
                    true
                }
                None => false,
            }
        });
        due.sort_by_key(|c| c.sequence);
        due
    }

    /// Take every held command regardless of its window. Used on teardown.
    pub fn flush_all(&mut self) -> Vec<DueCommand> {
        let mut due: Vec<_> = self
            .windows
            .drain()
            .filter_map(|(id, w)| {
                w.held.map(|(value, sequence)| DueCommand {
                    id,
                    value,
                    sequence,
                })
            })
            .collect();
        due.sort_by_key(|c| c.sequence);
        due
    }

    /// Drop any window and hold for a device that no longer exists,
    /// returning the sequence of the dropped hold.
    pub fn forget(&mut self, id: &DeviceId) -> Option<u64> {
        self.windows
            .remove(id)
            .and_then(|w| w.held)
            .map(|(_, sequence)| sequence)
    }

    pub fn held(&self, id: &DeviceId) -> Option<i32> {
        self.windows.get(id).and_then(|w| w.held).map(|(v, _)| v)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn coalescer(ms: u64) -> Coalescer {
        Coalescer::new(CoalescePolicy {
            window: Duration::from_millis(ms),
        })
    }

    #[test]
    fn disabled_policy_always_sends() {
        let mut c = Coalescer::new(CoalescePolicy::DISABLED);
        let now = Instant::now();
        let id = DeviceId::from("D1");
        assert_eq!(c.offer(&id, 1, 1, now), Offer::SendNow);
        assert_eq!(c.offer(&id, 2, 2, now), Offer::SendNow);
        assert!(c.next_deadline().is_none());
    }

    #[test]
    fn burst_sends_first_and_last() {
        let mut c = coalescer(40);
        let t0 = Instant::now();
        let id = DeviceId::from("D1");

        assert_eq!(c.offer(&id, 10, 1, t0), Offer::SendNow);
        assert_eq!(
            c.offer(&id, 20, 2, t0 + Duration::from_millis(5)),
            Offer::Held { replaced: None }
        );
        assert_eq!(
            c.offer(&id, 30, 3, t0 + Duration::from_millis(10)),
            Offer::Held { replaced: Some(2) }
        );
        assert_eq!(c.held(&id), Some(30));
        assert_eq!(c.next_deadline(), Some(t0 + Duration::from_millis(40)));

        assert!(c.flush_due(t0 + Duration::from_millis(39)).is_empty());
        let due = c.flush_due(t0 + Duration::from_millis(40));
        assert_eq!(
            due,
            vec![DueCommand {
                id: id.clone(),
                value: 30,
                sequence: 3
            }]
        );

        // The trailing send opened a new window.
        assert_eq!(
            c.offer(&id, 40, 4, t0 + Duration::from_millis(50)),
            Offer::Held { replaced: None }
        );
    }

    #[test]
    fn devices_are_independent() {
        let mut c = coalescer(40);
        let t0 = Instant::now();
        assert_eq!(c.offer(&"D1".into(), 1, 1, t0), Offer::SendNow);
        assert_eq!(c.offer(&"D2".into(), 1, 2, t0), Offer::SendNow);
    }

    #[test]
    fn idle_window_expires_without_sending() {
        let mut c = coalescer(40);
        let t0 = Instant::now();
        let id = DeviceId::from("D1");
        c.offer(&id, 1, 1, t0);

        assert!(c.flush_due(t0 + Duration::from_millis(100)).is_empty());
        assert_eq!(c.offer(&id, 2, 2, t0 + Duration::from_millis(100)), Offer::SendNow);
    }

    #[test]
    fn forget_drops_held_value() {
        let mut c = coalescer(40);
        let t0 = Instant::now();
        let id = DeviceId::from("D1");
        c.offer(&id, 1, 1, t0);
        c.offer(&id, 2, 2, t0);
        assert_eq!(c.forget(&id), Some(2));
        assert!(c.next_deadline().is_none());
        assert!(c.flush_due(t0 + Duration::from_secs(1)).is_empty());
        assert_eq!(c.forget(&id), None);
    }

    #[test]
    fn flush_all_ignores_open_windows() {
        let mut c = coalescer(40);
        let t0 = Instant::now();
        c.offer(&"D1".into(), 1, 1, t0);
        c.offer(&"D2".into(), 1, 2, t0);
        c.offer(&"D2".into(), 7, 3, t0 + Duration::from_millis(1));
        c.offer(&"D1".into(), 9, 4, t0 + Duration::from_millis(2));

        let flushed = c.flush_all();
        assert_eq!(
            flushed.iter().map(|c| (c.value, c.sequence)).collect::<Vec<_>>(),
            vec![(7, 3), (9, 4)]
        );
        assert!(c.next_deadline().is_none());
        assert_eq!(c.offer(&"D1".into(), 2, 5, t0 + Duration::from_millis(3)), Offer::SendNow);
    }
}
