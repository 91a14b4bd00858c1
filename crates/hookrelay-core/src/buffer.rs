//! The in-progress batch and its exclusive critical section.
//!
//! [`EventBuffer`] is the only place the batch-in-progress can be mutated.
//! Appends and detaches are serialized by a single [`Mutex`], so a batch
//! moves to "in flight" in the same critical section that opens the next
//! empty batch. No event can be lost between the two, and no event can be
//! observed by two detaches.
//!
//! Each batch is identified by a generation number. Interval timers are
//! armed for a generation and can only detach that generation, which keeps
//! a late timer from cutting a newer batch short.
//!
//! The lock is never held across delivery or retry sleeps; callers get the
//! detached [`Batch`] by value and own it exclusively from then on.

use hookrelay_types::{Batch, Event};
use tokio::sync::Mutex;

use crate::trigger::{FlushTimer, FlushTrigger};

/// Result of appending an event to the buffer.
#[derive(Debug)]
pub enum AddOutcome {
    /// The event was appended and the batch is still below the threshold.
    Pending {
        /// Generation of the batch the event joined.
        generation: u64,
        /// Whether this event opened a new batch. The caller arms the
        /// interval timer for `generation` when this is set.
        opened: bool,
    },
    /// The append reached the size threshold and the batch was detached.
    ///
    /// The caller is responsible for handing it to delivery.
    Ready(Batch),
}

impl AddOutcome {
    /// Whether the append pushed the batch over the size threshold.
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Mutable state guarded by the buffer lock.
#[derive(Debug, Default)]
struct BufferState {
    /// Batch-in-progress. `None` while empty.
    batch: Option<Batch>,
    /// Generation of the current (or next) batch-in-progress.
    generation: u64,
    /// Interval timer armed for `generation`, if any.
    timer: Option<FlushTimer>,
}

impl BufferState {
    /// Detach the in-progress batch and open the next generation.
    ///
    /// Cancels the interval timer of the detached generation.
    fn detach(&mut self) -> Option<Batch> {
        let batch = self.batch.take()?;
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        Some(batch)
    }
}

/// Thread-safe accumulator for the batch-in-progress.
#[derive(Debug)]
pub struct EventBuffer {
    state: Mutex<BufferState>,
    trigger: FlushTrigger,
}

impl EventBuffer {
    /// Create an empty buffer governed by `trigger`.
    pub fn new(trigger: FlushTrigger) -> Self {
        Self {
            state: Mutex::new(BufferState::default()),
            trigger,
        }
    }

    /// The flush trigger this buffer evaluates on every append.
    pub const fn trigger(&self) -> &FlushTrigger {
        &self.trigger
    }

    /// Append an event to the batch-in-progress.
    ///
    /// When the append brings the batch to the size threshold, the batch
    /// is detached before the lock is released and returned as
    /// [`AddOutcome::Ready`]. Concurrent callers therefore never see a
    /// batch larger than the threshold.
    pub async fn add(&self, event: Event) -> AddOutcome {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let opened = if let Some(batch) = state.batch.as_mut() {
            batch.push(event);
            false
        } else {
            state.batch = Some(Batch::start(event));
            true
        };

        let len = state.batch.as_ref().map_or(0, Batch::len);
        if self.trigger.size_reached(len) {
            if let Some(batch) = state.detach() {
                return AddOutcome::Ready(batch);
            }
        }

        AddOutcome::Pending {
            generation: state.generation,
            opened,
        }
    }

    /// Detach the whole batch-in-progress and start a fresh one.
    ///
    /// Returns `None` when the buffer is empty, so duplicate flush
    /// requests never produce an empty delivery.
    pub async fn take_and_reset(&self) -> Option<Batch> {
        self.state.lock().await.detach()
    }

    /// Detach the batch-in-progress only if it is still `generation`.
    ///
    /// Used by the interval timer of that generation. The timer handle is
    /// released without being aborted, since the caller is the timer task.
    pub async fn take_generation(&self, generation: u64) -> Option<Batch> {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            return None;
        }
        drop(state.timer.take());
        let batch = state.batch.take()?;
        state.generation = state.generation.wrapping_add(1);
        Some(batch)
    }

    /// Attach an interval timer to `generation`.
    ///
    /// If that generation has already been detached (the size trigger or
    /// the timer itself won the race), the timer is cancelled instead.
    /// Returns whether the timer was kept.
    pub async fn arm(&self, generation: u64, timer: FlushTimer) -> bool {
        let mut state = self.state.lock().await;
        if state.generation == generation && state.batch.is_some() && state.timer.is_none() {
            state.timer = Some(timer);
            true
        } else {
            timer.cancel();
            false
        }
    }

    /// Number of events in the batch-in-progress.
    pub async fn len(&self) -> usize {
        self.state.lock().await.batch.as_ref().map_or(0, Batch::len)
    }

    /// Whether the batch-in-progress is empty.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.batch.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use hookrelay_types::EventId;

    use super::*;

    fn event(n: u32) -> Event {
        Event::new(serde_json::json!({ "n": n }))
    }

    fn buffer(threshold: usize) -> EventBuffer {
        EventBuffer::new(FlushTrigger::new(threshold, Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn below_threshold_stays_pending() {
        let buf = buffer(3);

        let first = buf.add(event(1)).await;
        assert!(matches!(first, AddOutcome::Pending { opened: true, .. }));

        let second = buf.add(event(2)).await;
        assert!(matches!(second, AddOutcome::Pending { opened: false, .. }));
        assert!(!second.is_ready());

        assert_eq!(buf.len().await, 2);
    }

    #[tokio::test]
    async fn reaching_threshold_detaches_exactly_threshold_events_in_order() {
        let buf = buffer(3);
        let events: Vec<Event> = (0..3).map(event).collect();
        let expected: Vec<EventId> = events.iter().map(|e| e.id).collect();

        let mut outcomes = Vec::new();
        for e in events {
            outcomes.push(buf.add(e).await);
        }

        let ready: Vec<&AddOutcome> = outcomes.iter().filter(|o| o.is_ready()).collect();
        assert_eq!(ready.len(), 1);

        let AddOutcome::Ready(batch) = outcomes.pop().unwrap() else {
            panic!("third append should flush");
        };
        assert_eq!(batch.event_ids().collect::<Vec<_>>(), expected);
        assert!(buf.is_empty().await);
    }

    #[tokio::test]
    async fn take_and_reset_on_empty_buffer_is_none() {
        let buf = buffer(3);
        assert!(buf.take_and_reset().await.is_none());
    }

    #[tokio::test]
    async fn take_and_reset_returns_partial_batch_once() {
        let buf = buffer(3);
        buf.add(event(1)).await;

        let batch = buf.take_and_reset().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(buf.take_and_reset().await.is_none());
    }

    #[tokio::test]
    async fn stale_generation_cannot_take_newer_batch() {
        let buf = buffer(10);
        let AddOutcome::Pending { generation: old, .. } = buf.add(event(1)).await else {
            panic!("expected pending");
        };
        buf.take_and_reset().await.unwrap();

        let AddOutcome::Pending { generation: new, opened, .. } = buf.add(event(2)).await else {
            panic!("expected pending");
        };
        assert!(opened);
        assert_ne!(old, new);

        assert!(buf.take_generation(old).await.is_none());
        assert_eq!(buf.len().await, 1);
        assert_eq!(buf.take_generation(new).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn arming_a_detached_generation_cancels_the_timer() {
        let buf = buffer(10);
        let AddOutcome::Pending { generation, .. } = buf.add(event(1)).await else {
            panic!("expected pending");
        };
        buf.take_and_reset().await.unwrap();

        let timer = buf.trigger().arm(async {});
        assert!(!buf.arm(generation, timer).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_never_lose_or_duplicate() {
        let buf = Arc::new(buffer(7));
        let mut tasks = Vec::new();
        for writer in 0..8_u32 {
            let buf = Arc::clone(&buf);
            tasks.push(tokio::spawn(async move {
                let mut flushed = Vec::new();
                for n in 0..125_u32 {
                    if let AddOutcome::Ready(batch) = buf.add(event(writer * 1000 + n)).await {
                        flushed.push(batch);
                    }
                }
                flushed
            }));
        }

        let mut batches = Vec::new();
        for task in tasks {
            batches.extend(task.await.unwrap());
        }
        if let Some(rest) = buf.take_and_reset().await {
            batches.push(rest);
        }

        let mut ids: Vec<EventId> = batches.iter().flat_map(Batch::event_ids).collect();
        assert_eq!(ids.len(), 1000);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 1000);
        assert!(batches.iter().all(|b| b.len() <= 7));
    }
}
