use std::{
    collections::VecDeque,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

/// Ceiling on how long a queued action may wait for its turn.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure surfaced to the caller of a queued action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The action waited past the queue ceiling and was never run.
    #[error("queued action expired before it could run")]
    TimedOut,
    /// The lane dropped the action without producing a result.
    #[error("actor lane dropped the action without running it")]
    LaneClosed,
}

enum JobOutcome {
    Run,
    Expired,
}

struct Job {
    enqueued_at: Instant,
    run: Box<dyn FnOnce(JobOutcome) -> BoxFuture<'static, ()> + Send + Sync>,
}

#[derive(Default)]
struct Lane {
    jobs: VecDeque<Job>,
    draining: bool,
}

/// Serializes all mutating actions submitted for the same actor into a strict
/// FIFO, one in flight at a time. Actions for different actors proceed fully
/// in parallel.
///
/// This is the primary guard against two concurrent actions from one player
/// both reading a pre-increment balance: it turns "many concurrent requests"
/// into "one logical sequence" without a database-level lock per read.
#[derive(Clone)]
pub struct ActionQueue {
    lanes: Arc<DashMap<String, Lane>>,
    wait_timeout: Duration,
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new(DEFAULT_WAIT_TIMEOUT)
    }
}

impl ActionQueue {
    /// Create a queue whose actions may wait at most `wait_timeout` for their turn.
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            lanes: Arc::new(DashMap::new()),
            wait_timeout,
        }
    }

    /// Queue `action` on the actor's lane and wait for its result.
    pub async fn enqueue<T, F, Fut>(&self, actor_id: &str, action: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        self.submit(actor_id, action)
            .await
            .unwrap_or(Err(QueueError::LaneClosed))
    }

    /// Queue `action` on the actor's lane, registering it synchronously so two
    /// `submit` calls from the same task keep their order. The receiver yields
    /// the action's result once its turn comes.
    pub fn submit<T, F, Fut>(
        &self,
        actor_id: &str,
        action: F,
    ) -> oneshot::Receiver<Result<T, QueueError>>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job = Job {
            enqueued_at: Instant::now(),
            run: Box::new(move |outcome| match outcome {
                JobOutcome::Run => Box::pin(async move {
                    let value = action().await;
                    let _ = tx.send(Ok(value));
                }),
                JobOutcome::Expired => {
                    let _ = tx.send(Err(QueueError::TimedOut));
                    Box::pin(async {})
                }
            }),
        };

        let spawn_drain = {
            let mut lane = self.lanes.entry(actor_id.to_owned()).or_default();
            lane.jobs.push_back(job);
            if lane.draining {
                false
            } else {
                lane.draining = true;
                true
            }
        };

        if spawn_drain {
            let queue = self.clone();
            let actor = actor_id.to_owned();
            tokio::spawn(async move { queue.drain(actor).await });
        }

        rx
    }

    /// Number of actors with a live lane; used by health reporting.
    pub fn active_lanes(&self) -> usize {
        self.lanes.len()
    }

    async fn drain(&self, actor_id: String) {
        loop {
            let job = {
                let Some(mut lane) = self.lanes.get_mut(&actor_id) else {
                    return;
                };
                match lane.jobs.pop_front() {
                    Some(job) => job,
                    None => {
                        lane.draining = false;
                        drop(lane);
                        self.lanes
                            .remove_if(&actor_id, |_, lane| lane.jobs.is_empty() && !lane.draining);
                        return;
                    }
                }
            };

            if job.enqueued_at.elapsed() > self.wait_timeout {
                debug!(actor = %actor_id, "dropping queued action past its wait ceiling");
                (job.run)(JobOutcome::Expired).await;
                continue;
            }

            // Run each action on its own task so a panicking action fails only
            // its own caller and the lane keeps draining.
            let _ = tokio::spawn((job.run)(JobOutcome::Run)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::sleep;

    #[tokio::test]
    async fn actions_for_one_actor_run_in_submission_order() {
        let queue = ActionQueue::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        let receivers: Vec<_> = (0..5)
            .map(|index| {
                let order = order.clone();
                queue.submit("p1", move || async move {
                    // Later actions finish faster; only FIFO draining keeps order.
                    sleep(Duration::from_millis(20 - index * 4)).await;
                    order.lock().unwrap().push(index);
                })
            })
            .collect();

        for rx in receivers {
            rx.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn concurrent_read_modify_write_loses_no_updates() {
        let queue = ActionQueue::default();
        let balance = Arc::new(Mutex::new(0u64));

        let receivers: Vec<_> = (0..25)
            .map(|_| {
                let balance = balance.clone();
                queue.submit("p1", move || async move {
                    let read = *balance.lock().unwrap();
                    sleep(Duration::from_millis(1)).await;
                    *balance.lock().unwrap() = read + 1;
                })
            })
            .collect();

        for rx in receivers {
            rx.await.unwrap().unwrap();
        }

        assert_eq!(*balance.lock().unwrap(), 25);
    }

    #[tokio::test]
    async fn stale_actions_are_rejected_not_run() {
        let queue = ActionQueue::new(Duration::from_millis(20));

        let slow = queue.submit("p1", || async {
            sleep(Duration::from_millis(60)).await;
        });
        let stale = queue.submit::<(), _, _>("p1", || async { unreachable!("must never run") });

        slow.await.unwrap().unwrap();
        assert_eq!(stale.await.unwrap(), Err(QueueError::TimedOut));
    }

    #[tokio::test]
    async fn panicking_action_does_not_wedge_the_lane() {
        let queue = ActionQueue::default();

        let poisoned = queue.submit::<(), _, _>("p1", || async { panic!("boom") });
        let healthy = queue.submit("p1", || async { 7u32 });

        assert!(matches!(poisoned.await, Err(_) | Ok(Err(_))));
        assert_eq!(healthy.await.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn different_actors_drain_in_parallel() {
        let queue = ActionQueue::default();
        let started = Arc::new(Mutex::new(Vec::new()));

        let a = {
            let started = started.clone();
            queue.submit("a", move || async move {
                started.lock().unwrap().push("a");
                sleep(Duration::from_millis(50)).await;
            })
        };
        let b = {
            let started = started.clone();
            queue.submit("b", move || async move {
                started.lock().unwrap().push("b");
            })
        };

        // Actor B's action completes while actor A's is still sleeping.
        b.await.unwrap().unwrap();
        assert!(started.lock().unwrap().contains(&"b"));
        a.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn idle_lanes_are_removed() {
        let queue = ActionQueue::default();
        queue.enqueue("p1", || async {}).await.unwrap();
        // Drain finishes after the result is delivered; give it a beat.
        sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.active_lanes(), 0);
    }
}
