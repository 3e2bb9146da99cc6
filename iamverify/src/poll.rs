//! Bounded polling against eventually consistent state on a unit
//!
//! Unlike an error retry, a poll miss is an expected outcome: the probe returns
//! `Ok(None)` until whatever it waits for shows up. Errors from the probe are
//! not retried and end the poll immediately.

use std::{future::Future, time::Duration};

use anyhow::Result;
use tracing::{debug, info};

/// States a poll moves through
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollState<T> {
  Polling { attempt: u32 },
  Found(T),
  Exhausted { attempts: u32 },
}

/// Fixed interval poll with a bounded number of attempts
#[derive(Clone, Copy, Debug)]
pub struct Poll {
  pub attempts: u32,
  pub interval: Duration,
}

impl Poll {
  pub fn new(attempts: u32, interval: Duration) -> Self {
    Poll { attempts, interval }
  }

  /// Call `probe` until it yields a value or the attempts run out
  ///
  /// Sleeps `interval` between attempts but not after the last one. Only ever
  /// returns `Found` or `Exhausted`.
  pub async fn until<F, Fut, T>(&self, name: &str, mut probe: F) -> Result<PollState<T>>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
  {
    let mut state = PollState::Polling { attempt: 0 };

    while let PollState::Polling { attempt } = state {
      let attempt = attempt + 1;
      debug!(poll = %name, attempt, "polling");

      state = match probe().await? {
        Some(value) => PollState::Found(value),
        None if attempt >= self.attempts => PollState::Exhausted { attempts: attempt },
        None => {
          info!(poll = %name, attempt, "not ready, retrying in {}s", self.interval.as_secs());
          tokio::time::sleep(self.interval).await;
          PollState::Polling { attempt }
        }
      };
    }

    Ok(state)
  }
}
