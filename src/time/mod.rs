//! Time: the shared delay scheduler and deadlines on handles.
//!
//! # Timer thread hand-off
//!
//! Timer actions run on the scheduler thread. Anything that would run user
//! callbacks as a consequence of a timer firing goes through
//! [`hop_off_timer`], which moves the completion onto an executor when it
//! is observed on the timer thread. The only code that writes into a handle
//! directly from a timer is [`fail_after`] and [`complete_after`], and the
//! safe wrappers only ever point those at private copies.

mod delayer;
mod heap;
mod timeout;

pub use delayer::{
    delayed_executor, is_timer_thread, DelayScheduler, DelayedExecutor, ScheduledTask,
    TIMER_THREAD_NAME,
};
pub use heap::{TimerHeap, TimerId};
pub use timeout::{complete_after, fail_after, hop_off_timer};
