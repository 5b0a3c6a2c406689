//! Trailing-edge coalescing of bursty control input.
//!
//! A slider drag produces dozens of values per second. Each value goes through
//! [`DebounceSession::submit`], which arms its own timer; when a timer fires it
//! only runs its action if no newer submission arrived in the meantime. The
//! result is at most one device write per pause in the input, carrying the
//! last value.
//!
//! Superseded timers are not cancelled: they wake up, see they are stale and
//! return [`Settle::Superseded`]. Input that never pauses for a full quiet
//! window never writes; the write happens once the control settles.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use log::debug;
use tokio::{task::JoinHandle, time::sleep};

/// Quiet window applied to both brightness and temperature sliders.
pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(700);

/// What happened to a single submission once its quiet window elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    /// Still the latest submission: the action ran.
    Applied,
    /// A newer submission arrived during the window: nothing ran.
    Superseded,
}

/// Generation (high half) and last requested value (low half) in one word,
/// so both are always read and written together.
#[derive(Debug, Default)]
struct Slot(AtomicU64);

impl Slot {
    const fn pack(generation: u32, value: i32) -> u64 {
        ((generation as u64) << 32) | (value as u32 as u64)
    }

    const fn generation(slot: u64) -> u32 {
        (slot >> 32) as u32
    }

    const fn value(slot: u64) -> i32 {
        slot as u32 as i32
    }

    /// Records `value` as the latest request and returns its generation.
    fn advance(&self, value: i32) -> u32 {
        let (Ok(previous) | Err(previous)) =
            self.0
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |slot| {
                    Some(Self::pack(Self::generation(slot).wrapping_add(1), value))
                });
        Self::generation(previous).wrapping_add(1)
    }

    fn load(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Debounce state for one interactive control.
///
/// Cloning is cheap and clones share state, so timer tasks hold a clone.
/// Sessions never interact: brightness and temperature of the same device
/// each get their own.
///
/// # Example
///
/// ```no_run
/// use keylightd::debounce::DebounceSession;
///
/// # async fn example() {
/// let session = DebounceSession::new("desk/brightness");
/// for value in [40, 45, 52] {
///     session.submit(value, |settled| async move {
///         println!("writing brightness {settled}");
///     });
/// }
/// // ~700ms later, "writing brightness 52" is printed once.
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DebounceSession {
    label: Arc<str>,
    quiet_window: Duration,
    slot: Arc<Slot>,
}

impl DebounceSession {
    /// Creates a session with the default 700 ms quiet window.
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Self::with_quiet_window(label, DEFAULT_QUIET_WINDOW)
    }

    pub fn with_quiet_window(label: impl Into<Arc<str>>, quiet_window: Duration) -> Self {
        Self {
            label: label.into(),
            quiet_window,
            slot: Arc::default(),
        }
    }

    pub fn quiet_window(&self) -> Duration {
        self.quiet_window
    }

    /// Latest submitted value, if anything was submitted yet.
    pub fn last_requested(&self) -> Option<i32> {
        let slot = self.slot.load();
        (Slot::generation(slot) != 0).then(|| Slot::value(slot))
    }

    /// Records `value` and schedules `action(value)` to run after the quiet
    /// window, unless another submission supersedes it first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit<F, Fut>(&self, value: i32, action: F) -> JoinHandle<Settle>
    where
        F: FnOnce(i32) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.slot.advance(value);
        let slot = self.slot.clone();
        let label = self.label.clone();
        let quiet_window = self.quiet_window;

        tokio::spawn(async move {
            sleep(quiet_window).await;

            if Slot::generation(slot.load()) != generation {
                debug!("[{label}] value {value} superseded");
                return Settle::Superseded;
            }

            debug!("[{label}] settled on {value}");
            action(value).await;
            Settle::Applied
        })
    }
}
