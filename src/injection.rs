//! Platform boundary for synthetic mouse input.
//!
//! The scheduling engine only sees [`InjectionPort`]. One implementation per
//! backend is chosen at build time (`native-input` feature) or at startup
//! (`--dry-run` selects [`NoopPort`]).

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::error::InjectionError;
use crate::types::{ClickKind, Point};

#[cfg(feature = "native-input")]
pub use native::EnigoPort;

/// Performs platform-level clicks.
///
/// Implementations are called from background click threads and from the
/// explicit dispatch worker, so they must be `Send + Sync`.
pub trait InjectionPort: Send + Sync + 'static {
    /// Current pointer location.
    fn pointer_position(&self) -> Result<Point, InjectionError>;

    /// Moves to `point` and performs one click of `kind` there.
    fn perform_click(&self, kind: ClickKind, point: Point) -> Result<(), InjectionError>;

    /// Clicks wherever the pointer currently is and returns that location.
    ///
    /// Backends that can click in place should override this so the sampled
    /// position and the click cannot be split by a pointer move.
    fn click_at_pointer(&self, kind: ClickKind) -> Result<Point, InjectionError> {
        let point = self.pointer_position()?;
        self.perform_click(kind, point)?;
        Ok(point)
    }
}

/// Dry-run port: logs clicks instead of performing them.
#[derive(Debug)]
pub struct NoopPort {
    pointer: AtomicU64,
    clicks: AtomicU64,
}

impl NoopPort {
    pub fn new(pointer: Point) -> Self {
        Self {
            pointer: AtomicU64::new(pointer.pack()),
            clicks: AtomicU64::new(0),
        }
    }

    pub fn set_pointer(&self, pointer: Point) {
        self.pointer.store(pointer.pack(), Ordering::Relaxed);
    }

    /// Number of clicks swallowed so far.
    pub fn clicks(&self) -> u64 {
        self.clicks.load(Ordering::Relaxed)
    }
}

impl Default for NoopPort {
    fn default() -> Self {
        Self::new(Point::default())
    }
}

impl InjectionPort for NoopPort {
    fn pointer_position(&self) -> Result<Point, InjectionError> {
        Ok(Point::unpack(self.pointer.load(Ordering::Relaxed)))
    }

    fn perform_click(&self, kind: ClickKind, point: Point) -> Result<(), InjectionError> {
        self.clicks.fetch_add(1, Ordering::Relaxed);
        trace!(%kind, %point, "dry-run click");
        Ok(())
    }
}

#[cfg(feature = "native-input")]
mod native {
    use std::cell::RefCell;

    use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};
    use tracing::warn;

    use super::InjectionPort;
    use crate::error::InjectionError;
    use crate::types::{ClickKind, Point};

    thread_local! {
        // Enigo connections are not shareable across threads on every
        // platform, so each calling thread lazily opens its own.
        static ENIGO: RefCell<Option<Enigo>> = const { RefCell::new(None) };
    }

    /// Injects real input through `enigo` (SendInput, CGEvent or X11).
    #[derive(Debug, Default, Clone, Copy)]
    pub struct EnigoPort;

    impl EnigoPort {
        /// Opens a connection on the calling thread to surface setup errors early.
        pub fn new() -> Result<Self, InjectionError> {
            with_enigo(|_| Ok(()))?;
            Ok(Self)
        }
    }

    fn with_enigo<T>(
        f: impl FnOnce(&mut Enigo) -> Result<T, InjectionError>,
    ) -> Result<T, InjectionError> {
        ENIGO.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_none() {
                let enigo = Enigo::new(&Settings::default()).map_err(|e| {
                    warn!(error = %e, "failed to connect to input backend");
                    InjectionError::DisplayUnavailable
                })?;
                *slot = Some(enigo);
            }
            let enigo = slot.as_mut().ok_or(InjectionError::DisplayUnavailable)?;
            f(enigo)
        })
    }

    fn map_input_error(error: enigo::InputError) -> InjectionError {
        let reason = error.to_string();
        if reason.to_lowercase().contains("permission") {
            InjectionError::PermissionDenied
        } else {
            InjectionError::unknown(reason)
        }
    }

    fn press(enigo: &mut Enigo, kind: ClickKind) -> Result<(), InjectionError> {
        let (button, repeats) = match kind {
            ClickKind::Left => (Button::Left, 1),
            ClickKind::Right => (Button::Right, 1),
            ClickKind::Middle => (Button::Middle, 1),
            ClickKind::Double => (Button::Left, 2),
        };
        for _ in 0..repeats {
            enigo
                .button(button, Direction::Click)
                .map_err(map_input_error)?;
        }
        Ok(())
    }

    impl InjectionPort for EnigoPort {
        fn pointer_position(&self) -> Result<Point, InjectionError> {
            with_enigo(|enigo| {
                let (x, y) = enigo.location().map_err(map_input_error)?;
                Ok(Point::new(x, y))
            })
        }

        fn perform_click(&self, kind: ClickKind, point: Point) -> Result<(), InjectionError> {
            with_enigo(|enigo| {
                enigo
                    .move_mouse(point.x, point.y, Coordinate::Abs)
                    .map_err(map_input_error)?;
                press(enigo, kind)
            })
        }

        fn click_at_pointer(&self, kind: ClickKind) -> Result<Point, InjectionError> {
            with_enigo(|enigo| {
                let (x, y) = enigo.location().map_err(map_input_error)?;
                press(enigo, kind)?;
                Ok(Point::new(x, y))
            })
        }
    }
}
