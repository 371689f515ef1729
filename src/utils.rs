//! Small cross-cutting extension traits, ported from the logging/error
//! conventions used throughout both binaries.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{error, warn};

/// Milliseconds since the epoch, used for `PlaybackState::timestamp` and
/// `stateUpdate`'s `server_time` (§3, §4.3).
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Turns a `Result` into an `Option`, logging the error instead of propagating it.
///
/// Used at every "soft drop" point in §7 of the design: queue overflow, publish
/// failure, malformed client frame. The failure is real but must not abort the
/// connection or request it occurred on.
pub trait HandleErr
where
    Self: Sized,
{
    type OkValue;

    fn log_err(self) -> Option<Self::OkValue>;
    fn log_err_with_msg(self, msg: &str) -> Option<Self::OkValue>;
    fn log_warn(self) -> Option<Self::OkValue>;
    fn log_warn_with_msg(self, msg: &str) -> Option<Self::OkValue>;
}

impl<T, E> HandleErr for Result<T, E>
where
    E: std::fmt::Debug,
{
    type OkValue = T;

    fn log_err(self) -> Option<Self::OkValue> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                error!("{e:?}");
                None
            }
        }
    }

    fn log_err_with_msg(self, msg: &str) -> Option<Self::OkValue> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                error!("{msg}: {e:?}");
                None
            }
        }
    }

    fn log_warn(self) -> Option<Self::OkValue> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("{e:?}");
                None
            }
        }
    }

    fn log_warn_with_msg(self, msg: &str) -> Option<Self::OkValue> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("{msg}: {e:?}");
                None
            }
        }
    }
}

pub trait Ignore {
    fn ignore(self);
}

impl<T: Sized> Ignore for T {
    fn ignore(self) {}
}
