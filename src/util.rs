use crate::config::{IdWidth, RetryPolicy};
use crate::time::Clock;
use embedded_can::{ExtendedId, Id, StandardId};

/// Calls `f` until it succeeds or `policy` runs out of attempts, spinning on `clock` between
/// attempts. Returns the last error.
pub(crate) fn retry<T, E, C, F>(clock: &C, policy: RetryPolicy, what: &str, mut f: F) -> Result<T, E>
where
    C: Clock + ?Sized,
    F: FnMut() -> Result<T, E>,
{
    let attempts = policy.max_attempts();
    let mut attempt = 1;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => return Err(e),
            Err(_) => {
                debug!("{} failed, attempt {}/{}", what, attempt, attempts);
                attempt += 1;
                clock.delay(policy.backoff);
            }
        }
    }
}

/// Builds an identifier of `width` from its raw value, `None` if it does not fit.
pub(crate) fn make_id(raw: u32, width: IdWidth) -> Option<Id> {
    if raw > width.max_raw() {
        return None;
    }
    match width {
        IdWidth::Standard => StandardId::new(raw as u16).map(Id::Standard),
        IdWidth::Extended => ExtendedId::new(raw).map(Id::Extended),
    }
}

#[inline]
pub(crate) fn raw_id(id: Id) -> u32 {
    match id {
        Id::Standard(id) => u32::from(id.as_raw()),
        Id::Extended(id) => id.as_raw(),
    }
}
