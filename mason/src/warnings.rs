/*!
Configure-time warning sink. Warnings print as they happen and are
counted so the driver can escalate them at the end of the run when
`--werror` is in effect.

*/
use std::sync::atomic::{AtomicUsize, Ordering};

static WARNING_COUNT: AtomicUsize = AtomicUsize::new(0);

pub fn warn(message: impl AsRef<str>) {
    log::warn!("{}", message.as_ref());
    WARNING_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub fn count() -> usize {
    WARNING_COUNT.load(Ordering::Relaxed)
}

pub fn reset() {
    WARNING_COUNT.store(0, Ordering::Relaxed);
}
