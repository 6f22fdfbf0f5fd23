use std::cell::Cell;
use std::io;

/// The closed set of injectable failure sites. Tests arm a point to make
/// the corresponding I/O path return an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failpoint {
    ReadPage,
    WritePage,
}

impl Failpoint {
    /// Name matched against the `STRATUM_FAILPOINTS` env list.
    pub fn name(self) -> &'static str {
        match self {
            Failpoint::ReadPage => "pager::read_page",
            Failpoint::WritePage => "pager::write_page",
        }
    }

    fn mask(self) -> u8 {
        1 << self as u8
    }
}

thread_local! {
    static ARMED: Cell<u8> = Cell::new(0);
}

pub fn enable(point: Failpoint) {
    ARMED.with(|armed| armed.set(armed.get() | point.mask()));
}

pub fn disable(point: Failpoint) {
    ARMED.with(|armed| armed.set(armed.get() & !point.mask()));
}

pub fn clear() {
    ARMED.with(|armed| armed.set(0));
}

pub fn is_enabled(point: Failpoint) -> bool {
    if ARMED.with(|armed| armed.get() & point.mask() != 0) {
        return true;
    }

    std::env::var("STRATUM_FAILPOINTS")
        .ok()
        .map(|raw| raw.split(',').any(|v| v.trim() == point.name()))
        .unwrap_or(false)
}

pub fn maybe_fail(point: Failpoint) -> io::Result<()> {
    if is_enabled(point) {
        Err(io::Error::other(format!(
            "failpoint triggered: {}",
            point.name()
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arming_is_per_point() {
        clear();
        enable(Failpoint::WritePage);
        assert!(is_enabled(Failpoint::WritePage));
        assert!(!is_enabled(Failpoint::ReadPage));
        assert!(maybe_fail(Failpoint::WritePage).is_err());
        assert!(maybe_fail(Failpoint::ReadPage).is_ok());

        disable(Failpoint::WritePage);
        assert!(!is_enabled(Failpoint::WritePage));
        clear();
    }
}
