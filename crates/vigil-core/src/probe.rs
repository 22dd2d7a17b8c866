//! Runtime probe: identifies the host environment once at load time and
//! exposes capability flags consumed by the context store and correlation
//! ID generator.

use std::sync::OnceLock;

/// Capability flags and identity tag for the host this process is running
/// on. Computed once and shared process-wide via [`RuntimeProbe::get`].
#[derive(Debug, Clone, Copy)]
pub struct RuntimeProbe {
    /// Whether a first-class continuation-local storage mechanism is
    /// available. On this host it always is: `tokio::task_local!` exists
    /// unconditionally. The flag is still modeled explicitly so a future
    /// non-tokio host (or a caller running outside any executor) can be
    /// probed and the global-fallback path exercised deliberately.
    has_task_local: bool,
    /// Whether a cryptographically secure RNG is available. Always true
    /// on this host (`rand::rngs::OsRng` / `getrandom`).
    has_crypto_rng: bool,
}

impl RuntimeProbe {
    /// The process-wide tag attached to every [`vigil_types::LogRecord`].
    pub const TAG: &'static str = "rust";

    pub fn has_task_local(&self) -> bool {
        self.has_task_local
    }

    pub fn has_crypto_rng(&self) -> bool {
        self.has_crypto_rng
    }

    pub fn tag(&self) -> &'static str {
        Self::TAG
    }

    /// The process-wide probe, computed once.
    pub fn get() -> &'static RuntimeProbe {
        static PROBE: OnceLock<RuntimeProbe> = OnceLock::new();
        PROBE.get_or_init(|| RuntimeProbe { has_task_local: true, has_crypto_rng: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_reports_tokio_capabilities() {
        let probe = RuntimeProbe::get();
        assert!(probe.has_task_local());
        assert!(probe.has_crypto_rng());
        assert_eq!(probe.tag(), "rust");
    }
}
