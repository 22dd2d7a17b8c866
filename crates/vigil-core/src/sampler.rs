//! Samplers: probability, rate-limit, namespace-routed, and composite
//! error/level bypass.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use regex::Regex;
use vigil_types::level::LogLevel;

/// The facts a sampler decides on: the record's level, whether it has an
/// error field set, and its namespace.
#[derive(Debug, Clone, Copy)]
pub struct SampleContext<'a> {
    pub level: LogLevel,
    pub has_error: bool,
    pub namespace: Option<&'a str>,
}

/// A composable sampling decision.
pub trait Sampler: Send + Sync {
    fn should_sample(&self, ctx: &SampleContext<'_>) -> bool;

    /// Release any held resources (timers, background tasks). No-op by
    /// default; most samplers here hold none.
    fn destroy(&self) {}
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Admits a record with probability `p ∈ [0,1]`, clamping out-of-range
/// values silently rather than raising.
pub struct ProbabilitySampler {
    p: f64,
}

impl ProbabilitySampler {
    pub fn new(p: f64) -> Self {
        Self { p: p.clamp(0.0, 1.0) }
    }
}

impl Sampler for ProbabilitySampler {
    fn should_sample(&self, _ctx: &SampleContext<'_>) -> bool {
        rand::random::<f64>() < self.p
    }
}

/// Admits at most `max_per_second * window_ms / 1000` records per
/// `window_ms`-wide epoch, derived from `floor(now_ms / window_ms)`.
pub struct RateLimitSampler {
    max_per_window: u64,
    window_ms: u64,
    state: Mutex<(u64, u64)>, // (epoch, count)
}

impl RateLimitSampler {
    pub fn new(max_per_second: u32, window_ms: u64) -> Self {
        let window_ms = if window_ms == 0 { 1000 } else { window_ms };
        let max_per_window = (max_per_second as u64 * window_ms) / 1000;
        Self { max_per_window, window_ms, state: Mutex::new((0, 0)) }
    }

    pub fn with_default_window(max_per_second: u32) -> Self {
        Self::new(max_per_second, 1000)
    }
}

impl Sampler for RateLimitSampler {
    fn should_sample(&self, _ctx: &SampleContext<'_>) -> bool {
        let epoch = now_ms() / self.window_ms;
        let mut state = self.state.lock();
        if state.0 != epoch {
            *state = (epoch, 0);
        }
        if state.1 < self.max_per_window {
            state.1 += 1;
            true
        } else {
            false
        }
    }
}

enum NamespaceRoute {
    Exact(String),
    Wildcard(Regex),
}

/// Routes a record to a per-namespace sampler. Exact matches are preferred
/// over wildcard patterns (`auth.*` = one segment, `db.**` = zero or more
/// segments), both compiled at construction. A configured `default`
/// applies when nothing else matches; with no match and no default, the
/// record is admitted.
pub struct NamespaceSampler {
    exact: HashMap<String, Arc<dyn Sampler>>,
    wildcards: Vec<(Regex, Arc<dyn Sampler>)>,
    default: Option<Arc<dyn Sampler>>,
}

impl NamespaceSampler {
    pub fn builder() -> NamespaceSamplerBuilder {
        NamespaceSamplerBuilder::default()
    }
}

#[derive(Default)]
pub struct NamespaceSamplerBuilder {
    routes: Vec<(String, Arc<dyn Sampler>)>,
    default: Option<Arc<dyn Sampler>>,
}

impl NamespaceSamplerBuilder {
    pub fn route(mut self, namespace: impl Into<String>, sampler: Arc<dyn Sampler>) -> Self {
        self.routes.push((namespace.into(), sampler));
        self
    }

    pub fn default_sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.default = Some(sampler);
        self
    }

    pub fn build(self) -> NamespaceSampler {
        let mut exact = HashMap::new();
        let mut wildcards = Vec::new();
        for (pattern, sampler) in self.routes {
            if pattern.contains('*') {
                wildcards.push((compile_namespace_glob(&pattern), sampler));
            } else {
                exact.insert(pattern, sampler);
            }
        }
        NamespaceSampler { exact, wildcards, default: self.default }
    }
}

fn compile_namespace_glob(pattern: &str) -> Regex {
    let segments: Vec<&str> = pattern.split('.').collect();
    let mut out = String::from("^");
    for (i, seg) in segments.iter().enumerate() {
        if i > 0 {
            out.push_str(r"\.");
        }
        match *seg {
            "**" => {
                if i > 0 {
                    out.truncate(out.len() - 2);
                    out.push_str(r"(\..+)?");
                } else {
                    out.push_str(".*");
                }
            }
            "*" => out.push_str(r"[^.]+"),
            literal => out.push_str(&regex::escape(literal)),
        }
    }
    out.push('$');
    Regex::new(&out).expect("generated namespace glob regex is always valid")
}

impl Sampler for NamespaceSampler {
    fn should_sample(&self, ctx: &SampleContext<'_>) -> bool {
        let Some(namespace) = ctx.namespace else {
            return self.default.as_ref().map(|s| s.should_sample(ctx)).unwrap_or(true);
        };
        if let Some(sampler) = self.exact.get(namespace) {
            return sampler.should_sample(ctx);
        }
        for (re, sampler) in &self.wildcards {
            if re.is_match(namespace) {
                return sampler.should_sample(ctx);
            }
        }
        self.default.as_ref().map(|s| s.should_sample(ctx)).unwrap_or(true)
    }

    fn destroy(&self) {
        for sampler in self.exact.values() {
            sampler.destroy();
        }
        for (_, sampler) in &self.wildcards {
            sampler.destroy();
        }
        if let Some(d) = &self.default {
            d.destroy();
        }
    }
}

/// Wraps an inner sampler. Records whose level is `>= bypass_level`
/// (default `error`) or whose `has_error` flag is set bypass the inner
/// sampler and are always admitted.
///
/// Every logger with sampling configured wraps its user-chosen sampler in
/// one of these.
pub struct CompositeBypassSampler {
    inner: Arc<dyn Sampler>,
    bypass_level: LogLevel,
}

impl CompositeBypassSampler {
    pub fn new(inner: Arc<dyn Sampler>) -> Self {
        Self { inner, bypass_level: LogLevel::Error }
    }

    pub fn with_bypass_level(inner: Arc<dyn Sampler>, bypass_level: LogLevel) -> Self {
        Self { inner, bypass_level }
    }
}

impl Sampler for CompositeBypassSampler {
    fn should_sample(&self, ctx: &SampleContext<'_>) -> bool {
        if ctx.has_error || ctx.level >= self.bypass_level {
            return true;
        }
        self.inner.should_sample(ctx)
    }

    fn destroy(&self) {
        self.inner.destroy();
    }
}

/// Always-admit sampler, used as the implicit default when a logger has no
/// sampler configured.
pub struct AlwaysSample;

impl Sampler for AlwaysSample {
    fn should_sample(&self, _ctx: &SampleContext<'_>) -> bool {
        true
    }
}

/// Monotonically increasing counter used only by tests needing a
/// deterministic non-random sampler.
pub struct CountingSampler {
    admit_every_nth: u64,
    counter: AtomicU64,
}

impl CountingSampler {
    pub fn new(admit_every_nth: u64) -> Self {
        Self { admit_every_nth: admit_every_nth.max(1), counter: AtomicU64::new(0) }
    }
}

impl Sampler for CountingSampler {
    fn should_sample(&self, _ctx: &SampleContext<'_>) -> bool {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        n % self.admit_every_nth == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(level: LogLevel, has_error: bool, namespace: Option<&str>) -> SampleContext<'_> {
        SampleContext { level, has_error, namespace }
    }

    #[test]
    fn probability_zero_never_admits_and_one_always_does() {
        let never = ProbabilitySampler::new(0.0);
        let always = ProbabilitySampler::new(1.0);
        let c = ctx(LogLevel::Info, false, None);
        for _ in 0..100 {
            assert!(!never.should_sample(&c));
            assert!(always.should_sample(&c));
        }
    }

    #[test]
    fn probability_clamps_out_of_range() {
        let over = ProbabilitySampler::new(5.0);
        assert_eq!(over.p, 1.0);
        let under = ProbabilitySampler::new(-5.0);
        assert_eq!(under.p, 0.0);
    }

    #[test]
    fn rate_limit_admits_up_to_the_window_budget() {
        let sampler = RateLimitSampler::new(3, 60_000);
        let c = ctx(LogLevel::Info, false, None);
        let admitted = (0..10).filter(|_| sampler.should_sample(&c)).count();
        assert_eq!(admitted, 3);
    }

    #[test]
    fn namespace_sampler_prefers_exact_over_wildcard() {
        let sampler = NamespaceSampler::builder()
            .route("auth.login", Arc::new(ProbabilitySampler::new(1.0)))
            .route("auth.*", Arc::new(ProbabilitySampler::new(0.0)))
            .build();
        assert!(sampler.should_sample(&ctx(LogLevel::Info, false, Some("auth.login"))));
    }

    #[test]
    fn namespace_sampler_matches_double_star_across_segments() {
        let sampler = NamespaceSampler::builder()
            .route("db.**", Arc::new(ProbabilitySampler::new(0.0)))
            .build();
        assert!(!sampler.should_sample(&ctx(LogLevel::Info, false, Some("db.query.slow"))));
    }

    #[test]
    fn namespace_sampler_with_no_match_and_no_default_admits() {
        let sampler = NamespaceSampler::builder().build();
        assert!(sampler.should_sample(&ctx(LogLevel::Info, false, Some("unrouted"))));
    }

    #[test]
    fn composite_bypass_admits_errors_regardless_of_inner() {
        let inner = Arc::new(ProbabilitySampler::new(0.0));
        let composite = CompositeBypassSampler::new(inner);
        assert!(composite.should_sample(&ctx(LogLevel::Info, true, None)));
        assert!(composite.should_sample(&ctx(LogLevel::Error, false, None)));
        assert!(!composite.should_sample(&ctx(LogLevel::Info, false, None)));
    }
}
