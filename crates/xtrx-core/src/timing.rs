//! Clock domains and cross-domain timing exceptions.
//!
//! The model is tool-neutral: domains, period constraints, asynchronous
//! groups and false paths. Rendering into a vendor constraint language is the
//! job of an exporter downstream.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Relative tolerance between a period constraint and the declared frequency.
const PERIOD_TOLERANCE: f64 = 1e-3;

/// Where a domain's clock comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockSource {
    /// Pin, hard block or fabric net the timing tool treats as a primary clock.
    External,
    /// Generated from another domain by a PLL/MMCM; the tool relates the two.
    Derived { parent: String },
}

/// A clock-synchronous region of the design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingDomain {
    pub name: String,
    pub frequency_hz: f64,
    pub source: ClockSource,
    /// Clock name or pattern used when rendering tool constraints.
    pub clock: String,
}

impl TimingDomain {
    /// Nominal period in nanoseconds.
    pub fn period_ns(&self) -> f64 {
        1e9 / self.frequency_hz
    }

    pub fn is_external(&self) -> bool {
        matches!(self.source, ClockSource::External)
    }
}

/// Kind of cross-domain exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    /// No static timing relationship; the whole clock pair is cut.
    Asynchronous,
    /// Paths between the domains are ignored in both directions.
    FalsePath,
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionKind::Asynchronous => write!(f, "asynchronous"),
            ExceptionKind::FalsePath => write!(f, "false-path"),
        }
    }
}

/// An unordered domain pair with an exception. `a < b` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimingException {
    pub kind: ExceptionKind,
    pub a: String,
    pub b: String,
}

/// A period constraint on a domain's clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodConstraint {
    pub domain: String,
    pub period_ns: f64,
}

/// Errors raised by timing declarations and validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimingError {
    #[error("clock domain '{0}' already declared")]
    DuplicateDomain(String),

    #[error("clock domain '{0}' not declared")]
    UnknownDomain(String),

    #[error("clock domain '{name}' has invalid frequency {frequency_hz} Hz")]
    InvalidFrequency { name: String, frequency_hz: f64 },

    #[error("cannot declare an exception between '{0}' and itself")]
    SelfException(String),

    #[error("clock domain '{domain}' has invalid period {period_ns} ns")]
    InvalidPeriod { domain: String, period_ns: f64 },

    #[error("period {period_ns} ns on '{domain}' disagrees with its {expected_ns:.3} ns nominal period")]
    PeriodMismatch {
        domain: String,
        period_ns: f64,
        expected_ns: f64,
    },

    #[error("external clock domain '{0}' has no period constraint")]
    MissingPeriodConstraint(String),

    #[error(
        "clock domains '{a}' and '{b}' are unrelated and have no async or false-path declaration ({total} pair(s) missing)"
    )]
    MissingAsyncDeclaration { a: String, b: String, total: usize },
}

fn ordered(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Mutable registry of domains and exceptions, used during composition.
#[derive(Debug, Clone, Default)]
pub struct TimingDomainManager {
    domains: BTreeMap<String, TimingDomain>,
    exceptions: BTreeMap<(String, String), ExceptionKind>,
    periods: BTreeMap<String, f64>,
}

impl TimingDomainManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a domain, optionally derived from an already declared one.
    ///
    /// The tool clock name defaults to `<name>_clk`.
    pub fn declare_domain(
        &mut self,
        name: impl Into<String>,
        frequency_hz: f64,
        derived_from: Option<&str>,
    ) -> Result<(), TimingError> {
        let name = name.into();
        if self.domains.contains_key(&name) {
            return Err(TimingError::DuplicateDomain(name));
        }
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return Err(TimingError::InvalidFrequency { name, frequency_hz });
        }
        let source = match derived_from {
            Some(parent) => {
                self.require(parent)?;
                ClockSource::Derived {
                    parent: parent.to_string(),
                }
            }
            None => ClockSource::External,
        };
        debug!(domain = %name, frequency_hz, ?source, "declared clock domain");
        let clock = format!("{name}_clk");
        self.domains.insert(
            name.clone(),
            TimingDomain {
                name,
                frequency_hz,
                source,
                clock,
            },
        );
        Ok(())
    }

    /// Override the clock name or pattern a domain renders as.
    pub fn set_clock_name(
        &mut self,
        domain: &str,
        clock: impl Into<String>,
    ) -> Result<(), TimingError> {
        let d = self
            .domains
            .get_mut(domain)
            .ok_or_else(|| TimingError::UnknownDomain(domain.to_string()))?;
        d.clock = clock.into();
        Ok(())
    }

    /// Declare two domains asynchronous. Idempotent and symmetric.
    pub fn declare_async(&mut self, a: &str, b: &str) -> Result<(), TimingError> {
        let key = self.pair(a, b)?;
        self.exceptions.insert(key, ExceptionKind::Asynchronous);
        debug!(a, b, "declared asynchronous clock group");
        Ok(())
    }

    /// Declare false paths between two domains in both directions.
    ///
    /// A pair already declared asynchronous stays asynchronous.
    pub fn declare_false_path(&mut self, a: &str, b: &str) -> Result<(), TimingError> {
        let key = self.pair(a, b)?;
        self.exceptions.entry(key).or_insert(ExceptionKind::FalsePath);
        debug!(a, b, "declared false path");
        Ok(())
    }

    /// Constrain a domain's clock period.
    pub fn declare_period_constraint(
        &mut self,
        domain: &str,
        period_ns: f64,
    ) -> Result<(), TimingError> {
        let d = self.require(domain)?;
        if !(period_ns.is_finite() && period_ns > 0.0) {
            return Err(TimingError::InvalidPeriod {
                domain: domain.to_string(),
                period_ns,
            });
        }
        let expected_ns = d.period_ns();
        if ((period_ns - expected_ns) / expected_ns).abs() > PERIOD_TOLERANCE {
            return Err(TimingError::PeriodMismatch {
                domain: domain.to_string(),
                period_ns,
                expected_ns,
            });
        }
        self.periods.insert(domain.to_string(), period_ns);
        Ok(())
    }

    pub fn domain(&self, name: &str) -> Option<&TimingDomain> {
        self.domains.get(name)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Check that every unrelated pair carries an exception.
    pub fn validate(&self) -> Result<(), TimingError> {
        self.snapshot().validate()
    }

    /// Freeze the declarations into an immutable model.
    pub fn freeze(self) -> TimingModel {
        let domains = self.domains.into_values().collect();
        let exceptions = self
            .exceptions
            .into_iter()
            .map(|((a, b), kind)| TimingException { kind, a, b })
            .collect();
        let periods = self
            .periods
            .into_iter()
            .map(|(domain, period_ns)| PeriodConstraint { domain, period_ns })
            .collect();
        TimingModel {
            domains,
            exceptions,
            periods,
        }
    }

    fn snapshot(&self) -> TimingModel {
        self.clone().freeze()
    }

    fn require(&self, name: &str) -> Result<&TimingDomain, TimingError> {
        self.domains
            .get(name)
            .ok_or_else(|| TimingError::UnknownDomain(name.to_string()))
    }

    fn pair(&self, a: &str, b: &str) -> Result<(String, String), TimingError> {
        self.require(a)?;
        self.require(b)?;
        if a == b {
            return Err(TimingError::SelfException(a.to_string()));
        }
        Ok(ordered(a, b))
    }
}

/// Frozen timing declarations of a composed system.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimingModel {
    /// Domains ordered by name.
    pub domains: Vec<TimingDomain>,
    /// Exceptions ordered by domain pair.
    pub exceptions: Vec<TimingException>,
    /// Period constraints ordered by domain.
    pub periods: Vec<PeriodConstraint>,
}

impl TimingModel {
    pub fn domain(&self, name: &str) -> Option<&TimingDomain> {
        self.domains.iter().find(|d| d.name == name)
    }

    /// Root of a domain's derivation chain.
    ///
    /// A deserialized model may carry a parent cycle; a chain longer than the
    /// domain count is one, and the domain is then its own root.
    pub fn root<'a>(&'a self, name: &'a str) -> &'a str {
        let mut current = name;
        for _ in 0..=self.domains.len() {
            match self.domain(current).map(|d| &d.source) {
                Some(ClockSource::Derived { parent }) => current = parent.as_str(),
                _ => return current,
            }
        }
        name
    }

    /// Whether the tool can relate the two domains through a common source.
    pub fn related(&self, a: &str, b: &str) -> bool {
        self.root(a) == self.root(b)
    }

    /// Exception declared between two domains, if any.
    pub fn exception(&self, a: &str, b: &str) -> Option<ExceptionKind> {
        let (a, b) = ordered(a, b);
        self.exceptions
            .iter()
            .find(|e| e.a == a && e.b == b)
            .map(|e| e.kind)
    }

    /// Unrelated domain pairs lacking an exception, in name order.
    pub fn missing_exceptions(&self) -> Vec<(String, String)> {
        let mut missing = Vec::new();
        for (i, a) in self.domains.iter().enumerate() {
            for b in &self.domains[i + 1..] {
                if !self.related(&a.name, &b.name) && self.exception(&a.name, &b.name).is_none() {
                    missing.push((a.name.clone(), b.name.clone()));
                }
            }
        }
        missing
    }

    /// External domains without a period constraint.
    pub fn unconstrained_domains(&self) -> Vec<&str> {
        self.domains
            .iter()
            .filter(|d| d.is_external())
            .filter(|d| !self.periods.iter().any(|p| p.domain == d.name))
            .map(|d| d.name.as_str())
            .collect()
    }

    /// Require a period on every external domain and an exception on every
    /// unrelated domain pair.
    pub fn validate(&self) -> Result<(), TimingError> {
        if let Some(name) = self.unconstrained_domains().first() {
            return Err(TimingError::MissingPeriodConstraint(name.to_string()));
        }
        let missing = self.missing_exceptions();
        if let Some((a, b)) = missing.first() {
            return Err(TimingError::MissingAsyncDeclaration {
                a: a.clone(),
                b: b.clone(),
                total: missing.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcie_and_jtag() -> TimingDomainManager {
        let mut t = TimingDomainManager::new();
        t.declare_domain("pcie_clk", 125e6, None).unwrap();
        t.declare_domain("jtag_clk", 20e6, None).unwrap();
        t.declare_period_constraint("pcie_clk", 8.0).unwrap();
        t.declare_period_constraint("jtag_clk", 50.0).unwrap();
        t
    }

    #[test]
    fn unrelated_external_domains_need_async() {
        let t = pcie_and_jtag();
        let err = t.validate().unwrap_err();
        assert_eq!(
            err,
            TimingError::MissingAsyncDeclaration {
                a: "jtag_clk".into(),
                b: "pcie_clk".into(),
                total: 1,
            }
        );
    }

    #[test]
    fn async_declaration_satisfies_validation() {
        let mut t = pcie_and_jtag();
        t.declare_async("pcie_clk", "jtag_clk").unwrap();
        t.validate().unwrap();
    }

    #[test]
    fn async_is_idempotent_and_symmetric() {
        let mut t = pcie_and_jtag();
        t.declare_async("pcie_clk", "jtag_clk").unwrap();
        t.declare_async("jtag_clk", "pcie_clk").unwrap();
        t.declare_async("pcie_clk", "jtag_clk").unwrap();
        let model = t.freeze();
        assert_eq!(model.exceptions.len(), 1);
        assert_eq!(
            model.exception("pcie_clk", "jtag_clk"),
            Some(ExceptionKind::Asynchronous)
        );
        assert_eq!(
            model.exception("jtag_clk", "pcie_clk"),
            Some(ExceptionKind::Asynchronous)
        );
    }

    #[test]
    fn false_path_does_not_downgrade_async() {
        let mut t = pcie_and_jtag();
        t.declare_async("pcie_clk", "jtag_clk").unwrap();
        t.declare_false_path("jtag_clk", "pcie_clk").unwrap();
        let model = t.freeze();
        assert_eq!(
            model.exception("pcie_clk", "jtag_clk"),
            Some(ExceptionKind::Asynchronous)
        );
    }

    #[test]
    fn false_path_satisfies_validation() {
        let mut t = pcie_and_jtag();
        t.declare_false_path("jtag_clk", "pcie_clk").unwrap();
        t.validate().unwrap();
    }

    #[test]
    fn derived_domains_are_related() {
        let mut t = TimingDomainManager::new();
        t.declare_domain("pcie", 125e6, None).unwrap();
        t.declare_domain("sys", 125e6, Some("pcie")).unwrap();
        t.declare_domain("idelay", 200e6, Some("pcie")).unwrap();
        t.declare_period_constraint("pcie", 8.0).unwrap();
        t.validate().unwrap();

        let model = t.freeze();
        assert_eq!(model.root("idelay"), "pcie");
        assert!(model.related("sys", "idelay"));
        assert!(model.missing_exceptions().is_empty());
    }

    #[test]
    fn parent_cycle_in_loaded_model_terminates() {
        let derived = |name: &str, parent: &str| TimingDomain {
            name: name.into(),
            frequency_hz: 100e6,
            source: ClockSource::Derived {
                parent: parent.into(),
            },
            clock: name.into(),
        };
        let model = TimingModel {
            domains: vec![derived("a", "b"), derived("b", "a")],
            ..TimingModel::default()
        };

        assert_eq!(model.root("a"), "a");
        assert_eq!(model.root("b"), "b");
        assert!(!model.related("a", "b"));
        assert_eq!(
            model.validate().unwrap_err(),
            TimingError::MissingAsyncDeclaration {
                a: "a".into(),
                b: "b".into(),
                total: 1,
            }
        );
    }

    #[test]
    fn every_unrelated_pair_is_reported() {
        let mut t = TimingDomainManager::new();
        t.declare_domain("pcie", 125e6, None).unwrap();
        t.declare_domain("sys", 125e6, Some("pcie")).unwrap();
        t.declare_domain("jtag", 20e6, None).unwrap();
        t.declare_async("pcie", "jtag").unwrap();
        let model = t.freeze();
        assert_eq!(
            model.missing_exceptions(),
            vec![("jtag".to_string(), "sys".to_string())]
        );
    }

    #[test]
    fn external_domain_needs_period() {
        let mut t = TimingDomainManager::new();
        t.declare_domain("jtag", 20e6, None).unwrap();
        assert_eq!(
            t.validate().unwrap_err(),
            TimingError::MissingPeriodConstraint("jtag".into())
        );
    }

    #[test]
    fn period_must_match_frequency() {
        let mut t = TimingDomainManager::new();
        t.declare_domain("jtag", 20e6, None).unwrap();
        assert!(matches!(
            t.declare_period_constraint("jtag", 40.0),
            Err(TimingError::PeriodMismatch { .. })
        ));
        assert!(matches!(
            t.declare_period_constraint("jtag", -1.0),
            Err(TimingError::InvalidPeriod { .. })
        ));
        t.declare_period_constraint("jtag", 50.0).unwrap();
    }

    #[test]
    fn declaration_errors() {
        let mut t = TimingDomainManager::new();
        t.declare_domain("sys", 100e6, None).unwrap();
        assert_eq!(
            t.declare_domain("sys", 100e6, None).unwrap_err(),
            TimingError::DuplicateDomain("sys".into())
        );
        assert_eq!(
            t.declare_domain("pll", 100e6, Some("ref")).unwrap_err(),
            TimingError::UnknownDomain("ref".into())
        );
        assert!(matches!(
            t.declare_domain("zero", 0.0, None),
            Err(TimingError::InvalidFrequency { .. })
        ));
        assert_eq!(
            t.declare_async("sys", "sys").unwrap_err(),
            TimingError::SelfException("sys".into())
        );
        assert_eq!(
            t.declare_async("sys", "nope").unwrap_err(),
            TimingError::UnknownDomain("nope".into())
        );
    }

    #[test]
    fn clock_name_override() {
        let mut t = TimingDomainManager::new();
        t.declare_domain("pcie", 125e6, None).unwrap();
        assert_eq!(t.domain("pcie").unwrap().clock, "pcie_clk");
        t.set_clock_name("pcie", "*s7pciephy_clkout*").unwrap();
        assert_eq!(t.domain("pcie").unwrap().clock, "*s7pciephy_clkout*");
    }
}
