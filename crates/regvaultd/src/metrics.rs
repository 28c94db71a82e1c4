//! Prometheus counters for the registration pipelines

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum LoginOutcome {
    Success,
    Failure,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct LoginLabels {
    pub outcome: LoginOutcome,
}

pub struct Metrics {
    pub registry: Registry,
    pub registrations: Counter,
    pub updates: Counter,
    pub deletes: Counter,
    /// Records whose envelope could not be opened while listing or scanning
    pub decrypt_failures: Counter,
    pub logins: Family<LoginLabels, Counter>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("regvault");
        let registrations = Counter::default();
        let updates = Counter::default();
        let deletes = Counter::default();
        let decrypt_failures = Counter::default();
        let logins = Family::<LoginLabels, Counter>::default();

        registry.register(
            "registrations",
            "Students registered",
            registrations.clone(),
        );
        registry.register("updates", "Student records replaced", updates.clone());
        registry.register("deletes", "Student records deleted", deletes.clone());
        registry.register(
            "envelope_decrypt_failures",
            "Stored records whose envelope failed to open",
            decrypt_failures.clone(),
        );
        registry.register("logins", "Login attempts by outcome", logins.clone());

        Self {
            registry,
            registrations,
            updates,
            deletes,
            decrypt_failures,
            logins,
        }
    }

    pub fn login(&self, outcome: LoginOutcome) {
        self.logins.get_or_create(&LoginLabels { outcome }).inc();
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        prometheus_client::encoding::text::encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_counters() {
        let metrics = Metrics::new();
        metrics.registrations.inc();
        metrics.login(LoginOutcome::Failure);

        let body = metrics.encode().unwrap();
        assert!(body.contains("regvault_registrations_total 1"));
        assert!(body.contains(r#"regvault_logins_total{outcome="Failure"} 1"#));
        assert!(body.contains("regvault_envelope_decrypt_failures_total 0"));
    }
}
