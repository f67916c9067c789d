//! Configuration validation.
//!
//! Serde handles syntax; this checks semantics and reports every problem
//! found, not just the first.

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::SmartConfig;
use crate::load_balancer::host::HostKey;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub(crate) fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &SmartConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.initial_hosts.is_empty() && config.vdcs.is_empty() {
        errors.push(ValidationError::new(
            "initial_hosts",
            "at least one initial host or VDC is required",
        ));
    }

    for (i, host) in config.initial_hosts.iter().enumerate() {
        if let Err(e) = host.parse::<HostKey>() {
            errors.push(ValidationError::new(format!("initial_hosts[{}]", i), e));
        }
    }

    let mut names = HashSet::new();
    for (i, vdc) in config.vdcs.iter().enumerate() {
        if vdc.hosts.is_empty() {
            errors.push(ValidationError::new(format!("vdcs[{}].hosts", i), "VDC has no seed hosts"));
        }
        for (j, host) in vdc.hosts.iter().enumerate() {
            if let Err(e) = host.parse::<HostKey>() {
                errors.push(ValidationError::new(format!("vdcs[{}].hosts[{}]", i, j), e));
            }
        }
        let name = vdc.name.clone().or_else(|| vdc.hosts.first().cloned());
        if let Some(name) = name {
            if !names.insert(name.clone()) {
                errors.push(ValidationError::new(
                    format!("vdcs[{}].name", i),
                    format!("duplicate VDC name {:?}", name),
                ));
            }
        }
    }

    if !matches!(config.protocol.to_ascii_lowercase().as_str(), "http" | "https") {
        errors.push(ValidationError::new(
            "protocol",
            format!("unsupported protocol {:?}", config.protocol),
        ));
    }

    if config.port == Some(0) {
        errors.push(ValidationError::new("port", "must be non-zero"));
    }

    let polling = &config.polling;
    if polling.interval_secs == 0 {
        errors.push(ValidationError::new("polling.interval_secs", "must be greater than zero"));
    }
    if polling.probe_timeout_secs == 0 {
        errors.push(ValidationError::new("polling.probe_timeout_secs", "must be greater than zero"));
    }
    if polling.eviction_threshold == 0 {
        errors.push(ValidationError::new("polling.eviction_threshold", "must be at least 1"));
    }
    if polling.absence_threshold == 0 {
        errors.push(ValidationError::new("polling.absence_threshold", "must be at least 1"));
    }
    if polling.max_concurrent_checks == 0 {
        errors.push(ValidationError::new("polling.max_concurrent_checks", "must be at least 1"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address {:?}", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
