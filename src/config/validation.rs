//! Configuration validation.
//!
//! Semantic checks run after serde has accepted the file. All problems are
//! reported at once rather than only the first.

use crate::config::schema::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("rpc_endpoint must not be empty")]
    EmptyRpcEndpoint,
    #[error("http_endpoint must not be empty when set")]
    EmptyHttpEndpoint,
    #[error("tls.{present} is set but tls.{missing} is not; set both or neither")]
    TlsPairing {
        present: &'static str,
        missing: &'static str,
    },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("discovery.service must be set when etcd_servers are configured")]
    MissingDiscoveryService,
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.rpc_endpoint.trim().is_empty() {
        errors.push(ValidationError::EmptyRpcEndpoint);
    }
    if matches!(&config.http_endpoint, Some(endpoint) if endpoint.trim().is_empty()) {
        errors.push(ValidationError::EmptyHttpEndpoint);
    }

    match (&config.tls.cert_file, &config.tls.key_file) {
        (Some(_), None) => errors.push(ValidationError::TlsPairing {
            present: "cert_file",
            missing: "key_file",
        }),
        (None, Some(_)) => errors.push(ValidationError::TlsPairing {
            present: "key_file",
            missing: "cert_file",
        }),
        _ => {}
    }

    if config.tree_gc.enabled {
        if config.tree_gc.min_interval_secs == 0 {
            errors.push(ValidationError::Zero("tree_gc.min_interval_secs"));
        }
        if config.tree_gc.delete_threshold_secs == 0 {
            errors.push(ValidationError::Zero("tree_gc.delete_threshold_secs"));
        }
    }
    if config.shutdown.drain_timeout_secs == 0 {
        errors.push(ValidationError::Zero("shutdown.drain_timeout_secs"));
    }

    if !config.discovery.etcd_servers.is_empty() && config.discovery.service.trim().is_empty() {
        errors.push(ValidationError::MissingDiscoveryService);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
