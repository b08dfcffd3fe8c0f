//! Service reflection.
//!
//! Lists the services and methods a server exposes so generic clients can
//! discover them at runtime.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::rpc::MethodKind;

pub const SERVICE: &str = "logserver.reflection.ServerReflection";
pub const LIST_SERVICES: &str = "ListServices";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListServicesRequest {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListServicesResponse {
    pub services: Vec<ServiceDescriptor>,
}

/// Group registered `service/method` names by service, sorted.
pub fn describe(methods: &DashMap<String, MethodKind>) -> ListServicesResponse {
    let mut services: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in methods.iter() {
        if let Some((service, method)) = entry.key().split_once('/') {
            services
                .entry(service.to_string())
                .or_default()
                .push(method.to_string());
        }
    }

    ListServicesResponse {
        services: services
            .into_iter()
            .map(|(name, mut methods)| {
                methods.sort();
                ServiceDescriptor { name, methods }
            })
            .collect(),
    }
}
