//! Cluster identity

use serde::Serialize;
use std::fmt;

/// AKS cluster addressed by resource group and name
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClusterRef {
    pub resource_group: String,
    pub name: String,
}

impl ClusterRef {
    pub fn new(resource_group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            name: name.into(),
        }
    }

    /// `--resource-group <rg> --name <cluster>`
    pub fn az_args(&self) -> [&str; 4] {
        ["--resource-group", &self.resource_group, "--name", &self.name]
    }
}

impl fmt::Display for ClusterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_group, self.name)
    }
}

/// Client ID of the service principal a cluster uses to pull from the registry
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ServicePrincipalId(String);

impl ServicePrincipalId {
    /// Interpret the raw `servicePrincipalProfile.clientId` query output.
    ///
    /// Managed-identity clusters report `msi`; those have no principal to delete.
    pub fn from_query_output(raw: &str) -> Option<Self> {
        let id = raw.trim();
        if id.is_empty() || id.eq_ignore_ascii_case("msi") || id == "null" {
            None
        } else {
            Some(Self(id.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServicePrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
