//! Interface descriptor files and the device:interface filter built from them.
//!
//! A descriptor lists the monitored links per collector and host:
//!
//! ```yaml
//! collectors:
//!   - core:
//!       hosts:
//!         - R1:
//!             interfaces: [Gi0/1, Gi0/2]
//! ```

use crate::samples::SampleTable;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceDescriptor {
    pub collectors: Vec<BTreeMap<String, Collector>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Collector {
    pub hosts: Vec<BTreeMap<String, Host>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Host {
    pub interfaces: Vec<String>,
}

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("unable to read interface file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed interface file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Composite "device:interface" key identifying a monitored link
pub fn interface_key(device: &str, interface: &str) -> String {
    format!("{}:{}", device, interface)
}

/// Set of interface keys rows are checked against
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceFilter {
    keys: HashSet<String>,
}

impl InterfaceFilter {
    /// Build a filter from (host, interfaces) pairs.
    pub fn from_hosts<'a, I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, S)>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let keys = hosts
            .into_iter()
            .flat_map(|(host, interfaces)| {
                interfaces
                    .into_iter()
                    .map(move |i| interface_key(host, i.as_ref()))
            })
            .collect();
        Self { keys }
    }

    /// Flatten collectors -> hosts -> interfaces into a filter.
    pub fn from_descriptor(descriptor: &InterfaceDescriptor) -> Self {
        let hosts = descriptor
            .collectors
            .iter()
            .flat_map(|collector_map| collector_map.values())
            .flat_map(|collector| collector.hosts.iter())
            .flat_map(|host_map| host_map.iter())
            .map(|(name, host)| (name.as_str(), host.interfaces.iter()));
        Self::from_hosts(hosts)
    }

    pub fn contains(&self, device: &str, interface: &str) -> bool {
        self.keys.contains(&interface_key(device, interface))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keep only the rows whose device:interface key is in the filter.
    pub fn apply(&self, table: SampleTable) -> SampleTable {
        let before = table.len();
        let rows: Vec<_> = table
            .rows
            .into_iter()
            .filter(|row| self.contains(&row.device, &row.interface))
            .collect();
        tracing::debug!("Interface filter kept {} of {} samples", rows.len(), before);
        SampleTable { rows }
    }
}

/// Parse descriptor text. `Ok(None)` means the document is empty.
pub fn parse_descriptor(text: &str) -> Result<Option<InterfaceDescriptor>, serde_yaml::Error> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_yaml::from_str::<Option<InterfaceDescriptor>>(text)
}

/// Read and flatten a descriptor file.
pub fn load_filter<P: AsRef<Path>>(path: P) -> Result<Option<InterfaceFilter>, DescriptorError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| DescriptorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let descriptor = parse_descriptor(&text).map_err(|source| DescriptorError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(descriptor.as_ref().map(InterfaceFilter::from_descriptor))
}

/// Resolve the optional `--interfaces` argument into a filter.
///
/// No path, an empty path, or an unreadable file all mean no filtering.
/// A malformed descriptor is returned as an error.
pub fn resolve_filter(path: Option<&Path>) -> Result<Option<InterfaceFilter>, DescriptorError> {
    let path = match path {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return Ok(None),
    };
    match load_filter(path) {
        Ok(filter) => Ok(filter),
        Err(DescriptorError::Io { path, source }) => {
            tracing::error!(
                "Unable to read Interface file {} - Ignoring: {}",
                path.display(),
                source
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
