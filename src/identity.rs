use crate::env::{env_opt, HOSTNAME_ENV, POD_NAME_ENV};
use std::sync::OnceLock;

/// Identity of the running process, stamped onto every record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub pod_name: String,
    pub host_name: String,
}

impl ProcessIdentity {
    pub fn new(pod_name: impl Into<String>, host_name: impl Into<String>) -> Self {
        ProcessIdentity {
            pod_name: pod_name.into(),
            host_name: host_name.into(),
        }
    }

    /// Identity of this process, resolved on first call and fixed afterwards.
    pub fn current() -> &'static ProcessIdentity {
        static IDENTITY: OnceLock<ProcessIdentity> = OnceLock::new();
        IDENTITY.get_or_init(Self::resolve)
    }

    fn resolve() -> Self {
        let pod_name = env_opt(POD_NAME_ENV).unwrap_or_else(|| "local".to_string());
        ProcessIdentity::new(pod_name, resolve_host_name())
    }
}

fn resolve_host_name() -> String {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| env_opt(HOSTNAME_ENV))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_is_resolved_once() {
        let a = ProcessIdentity::current();
        let b = ProcessIdentity::current();
        assert!(std::ptr::eq(a, b));
        assert!(!a.pod_name.is_empty());
        assert!(!a.host_name.is_empty());
    }
}
