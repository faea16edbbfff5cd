//! `NamespaceListExcluder`: excludes objects in a fixed denylist of
//! namespaces (e.g. `kube-system`), the simplest real `ProcessExcluder`.

use orka_sync::ProcessExcluder;
use rustc_hash::FxHashSet;

pub struct NamespaceListExcluder {
    denied: FxHashSet<String>,
}

impl NamespaceListExcluder {
    pub fn new(denied: impl IntoIterator<Item = String>) -> Self {
        Self { denied: denied.into_iter().collect() }
    }
}

impl ProcessExcluder for NamespaceListExcluder {
    fn is_excluded(&self, namespace: Option<&str>) -> bool {
        namespace.is_some_and(|ns| self.denied.contains(ns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_only_denied_namespaces() {
        let excluder = NamespaceListExcluder::new(["kube-system".to_string()]);
        assert!(excluder.is_excluded(Some("kube-system")));
        assert!(!excluder.is_excluded(Some("default")));
        assert!(!excluder.is_excluded(None));
    }
}
