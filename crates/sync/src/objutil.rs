//! Small helpers for pulling GVK/namespace out of a raw Kubernetes object,
//! mirroring `orka-kubehub`'s `apiVersion`/`kind` parsing without depending
//! on `kube`.

use anyhow::{anyhow, Result};

use crate::types::Gvk;

/// Extract `{group, version, kind}` from an object's `apiVersion`/`kind`
/// fields, e.g. `apiVersion: apps/v1, kind: Deployment` -> `apps/v1/Deployment`.
pub fn gvk_of(obj: &serde_json::Value) -> Result<Gvk> {
    let api_version = obj
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("object missing apiVersion"))?;
    let kind = obj.get("kind").and_then(|v| v.as_str()).ok_or_else(|| anyhow!("object missing kind"))?;
    let (group, version) = match api_version.split_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), api_version.to_string()),
    };
    Ok(Gvk::new(group, version, kind))
}

pub fn namespace_of(obj: &serde_json::Value) -> Option<&str> {
    obj.pointer("/metadata/namespace").and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_core_and_grouped_kinds() {
        let pod = serde_json::json!({"apiVersion": "v1", "kind": "Pod"});
        assert_eq!(gvk_of(&pod).unwrap(), Gvk::new("", "v1", "Pod"));

        let deploy = serde_json::json!({"apiVersion": "apps/v1", "kind": "Deployment"});
        assert_eq!(gvk_of(&deploy).unwrap(), Gvk::new("apps", "v1", "Deployment"));
    }

    #[test]
    fn missing_fields_error() {
        assert!(gvk_of(&serde_json::json!({"kind": "Pod"})).is_err());
        assert!(gvk_of(&serde_json::json!({"apiVersion": "v1"})).is_err());
    }

    #[test]
    fn namespace_extraction() {
        let obj = serde_json::json!({"metadata": {"namespace": "ns1"}});
        assert_eq!(namespace_of(&obj), Some("ns1"));
        assert_eq!(namespace_of(&serde_json::json!({})), None);
    }
}
