//! `KubeClusterReader`: lists every live object of a GVK, for the replay
//! loop's `syncGVK`. Reuses `orka_kubehub::find_api_resource` the same way
//! the registrar does.

use kube::{api::Api, core::DynamicObject, Client};
use orka_sync::{ClusterReader, Gvk};

pub struct KubeClusterReader {
    client: Client,
}

impl KubeClusterReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ClusterReader for KubeClusterReader {
    async fn list(&self, gvk: &Gvk) -> anyhow::Result<Vec<serde_json::Value>> {
        let kube_gvk = kube::core::GroupVersionKind {
            group: gvk.group.clone(),
            version: gvk.version.clone(),
            kind: gvk.kind.clone(),
        };
        let (ar, _namespaced) = orka_kubehub::find_api_resource(self.client.clone(), &kube_gvk).await?;
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let list = api.list(&Default::default()).await?;
        list.items.into_iter().map(|obj| Ok(serde_json::to_value(&obj)?)).collect()
    }
}
