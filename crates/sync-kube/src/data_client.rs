//! `StoreDataClient`: bridges `orka-sync`'s `PolicyDataClient` to
//! `orka-store`'s ingest channel, reusing the `orka_core::Delta`/`DeltaKind`
//! wire shape (extended with `DeltaKind::Wipe` for full-cache resets).
//! Object-to-`Delta` conversion mirrors `orka_kubehub::delta_from`'s
//! `metadata.uid`-as-uuid convention.

use anyhow::{anyhow, Context, Result};
use orka_core::{Delta, DeltaKind, Uid};
use orka_sync::{PolicyDataClient, RemoveTarget};
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

pub struct StoreDataClient {
    tx: Sender<Delta>,
}

impl StoreDataClient {
    pub fn new(tx: Sender<Delta>) -> Self {
        Self { tx }
    }
}

fn uid_of(obj: &serde_json::Value) -> Result<Uid> {
    let uid_str = obj
        .pointer("/metadata/uid")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("object missing metadata.uid"))?;
    let uuid = Uuid::parse_str(uid_str).context("parsing metadata.uid as uuid")?;
    Ok(*uuid.as_bytes())
}

#[async_trait::async_trait]
impl PolicyDataClient for StoreDataClient {
    async fn add_data(&self, obj: &serde_json::Value) -> Result<()> {
        let delta = Delta { uid: uid_of(obj)?, kind: DeltaKind::Applied, raw: obj.clone() };
        self.tx.send(delta).await.map_err(|_| anyhow!("ingest channel closed"))
    }

    async fn remove_data(&self, target: RemoveTarget<'_>) -> Result<()> {
        let delta = match target {
            RemoveTarget::Object(obj) => Delta { uid: uid_of(obj)?, kind: DeltaKind::Deleted, raw: obj.clone() },
            RemoveTarget::WipeAll => Delta { uid: [0u8; 16], kind: DeltaKind::Wipe, raw: serde_json::Value::Null },
        };
        self.tx.send(delta).await.map_err(|_| anyhow!("ingest channel closed"))
    }
}
