use std::thread;
use tokio::sync::{mpsc, oneshot, watch};
use shared::types::{HostRecord, HostUpdate, MacAddress};
use crate::error::{BtyError, Result};
use crate::store::{file::HostStore, hash, Hosts};

/// Host records backed by a `HostStore`.
///
/// The store is reloaded from disk for every operation so edits made to the
/// file by hand are picked up by the next request. Each mutation is written
/// through before the operation returns.
pub struct HostRegistry {
    store: HostStore,
    digest_tx: watch::Sender<String>,
}

impl HostRegistry {
    pub fn new(store: HostStore, digest_tx: watch::Sender<String>) -> Self {
        Self { store, digest_tx }
    }

    fn load(&self) -> Result<Hosts> {
        let hosts = self.store.load().map_err(BtyError::PersistenceUnavailable)?;
        self.publish_digest(&hosts);
        Ok(hosts)
    }

    fn save(&self, hosts: &Hosts) -> Result<()> {
        self.store.save(hosts).map_err(BtyError::PersistenceUnavailable)?;
        self.publish_digest(hosts);
        Ok(())
    }

    fn publish_digest(&self, hosts: &Hosts) {
        match hash::compute_digest(hosts) {
            Ok(digest) => {
                self.digest_tx.send_if_modified(|current| {
                    if *current == digest {
                        return false;
                    }
                    *current = digest;
                    true
                });
            }
            Err(e) => tracing::error!("Failed to compute store digest: {:#}", e),
        }
    }

    /// Return the record for `hwa`, creating and persisting a default one on
    /// first contact.
    pub fn get_or_create(&self, hwa: MacAddress) -> Result<HostRecord> {
        let mut hosts = self.load()?;
        if let Some(record) = hosts.get(&hwa) {
            return Ok(record.clone());
        }

        let record = HostRecord::new(hwa);
        hosts.insert(hwa, record.clone());
        self.save(&hosts)?;

        tracing::info!("Registered new host {}", hwa);
        Ok(record)
    }

    pub fn get(&self, hwa: MacAddress) -> Result<Option<HostRecord>> {
        Ok(self.load()?.remove(&hwa))
    }

    /// Apply `update` to an existing record. Nothing is written if the update
    /// leaves the record unchanged.
    pub fn update(&self, hwa: MacAddress, update: &HostUpdate) -> Result<HostRecord> {
        let mut hosts = self.load()?;
        let record = hosts.get_mut(&hwa).ok_or(BtyError::UnknownHost(hwa))?;

        if !update.apply(record) {
            return Ok(record.clone());
        }

        let record = record.clone();
        self.save(&hosts)?;

        tracing::info!("Updated host {}: {:?}", hwa, record);
        Ok(record)
    }

    pub fn snapshot(&self) -> Result<Hosts> {
        self.load()
    }
}

/// Digest to publish before the registry thread starts.
///
/// An unreadable store is not fatal here: the daemon starts with an empty
/// digest and each request fails with `PersistenceUnavailable` until the file
/// is restored.
pub fn initial_digest(store: &HostStore) -> String {
    let digest = store
        .load()
        .and_then(|hosts| {
            let digest = hash::compute_digest(&hosts)?;
            tracing::info!(
                "Host store {:?} holds {} hosts, digest {}",
                store.path(),
                hosts.len(),
                digest
            );
            Ok(digest)
        });

    digest.unwrap_or_else(|e| {
        tracing::warn!("Host store unavailable, requests will fail until it is restored: {:#}", e);
        String::new()
    })
}

/// Commands sent to the registry thread
pub enum RegistryCommand {
    GetOrCreate(MacAddress, oneshot::Sender<Result<HostRecord>>),
    Get(MacAddress, oneshot::Sender<Result<Option<HostRecord>>>),
    Update(MacAddress, HostUpdate, oneshot::Sender<Result<HostRecord>>),
    Snapshot(oneshot::Sender<Result<Hosts>>),
    Shutdown,
}

/// Handle to the registry thread.
///
/// Every store operation runs on that one thread, so two first contacts from
/// the same host cannot both create a record and concurrent management
/// updates cannot overwrite each other.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Spawn a new registry thread owning `registry`
    pub fn spawn(registry: HostRegistry) -> Self {
        let (tx, mut rx) = mpsc::channel::<RegistryCommand>(256);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    RegistryCommand::GetOrCreate(hwa, reply) => {
                        let _ = reply.send(registry.get_or_create(hwa));
                    }
                    RegistryCommand::Get(hwa, reply) => {
                        let _ = reply.send(registry.get(hwa));
                    }
                    RegistryCommand::Update(hwa, update, reply) => {
                        let _ = reply.send(registry.update(hwa, &update));
                    }
                    RegistryCommand::Snapshot(reply) => {
                        let _ = reply.send(registry.snapshot());
                    }
                    RegistryCommand::Shutdown => {
                        tracing::info!("Registry thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    async fn request<T>(
        &self,
        cmd: impl FnOnce(oneshot::Sender<Result<T>>) -> RegistryCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(cmd(reply))
            .await
            .map_err(|_| BtyError::RegistryClosed)?;
        rx.await.map_err(|_| BtyError::RegistryClosed)?
    }

    pub async fn get_or_create(&self, hwa: MacAddress) -> Result<HostRecord> {
        self.request(|reply| RegistryCommand::GetOrCreate(hwa, reply)).await
    }

    pub async fn get(&self, hwa: MacAddress) -> Result<Option<HostRecord>> {
        self.request(|reply| RegistryCommand::Get(hwa, reply)).await
    }

    pub async fn update(&self, hwa: MacAddress, update: HostUpdate) -> Result<HostRecord> {
        self.request(|reply| RegistryCommand::Update(hwa, update, reply)).await
    }

    pub async fn snapshot(&self) -> Result<Hosts> {
        self.request(RegistryCommand::Snapshot).await
    }

    /// Shutdown the registry thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(RegistryCommand::Shutdown)
            .await
            .map_err(|_| BtyError::RegistryClosed)
    }
}
