//! Stand-in EC transport used when no wire codec is linked.
//!
//! The binary EC dialect is deployment-provided (the adapter only depends
//! on the [`EcTransport`] contract). With this stub in place the instance
//! simply never connects; the reconnect loop keeps probing so a real
//! transport wired in later picks up without restarts.

use async_trait::async_trait;
use serde_json::Value;

use peerdeck_core::ServerInfo;

use super::transport::{
    EcCategory, EcDownload, EcPreferences, EcSearchHit, EcSharedFile, EcTransport, EcUpload,
};

/// Transport whose every operation reports the missing wire codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubEcTransport;

macro_rules! unavailable {
    () => {
        anyhow::bail!("no EC wire transport is linked for this instance")
    };
}

#[async_trait]
impl EcTransport for StubEcTransport {
    async fn connect(&self, _password: &str) -> anyhow::Result<()> {
        unavailable!()
    }

    async fn version(&self) -> anyhow::Result<String> {
        unavailable!()
    }

    async fn close(&self) {}

    async fn download_queue(&self) -> anyhow::Result<Vec<EcDownload>> {
        unavailable!()
    }

    async fn shared_files(&self) -> anyhow::Result<Vec<EcSharedFile>> {
        unavailable!()
    }

    async fn upload_queue(&self) -> anyhow::Result<Vec<EcUpload>> {
        unavailable!()
    }

    async fn stats(&self) -> anyhow::Result<Value> {
        unavailable!()
    }

    async fn pause_file(&self, _hash: &str) -> anyhow::Result<()> {
        unavailable!()
    }

    async fn resume_file(&self, _hash: &str) -> anyhow::Result<()> {
        unavailable!()
    }

    async fn stop_file(&self, _hash: &str) -> anyhow::Result<()> {
        unavailable!()
    }

    async fn cancel_file(&self, _hash: &str) -> anyhow::Result<()> {
        unavailable!()
    }

    async fn add_link(&self, _link: &str, _category_id: Option<u32>) -> anyhow::Result<String> {
        unavailable!()
    }

    async fn download_search_result(
        &self,
        _hash: &str,
        _category_id: Option<u32>,
    ) -> anyhow::Result<()> {
        unavailable!()
    }

    async fn set_file_category(&self, _hash: &str, _category_id: u32) -> anyhow::Result<()> {
        unavailable!()
    }

    async fn categories(&self) -> anyhow::Result<Vec<EcCategory>> {
        unavailable!()
    }

    async fn create_category(&self, _category: &EcCategory) -> anyhow::Result<u32> {
        unavailable!()
    }

    async fn update_category(&self, _category: &EcCategory) -> anyhow::Result<()> {
        unavailable!()
    }

    async fn delete_category(&self, _id: u32) -> anyhow::Result<()> {
        unavailable!()
    }

    async fn refresh_shared(&self) -> anyhow::Result<()> {
        unavailable!()
    }

    async fn search(
        &self,
        _query: &str,
        _file_type: Option<&str>,
        _min_size: Option<u64>,
        _max_size: Option<u64>,
    ) -> anyhow::Result<Vec<EcSearchHit>> {
        unavailable!()
    }

    async fn log(&self) -> anyhow::Result<String> {
        unavailable!()
    }

    async fn preferences(&self) -> anyhow::Result<EcPreferences> {
        unavailable!()
    }

    async fn servers(&self) -> anyhow::Result<Vec<ServerInfo>> {
        unavailable!()
    }

    async fn server_action(&self, _action: &str, _address: &str) -> anyhow::Result<()> {
        unavailable!()
    }
}
