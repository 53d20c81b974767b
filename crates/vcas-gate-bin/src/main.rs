//! The gateway binary: wires the ACL engine, batch store, hook service, and
//! gateway service together against a broker adapter channel and a relational
//! store pool.
//!
//! Binding this process's side as the broker's external-protocol and
//! external-hook RPC *server* requires the broker vendor's generated service
//! descriptors, which are out of scope for the core (see the design ledger).
//! [`vcas_gate::gateway::GatewayService`] and [`vcas_gate::hook::HookService`]
//! are built here and ready to be mounted on that server once those stubs are
//! available; in the meantime this binary brings the core up, verifies
//! connectivity, and idles until told to shut down.

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tracing::info;
use vcas_gate::acl::AclEngine;
use vcas_gate::adapter::TonicBrokerAdapter;
use vcas_gate::config::Config;
use vcas_gate::gateway::GatewayService;
use vcas_gate::hook::{AuthzInstance, HookService, StoreInstance};
use vcas_gate::store::BatchStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let config = Config::parse();

	tracing_subscriber::fmt()
		.with_max_level(tracing::Level::INFO)
		.init();

	info!(port = config.port, "starting vcas-gate");

	let pool = sqlx::postgres::PgPoolOptions::new()
		.max_connections(16)
		.connect(&config.db_url)
		.await?;

	let acl = Arc::new(AclEngine::new());
	let store = Arc::new(BatchStore::new(config.hook_buf_qcap));
	let hook_service = HookService::new(vec![
		Arc::new(AuthzInstance::new(Arc::clone(&acl))),
		Arc::new(StoreInstance::new(Arc::clone(&store))),
	]);

	let declared = hook_service.on_provider_loaded(&pool).await?;
	info!(hooks = declared.len(), "provider loaded");

	let adapter_addr = format!("http://{}:{}", config.emqx_host, config.emqx_adapter_port);
	let channel = Channel::from_shared(adapter_addr)?.connect().await?;
	let adapter = Arc::new(TonicBrokerAdapter::new(channel));

	let gateway_service = GatewayService::new(adapter, Arc::clone(&acl));
	info!(connections = gateway_service.connection_count(), "gateway service ready");

	let shutdown = CancellationToken::new();
	let ctrl_c = shutdown.clone();
	tokio::spawn(async move {
		let _ = tokio::signal::ctrl_c().await;
		ctrl_c.cancel();
	});

	shutdown.cancelled().await;
	info!("shutting down");

	Ok(())
}
