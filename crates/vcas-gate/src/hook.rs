//! The compositional hook-provider service: an ordered list of capability
//! instances, each declaring only the hooks it implements.
//!
//! Composition rule: for hooks that return a value (authorize, publish), the
//! first instance to respond `STOP_AND_RETURN` wins; otherwise the service falls
//! through to a default `CONTINUE`. For hooks that return nothing but an error
//! channel (disconnect), every instance runs and the first error short-circuits.

use std::sync::Arc;

use async_trait::async_trait;
use vcas_proto::rpc::{Action, Disposition, HookSpec, PublishMessage, ValuedResponse};

use crate::acl::AclEngine;
use crate::error::GatewayError;
use crate::store::BatchStore;

/// A capability an instance may opt into by overriding the corresponding method.
///
/// The default implementation of every method is "I don't implement this hook":
/// `Ok(vec![])` for provider-load declarations, `None` for valued hooks (meaning
/// this instance doesn't vote), and `Ok(())` for disconnect.
#[async_trait]
pub trait HookInstance: Send + Sync {
	/// Called when the broker (re)loads this provider. Instances that need to
	/// (re)populate state from the database do so here and declare the hooks
	/// they want to receive going forward.
	async fn on_provider_loaded(&self, _pool: &sqlx::PgPool) -> Result<Vec<HookSpec>, GatewayError> {
		Ok(Vec::new())
	}

	/// Votes on whether `clientid` may `action` on `topic`.
	async fn on_client_authorize(
		&self,
		_clientid: &str,
		_topic: &str,
		_action: Action,
	) -> Option<ValuedResponse<bool>> {
		None
	}

	/// Observes (and may veto or rewrite) a publish.
	async fn on_message_publish(
		&self,
		_pool: &sqlx::PgPool,
		_msg: &PublishMessage,
	) -> Option<Result<ValuedResponse<PublishMessage>, GatewayError>> {
		None
	}

	/// Notified when `clientid` disconnects, for release of any held state.
	async fn on_client_disconnected(&self, _clientid: &str) -> Result<(), GatewayError> {
		Ok(())
	}
}

/// Delegates `client.authorize` to the [`AclEngine`] and releases ownerships on
/// disconnect.
pub struct AuthzInstance {
	acl: Arc<AclEngine>,
}

impl AuthzInstance {
	/// Wraps an ACL engine as a hook instance.
	pub fn new(acl: Arc<AclEngine>) -> Self {
		Self { acl }
	}
}

#[async_trait]
impl HookInstance for AuthzInstance {
	async fn on_provider_loaded(&self, pool: &sqlx::PgPool) -> Result<Vec<HookSpec>, GatewayError> {
		self.acl.fetch(pool).await?;
		Ok(vec![HookSpec {
			name: "client.authorize".to_owned(),
			topics: None,
		}])
	}

	async fn on_client_authorize(
		&self,
		clientid: &str,
		topic: &str,
		action: Action,
	) -> Option<ValuedResponse<bool>> {
		Some(if self.acl.check(topic, clientid, action) {
			ValuedResponse::cont(true)
		} else {
			ValuedResponse::stop(false)
		})
	}

	async fn on_client_disconnected(&self, clientid: &str) -> Result<(), GatewayError> {
		self.acl.release(clientid);
		Ok(())
	}
}

/// Batches publishes on retentive topics into the [`BatchStore`].
pub struct StoreInstance {
	store: Arc<BatchStore>,
}

impl StoreInstance {
	/// Wraps a batch store as a hook instance.
	pub fn new(store: Arc<BatchStore>) -> Self {
		Self { store }
	}
}

#[async_trait]
impl HookInstance for StoreInstance {
	async fn on_provider_loaded(&self, pool: &sqlx::PgPool) -> Result<Vec<HookSpec>, GatewayError> {
		self.store.init(pool).await?;
		Ok(vec![HookSpec {
			name: "message.publish".to_owned(),
			topics: None,
		}])
	}

	async fn on_message_publish(
		&self,
		pool: &sqlx::PgPool,
		msg: &PublishMessage,
	) -> Option<Result<ValuedResponse<PublishMessage>, GatewayError>> {
		Some(
			self
				.store
				.record_publish(pool, &msg.topic, &msg.payload)
				.await
				.map(|()| ValuedResponse::cont(msg.clone())),
		)
	}
}

/// The broker-facing hook-provider server: composes [`HookInstance`]s in order.
pub struct HookService {
	instances: Vec<Arc<dyn HookInstance>>,
}

impl HookService {
	/// Builds the service from an ordered instance list. Order matters: earlier
	/// instances get first refusal on every valued hook.
	pub fn new(instances: Vec<Arc<dyn HookInstance>>) -> Self {
		Self { instances }
	}

	/// Aggregates every instance's declared hooks into one `OnProviderLoaded`
	/// response. Instances run in order; the first error aborts the load.
	pub async fn on_provider_loaded(&self, pool: &sqlx::PgPool) -> Result<Vec<HookSpec>, GatewayError> {
		let mut hooks = Vec::new();
		for instance in &self.instances {
			hooks.extend(instance.on_provider_loaded(pool).await?);
		}
		Ok(hooks)
	}

	/// Runs `client.authorize` across instances, honoring `STOP_AND_RETURN`.
	pub async fn on_client_authorize(
		&self,
		clientid: &str,
		topic: &str,
		action: Action,
	) -> ValuedResponse<bool> {
		for instance in &self.instances {
			if let Some(response) = instance.on_client_authorize(clientid, topic, action).await
				&& response.disposition == Disposition::StopAndReturn
			{
				return response;
			}
		}
		ValuedResponse::cont(true)
	}

	/// Runs `message.publish` across instances, honoring `STOP_AND_RETURN`.
	///
	/// The first instance to return an error aborts the chain; the broker applies
	/// its own reconnect policy to a hook error.
	pub async fn on_message_publish(
		&self,
		pool: &sqlx::PgPool,
		msg: &PublishMessage,
	) -> Result<ValuedResponse<PublishMessage>, GatewayError> {
		for instance in &self.instances {
			if let Some(result) = instance.on_message_publish(pool, msg).await {
				let response = result?;
				if response.disposition == Disposition::StopAndReturn {
					return Ok(response);
				}
			}
		}
		Ok(ValuedResponse::cont(msg.clone()))
	}

	/// Runs `OnClientDisconnected` across every instance; the first error
	/// short-circuits the rest.
	pub async fn on_client_disconnected(&self, clientid: &str) -> Result<(), GatewayError> {
		for instance in &self.instances {
			instance.on_client_disconnected(clientid).await?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct StopFirst;
	#[async_trait]
	impl HookInstance for StopFirst {
		async fn on_client_authorize(
			&self,
			_clientid: &str,
			_topic: &str,
			_action: Action,
		) -> Option<ValuedResponse<bool>> {
			Some(ValuedResponse::stop(false))
		}
	}

	struct PanicsIfCalled;
	#[async_trait]
	impl HookInstance for PanicsIfCalled {
		async fn on_client_authorize(
			&self,
			_clientid: &str,
			_topic: &str,
			_action: Action,
		) -> Option<ValuedResponse<bool>> {
			panic!("should never be reached once an earlier instance stopped the chain")
		}
	}

	#[tokio::test]
	async fn stop_and_return_short_circuits_later_instances() {
		let service = HookService::new(vec![Arc::new(StopFirst), Arc::new(PanicsIfCalled)]);
		let resp = service.on_client_authorize("c1", "top1", Action::Publish).await;
		assert_eq!(resp.disposition, Disposition::StopAndReturn);
		assert!(!resp.value);
	}

	#[tokio::test]
	async fn no_instance_voting_defaults_to_continue_true() {
		let service = HookService::new(vec![]);
		let resp = service.on_client_authorize("c1", "top1", Action::Publish).await;
		assert_eq!(resp.disposition, Disposition::Continue);
		assert!(resp.value);
	}
}
