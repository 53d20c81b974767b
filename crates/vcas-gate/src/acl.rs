//! The topic ACL: exclusive-owner rules fetched from the relational store.
//!
//! Only the `Exclusive` rule variant is modeled, per the spec this gateway
//! implements; other rule modifiers are reserved (see the design ledger).

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use vcas_proto::rpc::Action;

use crate::error::GatewayError;

/// The query used by [`AclEngine::fetch`] to load exclusive-owner rules.
///
/// Overridable so deployments can point at a differently shaped `rule` table.
pub const DEFAULT_EXCLUSIVE_RULE_QUERY: &str = "SELECT top FROM rule WHERE mod = 'ex'";

/// A process-wide, topic-keyed exclusive-owner table.
///
/// Each topic with an exclusive rule owns an [`ArcSwapOption`] holding the current
/// owner's connection id (`None` = free). The owner transitions only
/// `None -> Some(c)` (via [`AclEngine::check`]) and `Some(c) -> None` (via
/// [`AclEngine::release`]).
#[derive(Default)]
pub struct AclEngine {
	rules: DashMap<String, ArcSwapOption<String>>,
}

impl AclEngine {
	/// An empty table; every topic is unrestricted until [`AclEngine::fetch`] runs.
	pub fn new() -> Self {
		Self::default()
	}

	/// Rebuilds the table from the database, replacing any prior contents.
	///
	/// Safe to call repeatedly (e.g. on every provider load).
	pub async fn fetch(&self, pool: &sqlx::PgPool) -> Result<(), GatewayError> {
		self.fetch_with_query(pool, DEFAULT_EXCLUSIVE_RULE_QUERY).await
	}

	/// As [`AclEngine::fetch`], but with an explicit query string.
	pub async fn fetch_with_query(
		&self,
		pool: &sqlx::PgPool,
		query: &str,
	) -> Result<(), GatewayError> {
		let rows: Vec<(String,)> = sqlx::query_as(query).fetch_all(pool).await?;

		self.rules.clear();
		for (topic,) in rows {
			self.rules.insert(topic, ArcSwapOption::empty());
		}

		Ok(())
	}

	/// `true` when `action` is not [`Action::Publish`], or when `conn` holds (or
	/// just claimed) the exclusive owner slot for `topic`. A topic with no
	/// exclusive rule permits all actions.
	///
	/// Linearizable per topic: the owner slot transitions via a single
	/// read-copy-update, so concurrent callers racing for the same unclaimed
	/// topic always agree on exactly one winner.
	pub fn check(&self, topic: &str, conn: &str, action: Action) -> bool {
		if action != Action::Publish {
			return true;
		}

		let Some(owner) = self.rules.get(topic) else {
			return true;
		};

		let resolved = owner.rcu(|current: &Option<Arc<String>>| match current {
			Some(holder) => Some(Arc::clone(holder)),
			None => Some(Arc::new(conn.to_owned())),
		});

		resolved.as_deref().is_some_and(|holder| holder == conn)
	}

	/// Releases every topic currently owned by `conn`. Idempotent; safe to call
	/// on a connection that owns nothing.
	pub fn release(&self, conn: &str) {
		for entry in self.rules.iter() {
			entry.value().rcu(|current: &Option<Arc<String>>| match current {
				Some(holder) if holder.as_str() == conn => None,
				other => other.clone(),
			});
		}
	}
}
