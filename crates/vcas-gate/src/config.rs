//! Configuration keys consumed by the core (§6), loaded from CLI flags or the
//! matching environment variable. Layered file-based configuration and
//! defaulting beyond this live outside the core (see the design ledger).

use clap::{Parser, ValueEnum};

/// What a hook failure should do to the triggering broker action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HookAction {
	/// Deny the action that triggered the failing hook.
	Deny,
	/// Let the action through despite the hook failure.
	Ignore,
}

/// The gateway's runtime configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "vcas-gate", about = "LegacyWire/VCAS protocol gateway and policy plane")]
pub struct Config {
	/// Bind port for this gateway's broker-facing RPC server.
	#[arg(long, env = "VCAS_GATE_PORT", default_value_t = 9009)]
	pub port: u16,

	/// Broker host, for the adapter RPC and REST control plane.
	#[arg(long = "emqx-host", env = "VCAS_GATE_EMQX_HOST", default_value = "127.0.0.1")]
	pub emqx_host: String,

	/// Broker adapter RPC port.
	#[arg(long = "emqx-adapter-port", env = "VCAS_GATE_EMQX_ADAPTER_PORT", default_value_t = 5001)]
	pub emqx_adapter_port: u16,

	/// Batch capacity per retentive topic, before a flush is triggered.
	#[arg(long = "hook-buf-qcap", env = "VCAS_GATE_HOOK_BUF_QCAP", default_value_t = 5)]
	pub hook_buf_qcap: usize,

	/// Whether the hook provider is registered with the broker at all.
	#[arg(long = "hook-enable", env = "VCAS_GATE_HOOK_ENABLE", default_value_t = true)]
	pub hook_enable: bool,

	/// What to do with the triggering action when a hook call fails.
	#[arg(long = "hook-action", env = "VCAS_GATE_HOOK_ACTION", value_enum, default_value_t = HookAction::Deny)]
	pub hook_action: HookAction,

	/// Hook call timeout, in milliseconds.
	#[arg(long = "hook-tout", env = "VCAS_GATE_HOOK_TOUT", default_value_t = 5_000)]
	pub hook_tout_ms: u64,

	/// Delay before the broker retries a failed provider load, in milliseconds.
	#[arg(long = "hook-trec", env = "VCAS_GATE_HOOK_TREC", default_value_t = 3_000)]
	pub hook_trec_ms: u64,

	/// Relational store connection string.
	#[arg(long = "db-url", env = "VCAS_GATE_DB_URL")]
	pub db_url: String,
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	#[test]
	fn command_builds_without_panicking() {
		Config::command().debug_assert();
	}

	#[test]
	fn defaults_apply_with_only_the_required_db_url() {
		let cfg = Config::parse_from(["vcas-gate", "--db-url", "postgres://localhost/vcas"]);
		assert_eq!(cfg.port, 9009);
		assert_eq!(cfg.hook_buf_qcap, 5);
		assert_eq!(cfg.hook_action, HookAction::Deny);
	}
}
