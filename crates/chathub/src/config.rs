// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the chat dispatch fabric.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "chathubd", version, about)]
pub struct ChatConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "CHATHUB_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9900, env = "CHATHUB_PORT")]
    pub port: u16,

    /// Bearer/query token expected on inbound connections. If unset, auth is disabled.
    #[arg(long, env = "CHATHUB_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Number of shards in each role's connection registry.
    #[arg(long, default_value_t = 10, env = "CHATHUB_SHARD_COUNT")]
    pub shard_count: usize,

    /// Idle-connection ping interval, in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "CHATHUB_PING_INTERVAL_MS")]
    pub ping_interval_ms: u64,

    /// Read timeout before a connection is considered dead, in milliseconds.
    #[arg(long, default_value_t = 90_000, env = "CHATHUB_READ_TIMEOUT_MS")]
    pub read_timeout_ms: u64,

    /// Bounded outbound queue capacity per connection.
    #[arg(long, default_value_t = 100, env = "CHATHUB_QUEUE_CAPACITY")]
    pub queue_capacity: usize,

    /// Size of the worker pool draining each manager's inbound action channel.
    #[arg(long, default_value_t = 8, env = "CHATHUB_INBOUND_WORKERS")]
    pub inbound_workers: usize,

    /// Default assignment TTL (admin<->user binding validity), in seconds
    /// (§4.4: "ttl=86400s default").
    #[arg(long, default_value_t = 86_400, env = "CHATHUB_ASSIGNMENT_TTL_SECS")]
    pub assignment_ttl_secs: i64,

    /// Default offline duration before an idle session auto-closes, in seconds.
    #[arg(long, default_value_t = 300, env = "CHATHUB_OFFLINE_DURATION_SECS")]
    pub offline_duration_secs: i64,

    /// Identifier for this node, used to build its `NodeChannel` subjects.
    /// Defaults to `host:port` if unset.
    #[arg(long, env = "CHATHUB_NODE_ID")]
    pub node_id: Option<String>,

    /// NATS URL for the cross-node bus. If unset, an in-process `LocalBus`
    /// is used and cross-node delivery is disabled (single-node mode).
    #[arg(long, env = "CHATHUB_BUS_URL")]
    pub bus_url: Option<String>,

    /// NATS auth token, if the bus requires one.
    #[arg(long, env = "CHATHUB_BUS_TOKEN")]
    pub bus_token: Option<String>,

    /// Graceful shutdown drain timeout, in milliseconds.
    #[arg(long, default_value_t = 5_000, env = "CHATHUB_SHUTDOWN_DRAIN_MS")]
    pub shutdown_drain_ms: u64,
}

impl ChatConfig {
    pub fn ping_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ping_interval_ms)
    }

    pub fn read_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.read_timeout_ms)
    }

    pub fn shutdown_drain(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.shutdown_drain_ms)
    }

    pub fn node_id(&self) -> String {
        self.node_id.clone().unwrap_or_else(|| format!("{}:{}", self.host, self.port))
    }
}
