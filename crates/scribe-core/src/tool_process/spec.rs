//! Launch specifications for auxiliary tool processes.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What a tool process is used for. Stages look handles up by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Web search backend used by research.
    Search,
    /// Filesystem backend used by summarize to write the report.
    Filesystem,
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ToolKind::Search => "search",
            ToolKind::Filesystem => "filesystem",
        };
        write!(f, "{s}")
    }
}

/// How to start one tool process and how long to wait on it.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolProcessSpec {
    pub id: String,
    pub kind: ToolKind,
    /// Executable to spawn.
    pub command: String,
    pub args: Vec<String>,
    /// Extra environment for the child. Values are never logged.
    pub env: BTreeMap<String, String>,
    /// Upper bound on spawn + readiness handshake.
    pub readiness_timeout: Duration,
    /// How long a graceful shutdown may take before the process is killed.
    pub shutdown_grace: Duration,
    /// Upper bound on a single request/response exchange.
    pub request_timeout: Duration,
}

impl ToolProcessSpec {
    pub fn new(id: impl Into<String>, kind: ToolKind, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            readiness_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Serper web search over MCP stdio (`uvx serper-mcp-server`).
    pub fn serper_search(api_key: impl Into<String>) -> Self {
        Self::new("serper-search", ToolKind::Search, "uvx")
            .with_args(["serper-mcp-server"])
            .with_env("SERPER_API_KEY", api_key)
    }

    /// MCP filesystem server rooted at `root`.
    pub fn filesystem(root: &Path) -> Self {
        Self::new("filesystem", ToolKind::Filesystem, "npx").with_args([
            "-y".to_string(),
            "@modelcontextprotocol/server-filesystem".to_string(),
            root.to_string_lossy().into_owned(),
        ])
    }
}

impl std::fmt::Debug for ToolProcessSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_keys: Vec<&String> = self.env.keys().collect();
        f.debug_struct("ToolProcessSpec")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env_keys", &env_keys)
            .field("readiness_timeout", &self.readiness_timeout)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
