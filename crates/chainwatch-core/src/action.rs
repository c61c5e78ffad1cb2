//! The normalized representation of one attempted tool invocation.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

/// Category of tool an [`Action`] was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Command,
    Http,
    HttpProxy,
    FileRead,
    FileWrite,
    FileDelete,
    Browser,
    Syscall,
    /// Any category not recognized by the built-in classifier.
    Custom(String),
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolCategory::Command => write!(f, "command"),
            ToolCategory::Http => write!(f, "http"),
            ToolCategory::HttpProxy => write!(f, "http_proxy"),
            ToolCategory::FileRead => write!(f, "file_read"),
            ToolCategory::FileWrite => write!(f, "file_write"),
            ToolCategory::FileDelete => write!(f, "file_delete"),
            ToolCategory::Browser => write!(f, "browser"),
            ToolCategory::Syscall => write!(f, "syscall"),
            ToolCategory::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// The verb performed against `resource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Execute,
    Get,
    Post,
    Put,
    Patch,
    Read,
    Write,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Execute => "execute",
            Operation::Get => "get",
            Operation::Post => "post",
            Operation::Put => "put",
            Operation::Patch => "patch",
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// How sensitive the classifier judged this action's resource to be.
///
/// Ordered `Low < Medium < High` so callers can take the max across a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    Medium,
    High,
}

/// Qualitative tags the classifier attaches to an action.
///
/// Kept in a `BTreeSet` everywhere so their serialized/joined order is deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Destructive,
    Credential,
    Network,
    VcsWrite,
    Payment,
    SensitiveFile,
    Sensitive,
}

/// Whether an action's effect stays on the local system or leaves it.
///
/// Once `External`, a trace's egress never reverts to `Internal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Egress {
    Internal,
    External,
}

impl Default for Egress {
    fn default() -> Self {
        Egress::Internal
    }
}

/// Derived metadata produced by classification, carried alongside an [`Action`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMeta {
    pub sensitivity: Sensitivity,
    pub tags: BTreeSet<Tag>,
    pub bytes: u64,
    pub rows: u64,
    pub egress: Egress,
    pub destination: Option<String>,
}

impl RawMeta {
    /// A meta value with no tags, low sensitivity, and internal egress.
    pub fn minimal() -> Self {
        Self {
            sensitivity: Sensitivity::Low,
            tags: BTreeSet::new(),
            bytes: 0,
            rows: 0,
            egress: Egress::Internal,
            destination: None,
        }
    }
}

/// Tool-specific input parameters, tagged by category rather than carried as a loose map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionParams {
    Command { name: String, args: Vec<String> },
    Http { method: String, url: String, headers: JsonMap<String, JsonValue> },
    File { path: String },
    /// Catch-all for tool calls whose shape the built-in variants don't cover.
    Other(JsonMap<String, JsonValue>),
}

/// One attempted tool invocation, normalized and immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub tool: ToolCategory,
    pub resource: String,
    pub operation: Operation,
    pub params: ActionParams,
    pub raw_meta: RawMeta,
}

impl Action {
    /// Construct an action directly from its parts. Classification (sensitivity, tags,
    /// egress) is the caller's responsibility; this constructor performs none of it.
    pub fn new(
        tool: ToolCategory,
        resource: impl Into<String>,
        operation: Operation,
        params: ActionParams,
        raw_meta: RawMeta,
    ) -> Self {
        Self { tool, resource: resource.into(), operation, params, raw_meta }
    }

    /// The resource string lower-cased, the form all pattern matching operates on.
    pub fn resource_lower(&self) -> String {
        self.resource.to_lowercase()
    }
}
