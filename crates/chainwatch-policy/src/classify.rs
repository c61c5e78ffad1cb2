//! Action construction and classification: deriving sensitivity, tags, and egress
//! for a raw command or tool call before it ever reaches the evaluator.

use std::collections::BTreeSet;

use chainwatch_core::{Action, ActionParams, Egress, Operation, RawMeta, Sensitivity, Tag, ToolCategory};
use serde_json::{Map as JsonMap, Value as JsonValue};

const COMMAND_DESTRUCTIVE: &[&str] =
    &["rm -rf", "dd if=", "mkfs", "chmod -r 777", "> /dev/sda", ":(){ :|:& };:"];
const COMMAND_CREDENTIAL: &[&str] = &["sudo", "passwd", "ssh-keygen", "chpasswd"];
const COMMAND_NETWORK: &[&str] = &["curl", "wget", "nc", "telnet", "ssh", "scp", "sftp"];
const COMMAND_VCS_WRITE: &[&str] = &["git push", "git commit", "git rebase", "git reset"];

const FILE_SENSITIVE: &[&str] =
    &[".ssh/", ".aws/", ".env", "credentials", "secret", "password", "salary", "/hr/"];

const HTTP_PAYMENT: &[&str] = &["stripe.com", "paypal.com", "/checkout", "/payment"];
const HTTP_CREDENTIAL: &[&str] = &["/oauth/token", "/api/keys", "/api/credentials"];
const HTTP_SENSITIVE: &[&str] = &["/hr/", "/salary", "/payroll", "/pii/"];

/// Build an [`Action`] from a command invocation (name + argv), classifying it in the
/// same step so the result is immediately usable by the evaluator.
pub fn build_from_command(name: &str, args: &[String]) -> Action {
    let resource = if args.is_empty() { name.to_string() } else { format!("{name} {}", args.join(" ")) };
    let lower = resource.to_lowercase();
    let raw_meta = classify_command(&lower);
    Action::new(
        ToolCategory::Command,
        resource,
        Operation::Execute,
        ActionParams::Command { name: name.to_string(), args: args.to_vec() },
        raw_meta,
    )
}

/// Build an [`Action`] from a parsed LLM tool call: a name and an arguments map.
pub fn build_from_tool_call(name: &str, arguments: &JsonMap<String, JsonValue>) -> Action {
    let tool = classify_tool_category(name);
    let resource = extract_resource(arguments).unwrap_or_else(|| name.to_string());
    let operation = extract_operation(&tool, arguments);
    let lower = resource.to_lowercase();

    let raw_meta = match tool {
        ToolCategory::Command => classify_command(&lower),
        ToolCategory::FileRead | ToolCategory::FileWrite | ToolCategory::FileDelete => {
            classify_file(&lower)
        }
        ToolCategory::Http | ToolCategory::HttpProxy | ToolCategory::Browser => {
            classify_http(&lower, &resource)
        }
        _ => RawMeta::minimal(),
    };

    let params = match &tool {
        ToolCategory::Http | ToolCategory::HttpProxy => ActionParams::Http {
            method: operation.to_string(),
            url: resource.clone(),
            headers: JsonMap::new(),
        },
        ToolCategory::FileRead | ToolCategory::FileWrite | ToolCategory::FileDelete => {
            ActionParams::File { path: resource.clone() }
        }
        _ => ActionParams::Other(arguments.clone()),
    };

    Action::new(tool, resource, operation, params, raw_meta)
}

/// Case-insensitive substring scan of a tool name into a [`ToolCategory`].
fn classify_tool_category(name: &str) -> ToolCategory {
    let lower = name.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
    if has(&["command", "exec", "shell", "bash", "run_"]) {
        ToolCategory::Command
    } else if has(&["http", "fetch", "request", "curl", "api_"]) {
        ToolCategory::Http
    } else if has(&["read", "cat"]) {
        ToolCategory::FileRead
    } else if has(&["write", "save", "create_file"]) {
        ToolCategory::FileWrite
    } else if has(&["delete", "remove"]) {
        ToolCategory::FileDelete
    } else if has(&["browser", "web"]) {
        ToolCategory::Browser
    } else {
        ToolCategory::Custom(name.to_string())
    }
}

/// Pull a resource string out of a tool call's arguments, preferring well-known keys
/// in order, then any string value, then the tool name itself (handled by the caller).
fn extract_resource(arguments: &JsonMap<String, JsonValue>) -> Option<String> {
    const KEYS: &[&str] = &["command", "url", "path", "file_path", "filename", "resource"];
    for key in KEYS {
        if let Some(s) = arguments.get(*key).and_then(JsonValue::as_str) {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    arguments
        .values()
        .find_map(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn extract_operation(tool: &ToolCategory, arguments: &JsonMap<String, JsonValue>) -> Operation {
    if let Some(method) = arguments.get("method").and_then(JsonValue::as_str) {
        return match method.to_lowercase().as_str() {
            "get" => Operation::Get,
            "post" => Operation::Post,
            "put" => Operation::Put,
            "patch" => Operation::Patch,
            "delete" => Operation::Delete,
            _ => Operation::Get,
        };
    }
    match tool {
        ToolCategory::Command => Operation::Execute,
        ToolCategory::Http | ToolCategory::HttpProxy | ToolCategory::Browser => Operation::Get,
        ToolCategory::FileRead => Operation::Read,
        ToolCategory::FileWrite => Operation::Write,
        ToolCategory::FileDelete => Operation::Delete,
        ToolCategory::Syscall | ToolCategory::Custom(_) => Operation::Execute,
    }
}

fn classify_command(lower_resource: &str) -> RawMeta {
    let mut meta = RawMeta::minimal();
    if COMMAND_DESTRUCTIVE.iter().any(|n| lower_resource.contains(n)) {
        meta.sensitivity = Sensitivity::High;
        meta.tags.insert(Tag::Destructive);
    } else if COMMAND_CREDENTIAL.iter().any(|n| has_word_or_prefix(lower_resource, n)) {
        meta.sensitivity = Sensitivity::High;
        meta.tags.insert(Tag::Credential);
    } else if COMMAND_NETWORK.iter().any(|n| has_word_or_prefix(lower_resource, n)) {
        meta.sensitivity = Sensitivity::Medium;
        meta.tags.insert(Tag::Network);
    } else if COMMAND_VCS_WRITE.iter().any(|n| lower_resource.contains(n)) {
        meta.sensitivity = Sensitivity::Medium;
        meta.tags.insert(Tag::VcsWrite);
    }
    if COMMAND_NETWORK.iter().any(|n| has_word_or_prefix(lower_resource, n)) {
        meta.egress = Egress::External;
    }
    meta
}

/// A command's first token (or a prefixed invocation like `/usr/bin/ssh`) matches `needle`.
fn has_word_or_prefix(lower_resource: &str, needle: &str) -> bool {
    lower_resource.split_whitespace().next().map(|first| {
        first == needle || first.ends_with(&format!("/{needle}"))
    }).unwrap_or(false)
        || lower_resource.contains(&format!(" {needle} "))
        || lower_resource.starts_with(&format!("{needle} "))
}

fn classify_file(lower_resource: &str) -> RawMeta {
    let mut meta = RawMeta::minimal();
    if FILE_SENSITIVE.iter().any(|n| lower_resource.contains(n)) {
        meta.sensitivity = Sensitivity::High;
        meta.tags.insert(Tag::SensitiveFile);
    }
    meta
}

fn classify_http(lower_resource: &str, resource: &str) -> RawMeta {
    let mut meta = RawMeta::minimal();
    if HTTP_PAYMENT.iter().any(|n| lower_resource.contains(n)) {
        meta.sensitivity = Sensitivity::High;
        meta.tags.insert(Tag::Payment);
    } else if HTTP_CREDENTIAL.iter().any(|n| lower_resource.contains(n)) {
        meta.sensitivity = Sensitivity::High;
        meta.tags.insert(Tag::Credential);
    } else if HTTP_SENSITIVE.iter().any(|n| lower_resource.contains(n)) {
        meta.sensitivity = Sensitivity::High;
        meta.tags.insert(Tag::Sensitive);
    }
    // Http/HttpProxy/Browser tool calls are external egress unconditionally, even
    // when the resource string has no `http(s)://` scheme (a bare hostname, or a
    // fallback to the tool name when the call carried no url/path argument at all).
    meta.egress = Egress::External;
    meta.destination = extract_host(resource);
    meta
}

/// Whether a resource string denotes network egress: an `http(s)://` URL, or (for
/// commands evaluated outside [`classify_command`]) a bare network-tool invocation.
pub fn is_external_resource(resource: &str) -> bool {
    let lower = resource.to_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn extract_host(resource: &str) -> Option<String> {
    let without_scheme = resource.split("://").nth(1)?;
    let host = without_scheme.split(['/', '?', '#']).next()?;
    Some(host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_rm_rf_is_destructive_high() {
        let action = build_from_command("rm", &["-rf".into(), "/".into()]);
        assert_eq!(action.raw_meta.sensitivity, Sensitivity::High);
        assert!(action.raw_meta.tags.contains(&Tag::Destructive));
    }

    #[test]
    fn command_sudo_is_credential_high() {
        let action = build_from_command("sudo", &["systemctl".into(), "restart".into(), "nginx".into()]);
        assert!(action.raw_meta.tags.contains(&Tag::Credential));
        assert_eq!(action.raw_meta.sensitivity, Sensitivity::High);
    }

    #[test]
    fn command_curl_is_network_medium_external() {
        let action = build_from_command("curl", &["https://example.com".into()]);
        assert!(action.raw_meta.tags.contains(&Tag::Network));
        assert_eq!(action.raw_meta.sensitivity, Sensitivity::Medium);
        assert_eq!(action.raw_meta.egress, Egress::External);
    }

    #[test]
    fn command_git_push_is_vcs_write() {
        let action = build_from_command("git", &["push".into(), "origin".into(), "main".into()]);
        assert!(action.raw_meta.tags.contains(&Tag::VcsWrite));
    }

    #[test]
    fn tool_call_run_command_classified_as_command() {
        let mut args = JsonMap::new();
        args.insert("command".into(), json!("rm -rf /data"));
        let action = build_from_tool_call("run_command", &args);
        assert_eq!(action.tool, ToolCategory::Command);
        assert_eq!(action.resource, "rm -rf /data");
        assert!(action.raw_meta.tags.contains(&Tag::Destructive));
    }

    #[test]
    fn tool_call_http_fetch_classified_and_external() {
        let mut args = JsonMap::new();
        args.insert("url".into(), json!("https://api.example.com/data"));
        let action = build_from_tool_call("fetch_url", &args);
        assert_eq!(action.tool, ToolCategory::Http);
        assert_eq!(action.raw_meta.egress, Egress::External);
        assert_eq!(action.raw_meta.destination.as_deref(), Some("api.example.com"));
    }

    #[test]
    fn tool_call_file_read_hr_path_is_sensitive() {
        let mut args = JsonMap::new();
        args.insert("path".into(), json!("/data/hr/employees.csv"));
        let action = build_from_tool_call("read_file", &args);
        assert_eq!(action.tool, ToolCategory::FileRead);
        assert!(action.raw_meta.tags.contains(&Tag::SensitiveFile));
        assert_eq!(action.raw_meta.sensitivity, Sensitivity::High);
    }

    #[test]
    fn tool_call_file_read_non_sensitive_path_has_no_tags() {
        let mut args = JsonMap::new();
        args.insert("path".into(), json!("/data/reports/q3.csv"));
        let action = build_from_tool_call("read_file", &args);
        assert_eq!(action.tool, ToolCategory::FileRead);
        assert!(action.raw_meta.tags.is_empty());
    }

    #[test]
    fn tool_call_read_secrets_file_is_sensitive() {
        let mut args = JsonMap::new();
        args.insert("path".into(), json!("/home/user/.ssh/id_rsa"));
        let action = build_from_tool_call("read_file", &args);
        assert!(action.raw_meta.tags.contains(&Tag::SensitiveFile));
        assert_eq!(action.raw_meta.sensitivity, Sensitivity::High);
    }

    #[test]
    fn tool_call_falls_back_to_tool_name_when_no_resource_key() {
        let args = JsonMap::new();
        let action = build_from_tool_call("ping", &args);
        assert_eq!(action.resource, "ping");
    }
}
