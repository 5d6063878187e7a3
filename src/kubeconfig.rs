//! Kubeconfig document parsing.
//!
//! Turns the raw bytes of one kubeconfig file into typed [`Cluster`], [`User`]
//! and [`Context`] records. The loose YAML shape is checked here once, so the
//! merger and registry can rely on every record being complete.

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;

use crate::error::ParseError;

/// A named API endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub name: String,
    pub server: String,
    pub certificate_authority: Option<String>,
    pub certificate_authority_data: Option<String>,
    pub insecure_skip_tls_verify: bool,
    pub tls_server_name: Option<String>,
    pub proxy_url: Option<String>,
}

/// A named credential. The material itself is kept opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub credentials: Mapping,
}

/// How a user authenticates, for display only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Token,
    ClientCertificate,
    Exec,
    AuthProvider,
    Basic,
    None,
}

impl CredentialKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::ClientCertificate => "client certificate",
            Self::Exec => "exec plugin",
            Self::AuthProvider => "auth provider",
            Self::Basic => "basic auth",
            Self::None => "none",
        }
    }
}

impl User {
    pub fn credential_kind(&self) -> CredentialKind {
        let has = |key: &str| self.credentials.contains_key(key);
        if has("exec") {
            CredentialKind::Exec
        } else if has("auth-provider") {
            CredentialKind::AuthProvider
        } else if has("token") || has("tokenFile") {
            CredentialKind::Token
        } else if has("client-certificate") || has("client-certificate-data") {
            CredentialKind::ClientCertificate
        } else if has("username") {
            CredentialKind::Basic
        } else {
            CredentialKind::None
        }
    }
}

/// A named pairing of cluster and user with an optional default namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub name: String,
    pub cluster: String,
    pub user: String,
    pub namespace: Option<String>,
}

/// One parsed kubeconfig file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub clusters: Vec<Cluster>,
    pub users: Vec<User>,
    pub contexts: Vec<Context>,
    pub current_context: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawCluster {
    server: Option<String>,
    certificate_authority: Option<String>,
    certificate_authority_data: Option<String>,
    insecure_skip_tls_verify: Option<bool>,
    tls_server_name: Option<String>,
    proxy_url: Option<String>,
}

#[derive(Deserialize)]
struct RawContext {
    cluster: Option<String>,
    user: Option<String>,
    namespace: Option<String>,
}

/// Parse one kubeconfig document.
///
/// Empty documents and absent or `null` sections are accepted. Fails on
/// invalid YAML, a missing required key, a value of the wrong shape, or a
/// name defined twice within the same section.
pub fn parse(bytes: &[u8]) -> Result<Document, ParseError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Document::default());
    }

    let root: Value = serde_yaml::from_slice(bytes).map_err(|e| {
        let location = match e.location() {
            Some(loc) => format!("line {}, column {}", loc.line(), loc.column()),
            None => "<document>".to_string(),
        };
        ParseError::new(location, e.to_string())
    })?;

    let root = match root {
        Value::Null => return Ok(Document::default()),
        Value::Mapping(map) => map,
        other => {
            return Err(ParseError::new(
                "<root>",
                format!("expected a mapping, found {}", shape(&other)),
            ));
        }
    };

    Ok(Document {
        clusters: parse_section(&root, "clusters", parse_cluster)?,
        users: parse_section(&root, "users", parse_user)?,
        contexts: parse_section(&root, "contexts", parse_context)?,
        current_context: optional_string(&root, "current-context", "current-context")?,
    })
}

/// Walk a `- name: ..., <body>: {...}` list, enforcing unique names.
fn parse_section<T>(
    root: &Mapping,
    key: &str,
    body: fn(String, Option<&Value>, &str) -> Result<T, ParseError>,
) -> Result<Vec<T>, ParseError> {
    let entries = match root.get(key) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Sequence(seq)) => seq,
        Some(other) => {
            return Err(ParseError::new(
                key,
                format!("expected a list, found {}", shape(other)),
            ));
        }
    };

    // "clusters" -> "cluster"
    let body_key = key.trim_end_matches('s');
    let mut seen = HashSet::new();
    let mut parsed = Vec::with_capacity(entries.len());

    for (idx, entry) in entries.iter().enumerate() {
        let location = format!("{}[{}]", key, idx);
        let map = match entry {
            Value::Mapping(map) => map,
            other => {
                return Err(ParseError::new(
                    location,
                    format!("expected a mapping, found {}", shape(other)),
                ));
            }
        };

        let name_location = format!("{}.name", location);
        let name = optional_string(map, "name", &name_location)?
            .ok_or_else(|| ParseError::new(&name_location, "missing required key 'name'"))?;

        if !seen.insert(name.clone()) {
            return Err(ParseError::new(
                name_location,
                format!("duplicate {} name '{}'", body_key, name),
            ));
        }

        let body_location = format!("{}.{}", location, body_key);
        parsed.push(body(name, map.get(body_key), &body_location)?);
    }

    Ok(parsed)
}

fn parse_cluster(name: String, body: Option<&Value>, location: &str) -> Result<Cluster, ParseError> {
    let raw: RawCluster = required_body(body, location)?;
    let server = non_empty(raw.server).ok_or_else(|| {
        ParseError::new(format!("{}.server", location), "missing required key 'server'")
    })?;

    Ok(Cluster {
        name,
        server,
        certificate_authority: non_empty(raw.certificate_authority),
        certificate_authority_data: non_empty(raw.certificate_authority_data),
        insecure_skip_tls_verify: raw.insecure_skip_tls_verify.unwrap_or(false),
        tls_server_name: non_empty(raw.tls_server_name),
        proxy_url: non_empty(raw.proxy_url),
    })
}

fn parse_user(name: String, body: Option<&Value>, location: &str) -> Result<User, ParseError> {
    let credentials = match body {
        None | Some(Value::Null) => Mapping::new(),
        Some(Value::Mapping(map)) => map.clone(),
        Some(other) => {
            return Err(ParseError::new(
                location,
                format!("expected a mapping, found {}", shape(other)),
            ));
        }
    };
    Ok(User { name, credentials })
}

fn parse_context(name: String, body: Option<&Value>, location: &str) -> Result<Context, ParseError> {
    let raw: RawContext = required_body(body, location)?;
    let cluster = non_empty(raw.cluster).ok_or_else(|| {
        ParseError::new(format!("{}.cluster", location), "missing required key 'cluster'")
    })?;
    let user = non_empty(raw.user).ok_or_else(|| {
        ParseError::new(format!("{}.user", location), "missing required key 'user'")
    })?;

    Ok(Context {
        name,
        cluster,
        user,
        namespace: non_empty(raw.namespace),
    })
}

fn required_body<T: for<'de> Deserialize<'de>>(
    body: Option<&Value>,
    location: &str,
) -> Result<T, ParseError> {
    let key = location.rsplit('.').next().unwrap_or(location);
    match body {
        None | Some(Value::Null) => Err(ParseError::new(
            location,
            format!("missing required key '{}'", key),
        )),
        Some(value @ Value::Mapping(_)) => serde_yaml::from_value(value.clone())
            .map_err(|e| ParseError::new(location, e.to_string())),
        Some(other) => Err(ParseError::new(
            location,
            format!("expected a mapping, found {}", shape(other)),
        )),
    }
}

fn optional_string(map: &Mapping, key: &str, location: &str) -> Result<Option<String>, ParseError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(non_empty(Some(s.clone()))),
        Some(other) => Err(ParseError::new(
            location,
            format!("expected a string, found {}", shape(other)),
        )),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
