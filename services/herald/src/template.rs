//! Message template rendering
//!
//! Templates reference service and failure fields with `{{ key }}`
//! placeholders. The dotted forms used by older configurations
//! (`{{.Service.Name}}`, `{{.Failure.Issue}}`) are accepted as aliases.
//! Rendering is a pure text substitution: unknown keys become empty strings
//! and an unterminated `{{` is left as-is, so rendering never fails.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::event::{Failure, Service};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("placeholder regex is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Name,
    Domain,
    Port,
    Latency,
    Online,
    Issue,
    Timestamp,
    Ping,
    StatusCode,
}

fn field_for(key: &str) -> Option<Field> {
    let key = key.trim().trim_start_matches('.').to_ascii_lowercase();
    let key = key
        .strip_prefix("service.")
        .or_else(|| key.strip_prefix("failure."))
        .unwrap_or(key.as_str());

    let field = match key {
        "id" => Field::Id,
        "name" => Field::Name,
        "domain" | "url" => Field::Domain,
        "port" => Field::Port,
        "latency" => Field::Latency,
        "online" => Field::Online,
        "issue" => Field::Issue,
        "timestamp" | "createdat" => Field::Timestamp,
        "ping" => Field::Ping,
        "status_code" | "statuscode" => Field::StatusCode,
        _ => return None,
    };
    Some(field)
}

fn value_of(field: Field, service: &Service, failure: Option<&Failure>) -> String {
    let opt = |v: Option<String>| v.unwrap_or_default();
    match field {
        Field::Id => service.id.to_string(),
        Field::Name => service.name.clone(),
        Field::Domain => service.domain.clone(),
        Field::Port => opt(service.port.map(|p| p.to_string())),
        Field::Latency => opt(service.latency_ms.map(|l| l.to_string())),
        Field::Online => service.online.to_string(),
        Field::Issue => opt(failure.map(|f| f.issue.clone())),
        Field::Timestamp => opt(failure.map(|f| f.timestamp.to_rfc3339())),
        Field::Ping => opt(failure.and_then(|f| f.ping_ms).map(|p| p.to_string())),
        Field::StatusCode => opt(failure.and_then(|f| f.status_code).map(|c| c.to_string())),
    }
}

/// Render `template` against a service and an optional failure
pub fn render(template: &str, service: &Service, failure: Option<&Failure>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            field_for(&caps[1])
                .map(|field| value_of(field, service, failure))
                .unwrap_or_default()
        })
        .into_owned()
}

/// Placeholder keys in `template` that do not name a known field
pub fn unknown_placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(template)
        .filter(|caps| field_for(&caps[1]).is_none())
        .map(|caps| caps[1].to_string())
        .collect()
}
