//! Provider-specific normalization of a parsed JSON body into a
//! [`WebhookEvent`].
//!
//! The provider is inferred from which signature header validated the
//! request (see [`super::signature`]), not from endpoint configuration —
//! the wire schema (§6) names no `provider` field, so the header that
//! authenticated the request also selects the extractor.

use serde_json::Value;

use crate::event_bus::WebhookEvent;

use super::signature::Provider;

fn truncated(body: &Value) -> String {
    let dump = body.to_string();
    if dump.len() > 200 {
        format!("{}...", &dump[..200])
    } else {
        dump
    }
}

fn github_summary(body: &Value) -> (String, String) {
    if let Some(commits) = body.get("commits").and_then(Value::as_array) {
        let repo = body
            .pointer("/repository/full_name")
            .and_then(Value::as_str)
            .unwrap_or("unknown repo");
        let pusher = body
            .pointer("/pusher/name")
            .or_else(|| body.pointer("/sender/login"))
            .and_then(Value::as_str)
            .unwrap_or("unknown user");
        return (
            "push".to_string(),
            format!("{pusher} pushed {} commit(s) to {repo}", commits.len()),
        );
    }
    if let Some(pr) = body.get("pull_request") {
        let action = body.get("action").and_then(Value::as_str).unwrap_or("updated");
        let title = pr.get("title").and_then(Value::as_str).unwrap_or("(untitled)");
        let number = pr.get("number").and_then(Value::as_u64).unwrap_or(0);
        return ("pull_request".to_string(), format!("PR #{number} {action}: {title}"));
    }
    if let Some(issue) = body.get("issue") {
        let action = body.get("action").and_then(Value::as_str).unwrap_or("updated");
        let title = issue.get("title").and_then(Value::as_str).unwrap_or("(untitled)");
        let number = issue.get("number").and_then(Value::as_u64).unwrap_or(0);
        return ("issues".to_string(), format!("Issue #{number} {action}: {title}"));
    }
    if let Some(run) = body.get("workflow_run") {
        let name = run.get("name").and_then(Value::as_str).unwrap_or("workflow");
        let conclusion = run
            .get("conclusion")
            .and_then(Value::as_str)
            .unwrap_or("in progress");
        return (
            "workflow_run".to_string(),
            format!("Workflow '{name}' {conclusion}"),
        );
    }
    ("unknown".to_string(), truncated(body))
}

fn sentry_summary(body: &Value) -> String {
    let title = body
        .pointer("/data/issue/title")
        .or_else(|| body.get("title"))
        .and_then(Value::as_str)
        .unwrap_or("(untitled issue)");
    let culprit = body
        .pointer("/data/issue/culprit")
        .or_else(|| body.get("culprit"))
        .and_then(Value::as_str);
    match culprit {
        Some(c) => format!("{title} in {c}"),
        None => title.to_string(),
    }
}

fn generic_summary(body: &Value) -> String {
    body.get("message")
        .or_else(|| body.get("summary"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| truncated(body))
}

/// Build a [`WebhookEvent`] from the validated provider and parsed body.
pub fn normalize(provider: Provider, channel: &str, body: Value) -> WebhookEvent {
    let (event_type, summary) = match provider {
        Provider::GitHub => github_summary(&body),
        Provider::Sentry => ("issue".to_string(), sentry_summary(&body)),
        Provider::Generic => ("event".to_string(), generic_summary(&body)),
    };

    WebhookEvent {
        source: provider.as_str().to_string(),
        event_type,
        summary,
        payload: body,
        channel_target: channel.to_string(),
    }
}
