
use chrono::{DateTime, Utc};

use crate::flags::flag_models::{FlagStats, FlagStatus, FlagWithCleanup};

const STYLES: &str = r#"
body { margin: 0; background: #030712; color: #f9fafb; font-family: system-ui, sans-serif; }
main { max-width: 80rem; margin: 0 auto; padding: 3rem 2rem; }
header { display: flex; justify-content: space-between; align-items: flex-start; margin-bottom: 2rem; }
h1 { font-size: 2.25rem; margin: 0; color: #60a5fa; }
.subtitle { color: #9ca3af; margin-top: .5rem; }
.scan { background: #2563eb; color: #fff; border: 0; border-radius: .5rem; padding: .75rem 1.5rem; font-weight: 600; cursor: pointer; }
.stats { display: grid; grid-template-columns: repeat(4, 1fr); gap: 1rem; margin-bottom: 2rem; }
.card { background: #111827; border: 1px solid #1f2937; border-radius: .5rem; padding: 1.5rem; }
.card .title { color: #9ca3af; font-size: .875rem; }
.card .value { font-size: 1.875rem; font-weight: 700; margin-top: .5rem; }
.blue { color: #60a5fa; } .red { color: #f87171; } .yellow { color: #facc15; } .green { color: #4ade80; }
.panel { background: #111827; border: 1px solid #1f2937; border-radius: .5rem; overflow-x: auto; }
.panel-head { padding: 1rem 1.5rem; border-bottom: 1px solid #1f2937; }
.panel-head h2 { margin: 0; font-size: 1.25rem; }
.panel-head p { margin: .25rem 0 0; color: #9ca3af; font-size: .875rem; }
table { width: 100%; border-collapse: collapse; }
th { text-align: left; font-size: .75rem; text-transform: uppercase; color: #d1d5db; padding: .75rem 1.5rem; background: #1f2937; }
td { padding: 1rem 1.5rem; border-top: 1px solid #1f2937; font-size: .875rem; color: #d1d5db; vertical-align: top; }
.name { color: #fff; font-weight: 500; }
.key { font-family: monospace; color: #9ca3af; }
.muted { color: #6b7280; font-size: .75rem; }
.bar { background: #374151; border-radius: 9999px; height: .5rem; width: 6rem; }
.bar div { background: #3b82f6; border-radius: 9999px; height: .5rem; }
.badge { display: inline-block; padding: .125rem .625rem; border-radius: 9999px; font-size: .75rem; font-weight: 500; }
.badge-active { background: #14532d; color: #86efac; }
.badge-expired { background: #7f1d1d; color: #fca5a5; }
.badge-pending { background: #713f12; color: #fde047; }
.badge-in-progress { background: #1e3a8a; color: #93c5fd; }
.badge-cleaned { background: #374151; color: #d1d5db; }
.action { background: none; border: 0; color: #60a5fa; font-weight: 500; cursor: pointer; padding: 0; }
.action:disabled { opacity: .5; cursor: not-allowed; }
a.issue { color: #4ade80; font-weight: 500; }
"#;

const SCRIPT: &str = r#"
async function requestCleanup(button) {
  const flagId = button.dataset.flagId;
  if (!confirm(`Create cleanup issue for flag "${button.dataset.flagKey}"?`)) return;
  button.disabled = true;
  button.textContent = 'Creating...';
  try {
    const response = await fetch('/cleanup', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({ flagId }),
    });
    const data = await response.json();
    if (response.ok) {
      alert(`Created issue: ${data.issue.url}`);
      window.location.reload();
      return;
    }
    alert(`Failed: ${data.error}`);
  } catch (error) {
    console.error(error);
    alert('Error creating cleanup issue');
  }
  button.disabled = false;
  button.textContent = 'Create Cleanup Issue';
}
"#;

/// Escapes text for use in HTML element content and double-quoted attributes.
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// "3 days ago" style distance from `then` to `now`.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - then;
    let (value, unit) = if elapsed.num_days() >= 365 {
        (elapsed.num_days() / 365, "year")
    } else if elapsed.num_days() >= 30 {
        (elapsed.num_days() / 30, "month")
    } else if elapsed.num_days() >= 1 {
        (elapsed.num_days(), "day")
    } else if elapsed.num_hours() >= 1 {
        (elapsed.num_hours(), "hour")
    } else if elapsed.num_minutes() >= 1 {
        (elapsed.num_minutes(), "minute")
    } else {
        return "just now".to_string();
    };

    if value == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{value} {unit}s ago")
    }
}

fn stat_card(title: &str, value: usize, color: &str) -> String {
    format!(
        r#"<div class="card"><div class="title">{title}</div><div class="value {color}">{value}</div></div>"#
    )
}

fn action_cell(flag: &FlagWithCleanup) -> String {
    match flag.flag.status {
        FlagStatus::Expired => format!(
            r#"<button class="action" data-flag-id="{}" data-flag-key="{}" onclick="requestCleanup(this)">Create Cleanup Issue</button>"#,
            flag.flag.id,
            escape_html(&flag.flag.key)
        ),
        FlagStatus::CleanupPending => flag
            .latest_job()
            .and_then(|job| job.github_issue_url.as_deref())
            .map(|url| {
                format!(
                    r#"<a class="issue" href="{}" target="_blank" rel="noopener noreferrer">View Issue</a>"#,
                    escape_html(url)
                )
            })
            .unwrap_or_default(),
        FlagStatus::Active | FlagStatus::CleanupInProgress | FlagStatus::CleanedUp => {
            String::new()
        }
    }
}

fn flag_row(flag: &FlagWithCleanup, now: DateTime<Utc>) -> String {
    let f = &flag.flag;
    let description = f
        .description
        .as_deref()
        .map(|d| format!(r#"<div class="muted">{}</div>"#, escape_html(d)))
        .unwrap_or_default();
    let last_evaluated = f
        .last_evaluated_at
        .map(|at| time_ago(at, now))
        .unwrap_or_else(|| "Never".to_string());

    format!(
        r#"<tr>
<td><div class="name">{name}</div><div class="key">{key}</div>{description}</td>
<td>{created}<div class="muted">by {created_by}</div></td>
<td>{rollout}%<div class="bar"><div style="width: {rollout}%"></div></div></td>
<td>{last_evaluated}</td>
<td><span class="badge {badge_class}">{label}</span></td>
<td>{action}</td>
</tr>
"#,
        name = escape_html(&f.name),
        key = escape_html(&f.key),
        created = time_ago(f.created_at, now),
        created_by = escape_html(&f.created_by),
        rollout = f.rollout_percent.clamp(0, 100),
        badge_class = f.status.badge_class(),
        label = f.status.label(),
        action = action_cell(flag),
    )
}

/// Renders the dashboard page: stat cards, the scan form and the flag table.
pub fn render(flags: &[FlagWithCleanup], now: DateTime<Utc>) -> String {
    let stats = FlagStats::from_flags(flags.iter().map(|f| &f.flag));

    let cards = [
        stat_card("Total Flags", stats.total, "blue"),
        stat_card("Expired", stats.expired, "red"),
        stat_card("Cleanup Pending", stats.cleanup_pending, "yellow"),
        stat_card("Cleaned Up", stats.cleaned_up, "green"),
    ]
    .concat();

    let rows: String = flags.iter().map(|flag| flag_row(flag, now)).collect();

    let plural = if flags.len() == 1 { "" } else { "s" };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Feature Flags Dashboard</title>
<style>{STYLES}</style>
</head>
<body>
<main>
<header>
<div>
<h1>Feature Flags Dashboard</h1>
<p class="subtitle">Proactive cleanup automation for your feature flags</p>
</div>
<form action="/scan" method="post"><button class="scan" type="submit">Run Cleanup Scan</button></form>
</header>
<section class="stats">{cards}</section>
<section class="panel">
<div class="panel-head"><h2>All Feature Flags</h2><p>Showing {count} flag{plural}</p></div>
<table>
<thead><tr><th>Flag Name</th><th>Created</th><th>Rollout</th><th>Last Evaluation</th><th>Status</th><th>Actions</th></tr></thead>
<tbody>
{rows}</tbody>
</table>
</section>
</main>
<script>{SCRIPT}</script>
</body>
</html>
"#,
        count = flags.len(),
    )
}
