//! Standalone HTML rendering of a trace.

use super::format_bytes;
use crate::core::duplicates::DuplicateDecision;
use crate::core::orchestrator::Trace;
use crate::core::plan::{OperationKind, PlanAction};
use std::io::Write;
use std::path::Path;

/// Write the full report for `trace` as one self-contained HTML page
pub fn write_html<W: Write>(trace: &Trace, mut writer: W) -> std::io::Result<()> {
    let title = if trace.simulated {
        "Photo Orbit Simulation"
    } else {
        "Photo Orbit Run"
    };

    write!(
        writer,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{}</title>
    <style>
        :root {{
            --bg-primary: #0a0a0a;
            --bg-secondary: #1a1a1a;
            --bg-tertiary: #2a2a2a;
            --text-primary: #ffffff;
            --text-secondary: #a0a0a0;
            --accent: #3b82f6;
            --success: #22c55e;
            --warning: #f59e0b;
            --danger: #ef4444;
        }}

        * {{ margin: 0; padding: 0; box-sizing: border-box; }}

        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            line-height: 1.6;
            padding: 2rem;
        }}

        .container {{ max-width: 1200px; margin: 0 auto; }}

        header {{
            margin-bottom: 2rem;
            padding-bottom: 1.5rem;
            border-bottom: 1px solid var(--bg-tertiary);
        }}

        h1 {{ font-size: 2rem; margin-bottom: 0.25rem; }}
        h2 {{ font-size: 1.25rem; margin: 2rem 0 1rem; }}

        .muted {{ color: var(--text-secondary); font-size: 0.875rem; }}

        .summary {{
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(180px, 1fr));
            gap: 1rem;
        }}

        .stat-card {{
            background: var(--bg-secondary);
            padding: 1.25rem;
            border-radius: 12px;
            text-align: center;
        }}

        .stat-value {{ font-size: 1.75rem; font-weight: bold; color: var(--accent); }}
        .stat-label {{ color: var(--text-secondary); font-size: 0.875rem; }}

        table {{
            width: 100%;
            border-collapse: collapse;
            background: var(--bg-secondary);
            border-radius: 12px;
            overflow: hidden;
            font-size: 0.8rem;
        }}

        th, td {{
            text-align: left;
            padding: 0.5rem 0.75rem;
            border-bottom: 1px solid var(--bg-tertiary);
            word-break: break-all;
        }}

        th {{ background: var(--bg-tertiary); color: var(--text-secondary); }}

        .badge {{
            padding: 0.125rem 0.5rem;
            border-radius: 4px;
            font-size: 0.7rem;
            text-transform: uppercase;
            white-space: nowrap;
        }}

        .badge-copy {{ background: var(--success); color: white; }}
        .badge-move {{ background: var(--accent); color: white; }}
        .badge-skip {{ background: var(--warning); color: black; }}
        .badge-error {{ background: var(--danger); color: white; }}

        footer {{
            text-align: center;
            padding: 2rem;
            color: var(--text-secondary);
            font-size: 0.875rem;
        }}
    </style>
</head>
<body>
    <div class="container">
        <header>
            <h1>{}</h1>
            <p class="muted">Run {} &middot; {} &middot; pattern <code>{}</code> &middot; {} &middot; {} mode</p>
            <p class="muted">Destination {}</p>
        </header>
"#,
        title,
        title,
        trace.run_id,
        trace.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        escape(trace.settings.pattern.as_str()),
        OperationKind::from(trace.settings.operation),
        trace.settings.extraction_mode.as_str(),
        escape_path(&trace.settings.destination),
    )?;

    let summary = &trace.summary;
    write!(
        writer,
        r#"
        <div class="summary">
            <div class="stat-card"><div class="stat-value">{}</div><div class="stat-label">Photos Found</div></div>
            <div class="stat-card"><div class="stat-value">{}</div><div class="stat-label">To Organize</div></div>
            <div class="stat-card"><div class="stat-value">{}</div><div class="stat-label">Skipped</div></div>
            <div class="stat-card"><div class="stat-value">{}</div><div class="stat-label">Duplicates</div></div>
            <div class="stat-card"><div class="stat-value">{}</div><div class="stat-label">Unsorted</div></div>
            <div class="stat-card"><div class="stat-value">{}</div><div class="stat-label">Total Size</div></div>
        </div>
"#,
        summary.total_files,
        summary.to_process,
        summary.skipped,
        summary.duplicates,
        summary.unsorted,
        format_bytes(summary.total_bytes),
    )?;

    writeln!(writer, "        <h2>Plan</h2>")?;
    writeln!(
        writer,
        "        <table>\n            <tr><th>#</th><th>Source</th><th>Destination</th><th>Action</th><th>Size</th></tr>"
    )?;
    for entry in &trace.entries {
        let (class, label) = match entry.action {
            PlanAction::Copy => ("badge-copy", "copy".to_string()),
            PlanAction::Move => ("badge-move", "move".to_string()),
            PlanAction::Skip { reason } => ("badge-skip", format!("skip: {}", reason)),
        };
        writeln!(
            writer,
            "            <tr><td>{}</td><td>{}</td><td>{}</td><td><span class=\"badge {}\">{}</span></td><td>{}</td></tr>",
            entry.id,
            escape_path(&entry.source.path),
            escape_path(&entry.destination),
            class,
            label,
            format_bytes(entry.source.size),
        )?;
    }
    writeln!(writer, "        </table>")?;

    if !trace.duplicate_groups.is_empty() {
        let strategy = trace.settings.duplicates.unwrap_or_default();
        writeln!(
            writer,
            "        <h2>Duplicate Groups</h2>\n        <p class=\"muted\">Strategy: {}</p>",
            strategy.as_str()
        )?;
        writeln!(
            writer,
            "        <table>\n            <tr><th>Group</th><th>Source</th><th>Size</th><th>Decision</th></tr>"
        )?;
        for group in &trace.duplicate_groups {
            for member in &group.members {
                let decision = group.decision(strategy, member);
                let class = match decision {
                    DuplicateDecision::Kept => "badge-copy",
                    DuplicateDecision::Skipped => "badge-skip",
                };
                writeln!(
                    writer,
                    "            <tr><td>{} <span class=\"muted\">{}</span></td><td>{}</td><td>{}</td><td><span class=\"badge {}\">{}</span></td></tr>",
                    group.id,
                    group.digest.short(),
                    escape_path(member),
                    format_bytes(group.size),
                    class,
                    decision.as_str(),
                )?;
            }
        }
        writeln!(writer, "        </table>")?;
    }

    if !trace.errors.is_empty() {
        writeln!(writer, "        <h2>Problems</h2>")?;
        writeln!(
            writer,
            "        <table>\n            <tr><th>Stage</th><th>Path</th><th>Message</th></tr>"
        )?;
        for error in &trace.errors {
            writeln!(
                writer,
                "            <tr><td><span class=\"badge badge-error\">{:?}</span></td><td>{}</td><td>{}</td></tr>",
                error.stage,
                escape_path(&error.path),
                escape(&error.message),
            )?;
        }
        writeln!(writer, "        </table>")?;
    }

    write!(
        writer,
        r#"
        <footer>
            <p>Report generated by Photo Orbit</p>
        </footer>
    </div>
</body>
</html>
"#
    )?;

    Ok(())
}

fn escape_path(path: &Path) -> String {
    escape(&path.display().to_string())
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("<a & \"b\">"), "&lt;a &amp; &quot;b&quot;&gt;");
        assert_eq!(escape("plain.jpg"), "plain.jpg");
    }
}
