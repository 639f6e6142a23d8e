//! HTML rendering of a run's log panel

use crate::race::format_tokens;
use crate::simulation::RunReport;
use anyhow::{Context, Result};
use minijinja::{context, Environment};
use std::fs::{self, File};
use std::io::Write;
use tracing::info;

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Karera DS - Race {{ started_at }}</title>
    <style>
        :root {
            --bg-primary: #0a0a0a;
            --bg-card: #1c1c1c;
            --text-primary: #ffffff;
            --text-secondary: #888888;
            --accent-purple: #8b5cf6;
            --accent-cyan: #22d3ee;
            --accent-green: #10b981;
            --accent-red: #ef4444;
            --accent-orange: #f59e0b;
        }
        body {
            font-family: 'Inter', -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            margin: 0;
        }
        .container { max-width: 960px; margin: 0 auto; padding: 2rem; }
        header { text-align: center; padding: 2rem 0; }
        header .timestamp { color: var(--text-secondary); font-size: 0.875rem; }
        .stats { display: grid; grid-template-columns: repeat(3, 1fr); gap: 1rem; margin-bottom: 2rem; }
        .stat { background: var(--bg-card); border-radius: 12px; padding: 1rem; }
        .stat .label { color: var(--text-secondary); font-size: 0.8rem; }
        .stat .value { font-size: 1.4rem; font-weight: 700; }
        .log { background: var(--bg-card); border-radius: 12px; padding: 1rem; font-family: monospace; }
        .log div { white-space: pre; }
        .log .time { color: var(--text-secondary); margin-right: 0.75rem; }
        .info { color: var(--text-primary); }
        .success { color: var(--accent-green); }
        .warning { color: var(--accent-orange); }
        .error { color: var(--accent-red); }
        .header { color: var(--accent-purple); font-weight: 700; }
        .phase { color: var(--accent-cyan); font-weight: 700; }
        .race { color: #facc15; }
        .reward { color: var(--accent-green); font-weight: 700; }
    </style>
</head>
<body>
<div class="container">
    <header>
        <h1>Karera DS</h1>
        <div>Horse racing simulation</div>
        <div class="timestamp">{{ started_at }} &rarr; {{ finished_at }}</div>
    </header>

    <div class="stats">
        <div class="stat"><div class="label">1st</div><div class="value">#{{ race.first.id }} {{ race.first.name }}</div></div>
        <div class="stat"><div class="label">2nd</div><div class="value">#{{ race.second.id }} {{ race.second.name }}</div></div>
        <div class="stat"><div class="label">3rd</div><div class="value">#{{ race.third.id }} {{ race.third.name }}</div></div>
        <div class="stat"><div class="label">Total pot</div><div class="value">{{ total_pot }} tokens</div></div>
        <div class="stat"><div class="label">Winning bets</div><div class="value">{{ winners }}</div></div>
        <div class="stat"><div class="label">Reward per winner</div><div class="value">{{ reward_per_winner }} tokens</div></div>
    </div>

    <div class="log">
    {% for entry in log %}
        <div class="{{ entry.category }}"><span class="time">{{ entry.timestamp }}</span>{{ entry.message }}</div>
    {% endfor %}
    </div>
</div>
</body>
</html>
"#;

/// Render a run as a standalone HTML page
pub fn render_report(report: &RunReport) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("race.html", TEMPLATE)
        .context("Failed to load report template")?;
    let template = env
        .get_template("race.html")
        .context("Failed to load report template")?;

    template
        .render(context! {
            started_at => report.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            finished_at => report.finished_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            race => &report.race,
            total_pot => format_tokens(report.payout.total_pot),
            winners => report.payout.winners.len(),
            reward_per_winner => format_tokens(report.payout.reward_per_winner),
            log => &report.log,
        })
        .context("Failed to render report")
}

/// Write the HTML report of a run to `output_path`
pub fn generate_report(report: &RunReport, output_path: &str) -> Result<String> {
    if let Some(parent) = std::path::Path::new(output_path).parent() {
        fs::create_dir_all(parent)?;
    }

    let html = render_report(report)?;

    let mut file = File::create(output_path).context("Failed to create report file")?;
    file.write_all(html.as_bytes())
        .context("Failed to write report file")?;

    info!("Report generated: {}", output_path);
    Ok(output_path.to_string())
}
