//! Run archive: saves finished runs as JSON and as a text summary

use crate::race::format_tokens;
use crate::simulation::RunReport;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Writes run archives under an output directory
pub struct RunArchive {
    output_dir: String,
}

impl RunArchive {
    /// Create an archive rooted at `output_dir`
    pub fn new(output_dir: &str) -> Self {
        Self {
            output_dir: output_dir.to_string(),
        }
    }

    /// Ensure output directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(format!("{}/runs", self.output_dir))
            .context("Failed to create runs directory")?;
        fs::create_dir_all(format!("{}/reports", self.output_dir))
            .context("Failed to create reports directory")?;
        Ok(())
    }

    /// Path of the HTML report for a run
    pub fn report_path(&self, report: &RunReport) -> String {
        format!(
            "{}/reports/race_{}.html",
            self.output_dir,
            file_stamp(report)
        )
    }

    /// Save the run to a JSON file
    pub fn save_run(&self, report: &RunReport) -> Result<String> {
        self.ensure_dirs()?;

        let filename = format!(
            "{}/runs/race_{}.json",
            self.output_dir,
            file_stamp(report)
        );

        let json = serde_json::to_string_pretty(report).context("Failed to serialize run")?;

        let mut file = File::create(&filename).context("Failed to create run file")?;
        file.write_all(json.as_bytes())
            .context("Failed to write run file")?;

        info!("Run saved to: {}", filename);
        Ok(filename)
    }

    /// Load a run from a JSON file
    pub fn load_run(path: &Path) -> Result<RunReport> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run file {}", path.display()))?;

        serde_json::from_str(&contents).context("Failed to parse run file")
    }

    /// Save a summary text file next to the run
    pub fn save_summary(&self, report: &RunReport) -> Result<String> {
        self.ensure_dirs()?;

        let filename = format!(
            "{}/runs/summary_{}.txt",
            self.output_dir,
            file_stamp(report)
        );

        let mut file = File::create(&filename).context("Failed to create summary file")?;
        file.write_all(format_summary(report).as_bytes())
            .context("Failed to write summary file")?;

        info!("Summary saved to: {}", filename);
        Ok(filename)
    }
}

/// File name stamp of a run, down to the millisecond
fn file_stamp(report: &RunReport) -> String {
    report.started_at.format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// Format a run as a text summary
pub fn format_summary(report: &RunReport) -> String {
    let race = &report.race;
    let payout = &report.payout;
    let status = report
        .final_state
        .status
        .map_or_else(|| "Unknown".to_string(), |s| s.to_string());

    let mut out = format!(
        r#"
╔══════════════════════════════════════════════════════════╗
║            KARERA DS RACE SUMMARY                        ║
╚══════════════════════════════════════════════════════════╝

  STANDINGS
  ─────────
  1st:                #{} {}
  2nd:                #{} {}
  3rd:                #{} {}

  BETS
  ────
  Bets processed:     {:>10}
  Total pot:          {:>10} tokens
  Winning bets:       {:>10}
  Reward per winner:  {:>10} tokens
  Undistributed:      {:>10} tokens
  Rewards issued:     {:>10}

  FINAL CONTRACT STATE
  ────────────────────
  Status:             {}
  Winners:            {:?}
  Total rewards:      {}
"#,
        race.first.id,
        race.first.name,
        race.second.id,
        race.second.name,
        race.third.id,
        race.third.name,
        report.bets_found,
        format_tokens(payout.total_pot),
        payout.winners.len(),
        format_tokens(payout.reward_per_winner),
        format_tokens(payout.remainder()),
        report.rewards_issued,
        status,
        report.final_state.winners,
        report.final_state.rewards,
    );

    if !payout.winners.is_empty() {
        out.push_str("\n  WINNERS\n  ───────\n");
        for winner in &payout.winners {
            out.push_str(&format!(
                "  {}  staked {} tokens\n",
                winner.bettor,
                format_tokens(winner.amount)
            ));
        }
    }

    out.push_str(&format!(
        "\nRace started: {}\nRace finished: {}\n",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
    ));
    out
}

/// Print summary to terminal
pub fn print_summary(report: &RunReport) {
    println!("{}", format_summary(report));
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::race::{default_horses, RaceResult, RaceStatus};
    use crate::simulation::log::{LogCategory, LogEntry};
    use crate::simulation::orchestrator::FinalState;
    use crate::simulation::payout::{Payout, Winner};
    use chrono::{Duration, Utc};

    pub(crate) fn sample_report() -> RunReport {
        RunReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            race: RaceResult::from_order(default_horses()).unwrap(),
            bets_found: 3,
            payout: Payout {
                total_pot: 4_500_000_000_000,
                winners: vec![Winner {
                    bettor: "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY".to_string(),
                    amount: 1_000_000_000_000,
                }],
                reward_per_winner: 4_500_000_000_000,
            },
            rewards_issued: 1,
            final_state: FinalState {
                status: Some(RaceStatus::Finished),
                winners: vec![1, 2],
                rewards: 1,
            },
            log: vec![
                LogEntry::new("📋 PHASE 1: SETUP", LogCategory::Phase),
                LogEntry::new("  → Horse #2 may already exist, continuing...", LogCategory::Warning),
            ],
        }
    }

    #[test]
    fn test_summary_mentions_standings_and_pot() {
        let summary = format_summary(&sample_report());

        assert!(summary.contains("#1 Thunder Bolt"));
        assert!(summary.contains("4.5000 tokens"));
        assert!(summary.contains("Finished"));
        assert!(summary.contains("5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"));
    }

    #[test]
    fn test_save_and_load_run() {
        let dir = tempdir::TempDir::new("run-archive").unwrap();
        let archive = RunArchive::new(dir.path().to_str().unwrap());
        let report = sample_report();

        let path = archive.save_run(&report).unwrap();
        archive.save_summary(&report).unwrap();

        let loaded = RunArchive::load_run(Path::new(&path)).unwrap();
        assert_eq!(loaded.race, report.race);
        assert_eq!(loaded.payout, report.payout);
        assert_eq!(loaded.log, report.log);
        assert!(dir.path().join("reports").is_dir());
    }

    #[test]
    fn test_runs_in_the_same_second_keep_separate_files() {
        let dir = tempdir::TempDir::new("run-archive").unwrap();
        let archive = RunArchive::new(dir.path().to_str().unwrap());
        let first = sample_report();
        let mut second = sample_report();
        second.started_at = first.started_at + Duration::milliseconds(1);
        second.bets_found = 7;

        let first_path = archive.save_run(&first).unwrap();
        let second_path = archive.save_run(&second).unwrap();

        assert_ne!(first_path, second_path);
        assert_ne!(archive.report_path(&first), archive.report_path(&second));
        assert_eq!(RunArchive::load_run(Path::new(&first_path)).unwrap().bets_found, 3);
        assert_eq!(RunArchive::load_run(Path::new(&second_path)).unwrap().bets_found, 7);
    }
}
