use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::TempDir;

pub const PROJECT_ID: &str = "11111111-1111-1111-1111-111111111111";
pub const SERIES_ID: &str = "22222222-2222-2222-2222-222222222222";

/// Test harness running the CLI against a temporary plan file.
pub struct CliTestHarness {
    _temp_dir: TempDir,
    plan_path: PathBuf,
}

impl CliTestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let plan_path = temp_dir.path().join("plan.json");
        Self {
            _temp_dir: temp_dir,
            plan_path,
        }
    }

    /// Harness seeded with one recurring-template project holding a weekly
    /// Friday milestone series (2 hours, starting 2025-03-01).
    pub fn with_friday_plan() -> Self {
        let harness = Self::new();
        harness.write_plan(&friday_plan());
        harness
    }

    pub fn write_plan(&self, contents: &str) {
        std::fs::write(&self.plan_path, contents).expect("Failed to write plan file");
    }

    pub fn read_plan(&self) -> String {
        std::fs::read_to_string(&self.plan_path).expect("Failed to read plan file")
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("cadence").expect("Failed to find cadence binary");
        cmd.env("CADENCE_PLAN_FILE", &self.plan_path);
        cmd
    }

    pub fn run_success(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().success()
    }

    pub fn run_failure(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().failure()
    }
}

pub fn friday_plan() -> String {
    format!(
        r#"{{
  "projects": [
    {{
      "id": "{PROJECT_ID}",
      "name": "Thesis",
      "mode": "recurring_template",
      "created_at": "2025-03-01T00:00:00Z"
    }}
  ],
  "series": [
    {{
      "id": "{SERIES_ID}",
      "project_id": "{PROJECT_ID}",
      "kind": "milestone",
      "start": "2025-03-01",
      "rule": "FREQ=WEEKLY;BYDAY=FR",
      "payload": {{ "title": "Weekly deliverable", "hours": 2.0 }},
      "created_at": "2025-03-01T00:00:00Z",
      "updated_at": "2025-03-01T00:00:00Z"
    }}
  ],
  "actuals": [
    {{ "project_id": "{PROJECT_ID}", "date": "2025-03-07", "hours": 0.5 }}
  ]
}}"#
    )
}
