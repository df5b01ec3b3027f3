use insight_core::db::{AnalyticsStore, Database};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("insight/data.db")
    }

    fn todays_log(&self) -> String {
        let name = format!("insight.log.{}", chrono::Utc::now().format("%Y-%m-%d"));
        fs::read_to_string(self.xdg_state.join("insight").join(name)).unwrap_or_default()
    }

    fn write_config(&self, contents: &str) {
        let dir = self.xdg_config.join("insight");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), contents).expect("failed to write config");
    }
}

fn run_insight(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("insight"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute insight: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "insight {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn run_ok(env: &CliTestEnv, args: &[&str]) -> String {
    let output = run_insight(env, args);
    assert_success(args, &output);
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn record_rollup_and_report_round_trip() {
    let env = CliTestEnv::new();
    env.write_config(
        r#"
[tracking]
user_agent = "Mozilla/5.0 (iPad; CPU OS 16_5 like Mac OS X) Safari/604.1"
referrer = "https://lusakatimes.com/news"
country = "Zambia"
"#,
    );

    let recorded = run_ok(&env, &["record", "--path", "/", "--session", "session_1_cli"]);
    assert!(recorded.contains("Recorded page_view / (session session_1_cli)"));

    run_ok(&env, &["record", "--path", "/trade", "--session", "session_1_cli"]);
    run_ok(
        &env,
        &[
            "record",
            "--path",
            "/trade",
            "--event",
            "search",
            "--data",
            r#"{"query":"copper"}"#,
            "--session",
            "session_1_cli",
        ],
    );

    let db_path = env.db_path();
    assert!(db_path.exists(), "database file should exist at {}", db_path.display());

    let rollup = run_ok(&env, &["rollup"]);
    assert!(rollup.contains("Rolled up 2 page(s)"), "got:\n{rollup}");

    let json = run_ok(&env, &["report", "--range", "7d", "--format", "json"]);
    let report: serde_json::Value = serde_json::from_str(&json).expect("report is JSON");
    assert_eq!(report["total_page_views"], 2);
    assert_eq!(report["total_sessions"], 1);
    assert_eq!(report["bounce_rate"], 0);
    assert_eq!(report["realtime_users"], 1);
    assert_eq!(report["hourly_views"].as_array().map(Vec::len), Some(24));
    assert_eq!(report["device_stats"][0]["device_type"], "tablet");
    assert_eq!(report["browser_stats"][0]["browser"], "Safari");
    assert_eq!(report["location_stats"][0]["country"], "Zambia");
    assert!(report["device_stats"][0].get("label").is_none());
    assert_eq!(report["top_referrers"][0]["referrer"], "lusakatimes.com");

    let text = run_ok(&env, &["report"]);
    assert!(text.contains("Zambia Insight report (7d)"));
    assert!(text.contains("Sessions:         1"));

    let db = Database::open(&db_path).expect("failed to open db");
    let session = db.get_session("session_1_cli").unwrap().expect("session row");
    assert_eq!(session.landing_page.as_deref(), Some("/"));
    let searches = db
        .events_between(chrono::Utc::now() - chrono::Duration::hours(1), chrono::Utc::now())
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == insight_core::EventType::Search)
        .count();
    assert_eq!(searches, 1);
}

#[test]
fn live_reports_active_users() {
    let env = CliTestEnv::new();
    run_ok(&env, &["record", "--path", "/provinces/lusaka"]);
    run_ok(&env, &["record", "--path", "/provinces/copperbelt"]);

    let live = run_ok(&env, &["live"]);
    assert!(live.contains("Active users (last 5 min): 2"), "got:\n{live}");
    assert!(live.contains("/provinces/copperbelt"));
}

#[test]
fn commands_log_start_and_finish() {
    let env = CliTestEnv::new();
    run_ok(&env, &["rollup"]);

    let log = env.todays_log();
    assert!(log.contains("insight starting"), "log:\n{log}");
    assert!(log.contains("command=\"rollup\""), "log:\n{log}");
    assert!(log.contains("insight finished"), "log:\n{log}");
}

#[test]
fn empty_report_is_not_an_error() {
    let env = CliTestEnv::new();
    let text = run_ok(&env, &["report", "--range", "90d"]);
    assert!(text.contains("Page views:       0"));
    assert!(text.contains("Bounce rate:      0%"));
}

#[test]
fn invalid_input_is_rejected() {
    let env = CliTestEnv::new();

    let bad_range = run_insight(&env, &["report", "--range", "1y"]);
    assert!(!bad_range.status.success());

    let bad_json = run_insight(&env, &["record", "--path", "/", "--data", "{not json"]);
    assert!(!bad_json.status.success());
    assert!(String::from_utf8_lossy(&bad_json.stderr).contains("--data must be valid JSON"));

    let bad_event = run_insight(&env, &["record", "--path", "/", "--event", "scroll"]);
    assert!(!bad_event.status.success());
}
