use chrono::{Datelike, Duration, Local, Weekday};
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendanced");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

struct Fixture {
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    seq: u32,
}

impl Fixture {
    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.seq += 1;
        let payload = json!({ "id": self.seq.to_string(), "method": method, "params": params });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        serde_json::from_str(line.trim()).expect("parse response json")
    }

    fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let resp = self.call(method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "expected success: {}",
            resp
        );
        resp.get("result").expect("result").clone()
    }
}

fn seeded_fixture(prefix: &str) -> (Child, Fixture, serde_json::Value) {
    let workspace = temp_dir(prefix);
    let (child, stdin, reader) = spawn_sidecar();
    let mut fx = Fixture {
        stdin,
        reader,
        seq: 0,
    };
    fx.ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = fx.ok("demo.seed", json!({}));
    (child, fx, seed)
}

fn weekdays_in_last_30_days() -> usize {
    let today = Local::now().date_naive();
    (0..30i64)
        .filter(|off| {
            let d = today - Duration::days(*off);
            !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)
        })
        .count()
}

#[test]
fn seed_creates_expected_classes_and_rosters() {
    let (mut child, mut fx, seed) = seeded_fixture("attendance-demo-shape");

    assert_eq!(seed.get("classes").and_then(|v| v.as_u64()), Some(5));
    assert_eq!(seed.get("students").and_then(|v| v.as_u64()), Some(106));
    let expected_records = 106 * weekdays_in_last_30_days() as u64;
    assert_eq!(
        seed.get("records").and_then(|v| v.as_u64()),
        Some(expected_records)
    );

    let classes = fx.ok("classes.list", json!({}));
    let rows = classes
        .get("classes")
        .and_then(|v| v.as_array())
        .expect("classes array");
    assert_eq!(rows.len(), 5);

    let mut sizes = std::collections::HashMap::new();
    for row in rows {
        let name = row.get("name").and_then(|v| v.as_str()).expect("name");
        let count = row
            .get("studentCount")
            .and_then(|v| v.as_u64())
            .expect("studentCount");
        sizes.insert(name.to_string(), count);
    }
    assert_eq!(sizes.get("Mathematics 101"), Some(&24));
    assert_eq!(sizes.get("English Literature"), Some(&21));
    assert_eq!(sizes.get("Physics"), Some(&18));
    assert_eq!(sizes.get("Chemistry"), Some(&20));
    assert_eq!(sizes.get("World History"), Some(&23));

    // Mathematics 101 is seeded first, so its roster carries the first
    // student numbers and the name cycle starts from the top of the list.
    let math_id = rows
        .iter()
        .find(|r| r.get("name").and_then(|v| v.as_str()) == Some("Mathematics 101"))
        .and_then(|r| r.get("id"))
        .and_then(|v| v.as_str())
        .expect("math class id")
        .to_string();
    let students = fx.ok("students.list", json!({ "classId": &math_id }));
    let roster = students
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students array");
    assert_eq!(roster.len(), 24);
    assert_eq!(
        roster[0].get("name").and_then(|v| v.as_str()),
        Some("Olivia Johnson")
    );
    assert_eq!(
        roster[0].get("studentNo").and_then(|v| v.as_str()),
        Some("SID100000")
    );
    assert_eq!(
        roster[23].get("studentNo").and_then(|v| v.as_str()),
        Some("SID100023")
    );

    let _ = child.kill();
}

#[test]
fn second_seed_is_a_noop() {
    let (mut child, mut fx, seed) = seeded_fixture("attendance-demo-idempotent");
    assert_eq!(seed.get("classes").and_then(|v| v.as_u64()), Some(5));

    let again = fx.ok("demo.seed", json!({}));
    assert_eq!(
        again.get("alreadySeeded").and_then(|v| v.as_bool()),
        Some(true)
    );

    let classes = fx.ok("classes.list", json!({}));
    assert_eq!(
        classes
            .get("classes")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(5)
    );

    let _ = child.kill();
}

#[test]
fn seeded_counts_split_cleanly_and_skip_weekends() {
    let (mut child, mut fx, _seed) = seeded_fixture("attendance-demo-counts");

    let overview = fx.ok("reports.overview", json!({}));
    let overall = overview.get("stats").expect("overall stats");
    let total = overall.get("total").and_then(|v| v.as_u64()).expect("total");
    let split: u64 = ["present", "absent", "late", "excused"]
        .iter()
        .map(|k| overall.get(*k).and_then(|v| v.as_u64()).expect("count"))
        .sum();
    assert_eq!(split, total);
    assert_eq!(total, 106 * weekdays_in_last_30_days() as u64);

    let classes = fx.ok("classes.list", json!({}));
    let physics_id = classes
        .get("classes")
        .and_then(|v| v.as_array())
        .and_then(|rows| {
            rows.iter()
                .find(|r| r.get("name").and_then(|v| v.as_str()) == Some("Physics"))
        })
        .and_then(|r| r.get("id"))
        .and_then(|v| v.as_str())
        .expect("physics class id")
        .to_string();

    let trend = fx.ok("reports.trend", json!({ "classId": &physics_id, "days": 14 }));
    let days = trend.get("days").and_then(|v| v.as_array()).expect("days");
    assert_eq!(days.len(), 14);
    for bucket in days {
        let date = bucket
            .get("date")
            .and_then(|v| v.as_str())
            .and_then(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .expect("bucket date");
        let bucket_total = bucket
            .get("stats")
            .and_then(|s| s.get("total"))
            .and_then(|v| v.as_u64())
            .expect("bucket total");
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            assert_eq!(bucket_total, 0, "weekend bucket {} must stay empty", date);
        } else {
            assert_eq!(bucket_total, 18, "weekday bucket {} covers the roster", date);
        }
    }

    let _ = child.kill();
}
