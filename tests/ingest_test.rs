//! End-to-end ingestion tests: log files on disk through to session files.

mod common;

use agent_session_monitor::models::{Round, UsageRecord};
use agent_session_monitor::tailer::FileStatus;
use agent_session_monitor::{FileIdentity, OffsetLedger, SessionStore};
use common::{ai_log_line, append, usage_line, TestEnv};
use serde_json::json;
use std::fs;

#[test]
fn test_single_line_creates_session() {
    let env = TestEnv::new();
    env.write_log(
        "{\"ai_log\":\"{\\\"session_id\\\":\\\"s1\\\",\\\"model\\\":\\\"GPT-4\\\",\\\"input_token\\\":100,\\\"output_token\\\":50}\"}\n",
    );

    let (mut tailer, mut aggregator) = env.start();
    let report = tailer.tail(&env.log_path, &mut aggregator).unwrap();
    assert_eq!(report.records_processed, 1);

    let session = aggregator.get("s1").unwrap();
    assert_eq!(session.messages_count, 1);
    assert_eq!(session.total_input_tokens, 100);
    assert_eq!(session.total_output_tokens, 50);
    assert_eq!(session.rounds.len(), 1);
    assert_eq!(session.rounds[0].round, 1);

    let on_disk = SessionStore::create(&env.output_dir).unwrap().load("s1").unwrap().unwrap();
    assert_eq!(&on_disk, session);
}

#[test]
fn test_replay_across_restarts_is_idempotent() {
    let env = TestEnv::new();
    env.write_log(&(usage_line("a", "GPT-4", 10, 1) + &usage_line("b", "Qwen", 20, 2) + &usage_line("a", "GPT-4", 30, 3)));

    let mut snapshots = Vec::new();
    for _ in 0..3 {
        let (mut tailer, mut aggregator) = env.start();
        tailer.tail(&env.log_path, &mut aggregator).unwrap();
        snapshots.push(aggregator.summary());
    }

    assert_eq!(snapshots[0].session_count, 2);
    assert_eq!(snapshots[0].totals.input_tokens, 60);
    assert_eq!(snapshots[0], snapshots[1]);
    assert_eq!(snapshots[1], snapshots[2]);
}

#[test]
fn test_appended_lines_picked_up_after_restart() {
    let env = TestEnv::new();
    env.write_log(&usage_line("a", "GPT-4", 10, 1));
    {
        let (mut tailer, mut aggregator) = env.start();
        tailer.tail(&env.log_path, &mut aggregator).unwrap();
    }

    append(&env.log_path, &usage_line("a", "GPT-4", 5, 5));
    let (mut tailer, mut aggregator) = env.start();
    let report = tailer.tail(&env.log_path, &mut aggregator).unwrap();
    assert_eq!(report.records_processed, 1);

    let session = aggregator.get("a").unwrap();
    assert_eq!(session.messages_count, 2);
    assert_eq!(session.total_input_tokens, 15);
    assert_eq!(session.rounds.iter().map(|r| r.round).collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn test_totals_match_round_sums() {
    let env = TestEnv::new();
    let mut content = String::new();
    for i in 0..25u64 {
        let tool_calls = if i % 4 == 0 {
            json!([{"function": {"name": "search"}}])
        } else {
            json!([])
        };
        content.push_str(&ai_log_line(json!({
            "session_id": format!("s{}", i % 3),
            "model": "DeepSeek-R1",
            "input_token": 100 + i,
            "output_token": i,
            "cached_tokens": i / 2,
            "reasoning": "x".repeat(i as usize * 3),
            "tool_calls": tool_calls,
        })));
    }
    env.write_log(&content);

    let (mut tailer, mut aggregator) = env.start();
    tailer.tail(&env.log_path, &mut aggregator).unwrap();

    for session in aggregator.sessions() {
        let sum = |f: fn(&Round) -> u64| session.rounds.iter().map(f).sum::<u64>();
        assert_eq!(session.total_input_tokens, sum(|r| r.input_tokens));
        assert_eq!(session.total_output_tokens, sum(|r| r.output_tokens));
        assert_eq!(session.total_reasoning_tokens, sum(|r| r.reasoning_tokens));
        assert_eq!(session.total_cached_tokens, sum(|r| r.cached_tokens));
        assert_eq!(session.messages_count, session.rounds.len() as u64);
    }
    let s0 = aggregator.get("s0").unwrap();
    assert!(s0.rounds[0].has_tool_calls);
    assert!(!s0.rounds[1].has_tool_calls);
}

#[test]
fn test_truncation_resets_offset_and_reprocesses_once() {
    let env = TestEnv::new();
    env.write_log(&(usage_line("a", "GPT-4", 1, 1) + &usage_line("a", "GPT-4", 2, 2) + &usage_line("a", "GPT-4", 3, 3)));

    let (mut tailer, mut sink) = (env.start().0, Vec::<UsageRecord>::new());
    tailer.tail(&env.log_path, &mut sink).unwrap();
    assert_eq!(sink.len(), 3);

    // Rewriting in place keeps the inode but shrinks the file.
    env.write_log(&usage_line("b", "GPT-4", 9, 9));
    let report = tailer.tail(&env.log_path, &mut sink).unwrap();
    assert!(report.files[0].truncated);
    assert_eq!(report.records_processed, 1);
    assert_eq!(sink.last().unwrap().session_id, "b");

    let report = tailer.tail(&env.log_path, &mut sink).unwrap();
    assert_eq!(report.records_processed, 0);
    assert_eq!(report.files[0].status, FileStatus::Unchanged);
}

#[test]
fn test_rotated_files_read_oldest_first() {
    let env = TestEnv::new();
    fs::write(env.rotated(2), usage_line("oldest", "GPT-4", 1, 1)).unwrap();
    fs::write(env.rotated(1), usage_line("older", "GPT-4", 1, 1)).unwrap();
    env.write_log(&usage_line("live", "GPT-4", 1, 1));

    let (mut tailer, _) = env.start();
    let mut sink = Vec::<UsageRecord>::new();
    let report = tailer.tail(&env.log_path, &mut sink).unwrap();

    let order: Vec<_> = sink.iter().map(|r| r.session_id.as_str()).collect();
    assert_eq!(order, ["oldest", "older", "live"]);

    let ledger = OffsetLedger::load(env.config().paths.state_file());
    for path in [env.rotated(2), env.rotated(1), env.log_path.clone()] {
        let (identity, metadata) = FileIdentity::of(&path).unwrap();
        assert_eq!(ledger.get(&identity), metadata.len(), "{}", path.display());
    }
    assert!(report.files.iter().all(|f| f.status == FileStatus::Read));
}

#[cfg(unix)]
#[test]
fn test_rotation_between_passes_does_not_double_count() {
    let env = TestEnv::new();
    env.write_log(&(usage_line("a", "GPT-4", 1, 1) + &usage_line("a", "GPT-4", 1, 1)));

    let (mut tailer, mut aggregator) = env.start();
    tailer.tail(&env.log_path, &mut aggregator).unwrap();

    // Writer finishes one more line, then the file is rotated.
    append(&env.log_path, &usage_line("a", "GPT-4", 1, 1));
    fs::rename(&env.log_path, env.rotated(1)).unwrap();
    env.write_log(&usage_line("a", "GPT-4", 1, 1));

    let report = tailer.tail(&env.log_path, &mut aggregator).unwrap();
    assert_eq!(report.records_processed, 2);
    assert_eq!(aggregator.get("a").unwrap().messages_count, 4);

    // A restarted process sees the same offsets and reads nothing.
    let (mut tailer, mut aggregator) = env.start();
    let report = tailer.tail(&env.log_path, &mut aggregator).unwrap();
    assert_eq!(report.records_processed, 0);
    assert_eq!(aggregator.get("a").unwrap().messages_count, 4);
}

#[test]
fn test_noise_lines_are_ignored() {
    let env = TestEnv::new();
    let content = [
        "GET /health 200\n".to_string(),
        usage_line("s1", "GPT-4", 1, 1),
        "{\"path\":\"/v1/models\",\"status\":200}\n".to_string(),
        "{\"ai_log\":\"{not json\"}\n".to_string(),
        "\n".to_string(),
        usage_line("s1", "GPT-4", 2, 2),
    ]
    .concat();
    env.write_log(&content);

    let (mut tailer, mut aggregator) = env.start();
    let report = tailer.tail(&env.log_path, &mut aggregator).unwrap();
    assert_eq!(report.lines_read, 6);
    assert_eq!(report.records_processed, 2);
    assert_eq!(aggregator.get("s1").unwrap().messages_count, 2);
    assert_eq!(report.files[0].end_offset, content.len() as u64);
}

#[test]
fn test_missing_log_is_not_an_error() {
    let env = TestEnv::new();
    let (mut tailer, mut aggregator) = env.start();
    let report = tailer.tail(&env.log_path, &mut aggregator).unwrap();
    assert!(report.files.is_empty());
    assert!(aggregator.is_empty());
    assert!(env.config().paths.state_file().exists());
}

#[test]
fn test_unreadable_state_file_replays_everything() {
    let env = TestEnv::new();
    env.write_log(&usage_line("a", "GPT-4", 1, 1));
    fs::create_dir_all(&env.output_dir).unwrap();
    fs::write(env.config().paths.state_file(), "not a ledger").unwrap();

    let (mut tailer, mut sink) = (env.start().0, Vec::<UsageRecord>::new());
    let report = tailer.tail(&env.log_path, &mut sink).unwrap();
    assert_eq!(report.records_processed, 1);

    let reloaded = OffsetLedger::load(env.config().paths.state_file());
    assert_eq!(reloaded.offsets().len(), 1);
}

#[test]
fn test_awkward_session_ids_persist_separately_across_restart() {
    let env = TestEnv::new();
    let long_id = format!("agent:main:{}", "x".repeat(300));
    let ids = ["team/a", "team_a", "team\\a", ".hidden", "..", "50%", long_id.as_str(), "ok"];
    let content: String = ids
        .iter()
        .enumerate()
        .map(|(i, id)| usage_line(id, "GPT-4", 10 * (i as u64 + 1), 1))
        .collect();
    env.write_log(&content);

    {
        let (mut tailer, mut aggregator) = env.start();
        let report = tailer.tail(&env.log_path, &mut aggregator).unwrap();
        assert!(!report.has_failures(), "{:?}", report.failed_files().collect::<Vec<_>>());
        assert_eq!(report.records_processed, ids.len());
        assert_eq!(aggregator.len(), ids.len());
    }

    let (mut tailer, mut aggregator) = env.start();
    assert_eq!(aggregator.len(), ids.len());
    for (i, id) in ids.iter().enumerate() {
        let session = aggregator.get(id).unwrap();
        assert_eq!(session.total_input_tokens, 10 * (i as u64 + 1));
        assert_eq!(session.messages_count, 1);
    }

    let report = tailer.tail(&env.log_path, &mut aggregator).unwrap();
    assert_eq!(report.records_processed, 0);

    let visible = fs::read_dir(&env.output_dir)
        .unwrap()
        .flatten()
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .count();
    assert_eq!(visible, ids.len());
}

#[test]
fn test_huge_token_counts_saturate() {
    let env = TestEnv::new();
    env.write_log(&(usage_line("big", "GPT-4", u64::MAX, 1) + &usage_line("big", "GPT-4", u64::MAX, 1)));

    {
        let (mut tailer, mut aggregator) = env.start();
        let report = tailer.tail(&env.log_path, &mut aggregator).unwrap();
        assert_eq!(report.records_processed, 2);
        let session = aggregator.get("big").unwrap();
        assert_eq!(session.total_input_tokens, u64::MAX);
        assert_eq!(session.total_output_tokens, 2);
        assert_eq!(session.rounds.len(), 2);
        assert_eq!(aggregator.summary().totals.input_tokens, u64::MAX);
    }

    let (_, aggregator) = env.start();
    assert_eq!(aggregator.get("big").unwrap().total_input_tokens, u64::MAX);
}
