// End-to-end scenario: snapshot, list, diff, restore through the command
// dispatcher.

mod common;

use common::harness;
use timemachine_core::model::{BackendStatus, RestoreState};
use timemachine_engine::{apply_engine_command, EngineCommand, EngineCommandResult, RestoreOptions};

#[test]
fn test_upgrade_config_scenario() {
    let h = harness();
    let ctx = h.ctx();

    let record = match apply_engine_command(
        EngineCommand::Snapshot {
            reason: "upgrade config".to_string(),
            risk_level: "high".to_string(),
        },
        &h.tm,
        &ctx,
    )
    .unwrap()
    {
        EngineCommandResult::Snapshot(record) => record,
        other => panic!("unexpected result {:?}", other),
    };
    assert!(record.tag.to_string().starts_with("stable/"));
    assert_eq!(record.backend_status, BackendStatus::BothCommitted);
    let tag = record.tag.to_string();

    match apply_engine_command(EngineCommand::List { category: None }, &h.tm, &ctx).unwrap() {
        EngineCommandResult::List(records) => {
            assert!(records.iter().any(|r| r.tag == record.tag))
        }
        other => panic!("unexpected result {:?}", other),
    }

    match apply_engine_command(
        EngineCommand::Diff {
            tag_a: tag.clone(),
            tag_b: tag.clone(),
        },
        &h.tm,
        &ctx,
    )
    .unwrap()
    {
        EngineCommandResult::Diff(report) => assert!(report.is_empty()),
        other => panic!("unexpected result {:?}", other),
    }

    let restore = EngineCommand::Restore {
        tag,
        options: RestoreOptions {
            require_verify: true,
            force: false,
        },
    };
    assert!(restore.is_mutating());
    match apply_engine_command(restore, &h.tm, &ctx).unwrap() {
        EngineCommandResult::Restore(result) => {
            assert_eq!(result.state, RestoreState::Committed);
            assert!(result.verification.unwrap().passed());
        }
        other => panic!("unexpected result {:?}", other),
    }

    assert!(h.tm.audit().verify_chain().unwrap());
}

#[test]
fn test_audit_chain_breaks_when_an_entry_is_edited() {
    let h = harness();
    let ctx = h.ctx();
    let tag = h.tm.snapshot(&ctx, "r", "high").unwrap().tag.to_string();
    h.tm.diff(&ctx, &tag, &tag).unwrap();
    h.tm.list(&ctx, None).unwrap();
    assert!(h.tm.audit().verify_chain().unwrap());

    h.sink.tamper(2, |entry| entry.actor = "someone-else".to_string());

    assert!(!h.tm.audit().verify_chain().unwrap());
    assert_eq!(h.tm.audit().chain_report().unwrap().broken_at, Some(2));
}

#[test]
fn test_audit_entries_record_the_actor() {
    let h = harness();
    let ctx = timemachine_core::context::OperationContext::new("deploy-bot");
    h.tm.snapshot(&ctx, "r", "high").unwrap();

    let entries = h.tm.audit().entries().unwrap();
    assert!(entries.iter().all(|e| e.actor == "deploy-bot"));
}
