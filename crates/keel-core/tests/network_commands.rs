//! Commands run against a project directory and an in-memory chain.

mod support;

use alloy_primitives::Address;
use semver::Version;
use tempfile::TempDir;

use keel_core::commands::status::{ContractState, StatusCommand};
use keel_core::commands::{
    AddCommand, AddOptions, CreateCommand, FreezeCommand, InitCommand, InitOptions, PushCommand,
    PushCommandOptions, SetAdminCommand, SetAdminTarget, UpgradeCommand,
};
use keel_core::context::AppContext;
use keel_core::error::KeelError;
use keel_core::proxy::{CreateProxyRequest, UpgradeRequest};
use keel_core::snapshot::ProxyFilter;

use support::chain::MockChain;
use support::fixtures::{PROJECT, contract_a, contract_b, library_l, system_contracts, write_artifacts};

fn setup_project(publish: bool) -> (TempDir, AppContext) {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let project = temp.path().join("project");
    let system = temp.path().join("system");
    write_artifacts(&system, &system_contracts());
    write_artifacts(
        &project.join("build/contracts"),
        &[contract_a(), contract_b(), library_l()],
    );

    let ctx = AppContext::with_global_config_dir(project, temp.path().join("global"))
        .with_system_artifacts_dir(system);
    InitCommand::new(ctx.clone())
        .execute(
            &InitOptions::new(PROJECT)
                .with_version(Version::new(1, 0, 0))
                .with_publish(publish),
        )
        .expect("init");
    AddCommand::new(ctx.clone())
        .execute(&AddOptions::new().with_contract("A").with_contract("B"))
        .expect("add");
    (temp, ctx)
}

#[tokio::test]
async fn test_push_persists_snapshot_and_status_follows() {
    let (_temp, ctx) = setup_project(true);
    let chain = MockChain::new();

    let before = StatusCommand::new(ctx.clone()).execute("dev").unwrap();
    assert!(before.has_pending_changes());
    assert!(before
        .contracts
        .iter()
        .all(|c| c.state == ContractState::NotDeployed));

    let report = PushCommand::new(ctx.clone())
        .execute(&chain, "dev", &PushCommandOptions::new())
        .await
        .unwrap();
    assert_eq!(report.contracts, vec!["A", "B"]);
    assert!(ctx.project_root().join("keel.dev.json").exists());

    let after = StatusCommand::new(ctx.clone()).execute("dev").unwrap();
    assert!(!after.has_pending_changes());
    assert!(after.published);
    assert_eq!(after.deployed_version.as_deref(), Some("1.0.0"));
}

#[tokio::test]
async fn test_failed_push_keeps_partial_progress_on_disk() {
    let (_temp, ctx) = setup_project(false);
    let chain = MockChain::new();
    chain.fail_deployments_of("0x600b01");

    let err = PushCommand::new(ctx.clone())
        .execute(&chain, "dev", &PushCommandOptions::new())
        .await
        .unwrap_err();
    assert!(err.downcast_ref::<KeelError>().is_some());

    let snapshot = ctx.snapshot_store("dev").load().unwrap();
    assert!(snapshot.contract("A").is_some());
    assert!(snapshot.contract("B").is_none());
    assert!(snapshot.proxy_admin_address().is_some());
}

#[tokio::test]
async fn test_create_and_upgrade_commands_record_proxies() {
    let (_temp, ctx) = setup_project(false);
    let chain = MockChain::new();
    PushCommand::new(ctx.clone())
        .execute(&chain, "dev", &PushCommandOptions::new())
        .await
        .unwrap();

    let created = CreateCommand::new(ctx.clone())
        .execute(&chain, "dev", CreateProxyRequest::new(PROJECT, "A"))
        .await
        .unwrap();
    let proxy = created.proxy.instance.address;

    let status = StatusCommand::new(ctx.clone()).execute("dev").unwrap();
    assert_eq!(status.proxies.len(), 1);
    assert_eq!(status.proxies[0].key, "demo/A");

    let report = UpgradeCommand::new(ctx.clone())
        .execute(&chain, "dev", UpgradeRequest::new(ProxyFilter::all()))
        .await
        .unwrap();
    assert_eq!(report.up_to_date.len(), 1);
    assert_eq!(
        ctx.snapshot_store("dev").load().unwrap().proxy(proxy).unwrap().instance.address,
        proxy
    );
}

#[tokio::test]
async fn test_set_admin_refuses_zero_address() {
    let (_temp, ctx) = setup_project(false);
    let chain = MockChain::new();

    let err = SetAdminCommand::new(ctx)
        .execute(&chain, "dev", &SetAdminTarget::ProxyAdminOwner, Address::ZERO)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("zero address"));
    assert_eq!(chain.transactions(), 0);
}

#[tokio::test]
async fn test_freeze_command_reports_previous_state() {
    let (_temp, ctx) = setup_project(true);
    let chain = MockChain::new();
    PushCommand::new(ctx.clone())
        .execute(&chain, "dev", &PushCommandOptions::new())
        .await
        .unwrap();

    let first = FreezeCommand::new(ctx.clone()).execute(&chain, "dev").await.unwrap();
    assert_eq!(first.version, "1.0.0");
    assert!(!first.already_frozen);

    let second = FreezeCommand::new(ctx.clone()).execute(&chain, "dev").await.unwrap();
    assert!(second.already_frozen);

    let status = StatusCommand::new(ctx).execute("dev").unwrap();
    assert!(status.frozen);
}
