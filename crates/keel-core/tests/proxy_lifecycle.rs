//! Creating, upgrading and handing over proxies.

mod support;

use alloy_primitives::{Address, Bytes, U256};

use keel_core::artifacts::{ContractDescriptor, StaticArtifacts};
use keel_core::deployer::ProjectDeployer;
use keel_core::dependency::{DependencyResolver, FixturePackageResolver};
use keel_core::error::KeelError;
use keel_core::manifest::ProjectManifest;
use keel_core::proxy::{CreateProxyRequest, InitCall, ProxyManager, UpgradeRequest};
use keel_core::reconciler::{PushOptions, Reconciler};
use keel_core::snapshot::{NetworkSnapshot, ProxyFilter};
use keel_core::types::ProxyKind;

use support::chain::MockChain;
use support::fixtures::{PROJECT, manifest, project_artifacts};

struct Harness {
    chain: MockChain,
    artifacts: StaticArtifacts,
    manifest: ProjectManifest,
    packages: FixturePackageResolver,
    snapshot: NetworkSnapshot,
}

impl Harness {
    async fn pushed() -> Self {
        let mut harness = Self {
            chain: MockChain::new(),
            artifacts: project_artifacts(),
            manifest: manifest(),
            packages: FixturePackageResolver::new(),
            snapshot: NetworkSnapshot::new(),
        };
        harness.push().await;
        harness
    }

    async fn push(&mut self) {
        let dependencies = DependencyResolver::new(&self.packages, "dev");
        Reconciler::new(&self.chain, &self.artifacts, &dependencies, &self.manifest)
            .push(&mut self.snapshot, &[], PushOptions::new())
            .await
            .expect("push");
    }

    async fn create(&mut self, request: CreateProxyRequest) -> Result<Address, KeelError> {
        let dependencies = DependencyResolver::new(&self.packages, "dev");
        let created = ProxyManager::new(&self.chain, &self.artifacts, &dependencies, &self.manifest)
            .create_proxy(&mut self.snapshot, request)
            .await?;
        Ok(created.proxy.instance.address)
    }

    async fn upgrade(&mut self, request: UpgradeRequest) -> keel_core::proxy::ProxyReport {
        let dependencies = DependencyResolver::new(&self.packages, "dev");
        ProxyManager::new(&self.chain, &self.artifacts, &dependencies, &self.manifest)
            .upgrade_proxies(&mut self.snapshot, request)
            .await
            .expect("upgrade")
    }

    fn implementation(&self, alias: &str) -> Address {
        self.snapshot.contract(alias).expect("contract recorded").address
    }
}

fn create_a() -> CreateProxyRequest {
    CreateProxyRequest::new(PROJECT, "A")
}

// =============================================================================
// Creation
// =============================================================================

#[tokio::test]
async fn test_create_upgradeable_proxy_administered_by_project() {
    let mut h = Harness::pushed().await;

    let proxy = h.create(create_a()).await.unwrap();

    let proxy_admin = h.snapshot.proxy_admin_address().unwrap();
    assert_eq!(h.chain.implementation_of(proxy), h.implementation("A"));
    assert_eq!(h.chain.admin_of(proxy), proxy_admin);

    let record = h.snapshot.proxy(proxy).unwrap();
    assert_eq!(record.key().to_string(), "demo/A");
    assert_eq!(record.instance.kind, ProxyKind::Upgradeable);
    assert_eq!(record.instance.admin, Some(proxy_admin));
    assert_eq!(record.instance.version, "1.0.0");
}

#[tokio::test]
async fn test_create_warns_about_uncalled_initializer() {
    let mut h = Harness::pushed().await;
    let dependencies = DependencyResolver::new(&h.packages, "dev");
    let proxies = ProxyManager::new(&h.chain, &h.artifacts, &dependencies, &h.manifest);

    let created = proxies.create_proxy(&mut h.snapshot, create_a()).await.unwrap();
    assert_eq!(created.warnings.len(), 1);
    assert!(created.warnings[0].contains("initialize"));

    let init = InitCall::new("initialize", U256::from(42).to_be_bytes::<32>().to_vec());
    let created = proxies
        .create_proxy(&mut h.snapshot, create_a().with_init(init))
        .await
        .unwrap();
    assert!(created.warnings.is_empty());
}

#[tokio::test]
async fn test_create_before_push_fails() {
    let mut h = Harness::pushed().await;
    h.snapshot.unset_contract("A");

    let err = h.create(create_a()).await.unwrap_err();
    assert!(matches!(err, KeelError::ContractNotDeployed { .. }));

    let err = h.create(CreateProxyRequest::new(PROJECT, "Nope")).await.unwrap_err();
    assert!(matches!(err, KeelError::ContractNotFound { .. }));
}

#[tokio::test]
async fn test_create_minimal_proxy_deploys_factory_once() {
    let mut h = Harness::pushed().await;
    assert!(h.snapshot.proxy_factory_address().is_none());

    let first = h
        .create(create_a().with_kind(ProxyKind::Minimal))
        .await
        .unwrap();
    let factory = h.snapshot.proxy_factory_address().expect("factory deployed");
    let second = h
        .create(create_a().with_kind(ProxyKind::Minimal))
        .await
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(h.snapshot.proxy_factory_address(), Some(factory));
    assert_eq!(h.chain.implementation_of(first), h.implementation("A"));
    assert_eq!(h.snapshot.proxy(first).unwrap().instance.admin, None);
}

#[tokio::test]
async fn test_create_plain_instance() {
    let mut h = Harness::pushed().await;

    let instance = h
        .create(create_a().with_kind(ProxyKind::NonProxy))
        .await
        .unwrap();

    let record = h.snapshot.proxy(instance).unwrap();
    assert_eq!(record.instance.implementation, instance);
    assert_ne!(instance, h.implementation("A"));
}

// =============================================================================
// Salted creation
// =============================================================================

#[tokio::test]
async fn test_salted_proxy_lands_on_predicted_address() {
    let mut h = Harness::pushed().await;
    let salt = U256::from(7);

    let proxy = h.create(create_a().with_salt(salt)).await.unwrap();

    assert_eq!(proxy, MockChain::salted_address(salt, Address::repeat_byte(0xee)));
    assert_eq!(h.chain.implementation_of(proxy), h.implementation("A"));
    assert_eq!(h.chain.admin_of(proxy), h.snapshot.proxy_admin_address().unwrap());
}

#[tokio::test]
async fn test_salted_proxy_on_used_address_sends_nothing() {
    let mut h = Harness::pushed().await;
    ProjectDeployer::new(&h.chain, &h.artifacts, &h.manifest)
        .ensure_proxy_factory(&mut h.snapshot)
        .await
        .unwrap();
    let salt = U256::from(7);
    let predicted = MockChain::salted_address(salt, Address::repeat_byte(0xee));
    h.chain.put_code(predicted);
    let transactions = h.chain.transactions();
    let proxies = h.snapshot.proxy_count();

    let err = h.create(create_a().with_salt(salt)).await.unwrap_err();

    match err {
        KeelError::AddressInUse { address, salt } => {
            assert_eq!(address, predicted);
            assert_eq!(salt, "7");
        }
        other => panic!("expected AddressInUse, got {other}"),
    }
    assert_eq!(h.chain.transactions(), transactions);
    assert_eq!(h.snapshot.proxy_count(), proxies);
}

#[tokio::test]
async fn test_used_salt_is_reported_before_project_is_published() {
    let mut h = Harness::pushed().await;
    ProjectDeployer::new(&h.chain, &h.artifacts, &h.manifest)
        .ensure_proxy_factory(&mut h.snapshot)
        .await
        .unwrap();
    let salt = U256::from(9);
    h.chain.put_code(MockChain::salted_address(salt, Address::repeat_byte(0xee)));
    h.manifest = manifest().with_publish(true);
    let transactions = h.chain.transactions();

    let err = h.create(create_a().with_salt(salt)).await.unwrap_err();

    assert!(matches!(err, KeelError::AddressInUse { .. }));
    assert_eq!(h.chain.transactions(), transactions);
    assert!(!h.snapshot.is_published());
}

#[tokio::test]
async fn test_salt_and_signature_rules() {
    let mut h = Harness::pushed().await;

    let err = h
        .create(create_a().with_kind(ProxyKind::Minimal).with_salt(U256::from(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, KeelError::InvalidRequest(_)));

    let err = h
        .create(create_a().with_signature(Bytes::from_static(&[1, 2, 3])))
        .await
        .unwrap_err();
    assert!(matches!(err, KeelError::InvalidRequest(_)));
}

// =============================================================================
// Upgrades
// =============================================================================

#[tokio::test]
async fn test_upgrade_points_proxies_at_new_implementation() {
    let mut h = Harness::pushed().await;
    let proxy = h.create(create_a()).await.unwrap();

    h.artifacts = project_artifacts().with(ContractDescriptor::new("A", "0x600a02"));
    h.push().await;
    let report = h.upgrade(UpgradeRequest::new(ProxyFilter::all())).await;

    assert_eq!(report.changed.len(), 1);
    assert_eq!(h.chain.implementation_of(proxy), h.implementation("A"));
    assert_eq!(
        h.snapshot.proxy(proxy).unwrap().instance.implementation,
        h.implementation("A")
    );

    let transactions = h.chain.transactions();
    let report = h.upgrade(UpgradeRequest::new(ProxyFilter::all())).await;
    assert!(report.changed.is_empty());
    assert_eq!(report.up_to_date.len(), 1);
    assert_eq!(h.chain.transactions(), transactions);
}

#[tokio::test]
async fn test_upgrade_leaves_minimal_proxies_alone() {
    let mut h = Harness::pushed().await;
    let proxy = h
        .create(create_a().with_kind(ProxyKind::Minimal))
        .await
        .unwrap();
    let original = h.implementation("A");

    h.artifacts = project_artifacts().with(ContractDescriptor::new("A", "0x600a02"));
    h.push().await;
    let transactions = h.chain.transactions();
    let report = h.upgrade(UpgradeRequest::new(ProxyFilter::all())).await;

    assert!(report.changed.is_empty());
    assert_eq!(report.unchangeable.len(), 1);
    assert_eq!(report.unchangeable[0].instance.address, proxy);
    assert_eq!(h.chain.transactions(), transactions);
    assert_eq!(h.chain.implementation_of(proxy), original);
}

#[tokio::test]
async fn test_upgrade_skips_proxies_administered_elsewhere() {
    let mut h = Harness::pushed().await;
    let outsider = Address::repeat_byte(0x77);
    let proxy = h.create(create_a().with_admin(outsider)).await.unwrap();

    h.artifacts = project_artifacts().with(ContractDescriptor::new("A", "0x600a02"));
    h.push().await;
    let report = h.upgrade(UpgradeRequest::new(ProxyFilter::all())).await;

    assert!(report.changed.is_empty());
    assert_eq!(report.not_owned.len(), 1);
    assert_eq!(report.warnings.len(), 1);
    assert_ne!(h.chain.implementation_of(proxy), h.implementation("A"));
}

#[tokio::test]
async fn test_upgrade_filter_by_address() {
    let mut h = Harness::pushed().await;
    let first = h.create(create_a()).await.unwrap();
    let second = h.create(create_a()).await.unwrap();

    h.artifacts = project_artifacts().with(ContractDescriptor::new("A", "0x600a02"));
    h.push().await;
    let report = h
        .upgrade(UpgradeRequest::new(ProxyFilter::all().with_address(first)))
        .await;

    assert_eq!(report.changed.len(), 1);
    assert_eq!(h.chain.implementation_of(first), h.implementation("A"));
    assert_ne!(h.chain.implementation_of(second), h.implementation("A"));
}

// =============================================================================
// Admin changes
// =============================================================================

#[tokio::test]
async fn test_set_admin_hands_over_owned_proxies() {
    let mut h = Harness::pushed().await;
    let proxy = h.create(create_a()).await.unwrap();
    let minimal = h
        .create(create_a().with_kind(ProxyKind::Minimal))
        .await
        .unwrap();
    let new_admin = Address::repeat_byte(0x55);

    let dependencies = DependencyResolver::new(&h.packages, "dev");
    let proxies = ProxyManager::new(&h.chain, &h.artifacts, &dependencies, &h.manifest);
    let report = proxies
        .set_proxies_admin(&mut h.snapshot, &ProxyFilter::all(), new_admin)
        .await
        .unwrap();

    assert_eq!(report.changed.len(), 1);
    assert_eq!(report.unchangeable[0].instance.address, minimal);
    assert_eq!(h.chain.admin_of(proxy), new_admin);
    assert_eq!(h.snapshot.proxy(proxy).unwrap().instance.admin, Some(new_admin));

    let report = proxies
        .set_proxies_admin(&mut h.snapshot, &ProxyFilter::all(), new_admin)
        .await
        .unwrap();
    assert!(report.changed.is_empty());
    assert_eq!(report.up_to_date.len(), 1);
}

#[tokio::test]
async fn test_transfer_proxy_admin_ownership() {
    let h = Harness::pushed().await;
    let dependencies = DependencyResolver::new(&h.packages, "dev");
    let proxies = ProxyManager::new(&h.chain, &h.artifacts, &dependencies, &h.manifest);
    let new_owner = Address::repeat_byte(0x44);

    assert!(proxies
        .transfer_proxy_admin_ownership(&h.snapshot, new_owner)
        .await
        .unwrap());
    assert!(!proxies
        .transfer_proxy_admin_ownership(&h.snapshot, new_owner)
        .await
        .unwrap());
}
