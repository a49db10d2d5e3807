use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;

use keel_core::artifacts::{AbiItem, ContractDescriptor, StaticArtifacts};
use keel_core::chain::contracts::{
    APP_CONTRACT, DIRECTORY_CONTRACT, PACKAGE_CONTRACT, PROXY_ADMIN_CONTRACT, PROXY_CONTRACT,
    PROXY_FACTORY_CONTRACT,
};
use keel_core::manifest::{ManifestStore, ProjectManifest};

// System contract bytecodes; none is a prefix of another.
pub const PROXY_ADMIN_CODE: &str = "0x5f5f01";
pub const PROXY_FACTORY_CODE: &str = "0x5f5f02";
pub const PROXY_CODE: &str = "0x5f5f03";
pub const APP_CODE: &str = "0x5f5f04";
pub const PACKAGE_CODE: &str = "0x5f5f05";
pub const DIRECTORY_CODE: &str = "0x5f5f06";

pub const PROJECT: &str = "demo";

/// Old-style library placeholder for `name`.
pub fn placeholder(name: &str) -> String {
    format!("__{:_<38}", name)
}

pub fn system_contracts() -> Vec<ContractDescriptor> {
    vec![
        ContractDescriptor::new(PROXY_ADMIN_CONTRACT, PROXY_ADMIN_CODE),
        ContractDescriptor::new(PROXY_FACTORY_CONTRACT, PROXY_FACTORY_CODE),
        ContractDescriptor::new(PROXY_CONTRACT, PROXY_CODE),
        ContractDescriptor::new(APP_CONTRACT, APP_CODE),
        ContractDescriptor::new(PACKAGE_CONTRACT, PACKAGE_CODE),
        ContractDescriptor::new(DIRECTORY_CONTRACT, DIRECTORY_CODE),
    ]
}

pub fn system_artifacts() -> StaticArtifacts {
    system_contracts()
        .into_iter()
        .fold(StaticArtifacts::new(), StaticArtifacts::with)
}

/// `A` standalone, `B` linking library `L`, `L` itself.
pub fn contract_a() -> ContractDescriptor {
    ContractDescriptor::new("A", "0x600a01").with_abi(vec![AbiItem::function("initialize", &["uint256"])])
}

pub fn contract_b() -> ContractDescriptor {
    ContractDescriptor::new("B", format!("0x600b01{}", placeholder("L")))
}

pub fn library_l() -> ContractDescriptor {
    ContractDescriptor::new("L", "0x600c01")
}

pub fn project_artifacts() -> StaticArtifacts {
    system_artifacts()
        .with(contract_a())
        .with(contract_b())
        .with(library_l())
}

pub fn manifest() -> ProjectManifest {
    ProjectManifest::new(PROJECT, Version::new(1, 0, 0))
        .with_contract("A", "A")
        .with_contract("B", "B")
}

/// Install package `name` under `packages_dir` with `contracts` as its build
/// output. Returns the path of its manifest.
pub fn install_package(
    packages_dir: &Path,
    name: &str,
    version: Version,
    contracts: &[ContractDescriptor],
) -> PathBuf {
    let root = packages_dir.join(name);
    let mut manifest = ProjectManifest::new(name, version).with_publish(true);
    for contract in contracts {
        manifest.add_contract(contract.name.clone(), contract.name.clone());
    }
    let store = ManifestStore::for_project(&root);
    store.save(&manifest).unwrap();
    write_artifacts(&root.join("build/contracts"), contracts);
    store.path().to_path_buf()
}

pub fn write_artifacts(dir: &Path, contracts: &[ContractDescriptor]) {
    fs::create_dir_all(dir).unwrap();
    for contract in contracts {
        fs::write(
            dir.join(format!("{}.json", contract.name)),
            serde_json::to_string_pretty(contract).unwrap(),
        )
        .unwrap();
    }
}
