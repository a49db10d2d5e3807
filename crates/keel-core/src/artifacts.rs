//! Compiled contract artifacts.
//!
//! A [`ContractDescriptor`] is the immutable view of one compiled contract:
//! creation and runtime bytecode (hex, possibly with unlinked library
//! placeholders), ABI and storage layout. Validation results are kept apart
//! from it and passed explicitly.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use alloy_primitives::{Address, Bytes, hex, keccak256};
use serde::{Deserialize, Serialize};

use crate::error::{KeelError, Result};

/// Length of an old-style `__Name_____` library placeholder, in hex characters.
const PLACEHOLDER_LEN: usize = 40;

/// One ABI entry; only what deployment needs is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl AbiItem {
    pub fn function(name: &str, inputs: &[&str]) -> Self {
        Self {
            kind: "function".to_string(),
            name: Some(name.to_string()),
            inputs: inputs
                .iter()
                .map(|kind| AbiParam {
                    name: String::new(),
                    kind: kind.to_string(),
                })
                .collect(),
        }
    }

    pub fn constructor(inputs: &[&str]) -> Self {
        Self {
            name: None,
            kind: "constructor".to_string(),
            ..Self::function("", inputs)
        }
    }

    /// Canonical signature, e.g. `initialize(address,uint256)`.
    pub fn signature(&self) -> String {
        let inputs: Vec<&str> = self.inputs.iter().map(|p| p.kind.as_str()).collect();
        format!("{}({})", self.name.as_deref().unwrap_or_default(), inputs.join(","))
    }
}

/// A state variable in solc's `storageLayout` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEntry {
    pub label: String,
    #[serde(default)]
    pub contract: String,
    #[serde(rename = "type")]
    pub type_id: String,
    #[serde(default)]
    pub slot: String,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageType {
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub number_of_bytes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayout {
    #[serde(default)]
    pub storage: Vec<StorageEntry>,
    #[serde(default)]
    pub types: BTreeMap<String, StorageType>,
}

impl StorageLayout {
    /// Human-readable type of `entry`, falling back to its raw identifier.
    pub fn type_label<'a>(&'a self, entry: &'a StorageEntry) -> &'a str {
        self.types
            .get(&entry.type_id)
            .map(|t| t.label.as_str())
            .unwrap_or(entry.type_id.as_str())
    }
}

/// A compiled contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDescriptor {
    #[serde(alias = "contractName")]
    pub name: String,
    pub bytecode: String,
    #[serde(default)]
    pub deployed_bytecode: String,
    #[serde(default)]
    pub abi: Vec<AbiItem>,
    #[serde(default, alias = "storageLayout")]
    pub storage: StorageLayout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_version: Option<String>,
}

impl ContractDescriptor {
    pub fn new(name: impl Into<String>, bytecode: impl Into<String>) -> Self {
        let bytecode = bytecode.into();
        Self {
            name: name.into(),
            deployed_bytecode: bytecode.clone(),
            bytecode,
            abi: Vec::new(),
            storage: StorageLayout::default(),
            source_path: None,
            compiler_version: None,
        }
    }

    pub fn with_abi(mut self, abi: Vec<AbiItem>) -> Self {
        self.abi = abi;
        self
    }

    pub fn with_storage(mut self, storage: StorageLayout) -> Self {
        self.storage = storage;
        self
    }

    /// Libraries referenced by placeholders in the creation bytecode.
    pub fn library_names(&self) -> Vec<String> {
        library_placeholders(&self.bytecode)
    }

    pub fn has_unlinked_libraries(&self) -> bool {
        has_unlinked_libraries(&self.bytecode)
    }

    /// Creation bytecode with every library placeholder replaced.
    pub fn linked(&self, libraries: &BTreeMap<String, Address>) -> Result<Bytes> {
        let mut code = self.bytecode.clone();
        for name in library_placeholders(&code) {
            let address = libraries.get(&name).ok_or_else(|| KeelError::Artifact {
                name: self.name.clone(),
                reason: format!("library {name} is not deployed"),
            })?;
            code = link_library(&code, &name, *address);
        }
        decode_hex(&self.name, &code)
    }

    pub fn local_bytecode_hash(&self) -> String {
        bytecode_digest(&self.bytecode)
    }

    pub fn deployed_bytecode_hash(&self) -> String {
        bytecode_digest(&self.deployed_bytecode)
    }

    pub fn body_bytecode_hash(&self) -> String {
        bytecode_digest(body_bytecode(&self.deployed_bytecode))
    }

    pub fn constructor_code(&self) -> String {
        constructor_code(&self.bytecode, &self.deployed_bytecode)
    }

    pub fn has_constructor_inputs(&self) -> bool {
        self.abi
            .iter()
            .any(|item| item.kind == "constructor" && !item.inputs.is_empty())
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions(name).next().is_some()
    }

    /// Whether the contract exposes an `initialize`-shaped function.
    pub fn has_initializer(&self) -> bool {
        self.abi.iter().any(|item| {
            item.kind == "function"
                && item
                    .name
                    .as_deref()
                    .is_some_and(|name| name.starts_with("initialize"))
        })
    }

    fn functions<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a AbiItem> + 'a {
        self.abi
            .iter()
            .filter(move |item| item.kind == "function" && item.name.as_deref() == Some(name))
    }

    /// Calldata for `method` with already ABI-encoded `args`.
    ///
    /// `method` is either a full signature (`initialize(address)`) or a bare
    /// name that must identify exactly one function in the ABI.
    pub fn encode_call(&self, method: &str, args: &Bytes) -> Result<Bytes> {
        let signature = if method.contains('(') {
            method.replace(' ', "")
        } else {
            let mut candidates = self.functions(method);
            match (candidates.next(), candidates.next()) {
                (Some(item), None) => item.signature(),
                (None, _) => {
                    return Err(KeelError::InvalidRequest(format!(
                        "contract {} has no function {}",
                        self.name, method
                    )));
                }
                (Some(_), Some(_)) => {
                    return Err(KeelError::InvalidRequest(format!(
                        "function {} of {} is overloaded; pass the full signature",
                        method, self.name
                    )));
                }
            }
        };

        let mut data = keccak256(signature.as_bytes())[..4].to_vec();
        data.extend_from_slice(args);
        Ok(data.into())
    }
}

fn decode_hex(name: &str, code: &str) -> Result<Bytes> {
    hex::decode(code.trim_start_matches("0x"))
        .map(Bytes::from)
        .map_err(|e| KeelError::Artifact {
            name: name.to_string(),
            reason: format!("invalid bytecode: {e}"),
        })
}

/// Bytecode may only hold hex digits and placeholder characters.
fn check_bytecode_chars(name: &str, code: &str) -> Result<()> {
    let body = code.trim_start_matches("0x");
    match body
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '/' | '.' | ':' | '-')))
    {
        Some(c) => Err(KeelError::Artifact {
            name: name.to_string(),
            reason: format!("invalid character {c:?} in bytecode"),
        }),
        None => Ok(()),
    }
}

/// Library names referenced by `__Name____` placeholders, in order of first appearance.
pub fn library_placeholders(bytecode: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut rest = bytecode;
    while let Some(start) = rest.find("__") {
        let candidate = &rest[start..];
        let Some(placeholder) = candidate.get(..PLACEHOLDER_LEN) else {
            break;
        };
        let name = placeholder_name(placeholder);
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
        rest = &candidate[PLACEHOLDER_LEN..];
    }
    names
}

/// `__contracts/Math.sol:SafeMath_________` -> `SafeMath`
fn placeholder_name(placeholder: &str) -> String {
    let trimmed = placeholder.trim_matches('_');
    trimmed.rsplit(':').next().unwrap_or(trimmed).to_string()
}

pub fn has_unlinked_libraries(bytecode: &str) -> bool {
    !library_placeholders(bytecode).is_empty()
}

/// Replace every placeholder for `name` with `address`.
pub fn link_library(bytecode: &str, name: &str, address: Address) -> String {
    let replacement = hex::encode(address);
    let mut linked = String::with_capacity(bytecode.len());
    let mut rest = bytecode;
    while let Some(start) = rest.find("__") {
        let candidate = &rest[start..];
        let Some(placeholder) = candidate.get(..PLACEHOLDER_LEN) else {
            break;
        };
        linked.push_str(&rest[..start]);
        if placeholder_name(placeholder) == name {
            linked.push_str(&replacement);
        } else {
            linked.push_str(placeholder);
        }
        rest = &candidate[PLACEHOLDER_LEN..];
    }
    linked.push_str(rest);
    linked
}

/// Stable digest of a hex bytecode string.
pub fn bytecode_digest(bytecode: &str) -> String {
    let normalized = bytecode.trim_start_matches("0x").to_ascii_lowercase();
    blake3::hash(normalized.as_bytes()).to_hex().to_string()
}

/// Runtime bytecode without the trailing solc CBOR metadata.
///
/// The last two bytes hold the metadata length; the metadata itself starts
/// with a CBOR map header (`a1`/`a2`).
pub fn body_bytecode(deployed: &str) -> &str {
    let code = deployed.trim_start_matches("0x");
    if !code.is_ascii() || code.len() < 4 || code.len() % 2 != 0 {
        return code;
    }
    let Ok(length) = usize::from_str_radix(&code[code.len() - 4..], 16) else {
        return code;
    };
    let metadata_chars = (length + 2) * 2;
    if metadata_chars > code.len() {
        return code;
    }
    let body = &code[..code.len() - metadata_chars];
    match code.get(body.len()..body.len() + 2) {
        Some("a1" | "a2" | "a3" | "a4") => body,
        _ => code,
    }
}

/// The part of the creation bytecode that precedes the runtime body.
pub fn constructor_code(bytecode: &str, deployed: &str) -> String {
    let code = bytecode.trim_start_matches("0x");
    let body = body_bytecode(deployed);
    if body.is_empty() {
        return code.to_string();
    }
    match code.find(body) {
        Some(index) => code[..index].to_string(),
        None => code.to_string(),
    }
}

/// Source of compiled contract descriptors.
pub trait ArtifactProvider {
    fn contract(&self, name: &str) -> Result<ContractDescriptor>;
}

/// Reads `<Name>.json` artifacts from a build directory, then from fallbacks.
#[derive(Debug, Clone)]
pub struct BuildDirArtifacts {
    dirs: Vec<PathBuf>,
}

impl BuildDirArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dirs: vec![dir.into()],
        }
    }

    /// Directory searched when the primary build directory lacks an artifact.
    pub fn with_fallback(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dirs.push(dir.into());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dirs[0]
    }

    fn read(path: &Path, name: &str) -> Result<ContractDescriptor> {
        let bytes = fs::read(path).map_err(|e| KeelError::Artifact {
            name: name.to_string(),
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        let mut descriptor: ContractDescriptor =
            serde_json::from_slice(&bytes).map_err(|e| KeelError::Artifact {
                name: name.to_string(),
                reason: format!("failed to parse {}: {}", path.display(), e),
            })?;
        for code in [&descriptor.bytecode, &descriptor.deployed_bytecode] {
            check_bytecode_chars(name, code)?;
        }
        if descriptor.source_path.is_none() {
            descriptor.source_path = Some(path.display().to_string());
        }
        Ok(descriptor)
    }
}

impl ArtifactProvider for BuildDirArtifacts {
    fn contract(&self, name: &str) -> Result<ContractDescriptor> {
        let file = format!("{name}.json");
        match self.dirs.iter().map(|dir| dir.join(&file)).find(|p| p.exists()) {
            Some(path) => Self::read(&path, name),
            None => Err(KeelError::Artifact {
                name: name.to_string(),
                reason: format!("no {} in {}", file, self.dir().display()),
            }),
        }
    }
}

/// In-memory artifacts.
#[derive(Debug, Clone, Default)]
pub struct StaticArtifacts {
    contracts: BTreeMap<String, ContractDescriptor>,
}

impl StaticArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, descriptor: ContractDescriptor) -> Self {
        self.insert(descriptor);
        self
    }

    pub fn insert(&mut self, descriptor: ContractDescriptor) {
        self.contracts.insert(descriptor.name.clone(), descriptor);
    }
}

impl ArtifactProvider for StaticArtifacts {
    fn contract(&self, name: &str) -> Result<ContractDescriptor> {
        self.contracts
            .get(name)
            .cloned()
            .ok_or_else(|| KeelError::Artifact {
                name: name.to_string(),
                reason: "not compiled".to_string(),
            })
    }
}
