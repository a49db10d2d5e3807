//! In-memory chain emulating the system contracts a project deploys.

use std::cell::RefCell;
use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, Bytes, U256, hex, keccak256};
use alloy_sol_types::{SolCall, SolEvent};

use keel_core::chain::contracts::{
    ADMIN_SLOT, IApp, IImplementationDirectory, IMPLEMENTATION_SLOT, IPackage, IProxyAdmin,
    IProxyFactory,
};
use keel_core::chain::{ChainClient, ChainError, Log, TransactionReceipt};

use super::fixtures;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SystemKind {
    ProxyAdmin,
    Factory,
    Proxy,
    App,
    Package,
    Directory,
}

#[derive(Debug, Clone)]
enum Account {
    Code,
    ProxyAdmin { owner: Address },
    Factory,
    Proxy,
    App { packages: BTreeMap<String, (Address, [u64; 3])> },
    Package { versions: BTreeMap<[u64; 3], Address> },
    Directory { implementations: BTreeMap<String, Address>, frozen: bool },
}

#[derive(Debug, Default)]
struct State {
    next_address: u64,
    accounts: BTreeMap<Address, Account>,
    code: BTreeMap<Address, Bytes>,
    storage: BTreeMap<(Address, B256), B256>,
    transactions: usize,
    deployed: Vec<Bytes>,
    failing_code: Vec<Vec<u8>>,
}

impl State {
    fn allocate(&mut self) -> Address {
        self.next_address += 1;
        Address::from_word(B256::from(U256::from(0x1000 + self.next_address)))
    }

    fn slot(&self, address: Address, slot: B256) -> Address {
        Address::from_word(self.storage.get(&(address, slot)).copied().unwrap_or_default())
    }

    fn create_proxy(&mut self, address: Address, code: Bytes, logic: Address, admin: Address) {
        self.accounts.insert(address, Account::Proxy);
        self.code.insert(address, code);
        self.storage.insert((address, IMPLEMENTATION_SLOT), logic.into_word());
        self.storage.insert((address, ADMIN_SLOT), admin.into_word());
    }
}

/// A single-account chain. Deployments get sequential addresses; the system
/// contracts are recognised by their fixture bytecode.
pub struct MockChain {
    sender: Address,
    system: Vec<(Vec<u8>, SystemKind)>,
    state: RefCell<State>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        let system = [
            (fixtures::PROXY_ADMIN_CODE, SystemKind::ProxyAdmin),
            (fixtures::PROXY_FACTORY_CODE, SystemKind::Factory),
            (fixtures::PROXY_CODE, SystemKind::Proxy),
            (fixtures::APP_CODE, SystemKind::App),
            (fixtures::PACKAGE_CODE, SystemKind::Package),
            (fixtures::DIRECTORY_CODE, SystemKind::Directory),
        ]
        .into_iter()
        .map(|(code, kind)| (decode_hex(code), kind))
        .collect();
        Self {
            sender: Address::repeat_byte(0xee),
            system,
            state: RefCell::new(State::default()),
        }
    }

    /// Deployments and transactions sent so far.
    pub fn transactions(&self) -> usize {
        self.state.borrow().transactions
    }

    /// Number of deployments whose init code starts with `code`.
    pub fn deployments_of(&self, code: &str) -> usize {
        let code = decode_hex(code);
        self.state
            .borrow()
            .deployed
            .iter()
            .filter(|init| init.starts_with(&code))
            .count()
    }

    /// Make every deployment starting with `code` revert.
    pub fn fail_deployments_of(&self, code: &str) {
        self.state.borrow_mut().failing_code.push(decode_hex(code));
    }

    /// Put code at `address`, as if someone else deployed there.
    pub fn put_code(&self, address: Address) {
        let mut state = self.state.borrow_mut();
        state.accounts.insert(address, Account::Code);
        state.code.insert(address, Bytes::from_static(&[0x60, 0x00]));
    }

    pub fn implementation_of(&self, proxy: Address) -> Address {
        self.state.borrow().slot(proxy, IMPLEMENTATION_SLOT)
    }

    pub fn admin_of(&self, proxy: Address) -> Address {
        self.state.borrow().slot(proxy, ADMIN_SLOT)
    }

    pub fn registered_implementation(&self, directory: Address, alias: &str) -> Option<Address> {
        match self.state.borrow().accounts.get(&directory) {
            Some(Account::Directory { implementations, .. }) => implementations.get(alias).copied(),
            _ => None,
        }
    }

    pub fn directory_frozen(&self, directory: Address) -> bool {
        matches!(
            self.state.borrow().accounts.get(&directory),
            Some(Account::Directory { frozen: true, .. })
        )
    }

    pub fn linked_package(&self, app: Address, name: &str) -> Option<(Address, [u64; 3])> {
        match self.state.borrow().accounts.get(&app) {
            Some(Account::App { packages }) => packages.get(name).copied(),
            _ => None,
        }
    }

    /// Address the factory assigns to `salt` deployed by `sender`.
    pub fn salted_address(salt: U256, sender: Address) -> Address {
        let mut preimage = salt.to_be_bytes::<32>().to_vec();
        preimage.extend_from_slice(sender.as_slice());
        Address::from_slice(&keccak256(&preimage)[12..])
    }

    fn system_kind(&self, init_code: &[u8]) -> Option<(SystemKind, usize)> {
        self.system
            .iter()
            .find(|(code, _)| init_code.starts_with(code))
            .map(|(code, kind)| (*kind, code.len()))
    }

    fn receipt(&self, logs: Vec<Log>) -> TransactionReceipt {
        let count = self.state.borrow().transactions as u64;
        TransactionReceipt {
            transaction_hash: keccak256(count.to_be_bytes()),
            contract_address: None,
            logs,
        }
    }

    fn execute(&self, to: Address, data: &[u8]) -> Result<Vec<Log>, ChainError> {
        let mut state = self.state.borrow_mut();
        let selector = selector(data)?;
        let account = state
            .accounts
            .get(&to)
            .cloned()
            .ok_or_else(|| revert(format!("no contract at {to}")))?;

        match account {
            Account::ProxyAdmin { .. } => {
                if selector == IProxyAdmin::transferOwnershipCall::SELECTOR {
                    let call = decode::<IProxyAdmin::transferOwnershipCall>(data)?;
                    state.accounts.insert(
                        to,
                        Account::ProxyAdmin {
                            owner: call.newOwner,
                        },
                    );
                } else if selector == IProxyAdmin::changeProxyAdminCall::SELECTOR {
                    let call = decode::<IProxyAdmin::changeProxyAdminCall>(data)?;
                    ensure_admin(&state, call.proxy, to)?;
                    state.storage.insert((call.proxy, ADMIN_SLOT), call.newAdmin.into_word());
                } else if selector == IProxyAdmin::upgradeCall::SELECTOR {
                    let call = decode::<IProxyAdmin::upgradeCall>(data)?;
                    ensure_admin(&state, call.proxy, to)?;
                    state
                        .storage
                        .insert((call.proxy, IMPLEMENTATION_SLOT), call.implementation.into_word());
                } else if selector == IProxyAdmin::upgradeAndCallCall::SELECTOR {
                    let call = decode::<IProxyAdmin::upgradeAndCallCall>(data)?;
                    ensure_admin(&state, call.proxy, to)?;
                    state
                        .storage
                        .insert((call.proxy, IMPLEMENTATION_SLOT), call.implementation.into_word());
                } else {
                    return Err(revert("unknown ProxyAdmin function"));
                }
                Ok(Vec::new())
            }
            Account::Factory => {
                let proxy = if selector == IProxyFactory::deployMinimalCall::SELECTOR {
                    let call = decode::<IProxyFactory::deployMinimalCall>(data)?;
                    let address = state.allocate();
                    state.create_proxy(address, Bytes::from_static(&[0x36, 0x3d]), call.logic, Address::ZERO);
                    address
                } else if selector == IProxyFactory::deployCall::SELECTOR {
                    let call = decode::<IProxyFactory::deployCall>(data)?;
                    self.deploy_salted(&mut state, call.salt, call.logic, call.admin)?
                } else if selector == IProxyFactory::deploySignedCall::SELECTOR {
                    let call = decode::<IProxyFactory::deploySignedCall>(data)?;
                    self.deploy_salted(&mut state, call.salt, call.logic, call.admin)?
                } else {
                    return Err(revert("unknown ProxyFactory function"));
                };
                Ok(vec![Log {
                    address: to,
                    topics: vec![IProxyFactory::ProxyCreated::SIGNATURE_HASH],
                    data: IProxyFactory::ProxyCreated { proxy }.encode_data().into(),
                }])
            }
            Account::Directory {
                mut implementations,
                mut frozen,
            } => {
                if selector == IImplementationDirectory::setImplementationCall::SELECTOR {
                    if frozen {
                        return Err(revert("directory is frozen"));
                    }
                    let call = decode::<IImplementationDirectory::setImplementationCall>(data)?;
                    implementations.insert(call.contractName, call.implementation);
                } else if selector == IImplementationDirectory::unsetImplementationCall::SELECTOR {
                    if frozen {
                        return Err(revert("directory is frozen"));
                    }
                    let call = decode::<IImplementationDirectory::unsetImplementationCall>(data)?;
                    implementations.remove(&call.contractName);
                } else if selector == IImplementationDirectory::freezeCall::SELECTOR {
                    frozen = true;
                } else {
                    return Err(revert("unknown ImplementationDirectory function"));
                }
                state.accounts.insert(
                    to,
                    Account::Directory {
                        implementations,
                        frozen,
                    },
                );
                Ok(Vec::new())
            }
            Account::Package { mut versions } => {
                if selector != IPackage::addVersionCall::SELECTOR {
                    return Err(revert("unknown Package function"));
                }
                let call = decode::<IPackage::addVersionCall>(data)?;
                if versions.contains_key(&call.semanticVersion) {
                    return Err(revert("version already exists"));
                }
                versions.insert(call.semanticVersion, call.contractAddress);
                state.accounts.insert(to, Account::Package { versions });
                Ok(Vec::new())
            }
            Account::App { mut packages } => {
                if selector == IApp::setPackageCall::SELECTOR {
                    let call = decode::<IApp::setPackageCall>(data)?;
                    packages.insert(call.packageName, (call.package, call.version));
                } else if selector == IApp::unsetPackageCall::SELECTOR {
                    let call = decode::<IApp::unsetPackageCall>(data)?;
                    packages.remove(&call.packageName);
                } else {
                    return Err(revert("unknown App function"));
                }
                state.accounts.insert(to, Account::App { packages });
                Ok(Vec::new())
            }
            // Initializer calls on plain instances and proxies succeed.
            Account::Code | Account::Proxy => Ok(Vec::new()),
        }
    }

    fn deploy_salted(
        &self,
        state: &mut State,
        salt: U256,
        logic: Address,
        admin: Address,
    ) -> Result<Address, ChainError> {
        let address = Self::salted_address(salt, self.sender);
        if state.code.contains_key(&address) {
            return Err(revert("salt already used"));
        }
        state.create_proxy(address, decode_hex(fixtures::PROXY_CODE).into(), logic, admin);
        Ok(address)
    }

    fn read(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, ChainError> {
        let state = self.state.borrow();
        let selector = selector(data)?;
        let account = state
            .accounts
            .get(&to)
            .ok_or_else(|| revert(format!("no contract at {to}")))?;

        match account {
            Account::ProxyAdmin { owner } if selector == IProxyAdmin::ownerCall::SELECTOR => {
                Ok(IProxyAdmin::ownerCall::abi_encode_returns(&(*owner,)))
            }
            Account::Factory if selector == IProxyFactory::getDeploymentAddressCall::SELECTOR => {
                let call = decode::<IProxyFactory::getDeploymentAddressCall>(data)?;
                let address = Self::salted_address(call.salt, call.sender);
                Ok(IProxyFactory::getDeploymentAddressCall::abi_encode_returns(&(address,)))
            }
            Account::Factory if selector == IProxyFactory::getSignerCall::SELECTOR => {
                Ok(IProxyFactory::getSignerCall::abi_encode_returns(&(self.sender,)))
            }
            Account::Directory {
                implementations, ..
            } if selector == IImplementationDirectory::getImplementationCall::SELECTOR => {
                let call = decode::<IImplementationDirectory::getImplementationCall>(data)?;
                let implementation = implementations
                    .get(&call.contractName)
                    .copied()
                    .unwrap_or(Address::ZERO);
                Ok(IImplementationDirectory::getImplementationCall::abi_encode_returns(&(
                    implementation,
                )))
            }
            Account::Directory { frozen, .. }
                if selector == IImplementationDirectory::frozenCall::SELECTOR =>
            {
                Ok(IImplementationDirectory::frozenCall::abi_encode_returns(&(*frozen,)))
            }
            Account::Package { versions } if selector == IPackage::hasVersionCall::SELECTOR => {
                let call = decode::<IPackage::hasVersionCall>(data)?;
                let found = versions.contains_key(&call.semanticVersion);
                Ok(IPackage::hasVersionCall::abi_encode_returns(&(found,)))
            }
            Account::Package { versions } if selector == IPackage::getContractCall::SELECTOR => {
                let call = decode::<IPackage::getContractCall>(data)?;
                let directory = versions
                    .get(&call.semanticVersion)
                    .copied()
                    .unwrap_or(Address::ZERO);
                Ok(IPackage::getContractCall::abi_encode_returns(&(directory,)))
            }
            Account::App { packages } if selector == IApp::getPackageCall::SELECTOR => {
                let call = decode::<IApp::getPackageCall>(data)?;
                let (package, version) = packages
                    .get(&call.packageName)
                    .copied()
                    .unwrap_or((Address::ZERO, [0; 3]));
                Ok(IApp::getPackageCall::abi_encode_returns(&(package, version)))
            }
            _ => Err(revert("unsupported call")),
        }
    }
}

impl ChainClient for MockChain {
    async fn network_id(&self) -> Result<u64, ChainError> {
        Ok(1337)
    }

    fn default_sender(&self) -> Address {
        self.sender
    }

    async fn deploy(&self, init_code: Bytes) -> Result<Address, ChainError> {
        let kind = self.system_kind(&init_code);
        let mut state = self.state.borrow_mut();
        state.transactions += 1;
        if state
            .failing_code
            .iter()
            .any(|code| init_code.starts_with(code))
        {
            return Err(revert("deployment failed"));
        }
        state.deployed.push(init_code.clone());

        let address = state.allocate();
        match kind {
            Some((SystemKind::Proxy, prefix)) => {
                let args = &init_code[prefix..];
                if args.len() < 64 {
                    return Err(revert("missing proxy constructor arguments"));
                }
                let logic = Address::from_slice(&args[12..32]);
                let admin = Address::from_slice(&args[44..64]);
                state.create_proxy(address, init_code.clone(), logic, admin);
                return Ok(address);
            }
            Some((SystemKind::ProxyAdmin, _)) => {
                state.accounts.insert(address, Account::ProxyAdmin { owner: self.sender });
            }
            Some((SystemKind::Factory, _)) => {
                state.accounts.insert(address, Account::Factory);
            }
            Some((SystemKind::App, _)) => {
                state.accounts.insert(
                    address,
                    Account::App {
                        packages: BTreeMap::new(),
                    },
                );
            }
            Some((SystemKind::Package, _)) => {
                state.accounts.insert(
                    address,
                    Account::Package {
                        versions: BTreeMap::new(),
                    },
                );
            }
            Some((SystemKind::Directory, _)) => {
                state.accounts.insert(
                    address,
                    Account::Directory {
                        implementations: BTreeMap::new(),
                        frozen: false,
                    },
                );
            }
            None => {
                state.accounts.insert(address, Account::Code);
            }
        }
        state.code.insert(address, init_code);
        Ok(address)
    }

    async fn send(&self, to: Address, data: Bytes) -> Result<TransactionReceipt, ChainError> {
        self.state.borrow_mut().transactions += 1;
        let logs = self.execute(to, &data)?;
        Ok(self.receipt(logs))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        self.read(to, &data).map(Bytes::from)
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ChainError> {
        Ok(self
            .state
            .borrow()
            .code
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_storage_at(&self, address: Address, slot: B256) -> Result<B256, ChainError> {
        Ok(self
            .state
            .borrow()
            .storage
            .get(&(address, slot))
            .copied()
            .unwrap_or_default())
    }
}

fn decode_hex(code: &str) -> Vec<u8> {
    hex::decode(code.trim_start_matches("0x")).unwrap()
}

fn revert(reason: impl Into<String>) -> ChainError {
    ChainError::Reverted(reason.into())
}

fn selector(data: &[u8]) -> Result<[u8; 4], ChainError> {
    data.get(..4)
        .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
        .ok_or_else(|| revert("missing function selector"))
}

fn decode<T: SolCall>(data: &[u8]) -> Result<T, ChainError> {
    T::abi_decode(data, true).map_err(|e| ChainError::Decode(e.to_string()))
}

fn ensure_admin(state: &State, proxy: Address, admin: Address) -> Result<(), ChainError> {
    if state.slot(proxy, ADMIN_SLOT) == admin {
        Ok(())
    } else {
        Err(revert(format!("{admin} is not the admin of {proxy}")))
    }
}
