//! Typed wrappers for the system contracts a project deploys.
//!
//! Calldata is built with `alloy_sol_types::sol!` bindings; the wrappers only
//! pair an address with a chain client.

use alloy_primitives::{Address, B256, Bytes, U256, b256};
use alloy_sol_types::{SolCall, SolEvent, SolValue, sol};

use super::{ChainClient, ChainError, TransactionReceipt};

/// Storage slot holding the implementation address of an EIP-1967 proxy.
pub const IMPLEMENTATION_SLOT: B256 =
    b256!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

/// Storage slot holding the admin address of an EIP-1967 proxy.
pub const ADMIN_SLOT: B256 =
    b256!("b53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103");

/// Artifact names of the system contracts.
pub const PROXY_CONTRACT: &str = "AdminUpgradeabilityProxy";
pub const PROXY_ADMIN_CONTRACT: &str = "ProxyAdmin";
pub const PROXY_FACTORY_CONTRACT: &str = "ProxyFactory";
pub const APP_CONTRACT: &str = "App";
pub const PACKAGE_CONTRACT: &str = "Package";
pub const DIRECTORY_CONTRACT: &str = "ImplementationDirectory";

sol! {
    interface IProxyAdmin {
        function owner() external view returns (address);
        function transferOwnership(address newOwner) external;
        function changeProxyAdmin(address proxy, address newAdmin) external;
        function upgrade(address proxy, address implementation) external;
        function upgradeAndCall(address proxy, address implementation, bytes data) external payable;
    }

    interface IProxyFactory {
        event ProxyCreated(address proxy);
        function deployMinimal(address logic, bytes data) external returns (address);
        function deploy(uint256 salt, address logic, address admin, bytes data) external returns (address);
        function deploySigned(uint256 salt, address logic, address admin, bytes data, bytes signature) external returns (address);
        function getDeploymentAddress(uint256 salt, address sender) external view returns (address);
        function getSigner(uint256 salt, address logic, address admin, bytes data, bytes signature) external view returns (address);
    }

    interface IImplementationDirectory {
        function getImplementation(string contractName) external view returns (address);
        function setImplementation(string contractName, address implementation) external;
        function unsetImplementation(string contractName) external;
        function freeze() external;
        function frozen() external view returns (bool);
    }

    interface IPackage {
        function addVersion(uint64[3] semanticVersion, address contractAddress, bytes contentURI) external;
        function hasVersion(uint64[3] semanticVersion) external view returns (bool);
        function getContract(uint64[3] semanticVersion) external view returns (address);
    }

    interface IApp {
        function getPackage(string packageName) external view returns (address, uint64[3]);
        function setPackage(string packageName, address package, uint64[3] version) external;
        function unsetPackage(string packageName) external;
        function getImplementation(string packageName, string contractName) external view returns (address);
    }
}

/// Constructor arguments of an upgradeable proxy: `(logic, admin, data)`.
pub fn proxy_constructor_args(logic: Address, admin: Address, data: &Bytes) -> Vec<u8> {
    (logic, admin, data.clone()).abi_encode_params()
}

/// Address announced by a `ProxyCreated` event in `receipt`, if any.
pub fn created_proxy(receipt: &TransactionReceipt) -> Option<Address> {
    receipt.logs.iter().find_map(|log| {
        let is_created = log.topics.first() == Some(&IProxyFactory::ProxyCreated::SIGNATURE_HASH);
        (is_created && log.data.len() >= 32).then(|| Address::from_slice(&log.data[12..32]))
    })
}

async fn call_decode<C, T>(chain: &C, to: Address, call: T) -> Result<T::Return, ChainError>
where
    C: ChainClient,
    T: SolCall,
{
    let output = chain.call(to, call.abi_encode().into()).await?;
    T::abi_decode_returns(&output, true)
        .map_err(|e| ChainError::Decode(format!("{} output: {}", T::SIGNATURE, e)))
}

async fn send_call<C, T>(chain: &C, to: Address, call: T) -> Result<TransactionReceipt, ChainError>
where
    C: ChainClient,
    T: SolCall,
{
    chain.send(to, call.abi_encode().into()).await
}

/// Read the implementation and admin slots of an EIP-1967 proxy.
pub async fn proxy_slots<C: ChainClient>(
    chain: &C,
    proxy: Address,
) -> Result<(Address, Address), ChainError> {
    let implementation = chain.get_storage_at(proxy, IMPLEMENTATION_SLOT).await?;
    let admin = chain.get_storage_at(proxy, ADMIN_SLOT).await?;
    Ok((Address::from_word(implementation), Address::from_word(admin)))
}

/// The `ProxyAdmin` owning a project's upgradeable proxies.
pub struct ProxyAdminContract<'a, C> {
    pub address: Address,
    chain: &'a C,
}

impl<'a, C: ChainClient> ProxyAdminContract<'a, C> {
    pub fn new(address: Address, chain: &'a C) -> Self {
        Self { address, chain }
    }

    pub async fn owner(&self) -> Result<Address, ChainError> {
        Ok(call_decode(self.chain, self.address, IProxyAdmin::ownerCall {})
            .await?
            ._0)
    }

    pub async fn transfer_ownership(&self, new_owner: Address) -> Result<(), ChainError> {
        send_call(
            self.chain,
            self.address,
            IProxyAdmin::transferOwnershipCall { newOwner: new_owner },
        )
        .await?;
        Ok(())
    }

    pub async fn change_proxy_admin(&self, proxy: Address, new_admin: Address) -> Result<(), ChainError> {
        send_call(
            self.chain,
            self.address,
            IProxyAdmin::changeProxyAdminCall {
                proxy,
                newAdmin: new_admin,
            },
        )
        .await?;
        Ok(())
    }

    /// Point `proxy` at `implementation`, calling `data` on it atomically when non-empty.
    pub async fn upgrade(&self, proxy: Address, implementation: Address, data: Bytes) -> Result<(), ChainError> {
        if data.is_empty() {
            send_call(
                self.chain,
                self.address,
                IProxyAdmin::upgradeCall {
                    proxy,
                    implementation,
                },
            )
            .await?;
        } else {
            send_call(
                self.chain,
                self.address,
                IProxyAdmin::upgradeAndCallCall {
                    proxy,
                    implementation,
                    data,
                },
            )
            .await?;
        }
        Ok(())
    }
}

/// Factory for minimal clones and salted (CREATE2) proxies.
pub struct ProxyFactoryContract<'a, C> {
    pub address: Address,
    chain: &'a C,
}

impl<'a, C: ChainClient> ProxyFactoryContract<'a, C> {
    pub fn new(address: Address, chain: &'a C) -> Self {
        Self { address, chain }
    }

    pub async fn deployment_address(&self, salt: U256, sender: Address) -> Result<Address, ChainError> {
        Ok(call_decode(
            self.chain,
            self.address,
            IProxyFactory::getDeploymentAddressCall { salt, sender },
        )
        .await?
        ._0)
    }

    pub async fn signer(
        &self,
        salt: U256,
        logic: Address,
        admin: Address,
        data: Bytes,
        signature: Bytes,
    ) -> Result<Address, ChainError> {
        Ok(call_decode(
            self.chain,
            self.address,
            IProxyFactory::getSignerCall {
                salt,
                logic,
                admin,
                data,
                signature,
            },
        )
        .await?
        ._0)
    }

    pub async fn deploy_minimal(&self, logic: Address, data: Bytes) -> Result<TransactionReceipt, ChainError> {
        send_call(
            self.chain,
            self.address,
            IProxyFactory::deployMinimalCall { logic, data },
        )
        .await
    }

    pub async fn deploy(
        &self,
        salt: U256,
        logic: Address,
        admin: Address,
        data: Bytes,
        signature: Option<Bytes>,
    ) -> Result<TransactionReceipt, ChainError> {
        match signature {
            Some(signature) => {
                send_call(
                    self.chain,
                    self.address,
                    IProxyFactory::deploySignedCall {
                        salt,
                        logic,
                        admin,
                        data,
                        signature,
                    },
                )
                .await
            }
            None => {
                send_call(
                    self.chain,
                    self.address,
                    IProxyFactory::deployCall {
                        salt,
                        logic,
                        admin,
                        data,
                    },
                )
                .await
            }
        }
    }
}

/// Per-version registry of implementation addresses.
pub struct DirectoryContract<'a, C> {
    pub address: Address,
    chain: &'a C,
}

impl<'a, C: ChainClient> DirectoryContract<'a, C> {
    pub fn new(address: Address, chain: &'a C) -> Self {
        Self { address, chain }
    }

    pub async fn implementation(&self, contract_name: &str) -> Result<Address, ChainError> {
        Ok(call_decode(
            self.chain,
            self.address,
            IImplementationDirectory::getImplementationCall {
                contractName: contract_name.to_string(),
            },
        )
        .await?
        ._0)
    }

    pub async fn set_implementation(&self, contract_name: &str, implementation: Address) -> Result<(), ChainError> {
        send_call(
            self.chain,
            self.address,
            IImplementationDirectory::setImplementationCall {
                contractName: contract_name.to_string(),
                implementation,
            },
        )
        .await?;
        Ok(())
    }

    pub async fn unset_implementation(&self, contract_name: &str) -> Result<(), ChainError> {
        send_call(
            self.chain,
            self.address,
            IImplementationDirectory::unsetImplementationCall {
                contractName: contract_name.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    pub async fn frozen(&self) -> Result<bool, ChainError> {
        Ok(call_decode(self.chain, self.address, IImplementationDirectory::frozenCall {})
            .await?
            ._0)
    }

    pub async fn freeze(&self) -> Result<(), ChainError> {
        send_call(self.chain, self.address, IImplementationDirectory::freezeCall {}).await?;
        Ok(())
    }
}

/// Registry mapping semantic versions to directories.
pub struct PackageContract<'a, C> {
    pub address: Address,
    chain: &'a C,
}

impl<'a, C: ChainClient> PackageContract<'a, C> {
    pub fn new(address: Address, chain: &'a C) -> Self {
        Self { address, chain }
    }

    pub async fn has_version(&self, version: [u64; 3]) -> Result<bool, ChainError> {
        Ok(call_decode(
            self.chain,
            self.address,
            IPackage::hasVersionCall {
                semanticVersion: version,
            },
        )
        .await?
        ._0)
    }

    /// Directory registered for `version`.
    pub async fn contract(&self, version: [u64; 3]) -> Result<Address, ChainError> {
        Ok(call_decode(
            self.chain,
            self.address,
            IPackage::getContractCall {
                semanticVersion: version,
            },
        )
        .await?
        ._0)
    }

    pub async fn add_version(&self, version: [u64; 3], directory: Address) -> Result<(), ChainError> {
        send_call(
            self.chain,
            self.address,
            IPackage::addVersionCall {
                semanticVersion: version,
                contractAddress: directory,
                contentURI: Bytes::new(),
            },
        )
        .await?;
        Ok(())
    }
}

/// The app container linking a project's package and its dependencies.
pub struct AppContract<'a, C> {
    pub address: Address,
    chain: &'a C,
}

impl<'a, C: ChainClient> AppContract<'a, C> {
    pub fn new(address: Address, chain: &'a C) -> Self {
        Self { address, chain }
    }

    /// Package address and version registered under `name` (zero address when unset).
    pub async fn package(&self, name: &str) -> Result<(Address, [u64; 3]), ChainError> {
        let output = call_decode(
            self.chain,
            self.address,
            IApp::getPackageCall {
                packageName: name.to_string(),
            },
        )
        .await?;
        Ok((output._0, output._1))
    }

    pub async fn set_package(&self, name: &str, package: Address, version: [u64; 3]) -> Result<(), ChainError> {
        send_call(
            self.chain,
            self.address,
            IApp::setPackageCall {
                packageName: name.to_string(),
                package,
                version,
            },
        )
        .await?;
        Ok(())
    }

    pub async fn unset_package(&self, name: &str) -> Result<(), ChainError> {
        send_call(
            self.chain,
            self.address,
            IApp::unsetPackageCall {
                packageName: name.to_string(),
            },
        )
        .await?;
        Ok(())
    }
}
