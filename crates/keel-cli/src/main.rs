//! Keel - upgradeable smart contract project manager
//!
//! Usage:
//!   keel init demo            # Create keel.toml
//!   keel add Token            # Track a compiled contract
//!   keel push -n dev          # Bring a network in line with the manifest
//!   keel create Token -n dev  # Create a proxy
//!   keel status -n dev        # Compare manifest and network

use std::path::PathBuf;

use alloy_primitives::{Address, Bytes, U256};
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use semver::Version;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use keel_core::commands::status::{ContractState, DependencyState};
use keel_core::commands::{
    AddCommand, AddOptions, BumpCommand, CreateCommand, FreezeCommand, InitCommand, InitOptions,
    LinkCommand, LinkOptions, PushCommand, PushCommandOptions, RemoveCommand, SetAdminCommand,
    SetAdminTarget, StatusCommand, StatusReport, UnlinkCommand, UpgradeCommand,
};
use keel_core::context::{AppContext, NetworkTarget};
use keel_core::proxy::{CreateProxyRequest, InitCall, ProxyReport, UpgradeRequest};
use keel_core::reconciler::{PushOptions, PushReport};
use keel_core::snapshot::{ProxyFilter, ProxyRecord};
use keel_core::types::{ContractKey, ProxyKind};

#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Upgradeable smart contract project manager", long_about = None)]
struct Cli {
    /// Project directory (defaults to the current directory)
    #[arg(long, global = true, env = "KEEL_PROJECT_DIR")]
    project_dir: Option<PathBuf>,

    /// Directory holding compiled contract artifacts
    #[arg(long, global = true)]
    build_dir: Option<PathBuf>,

    /// Directory holding the ProxyAdmin, App and other system contract artifacts
    #[arg(long, global = true, env = "KEEL_SYSTEM_ARTIFACTS")]
    system_artifacts: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create keel.toml for a new project
    Init {
        /// Project name (defaults to the directory name)
        name: Option<String>,
        /// Initial version
        #[arg(long, default_value = "0.1.0")]
        version: Version,
        /// Publish the project as an on-chain package
        #[arg(long)]
        publish: bool,
        /// Overwrite an existing keel.toml
        #[arg(long, short)]
        force: bool,
    },

    /// Add compiled contracts to the project
    Add {
        /// Contracts as NAME or NAME:ALIAS
        #[arg(required = true)]
        contracts: Vec<String>,
    },

    /// Remove contracts from the project
    #[command(alias = "rm")]
    Remove {
        /// Aliases to remove
        #[arg(required = true)]
        aliases: Vec<String>,
    },

    /// Link installed packages as dependencies
    Link {
        /// Packages as NAME or NAME@RANGE
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Unlink dependencies
    Unlink {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Set the project version
    Bump {
        version: Version,
    },

    /// Deploy changed contracts and link dependencies on a network
    Push(PushArgs),

    /// Create a proxy or plain instance of a contract
    Create(Box<CreateArgs>),

    /// Upgrade proxies to the current implementations
    Upgrade(UpgradeArgs),

    /// Change proxy admins or the ProxyAdmin owner
    SetAdmin(SetAdminArgs),

    /// Freeze the current release of a published project
    Freeze {
        #[command(flatten)]
        network: NetworkArgs,
    },

    /// Compare the manifest with what a network has deployed
    Status {
        /// Network name
        #[arg(short, long, env = "KEEL_NETWORK")]
        network: String,
        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// Only show issues (non-zero exit if problems)
    Quiet,
}

#[derive(Args, Clone)]
struct NetworkArgs {
    /// Network name from the user config
    #[arg(short, long, env = "KEEL_NETWORK")]
    network: String,
    /// JSON-RPC endpoint, overriding the user config
    #[arg(long)]
    rpc_url: Option<Url>,
    /// Sender account, overriding the user config
    #[arg(long)]
    from: Option<Address>,
    /// Output format
    #[arg(short = 'o', long, default_value = "table")]
    format: OutputFormat,
}

impl NetworkArgs {
    fn target(&self) -> NetworkTarget {
        let mut target = NetworkTarget::new(&self.network);
        if let Some(url) = &self.rpc_url {
            target = target.with_rpc_url(url.clone());
        }
        if let Some(from) = self.from {
            target = target.with_from(from);
        }
        target
    }
}

#[derive(Args)]
struct PushArgs {
    #[command(flatten)]
    network: NetworkArgs,
    /// Aliases to push (defaults to every contract)
    contracts: Vec<String>,
    /// Upload every contract even when unchanged
    #[arg(long)]
    reupload: bool,
    /// Accept new validation warnings
    #[arg(long, short)]
    force: bool,
    /// Deploy dependencies missing on the network
    #[arg(long)]
    deploy_dependencies: bool,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum KindArg {
    #[default]
    Upgradeable,
    Minimal,
    Plain,
}

impl From<KindArg> for ProxyKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Upgradeable => ProxyKind::Upgradeable,
            KindArg::Minimal => ProxyKind::Minimal,
            KindArg::Plain => ProxyKind::NonProxy,
        }
    }
}

#[derive(Args)]
struct CreateArgs {
    #[command(flatten)]
    network: NetworkArgs,
    /// Contract as ALIAS or PACKAGE/ALIAS
    contract: String,
    /// Initializer to call, e.g. initialize(address,uint256)
    #[arg(long)]
    init: Option<String>,
    /// ABI-encoded initializer arguments as hex
    #[arg(long, requires = "init")]
    args: Option<Bytes>,
    /// Kind of instance to create
    #[arg(long, default_value = "upgradeable")]
    kind: KindArg,
    /// Admin of the new proxy (defaults to the project ProxyAdmin)
    #[arg(long)]
    admin: Option<Address>,
    /// Salt for a deterministic address through the ProxyFactory
    #[arg(long)]
    salt: Option<U256>,
    /// Signature authorising another account's salted deployment
    #[arg(long, requires = "salt")]
    signature: Option<Bytes>,
}

#[derive(Args)]
struct ProxySelection {
    /// Contract as ALIAS or PACKAGE/ALIAS
    contract: Option<String>,
    /// Only the proxy at this address
    #[arg(long)]
    address: Option<Address>,
    /// Every proxy in the project
    #[arg(long, conflicts_with_all = ["contract", "address"])]
    all: bool,
}

#[derive(Args)]
struct UpgradeArgs {
    #[command(flatten)]
    network: NetworkArgs,
    #[command(flatten)]
    selection: ProxySelection,
    /// Method to call after upgrading
    #[arg(long)]
    init: Option<String>,
    /// ABI-encoded arguments as hex
    #[arg(long, requires = "init")]
    args: Option<Bytes>,
}

#[derive(Args)]
struct SetAdminArgs {
    #[command(flatten)]
    network: NetworkArgs,
    #[command(flatten)]
    selection: ProxySelection,
    /// New admin address
    #[arg(long)]
    new_admin: Address,
    /// Transfer ownership of the project's ProxyAdmin instead
    #[arg(long, conflicts_with_all = ["contract", "address", "all"])]
    proxy_admin: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keel=info,keel_core=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let ctx = build_context(&cli)?;
    run(ctx, cli.command).await
}

fn build_context(cli: &Cli) -> Result<AppContext> {
    let root = match &cli.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let mut ctx = AppContext::new(root)?;
    if let Some(dir) = &cli.build_dir {
        ctx = ctx.with_build_dir(dir.clone());
    }
    if let Some(dir) = &cli.system_artifacts {
        ctx = ctx.with_system_artifacts_dir(dir.clone());
    }
    Ok(ctx)
}

async fn run(ctx: AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Init {
            name,
            version,
            publish,
            force,
        } => run_init(ctx, name, version, publish, force)?,
        Commands::Add { contracts } => run_add(ctx, &contracts)?,
        Commands::Remove { aliases } => {
            for alias in RemoveCommand::new(ctx).execute(&aliases)? {
                println!("✓ Removed {}", alias);
            }
        }
        Commands::Link { packages } => run_link(ctx, &packages)?,
        Commands::Unlink { names } => {
            for name in UnlinkCommand::new(ctx).execute(&names)? {
                println!("✓ Unlinked {}", name);
            }
        }
        Commands::Bump { version } => {
            let previous = BumpCommand::new(ctx).execute(&version)?;
            println!("✓ Bumped version {} -> {}", previous, version);
        }
        Commands::Push(args) => run_push(ctx, args).await?,
        Commands::Create(args) => run_create(ctx, *args).await?,
        Commands::Upgrade(args) => run_upgrade(ctx, args).await?,
        Commands::SetAdmin(args) => run_set_admin(ctx, args).await?,
        Commands::Freeze { network } => {
            let chain = ctx.connect(&network.target()).await?;
            let report = FreezeCommand::new(ctx).execute(&chain, &network.network).await?;
            if report.already_frozen {
                println!("• Version {} was already frozen", report.version);
            } else {
                println!("✓ Froze version {}", report.version);
            }
        }
        Commands::Status { network, format } => run_status(ctx, &network, format)?,
    }
    Ok(())
}

fn run_init(ctx: AppContext, name: Option<String>, version: Version, publish: bool, force: bool) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => ctx
            .project_root()
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Cannot derive a project name; pass one explicitly"))?,
    };
    let options = InitOptions::new(name)
        .with_version(version)
        .with_publish(publish)
        .with_force(force);
    let manifest = InitCommand::new(ctx).execute(&options)?;
    println!("✓ Initialized {} {}", manifest.name, manifest.version);
    Ok(())
}

fn run_add(ctx: AppContext, contracts: &[String]) -> Result<()> {
    let mut options = AddOptions::new();
    for spec in contracts {
        options = match spec.split_once(':') {
            Some((name, alias)) if !name.is_empty() && !alias.is_empty() => {
                options.with_aliased_contract(alias, name)
            }
            Some(_) => anyhow::bail!("Invalid contract '{}'. Use NAME or NAME:ALIAS", spec),
            None => options.with_contract(spec),
        };
    }
    let added = AddCommand::new(ctx).execute(&options)?;
    if added.is_empty() {
        println!("• Nothing to add");
    }
    for alias in added {
        println!("✓ Added {}", alias);
    }
    Ok(())
}

fn run_link(ctx: AppContext, packages: &[String]) -> Result<()> {
    let mut links = Vec::with_capacity(packages.len());
    for package in packages {
        let (name, range) = split_name_and_range(package)?;
        let link = LinkOptions::new(name);
        links.push(match range {
            Some(range) => link.with_range(range),
            None => link,
        });
    }
    for (name, range) in LinkCommand::new(ctx).execute(&links)? {
        println!("✓ Linked {} {}", name, range);
    }
    Ok(())
}

/// Split `name@range`, keeping the leading `@` of scoped package names.
fn split_name_and_range(input: &str) -> Result<(String, Option<String>)> {
    let search_from = usize::from(input.starts_with('@'));
    match input[search_from..].rfind('@') {
        Some(index) => {
            let split = search_from + index;
            let (name, range) = (&input[..split], &input[split + 1..]);
            if range.is_empty() {
                anyhow::bail!("Missing version range after '@' in '{}'", input);
            }
            Ok((name.to_string(), Some(range.to_string())))
        }
        None => Ok((input.to_string(), None)),
    }
}

/// Resolve `ALIAS` or `PACKAGE/ALIAS` against the project's own package.
fn contract_key(spec: &str, project: &str) -> ContractKey {
    ContractKey::parse(spec).unwrap_or_else(|| ContractKey::new(project, spec))
}

fn proxy_filter(ctx: &AppContext, selection: &ProxySelection) -> Result<ProxyFilter> {
    if !selection.all && selection.contract.is_none() && selection.address.is_none() {
        anyhow::bail!("Select proxies with a contract, --address or --all");
    }
    let mut filter = ProxyFilter::all();
    if let Some(contract) = &selection.contract {
        let project = ctx.manifest_store().load()?.name;
        let key = contract_key(contract, &project);
        filter = filter.with_package(key.package).with_contract(key.contract);
    }
    if let Some(address) = selection.address {
        filter = filter.with_address(address);
    }
    Ok(filter)
}

async fn run_push(ctx: AppContext, args: PushArgs) -> Result<()> {
    let chain = ctx.connect(&args.network.target()).await?;
    let options = PushCommandOptions::new()
        .with_contracts(args.contracts.clone())
        .with_options(
            PushOptions::new()
                .with_reupload(args.reupload)
                .with_force(args.force)
                .with_deploy_dependencies(args.deploy_dependencies),
        );
    let report = PushCommand::new(ctx)
        .execute(&chain, &args.network.network, &options)
        .await?;
    print_push_report(&report, args.network.format)
}

fn print_push_report(report: &PushReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if report.nothing_to_do() {
                println!("• Nothing to do, network is up to date");
                return Ok(());
            }
            if report.version_bumped {
                println!("✓ Started a new release");
            }
            for library in &report.libraries {
                println!("✓ Uploaded library {}", library);
            }
            for contract in &report.contracts {
                println!("✓ Uploaded {}", contract);
            }
            for alias in report.removed_contracts.iter().chain(&report.removed_libraries) {
                println!("✓ Removed {}", alias);
            }
            for name in &report.linked_dependencies {
                println!("✓ Linked dependency {}", name);
            }
            for name in &report.unlinked_dependencies {
                println!("✓ Unlinked dependency {}", name);
            }
            for warning in &report.warnings {
                println!("  ⚠ {}", warning);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "libraries": report.libraries,
                "contracts": report.contracts,
                "removedContracts": report.removed_contracts,
                "removedLibraries": report.removed_libraries,
                "linkedDependencies": report.linked_dependencies,
                "unlinkedDependencies": report.unlinked_dependencies,
                "warnings": report.warnings,
                "versionBumped": report.version_bumped,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Quiet => {}
    }
    Ok(())
}

async fn run_create(ctx: AppContext, args: CreateArgs) -> Result<()> {
    let project = ctx.manifest_store().load()?.name;
    let key = contract_key(&args.contract, &project);
    let mut request = CreateProxyRequest::new(key.package, key.contract).with_kind(args.kind.into());
    if let Some(method) = &args.init {
        request = request.with_init(InitCall::new(method.clone(), args.args.clone().unwrap_or_default()));
    }
    if let Some(admin) = args.admin {
        request = request.with_admin(admin);
    }
    if let Some(salt) = args.salt {
        request = request.with_salt(salt);
    }
    if let Some(signature) = &args.signature {
        request = request.with_signature(signature.clone());
    }

    let chain = ctx.connect(&args.network.target()).await?;
    let created = CreateCommand::new(ctx)
        .execute(&chain, &args.network.network, request)
        .await?;

    match args.network.format {
        OutputFormat::Table => {
            println!(
                "✓ Created {} {} at {}",
                created.proxy.instance.kind,
                created.proxy.key(),
                created.proxy.instance.address
            );
            for warning in &created.warnings {
                println!("  ⚠ {}", warning);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "contract": created.proxy.key().to_string(),
                "address": created.proxy.instance.address.to_string(),
                "implementation": created.proxy.instance.implementation.to_string(),
                "kind": created.proxy.instance.kind.to_string(),
                "warnings": created.warnings,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Quiet => println!("{}", created.proxy.instance.address),
    }
    Ok(())
}

async fn run_upgrade(ctx: AppContext, args: UpgradeArgs) -> Result<()> {
    let mut request = UpgradeRequest::new(proxy_filter(&ctx, &args.selection)?);
    if let Some(method) = &args.init {
        request = request.with_init(InitCall::new(method.clone(), args.args.clone().unwrap_or_default()));
    }
    let chain = ctx.connect(&args.network.target()).await?;
    let report = UpgradeCommand::new(ctx)
        .execute(&chain, &args.network.network, request)
        .await?;
    print_proxy_report("Upgraded", &report, args.network.format)
}

async fn run_set_admin(ctx: AppContext, args: SetAdminArgs) -> Result<()> {
    let target = if args.proxy_admin {
        SetAdminTarget::ProxyAdminOwner
    } else {
        SetAdminTarget::Proxies(proxy_filter(&ctx, &args.selection)?)
    };
    let chain = ctx.connect(&args.network.target()).await?;
    let report = SetAdminCommand::new(ctx)
        .execute(&chain, &args.network.network, &target, args.new_admin)
        .await?;

    match report.proxies {
        Some(proxies) => print_proxy_report("Changed admin of", &proxies, args.network.format)?,
        None if report.ownership_transferred => {
            println!("✓ Transferred ProxyAdmin ownership to {}", args.new_admin)
        }
        None => println!("• ProxyAdmin is already owned by {}", args.new_admin),
    }
    Ok(())
}

fn print_proxy_report(verb: &str, report: &ProxyReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if report.is_empty() {
                println!("• No proxies matched");
            }
            for proxy in &report.changed {
                println!("✓ {} {} at {}", verb, proxy.key(), proxy.instance.address);
            }
            for proxy in &report.up_to_date {
                println!("• {} at {} is up to date", proxy.key(), proxy.instance.address);
            }
            for proxy in &report.unchangeable {
                println!(
                    "• Skipped {} {} at {}",
                    proxy.instance.kind,
                    proxy.key(),
                    proxy.instance.address
                );
            }
            for proxy in &report.not_owned {
                println!("• Skipped {} at {}, not owned by this project", proxy.key(), proxy.instance.address);
            }
            for warning in &report.warnings {
                println!("  ⚠ {}", warning);
            }
        }
        OutputFormat::Json => {
            let addresses =
                |proxies: &[ProxyRecord]| proxies.iter().map(|p| p.instance.address.to_string()).collect::<Vec<_>>();
            let output = serde_json::json!({
                "changed": addresses(&report.changed),
                "upToDate": addresses(&report.up_to_date),
                "unchangeable": addresses(&report.unchangeable),
                "notOwned": addresses(&report.not_owned),
                "warnings": report.warnings,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Quiet => {}
    }
    Ok(())
}

fn run_status(ctx: AppContext, network: &str, format: OutputFormat) -> Result<()> {
    let report = StatusCommand::new(ctx).execute(network)?;
    match format {
        OutputFormat::Table => print_status_table(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Quiet => {
            if report.has_pending_changes() {
                println!("Network {} is out of date", report.network);
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn print_status_table(report: &StatusReport) {
    println!("Project: {} {}", report.project, report.manifest_version);
    println!(
        "Network: {} (deployed version {})",
        report.network,
        report.deployed_version.as_deref().unwrap_or("-")
    );
    if report.published {
        println!("Published{}", if report.frozen { ", frozen" } else { "" });
    }
    println!();

    if !report.contracts.is_empty() {
        println!("Contracts ({}):", report.contracts.len());
        println!("  {:<20} {:<20} {:<44} Status", "Alias", "Contract", "Address");
        println!("  {}", "-".repeat(96));
        for contract in &report.contracts {
            println!(
                "  {:<20} {:<20} {:<44} {}",
                truncate(&contract.alias, 20),
                truncate(contract.contract.as_deref().unwrap_or("-"), 20),
                contract.address.as_deref().unwrap_or("-"),
                contract_state(contract.state)
            );
        }
        println!();
    }

    if !report.dependencies.is_empty() {
        println!("Dependencies ({}):", report.dependencies.len());
        println!("  {:<24} {:<12} {:<12} Status", "Name", "Range", "Linked");
        println!("  {}", "-".repeat(60));
        for dependency in &report.dependencies {
            println!(
                "  {:<24} {:<12} {:<12} {}",
                truncate(&dependency.name, 24),
                dependency.range.as_deref().unwrap_or("-"),
                dependency.linked_version.as_deref().unwrap_or("-"),
                dependency_state(dependency.state)
            );
        }
        println!();
    }

    if !report.proxies.is_empty() {
        println!("Proxies ({}):", report.proxies.len());
        for proxy in &report.proxies {
            println!(
                "  {:<30} {} [{} {}]",
                truncate(&proxy.key, 30),
                proxy.address,
                proxy.kind,
                proxy.version
            );
        }
        println!();
    }

    if report.has_pending_changes() {
        println!("Run 'keel push --network {}' to apply pending changes", report.network);
    } else {
        println!("Network is up to date");
    }
}

fn contract_state(state: ContractState) -> &'static str {
    match state {
        ContractState::Deployed => "OK",
        ContractState::Changed => "Changed",
        ContractState::NotDeployed => "Not Deployed",
        ContractState::Removed => "Removed",
        ContractState::Unknown => "No Artifact",
    }
}

fn dependency_state(state: DependencyState) -> &'static str {
    match state {
        DependencyState::Linked => "OK",
        DependencyState::Outdated => "Outdated",
        DependencyState::NotLinked => "Not Linked",
        DependencyState::Removed => "Removed",
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}
