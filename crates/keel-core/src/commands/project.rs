//! Manifest commands: init, add, remove, link, unlink and bump.
//!
//! None of these talk to a network. Each loads keel.toml, applies one
//! change and writes it back.

use anyhow::Context;
use semver::Version;

use crate::artifacts::ArtifactProvider;
use crate::context::AppContext;
use crate::dependency::DependencyResolver;
use crate::manifest::ProjectManifest;
use crate::version::{ensure_monotonic, satisfies_version};

/// Options for the init command
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub name: String,
    pub version: Version,
    pub publish: bool,
    /// Overwrite an existing keel.toml
    pub force: bool,
}

impl InitOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Version::new(0, 1, 0),
            publish: false,
            force: false,
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_publish(mut self, publish: bool) -> Self {
        self.publish = publish;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Creates keel.toml for a new project
pub struct InitCommand {
    ctx: AppContext,
}

impl InitCommand {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub fn execute(&self, options: &InitOptions) -> anyhow::Result<ProjectManifest> {
        let store = self.ctx.manifest_store();
        store.init(&options.name, options.version.clone(), options.force)?;
        if options.publish {
            return store.modify(|manifest| {
                manifest.publish = true;
                Ok(manifest.clone())
            });
        }
        store.load()
    }
}

/// Contracts to add, as `(alias, contract name)`
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub contracts: Vec<(String, String)>,
}

impl AddOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `name` under its own name as alias.
    pub fn with_contract(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.contracts.push((name.clone(), name));
        self
    }

    pub fn with_aliased_contract(mut self, alias: impl Into<String>, name: impl Into<String>) -> Self {
        self.contracts.push((alias.into(), name.into()));
        self
    }
}

/// Adds contracts to the manifest
pub struct AddCommand {
    ctx: AppContext,
}

impl AddCommand {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Returns the aliases added or changed.
    pub fn execute(&self, options: &AddOptions) -> anyhow::Result<Vec<String>> {
        let artifacts = self.ctx.artifacts();
        for (_, name) in &options.contracts {
            artifacts
                .contract(name)
                .with_context(|| format!("Contract {name} not found; compile the project first"))?;
        }
        self.ctx.manifest_store().modify(|manifest| {
            let mut changed = Vec::new();
            for (alias, name) in &options.contracts {
                if manifest.contract_name(alias) == Some(name.as_str()) {
                    continue;
                }
                manifest.add_contract(alias.clone(), name.clone());
                tracing::info!("Added contract {} as {}", name, alias);
                changed.push(alias.clone());
            }
            Ok(changed)
        })
    }
}

/// Removes contracts from the manifest
pub struct RemoveCommand {
    ctx: AppContext,
}

impl RemoveCommand {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Returns the aliases removed.
    pub fn execute(&self, aliases: &[String]) -> anyhow::Result<Vec<String>> {
        self.ctx.manifest_store().modify(|manifest| {
            let mut removed = Vec::new();
            for alias in aliases {
                if manifest.remove_contract(alias).is_some() {
                    tracing::info!("Removed contract {}", alias);
                    removed.push(alias.clone());
                } else {
                    tracing::warn!("Contract {} is not part of the project", alias);
                }
            }
            Ok(removed)
        })
    }
}

/// A dependency to link, optionally with an explicit version range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOptions {
    pub name: String,
    /// Required range; `^<installed version>` when unset
    pub range: Option<String>,
}

impl LinkOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            range: None,
        }
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }
}

/// Links installed packages as dependencies
pub struct LinkCommand {
    ctx: AppContext,
}

impl LinkCommand {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Returns `(name, range)` for every dependency linked.
    pub fn execute(&self, links: &[LinkOptions]) -> anyhow::Result<Vec<(String, String)>> {
        let packages = self.ctx.package_resolver();
        // Linking is network-independent; only the installed manifest is read.
        let resolver = DependencyResolver::new(&packages, "");

        let mut resolved = Vec::new();
        for link in links {
            let installed = resolver.load_manifest(&link.name)?.version.to_string();
            let range = link.range.clone().unwrap_or_else(|| format!("^{installed}"));
            if !satisfies_version(&installed, &range) {
                anyhow::bail!(
                    "Installed version {} of {} does not satisfy {}",
                    installed,
                    link.name,
                    range
                );
            }
            resolved.push((link.name.clone(), range));
        }

        self.ctx.manifest_store().modify(|manifest| {
            for (name, range) in &resolved {
                manifest.link_dependency(name.clone(), range.clone())?;
                tracing::info!("Linked dependency {} {}", name, range);
            }
            Ok(resolved.clone())
        })
    }
}

/// Unlinks dependencies
pub struct UnlinkCommand {
    ctx: AppContext,
}

impl UnlinkCommand {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Returns the dependencies unlinked.
    pub fn execute(&self, names: &[String]) -> anyhow::Result<Vec<String>> {
        self.ctx.manifest_store().modify(|manifest| {
            let mut unlinked = Vec::new();
            for name in names {
                if manifest.unlink_dependency(name).is_none() {
                    anyhow::bail!("Dependency {} is not linked", name);
                }
                tracing::info!("Unlinked dependency {}", name);
                unlinked.push(name.clone());
            }
            Ok(unlinked)
        })
    }
}

/// Sets the project version
pub struct BumpCommand {
    ctx: AppContext,
}

impl BumpCommand {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Returns the previous version.
    pub fn execute(&self, version: &Version) -> anyhow::Result<Version> {
        self.ctx.manifest_store().modify(|manifest| {
            ensure_monotonic(&manifest.version, version)?;
            let previous = std::mem::replace(&mut manifest.version, version.clone());
            tracing::info!("Bumped {} from {} to {}", manifest.name, previous, version);
            Ok(previous)
        })
    }
}
