// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Operator CLI for the glustervol adapter.
//!
//! Exercises the provider against a live volume: listing, reading, copying,
//! stat, mkdir/rm, symlinks, capacity, and directory watching. Requires the
//! `gfapi` feature; without it the binary only reports how it was built.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use glustervol_core::{
    AccessMode, ConnectOptions, CopyOption, GlusterProvider, OpenOptions, VolPath, WatchConfig,
    WatchKind,
};

#[derive(Parser)]
#[command(name = "glustervol", about = "Remote volume filesystem operations")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// TOML config file with [connect] and [watch] sections
    #[arg(long)]
    config: Option<String>,

    /// Effective uid applied at connect time
    #[arg(long)]
    uid: Option<u32>,

    /// Effective gid applied at connect time
    #[arg(long)]
    gid: Option<u32>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
struct CliConfig {
    connect: ConnectOptions,
    watch: Option<WatchConfig>,
}

#[derive(Subcommand)]
enum Command {
    /// List a directory, optionally filtered by a glob: or regex: matcher
    Ls {
        uri: String,
        #[arg(long)]
        matcher: Option<String>,
    },
    /// Print a file's contents
    Cat { uri: String },
    /// Copy a file within or across volumes of one server
    Cp {
        from: String,
        to: String,
        #[arg(long)]
        replace: bool,
        #[arg(long)]
        attributes: bool,
    },
    /// Rename a file within one volume
    Mv {
        from: String,
        to: String,
        #[arg(long)]
        replace: bool,
    },
    /// Print attributes and access bits
    Stat {
        uri: String,
        #[arg(long)]
        nofollow: bool,
    },
    /// Create a directory
    Mkdir { uri: String },
    /// Delete a file or empty directory
    Rm { uri: String },
    /// Create a symbolic link at LINK pointing to TARGET
    Ln { target: String, link: String },
    /// Print volume capacity
    Df { uri: String },
    /// Watch a directory, printing events until interrupted
    Watch {
        uri: String,
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.global)?;
    let provider = build_provider(&config)?;
    run(&provider, cli.command)
}

fn load_config(global: &GlobalArgs) -> Result<CliConfig> {
    let mut config = match &global.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {path}"))?;
            toml::from_str(&raw).with_context(|| format!("parsing config {path}"))?
        }
        None => CliConfig::default(),
    };
    let overrides = ConnectOptions {
        uid: global.uid,
        gid: global.gid,
    };
    config.connect = overrides.or(config.connect).or(ConnectOptions::from_env());
    Ok(config)
}

#[cfg(feature = "gfapi")]
fn build_provider(config: &CliConfig) -> Result<GlusterProvider> {
    Ok(GlusterProvider::with_defaults(
        std::sync::Arc::new(glustervol_core::GfapiLibrary::new()),
        config.connect,
        config.watch.unwrap_or_default(),
    ))
}

#[cfg(not(feature = "gfapi"))]
fn build_provider(_config: &CliConfig) -> Result<GlusterProvider> {
    anyhow::bail!("this binary was built without the gfapi feature; rebuild with --features gfapi");
}

fn resolve(provider: &GlusterProvider, uri: &str) -> Result<VolPath> {
    provider.get_path(uri).with_context(|| format!("resolving {uri}"))
}

fn run(provider: &GlusterProvider, command: Command) -> Result<()> {
    match command {
        Command::Ls { uri, matcher } => {
            let dir = resolve(provider, &uri)?;
            let filter = match matcher {
                Some(pattern) => {
                    let compiled = provider.path_matcher(&pattern)?;
                    Some(Box::new(move |path: &VolPath| {
                        path.file_name_path()
                            .map(|name| name.matches(&compiled))
                            .unwrap_or(false)
                    }) as glustervol_core::DirFilter)
                }
                None => None,
            };
            let mut stream = provider.new_directory_stream(&dir, filter)?;
            for entry in stream.iter()? {
                println!("{}", entry?);
            }
            stream.close()?;
        }
        Command::Cat { uri } => {
            let path = resolve(provider, &uri)?;
            let mut channel = provider.new_channel(&path, OpenOptions::reading(), None)?;
            let mut stdout = glustervol_core::IoWriter(std::io::stdout().lock());
            let size = channel.size()?;
            channel.transfer_to(0, size, &mut stdout)?;
            channel.close()?;
        }
        Command::Cp {
            from,
            to,
            replace,
            attributes,
        } => {
            let mut options = Vec::new();
            if replace {
                options.push(CopyOption::ReplaceExisting);
            }
            if attributes {
                options.push(CopyOption::CopyAttributes);
            }
            provider.copy(&resolve(provider, &from)?, &resolve(provider, &to)?, &options)?;
        }
        Command::Mv { from, to, replace } => {
            let options = if replace {
                vec![CopyOption::ReplaceExisting]
            } else {
                Vec::new()
            };
            provider.move_file(&resolve(provider, &from)?, &resolve(provider, &to)?, &options)?;
        }
        Command::Stat { uri, nofollow } => {
            let path = resolve(provider, &uri)?;
            let attrs = provider.read_attributes(&path, !nofollow)?;
            println!("path:  {path}");
            println!("kind:  {:?}", attrs.kind());
            println!("size:  {}", attrs.size);
            println!("mode:  {:o}", attrs.mode & 0o7777);
            println!("owner: {}:{}", attrs.uid, attrs.gid);
            println!("inode: {}", attrs.inode);
            println!("mtime: {}s", attrs.mtime.tv_sec);
            let readable = provider.check_access(&path, &[AccessMode::Read]).is_ok();
            let writable = provider.check_access(&path, &[AccessMode::Write]).is_ok();
            println!("access: read={readable} write={writable}");
        }
        Command::Mkdir { uri } => {
            provider.create_directory(&resolve(provider, &uri)?, None)?;
        }
        Command::Rm { uri } => {
            provider.delete(&resolve(provider, &uri)?)?;
        }
        Command::Ln { target, link } => {
            provider
                .create_symbolic_link(&resolve(provider, &link)?, &resolve(provider, &target)?)?;
        }
        Command::Df { uri } => {
            let volume = provider.new_filesystem(&uri, ConnectOptions::default())?;
            println!("volume:      {}", volume.authority());
            println!("total:       {}", volume.total_space()?);
            println!("usable:      {}", volume.usable_space()?);
            println!("unallocated: {}", volume.unallocated_space()?);
        }
        Command::Watch { uri, timeout_secs } => {
            let dir = resolve(provider, &uri)?;
            let service = provider.new_watch_service();
            service.register(&dir, &[WatchKind::Create, WatchKind::Modify, WatchKind::Delete])?;
            tracing::info!(%dir, "watching");
            let deadline = std::time::Instant::now() + Duration::from_secs(timeout_secs);
            while std::time::Instant::now() < deadline {
                let Some(ready) = service.poll_timeout(Duration::from_secs(1))? else {
                    continue;
                };
                for event in ready.poll_events() {
                    println!("{:?} {} (count {})", event.kind, event.path, event.count);
                }
                if !ready.reset() {
                    break;
                }
            }
            service.close();
        }
    }
    Ok(())
}
