/*
 *  main.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 *
 *  Reference host: load one plugin and print its value reports
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, error, info, warn};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{self, MissedTickBehavior};

use statelink::config::{self, Cli, Config};
use statelink::plugin::{
    Capability,
    PluginLoader,
    PollPlugin,
    PushPlugin,
    PushSession,
    StatusCode,
    StopFlag,
};
use statelink::PluginError;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// How often the host checks whether a push plugin's run returned early
const PUSH_WATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Waits for a SIGINT, SIGTERM, or SIGHUP signal.
async fn signal_handler() -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

/// Resolves when the host should stop: a signal or the configured run time
async fn shutdown(run_for: Option<Duration>) -> Result<()> {
    match run_for {
        Some(limit) => tokio::select! {
            res = signal_handler() => res,
            _ = time::sleep(limit) => {
                info!("Run time of {}s elapsed", limit.as_secs());
                Ok(())
            }
        },
        None => signal_handler().await,
    }
}

/// Sample a poll-profile plugin on the host's cadence
async fn drive_poll(plugin: PollPlugin, cfg: &Config) -> Result<()> {
    let mut instance = plugin.initialize().context("plugin failed to initialize")?;
    instance.set_validate_reports(cfg.validate_reports());

    let name = instance.display_name()?;
    let schema = instance.schema()?.to_json()?;
    info!("{} declares schema {}", name, schema);

    let mut ticker = time::interval(cfg.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let stop = shutdown(cfg.run_for());
    tokio::pin!(stop);

    loop {
        tokio::select! {
            res = &mut stop => {
                res?;
                break;
            }
            _ = ticker.tick() => {
                match instance.sample() {
                    Ok(Some(report)) => println!("[{}] {}", name, report.to_string_lossy()),
                    Ok(None) => {}
                    Err(e @ (PluginError::ContractViolation(_) | PluginError::Utf8(_))) => {
                        return Err(e).with_context(|| format!("{} broke its schema contract", name));
                    }
                    Err(e) => warn!("{} sample failed: {}", name, e),
                }
            }
        }
    }

    instance.finalize()?;
    debug!("{} finalized", name);
    Ok(())
}

/// Run a push-profile plugin until shutdown, then stop and join it
async fn drive_push(plugin: PushPlugin, cfg: &Config) -> Result<()> {
    let name = plugin.display_name()?;
    let schema = plugin.schema()?;
    info!("{} declares schema {}", name, schema.to_json()?);

    let flag = StopFlag::new();
    let violation = Arc::new(AtomicBool::new(false));
    let validate = cfg.validate_reports();

    let session = {
        let flag = flag.clone();
        let violation = violation.clone();
        let name = name.clone();
        PushSession::start_with_flag(&plugin, flag.clone(), move |bytes| {
            let checked = std::str::from_utf8(bytes)
                .map_err(PluginError::from)
                .and_then(|report| {
                    if validate {
                        schema.check_report(report)?;
                    }
                    Ok(report)
                });

            match checked {
                Ok(report) => {
                    println!("[{}] {}", name, report);
                    StatusCode::Ok
                }
                Err(e) => {
                    error!("{} broke its schema contract: {}", name, e);
                    violation.store(true, Ordering::Release);
                    flag.request_stop();
                    StatusCode::Error
                }
            }
        })?
    };

    let mut watch = time::interval(PUSH_WATCH_INTERVAL);
    let stop = shutdown(cfg.run_for());
    tokio::pin!(stop);

    loop {
        tokio::select! {
            res = &mut stop => {
                res?;
                break;
            }
            _ = watch.tick() => {
                if session.is_finished() {
                    break;
                }
            }
        }
    }

    let status = tokio::task::spawn_blocking(move || session.stop()).await??;

    if violation.load(Ordering::Acquire) {
        bail!("{} broke its schema contract", name);
    }
    if !status.is_ok() {
        bail!("{} run reported an error", name);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_with(&cli)?;

    if cli.dump_config {
        println!("{}", cfg.to_yaml()?);
        return Ok(());
    }

    env_logger::Builder::from_env(Env::default().default_filter_or(cfg.log_level()))
        .format_timestamp_secs()
        .init();

    info!("statelink v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let path = cfg.plugin.as_ref()
        .context("no plugin configured; pass --plugin or set `plugin` in the config file")?;
    let loaded = PluginLoader::load_plugin(path)?;

    match loaded.capability() {
        Capability::Poll(plugin) => drive_poll(plugin, &cfg).await,
        Capability::Push(plugin) => drive_push(plugin, &cfg).await,
    }
}
