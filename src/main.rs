/*
 *  main.rs
 *
 *  kioskd - the show must go on
 *	(c) 2020-26 Stuart Hunter
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */

use log::{error, info, warn};
use env_logger::Env;
use tokio::net::TcpListener;

#[cfg(unix)] // Only compile this block on Unix-like systems
use tokio::signal::unix::{signal, SignalKind};

use kioskd::config::{self, Config};
use kioskd::control;
use kioskd::kiosk::{self, Kiosk};
use kioskd::plugin::PluginLoader;
use kioskd::surface::{FbdevPresenter, HeadlessPresenter, Presenter, Surface};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Asynchronously waits for a SIGINT, SIGTERM, or SIGHUP signal.
/// Once a signal is caught, it logs the event and returns, allowing for
/// graceful shutdown.
#[cfg(unix)]
async fn signal_handler() -> Result<(), Box<dyn std::error::Error>> {
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

#[cfg(not(unix))]
async fn signal_handler() -> Result<(), Box<dyn std::error::Error>> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received. Initiating graceful shutdown.");
    Ok(())
}

/// Framebuffer when a device is configured, otherwise an in-memory surface
fn render_target(cfg: &Config) -> Result<(Surface, Box<dyn Presenter>), Box<dyn std::error::Error>> {
    let clear = cfg.clear_colour();

    if let Some(device) = cfg.device() {
        let presenter = FbdevPresenter::open(device)?;
        let fb = presenter.geometry();
        let surface = Surface::new(fb.width, fb.height)?.with_clear_colour(clear);
        return Ok((surface, Box::new(presenter)));
    }

    let (width, height) = cfg.size();
    info!("Headless surface {}x{}", width, height);
    let surface = Surface::new(width, height)?.with_clear_colour(clear);
    Ok((surface, Box::new(HeadlessPresenter::new())))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::load()?;

    // Initialize the logger; RUST_LOG still wins when set
    env_logger::Builder::from_env(Env::default().default_filter_or(cfg.log_level()))
        .format_timestamp_secs()
        .init();

    info!("{} - the show must go on", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let (surface, presenter) = render_target(&cfg)?;

    let loader = match cfg.plugin_path.as_ref() {
        Some(dirs) => PluginLoader::new(dirs.clone()),
        None => PluginLoader::from_env(),
    };

    let mut kiosk = Kiosk::new(loader, surface, presenter);

    let plugins = cfg.plugins();
    let loaded = kiosk.load_plugins(&plugins);
    if loaded == 0 {
        warn!("No prop types loaded; every Update will fail");
    } else {
        info!("{} of {} plugins loaded: {}", loaded, plugins.len(), kiosk.list_types().join(", "));
    }

    let bind = cfg.bind_address();
    let listener = TcpListener::bind(&bind).await?;

    let (requests, inbox) = control::channel();
    tokio::spawn(async move {
        if let Err(e) = control::serve(listener, requests).await {
            error!("Control plane stopped: {}", e);
        }
    });

    let shutdown = async {
        if let Err(e) = signal_handler().await {
            error!("Signal handling unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    kiosk::run(&mut kiosk, inbox, cfg.render_interval(), shutdown).await;

    info!("Stopped after {} frames", kiosk.frames());
    Ok(())
}
