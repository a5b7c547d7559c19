//! The connection loop.
//!
//! One task owns the bot and the transport. Each turn of the loop is
//! either an inbound line, a timer tick, or a Ctrl-C; the resulting
//! dispatch runs to completion before the next turn, so handlers never
//! observe half-applied state. Outbound lines queue on the bot and are
//! flushed at the end of every turn.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio::net::TcpStream;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, trace, warn};

use corvid_proto::{ProtocolError, Transport};

use crate::bot::Bot;
use crate::config::{Config, NetworkConfig};
use crate::hooks::dispatch;

/// Timer granularity; also bounds how stale a reconnect request can go
/// unnoticed.
const TICK: Duration = Duration::from_millis(250);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// What one turn of the loop woke up for.
enum Turn {
    Tick,
    Line(String),
    Eof,
    ReadError(ProtocolError),
    Interrupt,
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let mut bot = Bot::new(config)?;
    bot.autoload_plugins();

    let mut transport: Option<Transport> = None;
    let mut tick = interval(TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let turn = match &mut transport {
            Some(t) => {
                tokio::select! {
                    _ = tick.tick() => Turn::Tick,
                    line = t.read_line() => match line {
                        Ok(Some(line)) => Turn::Line(line),
                        Ok(None) => Turn::Eof,
                        Err(err) => Turn::ReadError(err),
                    },
                    _ = tokio::signal::ctrl_c() => Turn::Interrupt,
                }
            }
            None => {
                tokio::select! {
                    _ = tick.tick() => Turn::Tick,
                    _ = tokio::signal::ctrl_c() => Turn::Interrupt,
                }
            }
        };

        match turn {
            Turn::Tick => {
                let now_ms = bot.now_ms();
                dispatch::call_timestamp(&mut bot, now_ms);
                if bot.connect_requested && transport.is_none() && !bot.in_shutdown {
                    bot.connect_requested = false;
                    match establish(&bot.config().network.clone()).await {
                        Ok(t) => {
                            transport = Some(t);
                            bot.connected = true;
                            dispatch::call_event(&mut bot, "connect", &[]);
                        }
                        Err(err) => {
                            warn!(error = %err, "connection attempt failed");
                            dispatch::call_event(&mut bot, "connect failed", &[]);
                        }
                    }
                }
            }
            Turn::Line(line) => {
                trace!(line = %line, "received");
                dispatch::call_event(&mut bot, "recv", &[&line]);
            }
            Turn::Eof => {
                info!("server closed the connection");
                drop_transport(&mut bot, &mut transport);
            }
            Turn::ReadError(err) => {
                warn!(error = %err, "read failed");
                drop_transport(&mut bot, &mut transport);
            }
            Turn::Interrupt => {
                info!("interrupt received");
                bot.shutdown("Interrupted");
            }
        }

        flush(&mut bot, &mut transport).await;
        if bot.disconnect_requested {
            drop_transport(&mut bot, &mut transport);
        }
        if bot.force_exit || (bot.in_shutdown && transport.is_none()) {
            break;
        }
    }

    // Plugins that never saw a shutdown event (we may have never been
    // connected) still get an orderly teardown.
    for name in bot.plugin_names() {
        let _ = bot.unload_plugin(&name, true);
    }
    info!("exited");
    Ok(())
}

/// Dials the configured server, negotiating TLS when asked to.
async fn establish(network: &NetworkConfig) -> anyhow::Result<Transport> {
    let addr = format!("{}:{}", network.host, network.port);
    info!(addr = %addr, tls = network.tls, "connecting");
    let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
        .await
        .context("connect timed out")?
        .with_context(|| format!("connecting to {addr}"))?;
    if !network.tls {
        return Ok(Transport::tcp(stream));
    }

    let mut roots = RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    if !loaded.errors.is_empty() {
        debug!(
            errors = loaded.errors.len(),
            "some platform certificates failed to load"
        );
    }
    for cert in loaded.certs {
        let _ = roots.add(cert);
    }
    let tls_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let server_name =
        ServerName::try_from(network.host.clone()).context("invalid TLS server name")?;
    let stream = timeout(
        CONNECT_TIMEOUT,
        TlsConnector::from(Arc::new(tls_config)).connect(server_name, stream),
    )
    .await
    .context("TLS handshake timed out")?
    .context("TLS handshake failed")?;
    Ok(Transport::tls(stream))
}

/// Tears the transport down and tells the bot, exactly once.
fn drop_transport(bot: &mut Bot, transport: &mut Option<Transport>) {
    bot.disconnect_requested = false;
    if transport.take().is_none() {
        return;
    }
    // Whatever was still queued was addressed to this connection.
    bot.out.clear();
    if bot.connected {
        bot.connected = false;
        dispatch::call_event(bot, "disconnect", &[]);
    }
}

async fn flush(bot: &mut Bot, transport: &mut Option<Transport>) {
    let Some(t) = transport.as_mut() else {
        return;
    };
    while let Some(line) = bot.out.pop_front() {
        trace!(line = %line, "sending");
        if let Err(err) = t.send_line(&line).await {
            warn!(error = %err, "write failed");
            bot.disconnect_requested = true;
            break;
        }
    }
}
