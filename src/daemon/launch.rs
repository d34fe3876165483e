// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Daemon task manager for the RTU bridge
//!
//! Owns the long-lived tasks: the 1 s scan (tick) loop, the 0.5 s command
//! drain, the 1 s push loop, the blocking command intake, the Modbus TCP
//! server and the WebSocket push endpoint. All tasks share one `running`
//! flag for coordinated shutdown and are joined with a bounded grace
//! window.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

use crate::command::{CommandExecutor, CommandRequest};
use crate::config::Config;
use crate::engine::{Engine, StatusFrame};
use crate::modbus::WtpModbusServer;
use crate::push::{spawn_push_server, PushServerHandle, StatusBroadcaster};
use crate::registers::{PendingWrites, RegisterBank};

/// Per-task grace window when joining at shutdown.
const JOIN_GRACE: Duration = Duration::from_secs(2);

/// Coordinates the background services of the bridge.
///
/// The `running` flag is shared between tasks; each loop checks it and
/// terminates gracefully once `shutdown()` clears it. The engine sits
/// behind a mutex shared by the tick and drain loops only; the Modbus
/// server and the push feed work against the register bank and the
/// pending-write queue, never against the engine itself.
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    engine: Option<Arc<Mutex<Engine>>>,
    pending: Arc<PendingWrites>,
    status: Arc<RwLock<StatusFrame>>,
    broadcaster: StatusBroadcaster,
    command_tx: mpsc::UnboundedSender<CommandRequest>,
    command_rx: Option<mpsc::UnboundedReceiver<CommandRequest>>,
    modbus_alive: Arc<AtomicBool>,
    push_handle: Option<PushServerHandle>,
}

impl Daemon {
    pub fn new() -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            engine: None,
            pending: Arc::new(PendingWrites::new()),
            status: Arc::new(RwLock::new(StatusFrame::default())),
            broadcaster: StatusBroadcaster::new(16),
            command_tx,
            command_rx: Some(command_rx),
            modbus_alive: Arc::new(AtomicBool::new(false)),
            push_handle: None,
        }
    }

    /// Sender half of the command intake channel, for external surfaces.
    pub fn command_sender(&self) -> mpsc::UnboundedSender<CommandRequest> {
        self.command_tx.clone()
    }

    /// The launched engine, shared with the tick and drain loops.
    pub fn engine(&self) -> Option<Arc<Mutex<Engine>>> {
        self.engine.as_ref().map(Arc::clone)
    }

    /// Launch all configured tasks.
    ///
    /// Binding either listening socket fails the whole launch; everything
    /// after that is supervised and survives client errors.
    pub async fn launch(&mut self, config: Config) -> Result<()> {
        let seed = match config.simulation.seed {
            Some(seed) => seed,
            None => {
                let seed: u64 = rand::random();
                info!("No seed given, using OS-randomised seed {seed}");
                seed
            }
        };
        info!(
            "Simulator active: speed={}x, seed={}, auto_events={}",
            config.simulation.speed, seed, config.simulation.auto_events
        );

        let engine = Engine::new(seed, config.simulation.speed, config.simulation.auto_events);
        let bank = engine.bank();
        let rain = engine.rain();
        let scenario = engine.scenario();
        let engine = Arc::new(Mutex::new(engine));
        self.engine = Some(Arc::clone(&engine));

        if config.modbus.enabled {
            self.start_modbus_server(&config, bank.clone()).await?;
        }
        if config.dashboard.enabled {
            self.start_push_server(&config).await?;
        }

        self.start_tick_loop(&config, Arc::clone(&engine));
        self.start_drain_loop(&config, Arc::clone(&engine));
        self.start_push_loop(&config);
        self.start_intake_loop(CommandExecutor::new(rain, scenario, Arc::clone(&self.status)));
        self.start_stdin_loop();
        self.start_heartbeat();

        Ok(())
    }

    /// The PLC scan cycle: measure the wall delta, tick the engine, publish
    /// the resulting status frame.
    fn start_tick_loop(&mut self, config: &Config, engine: Arc<Mutex<Engine>>) {
        let running = self.running.clone();
        let status = Arc::clone(&self.status);
        let modbus_alive = self.modbus_alive.clone();
        let modbus_enabled = config.modbus.enabled;
        let tick_interval = Duration::from_millis(config.simulation.tick_interval_ms);

        let task = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            let mut last = Instant::now();

            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                let wall_dt = last.elapsed().as_secs_f64();
                last = Instant::now();

                let frame = {
                    let mut engine = match engine.lock() {
                        Ok(engine) => engine,
                        Err(_) => {
                            running.store(false, Ordering::SeqCst);
                            return Err(anyhow!("engine lock poisoned, terminating"));
                        }
                    };
                    let comm_fault = modbus_enabled && !modbus_alive.load(Ordering::Relaxed);
                    engine.set_comm_fault(comm_fault);
                    match engine.tick(wall_dt) {
                        Ok(frame) => frame,
                        Err(e) => {
                            // A poisoned bank lock is unrecoverable; the
                            // whole process comes down with this loop.
                            error!("Scan tick failed: {e}");
                            running.store(false, Ordering::SeqCst);
                            return Err(e);
                        }
                    }
                };

                match status.write() {
                    Ok(mut latest) => *latest = frame,
                    Err(_) => {
                        running.store(false, Ordering::SeqCst);
                        return Err(anyhow!("status lock poisoned, terminating"));
                    }
                }
            }
            Ok(())
        });
        self.tasks.push(task);
        info!("Scan loop started");
    }

    /// Drain SCADA writes into the coil set ahead of the next tick.
    fn start_drain_loop(&mut self, config: &Config, engine: Arc<Mutex<Engine>>) {
        let running = self.running.clone();
        let pending = Arc::clone(&self.pending);
        let drain_interval = Duration::from_millis(config.simulation.drain_interval_ms);

        let task = tokio::spawn(async move {
            let mut interval = time::interval(drain_interval);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                let result = match engine.lock() {
                    Ok(mut engine) => engine.drain_pending(&pending),
                    Err(_) => {
                        running.store(false, Ordering::SeqCst);
                        return Err(anyhow!("engine lock poisoned, terminating"));
                    }
                };
                if let Err(e) = result {
                    error!("Command drain failed: {e}");
                    running.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            }
            Ok(())
        });
        self.tasks.push(task);
        info!("Command drain started");
    }

    /// Fan the latest status frame out to push subscribers once per second.
    fn start_push_loop(&mut self, config: &Config) {
        let running = self.running.clone();
        let status = Arc::clone(&self.status);
        let broadcaster = self.broadcaster.clone();
        let push_interval = Duration::from_millis(config.simulation.push_interval_ms);

        let task = tokio::spawn(async move {
            let mut interval = time::interval(push_interval);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                // Copy under the read lock, serialise and send outside it.
                let frame = match status.read() {
                    Ok(frame) => frame.clone(),
                    Err(_) => return Err(anyhow!("status lock poisoned, terminating")),
                };
                broadcaster.send(frame);
            }
            Ok(())
        });
        self.tasks.push(task);
    }

    /// Block on the command channel and apply scenario effects immediately.
    fn start_intake_loop(&mut self, executor: CommandExecutor) {
        let running = self.running.clone();
        let mut rx = self
            .command_rx
            .take()
            .expect("intake loop started twice");

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    request = rx.recv() => {
                        let Some(request) = request else { break };
                        let response = executor.run_line(&request.line);
                        match request.reply {
                            Some(reply) => {
                                let _ = reply.send(response);
                            }
                            None if !response.is_empty() => info!("command: {response}"),
                            None => {}
                        }
                    }
                    _ = time::sleep(Duration::from_millis(250)) => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                    }
                }
            }
            Ok(())
        });
        self.tasks.push(task);
        info!("Command intake started");
    }

    /// Interactive operator console on stdin.
    fn start_stdin_loop(&mut self) {
        let running = self.running.clone();
        let command_tx = self.command_tx.clone();

        let task = tokio::spawn(async move {
            info!("Interactive commands available. Type 'help' for list.");
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while running.load(Ordering::SeqCst) {
                let next = tokio::select! {
                    line = lines.next_line() => line,
                    _ = time::sleep(Duration::from_millis(250)) => continue,
                };
                let line = match next {
                    Ok(Some(line)) => line,
                    // EOF: headless run, no console.
                    Ok(None) => break,
                    Err(e) => {
                        debug!("stdin error: {e}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
                if command_tx
                    .send(CommandRequest {
                        line,
                        reply: Some(reply_tx),
                    })
                    .is_err()
                {
                    break;
                }
                if let Ok(response) = reply_rx.await {
                    if !response.is_empty() {
                        println!("{response}");
                    }
                }
            }
            Ok(())
        });
        self.tasks.push(task);
    }

    /// Launch the Modbus TCP server.
    ///
    /// The listener is bound here so a busy port fails startup instead of
    /// a background task. The serving task is monitored: if it dies while
    /// the bridge is still running, the comm-fault alarm bit asserts.
    async fn start_modbus_server(
        &mut self,
        config: &Config,
        bank: Arc<RwLock<RegisterBank>>,
    ) -> Result<()> {
        let socket_addr: SocketAddr = format!("{}:{}", config.modbus.address, config.modbus.port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid modbus address {}:{}",
                    config.modbus.address, config.modbus.port
                )
            })?;

        info!("Starting Modbus TCP server on {socket_addr}");
        let listener = TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("cannot bind Modbus TCP port {socket_addr}"))?;
        info!("Connect SCADA to {socket_addr}, Unit ID 1");

        let service = WtpModbusServer::new(bank, Arc::clone(&self.pending));
        let running = self.running.clone();
        let modbus_alive = self.modbus_alive.clone();
        modbus_alive.store(true, Ordering::Relaxed);

        let task = tokio::spawn(async move {
            let server = Server::new(listener);

            let on_connected = move |stream, socket_addr| {
                let service = service.clone();
                async move {
                    accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                        Ok(Some(service.clone()))
                    })
                }
            };
            let on_process_error = |err| {
                error!("Modbus server error: {err}");
            };

            let server_handle = tokio::spawn(async move {
                if let Err(e) = server.serve(&on_connected, on_process_error).await {
                    error!("Modbus server error: {e}");
                }
            });

            // Supervise: surface an unexpected server death as a comm
            // fault, or abort the server on shutdown.
            while running.load(Ordering::SeqCst) && !server_handle.is_finished() {
                time::sleep(Duration::from_millis(250)).await;
            }

            if server_handle.is_finished() {
                modbus_alive.store(false, Ordering::Relaxed);
                if running.load(Ordering::SeqCst) {
                    warn!("Modbus server stopped unexpectedly");
                }
                return Ok(());
            }

            info!("Shutting down Modbus server...");
            server_handle.abort();
            match time::timeout(Duration::from_secs(1), server_handle).await {
                Ok(_) => info!("Modbus server shut down"),
                Err(_) => warn!("Modbus server shutdown timed out, forcing termination"),
            }
            modbus_alive.store(false, Ordering::Relaxed);
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Launch the WebSocket push endpoint on the dashboard port plus one.
    async fn start_push_server(&mut self, config: &Config) -> Result<()> {
        let socket_addr: SocketAddr = format!(
            "{}:{}",
            config.dashboard.address,
            config.dashboard.push_port()
        )
        .parse()
        .with_context(|| "invalid dashboard address")?;

        let handle = spawn_push_server(
            socket_addr,
            self.broadcaster.clone(),
            self.command_tx.clone(),
        )
        .await
        .with_context(|| format!("cannot bind push feed port {socket_addr}"))?;

        self.push_handle = Some(handle);
        Ok(())
    }

    /// Periodic liveness log line.
    fn start_heartbeat(&mut self) {
        let running = self.running.clone();
        let task = tokio::spawn(async move {
            let mut seconds = 0u64;
            while running.load(Ordering::SeqCst) {
                // Short sleeps keep shutdown inside the join grace window.
                time::sleep(Duration::from_secs(1)).await;
                seconds += 1;
                if seconds % 60 == 0 {
                    debug!("Daemon heartbeat: running");
                }
            }
            Ok(())
        });
        self.tasks.push(task);
    }

    /// Signal all tasks to stop. Does not wait; call `join()` after.
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait for every task to finish, with a bounded grace window each.
    ///
    /// Returns the first task error, so a fatal loop failure (poisoned
    /// bank lock) propagates to the exit code.
    pub async fn join(mut self) -> Result<()> {
        if let Some(push_handle) = self.push_handle.take() {
            if let Err(e) = push_handle.shutdown().await {
                warn!("Push server shutdown failed: {e}");
            }
        }

        let mut first_error = None;
        for task in self.tasks {
            match time::timeout(JOIN_GRACE, task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    error!("Task failed: {e}");
                    first_error.get_or_insert(e);
                }
                Ok(Err(e)) => error!("Task panicked: {e}"),
                Err(_) => warn!("Task did not stop within grace period, may be hung"),
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// True while no task has requested termination.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}
