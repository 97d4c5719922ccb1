//! Scripted in-memory transport
//!
//! [`MockTransport`] answers `connect` and `exec` from a per-host script, and
//! records how many sessions were open at once and how many were closed. It
//! is what the prober and scheduler tests run against.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::error::{RemoteError, Result};
use crate::transport::{CommandOutput, RemoteSession, Transport};

/// What a scripted command does
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this output
    Output(CommandOutput),
    /// Return this output after a delay (the exec timeout still applies)
    Delayed(Duration, CommandOutput),
    /// Never answer; the exec timeout fires
    Hang,
    /// The session drops underneath the command
    Disconnect,
    /// The server refuses to run the command on this channel
    Reject(String),
    /// The command panics
    Panic(String),
}

impl MockReply {
    /// Successful command with the given stdout
    pub fn stdout(stdout: impl Into<String>) -> Self {
        MockReply::Output(CommandOutput {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_status: Some(0),
        })
    }

    /// Failed command with the given stderr
    pub fn stderr(stderr: impl Into<String>, exit_status: u32) -> Self {
        MockReply::Output(CommandOutput {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_status: Some(exit_status),
        })
    }
}

/// Script for one host
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    refuse: Option<String>,
    connect_panic: Option<String>,
    connect_delay: Duration,
    replies: Vec<(String, MockReply)>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host whose connection attempts fail with `reason`
    pub fn refusing(reason: impl Into<String>) -> Self {
        Self {
            refuse: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Host whose connection attempts panic with `message`
    pub fn panicking_on_connect(message: impl Into<String>) -> Self {
        Self {
            connect_panic: Some(message.into()),
            ..Self::default()
        }
    }

    /// Delay every connection attempt (the connect timeout still applies)
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Answer commands starting with `prefix`. Earlier entries win.
    pub fn reply(mut self, prefix: impl Into<String>, reply: MockReply) -> Self {
        self.replies.push((prefix.into(), reply));
        self
    }

    fn lookup(&self, command: &str) -> MockReply {
        self.replies
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| {
                let program = command.split_whitespace().next().unwrap_or_default();
                MockReply::stderr(format!("bash: {}: command not found", program), 127)
            })
    }
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    commands: AtomicUsize,
}

impl Counters {
    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory [`Transport`] driven by per-host scripts
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    hosts: Arc<HashMap<String, MockHost>>,
    counters: Arc<Counters>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the script for `host`
    pub fn host(mut self, host: impl Into<String>, script: MockHost) -> Self {
        Arc::make_mut(&mut self.hosts).insert(host.into(), script);
        self
    }

    /// Highest number of hosts being worked on at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Sessions successfully opened
    pub fn sessions_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Sessions released through [`RemoteSession::close`]
    pub fn sessions_closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Commands executed across all sessions
    pub fn commands_run(&self) -> usize {
        self.counters.commands.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, host: &str, connect_timeout: Duration) -> Result<Box<dyn RemoteSession>> {
        if let Some(message) = self.hosts.get(host).and_then(|h| h.connect_panic.as_ref()) {
            panic!("{}", message);
        }

        self.counters.enter();

        let Some(script) = self.hosts.get(host).cloned() else {
            self.counters.leave();
            return Err(RemoteError::Connection(format!("{}: no route to host", host)));
        };

        if connect_timeout < script.connect_delay {
            sleep(connect_timeout).await;
            self.counters.leave();
            return Err(RemoteError::Timeout(connect_timeout));
        }
        sleep(script.connect_delay).await;

        if let Some(reason) = &script.refuse {
            self.counters.leave();
            return Err(RemoteError::Connection(format!("{}: {}", host, reason)));
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            host: host.to_string(),
            script,
            counters: Arc::clone(&self.counters),
        }))
    }
}

/// Session handed out by [`MockTransport`]
#[derive(Debug)]
pub struct MockSession {
    host: String,
    script: MockHost,
    counters: Arc<Counters>,
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn exec(&self, command: &str, command_timeout: Duration) -> Result<CommandOutput> {
        self.counters.commands.fetch_add(1, Ordering::SeqCst);

        match self.script.lookup(command) {
            MockReply::Output(output) => Ok(output),
            MockReply::Delayed(delay, output) => timeout(command_timeout, sleep(delay))
                .await
                .map(|_| output)
                .map_err(|_| RemoteError::Timeout(command_timeout)),
            MockReply::Hang => {
                sleep(command_timeout).await;
                Err(RemoteError::Timeout(command_timeout))
            }
            MockReply::Disconnect => Err(RemoteError::SessionClosed),
            MockReply::Reject(reason) => Err(RemoteError::Channel(reason)),
            MockReply::Panic(message) => panic!("{}", message),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        self.counters.leave();
        Ok(())
    }

    fn host(&self) -> &str {
        &self.host
    }
}
